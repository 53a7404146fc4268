use std::path::Path;

use serde::Deserialize;

use crate::error::CtcError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CtcLossConfig {
    /// Alphabet index of the blank symbol, fixed for the lifetime of the engine.
    pub blank_index: usize,
    /// When false, inputs are raw activations and get a row-wise log-softmax
    /// before solving.
    pub after_log_softmax: bool,
    /// Tensor inputs are laid out `T x batch x A` instead of `batch x T x A`.
    pub time_major: bool,
    /// `None` runs one worker per batch item. `Some(n)` bounds the pool to `n` threads.
    pub max_workers: Option<usize>,
}

impl CtcLossConfig {
    pub const DEFAULT_BLANK_INDEX: usize = 0;

    pub fn load(path: &Path) -> Result<Self, CtcError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| CtcError::io("read ctc config", e))?;
        let config: Self =
            serde_json::from_str(&data).map_err(|e| CtcError::json("parse ctc config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CtcError> {
        if self.max_workers == Some(0) {
            return Err(CtcError::invalid_input("max_workers must be at least 1"));
        }
        Ok(())
    }
}

impl Default for CtcLossConfig {
    fn default() -> Self {
        Self {
            blank_index: Self::DEFAULT_BLANK_INDEX,
            after_log_softmax: true,
            time_major: false,
            max_workers: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctc_loss_config_default() {
        let config = CtcLossConfig::default();
        assert_eq!(config.blank_index, 0);
        assert!(config.after_log_softmax);
        assert!(!config.time_major);
        assert_eq!(config.max_workers, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: CtcLossConfig =
            serde_json::from_str(r#"{ "blank_index": 28, "max_workers": 4 }"#)
                .expect("valid config json");
        assert_eq!(config.blank_index, 28);
        assert_eq!(config.max_workers, Some(4));
        assert!(config.after_log_softmax);
        assert!(!config.time_major);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = CtcLossConfig {
            max_workers: Some(0),
            ..CtcLossConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CtcError::InvalidInput { .. })
        ));
    }

    #[test]
    fn load_reads_and_validates_file() {
        let path = std::env::temp_dir().join("ctc_loss_rs_config_load.json");
        std::fs::write(&path, r#"{ "blank_index": 3, "time_major": true }"#)
            .expect("write config");
        let config = CtcLossConfig::load(&path).expect("load config");
        assert_eq!(config.blank_index, 3);
        assert!(config.time_major);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_fails_on_missing_file() {
        let result = CtcLossConfig::load(Path::new("/nonexistent/ctc.json"));
        assert!(matches!(result, Err(CtcError::Io { .. })));
    }

    #[test]
    fn load_fails_on_bad_json() {
        let path = std::env::temp_dir().join("ctc_loss_rs_config_bad.json");
        std::fs::write(&path, "{ blank_index: ").expect("write config");
        let result = CtcLossConfig::load(&path);
        assert!(matches!(result, Err(CtcError::Json { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
