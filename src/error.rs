use thiserror::Error;

#[derive(Debug, Error)]
pub enum CtcError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error(
        "batch item {batch_index}: no alignment of {label_len} labels into {seq_len} frames \
         ({required_frames} frames required)"
    )]
    Infeasible {
        batch_index: usize,
        label_len: usize,
        seq_len: usize,
        required_frames: usize,
    },
    #[error("batch item {batch_index} failed: {message}")]
    ItemFailed { batch_index: usize, message: String },
}

impl CtcError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
