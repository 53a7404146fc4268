use super::extended::{extend_labels_into, required_frames};
use super::gradient::{accumulate_marginals, write_gradient};
use super::lattice::Lattice;
use super::LogProbMatrix;
use crate::types::{ItemOutcome, ItemStatus};

/// Scratch buffers for one item, reused across items on the same thread.
#[derive(Debug, Default)]
pub struct Workspace {
    extended: Vec<usize>,
    lattice: Lattice,
    marginals: Vec<f64>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lattice of the most recently solved item.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn extended(&self) -> &[usize] {
        &self.extended
    }
}

/// Runs forward-backward for one item.
///
/// `gradient` must hold exactly `frames x alphabet_size` values; it is fully
/// overwritten, with zeros when the item is infeasible.
pub fn solve_item(
    log_probs: &LogProbMatrix<'_>,
    labels: &[usize],
    blank: usize,
    workspace: &mut Workspace,
    gradient: &mut [f64],
) -> ItemOutcome {
    let frames = log_probs.frames();
    let alphabet_size = log_probs.alphabet_size();
    debug_assert_eq!(gradient.len(), frames * alphabet_size);

    if blank >= alphabet_size || labels.iter().any(|&l| l >= alphabet_size) {
        gradient.fill(0.0);
        return ItemOutcome::failed(format!(
            "label or blank index outside alphabet of size {alphabet_size}"
        ));
    }

    let required = required_frames(labels);
    let infeasible = ItemStatus::Infeasible {
        label_len: labels.len(),
        seq_len: frames,
        required_frames: required,
    };
    if frames < required {
        gradient.fill(0.0);
        return ItemOutcome {
            loss: f64::INFINITY,
            status: infeasible,
        };
    }

    extend_labels_into(labels, blank, &mut workspace.extended);
    let extended = &workspace.extended;
    let lattice = &mut workspace.lattice;
    lattice.reset(extended.len(), frames);

    let log_likelihood = lattice.forward(log_probs, extended, blank);
    if log_likelihood == f64::NEG_INFINITY {
        // Feasible by length but every path crosses a zero-probability symbol.
        gradient.fill(0.0);
        return ItemOutcome {
            loss: f64::INFINITY,
            status: infeasible,
        };
    }
    lattice.backward(log_probs, extended, blank);

    accumulate_marginals(lattice, extended, alphabet_size, &mut workspace.marginals);
    write_gradient(log_probs, &workspace.marginals, log_likelihood, gradient);

    ItemOutcome {
        loss: -log_likelihood,
        status: ItemStatus::Ok,
    }
}
