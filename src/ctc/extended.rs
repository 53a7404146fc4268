/// Interleaves `blank` around every label: `[b, l0, b, l1, ..., b]`.
///
/// Always yields `2 * labels.len() + 1` entries.
pub fn build_extended_labels(labels: &[usize], blank: usize) -> Vec<usize> {
    let mut extended = Vec::with_capacity(2 * labels.len() + 1);
    extend_labels_into(labels, blank, &mut extended);
    extended
}

/// Same as [`build_extended_labels`] but reuses `out`'s allocation.
pub(crate) fn extend_labels_into(labels: &[usize], blank: usize, out: &mut Vec<usize>) {
    out.clear();
    out.push(blank);
    for &label in labels {
        out.push(label);
        out.push(blank);
    }
}

/// Minimum number of frames a monotonic alignment of `labels` needs: one per
/// label, plus a separating blank between every pair of equal neighbours.
pub fn required_frames(labels: &[usize]) -> usize {
    labels.len() + labels.windows(2).filter(|w| w[0] == w[1]).count()
}
