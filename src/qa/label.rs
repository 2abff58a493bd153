//! Truth-label cooking

use smallvec::SmallVec;

use crate::cluster::{truth_label, Cluster, NO_LABEL};

/// Assign a truth label to a track from its clusters (earliest row first).
///
/// The most frequent primary tag wins, ties going to the tag seen first.
/// Clusters carrying the winner as a secondary tag count towards it too. The
/// label is negated (fake track) when more than `wrong` of the clusters
/// disagree, or when fewer than half of the last 10% of the clusters carry
/// it in any tag.
///
/// Returns 0 for an empty track and [`NO_LABEL`] when no cluster is tagged.
pub fn cook_label(clusters: &[&Cluster], wrong: f64) -> i32 {
    let n = clusters.len();
    if n == 0 {
        return 0;
    }

    let mut tally: SmallVec<[(i32, usize); 8]> = SmallVec::new();
    for c in clusters {
        let label = c.primary_label();
        if label == NO_LABEL {
            continue;
        }
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => tally.push((label, 1)),
        }
    }

    let mut best: Option<(i32, usize)> = None;
    for &(label, count) in &tally {
        if best.map_or(true, |(_, max)| count > max) {
            best = Some((label, count));
        }
    }
    let Some((label, mut max)) = best else {
        return NO_LABEL;
    };

    max += clusters
        .iter()
        .filter(|c| c.labels[1..].iter().any(|&l| l != NO_LABEL && truth_label(l) == label))
        .count();

    if 1.0 - max as f64 / n as f64 > wrong {
        return -label;
    }

    let tail = (0.1 * n as f64) as usize;
    let in_tail = clusters[n - tail..]
        .iter()
        .filter(|c| c.has_label(label))
        .count();
    if in_tail < (0.5 * tail as f64) as usize {
        -label
    } else {
        label
    }
}
