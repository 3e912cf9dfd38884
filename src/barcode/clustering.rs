use itertools::Itertools;

use crate::barcode::Blob;

/// For every blob, indices of the other blobs not farther than `max_distance`.
/// Lists are sorted ascending.
pub fn neighbor_lists(blobs: &[Blob], max_distance: f32) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); blobs.len()];
    for (i, j) in (0..blobs.len()).tuple_combinations() {
        if blobs[i].distance_to(&blobs[j]) <= max_distance {
            neighbors[i].push(j);
            neighbors[j].push(i);
        }
    }
    for list in neighbors.iter_mut() {
        list.sort_unstable();
    }
    neighbors
}

/// Single-linkage clustering of one frame's blobs: blobs closer than `max_distance`
/// end up in the same cluster, transitively.
///
/// Clusters are ordered by their lowest blob index and members are sorted ascending,
/// so the output only depends on the input order.
pub fn spatial_clusters(blobs: &[Blob], max_distance: f32) -> Vec<Vec<usize>> {
    let neighbors = neighbor_lists(blobs, max_distance);
    let mut cluster_of: Vec<Option<usize>> = vec![None; blobs.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for start in 0..blobs.len() {
        if cluster_of[start].is_some() {
            continue;
        }
        let cluster_idx = clusters.len();
        let mut members = vec![start];
        cluster_of[start] = Some(cluster_idx);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &next in &neighbors[current] {
                if cluster_of[next].is_some() {
                    continue;
                }
                cluster_of[next] = Some(cluster_idx);
                members.push(next);
                stack.push(next);
            }
        }
        members.sort_unstable();
        clusters.push(members);
    }
    clusters
}
