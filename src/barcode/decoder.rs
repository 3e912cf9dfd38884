use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;

use crate::barcode::{
    spatial_clusters, Blob, CandidateBarcode, CandidateLabels, Catalog, Color, IdentityIndex,
    LabelOption,
};
use crate::mot::DecoderConfig;
use crate::utils::{euclidean_distance, normalize_angle, Point};

// A chain may have at most one defect: a missing chip or a chip of the wrong color
const MAX_DEFECTS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Empty,
    Found(usize),
    Mismatched(usize),
}

impl Slot {
    fn blob(&self) -> Option<usize> {
        match self {
            Slot::Empty => None,
            Slot::Found(idx) | Slot::Mismatched(idx) => Some(*idx),
        }
    }
}

#[derive(Debug, Clone)]
struct Chain {
    slots: Vec<Slot>,
    missing: usize,
    mismatched: usize,
    confidence: f32,
    spread: f32,
}

impl Chain {
    fn defects(&self) -> usize {
        self.missing + self.mismatched
    }
    fn blob_indices(&self) -> Vec<usize> {
        self.slots.iter().filter_map(|s| s.blob()).collect()
    }
    // Fewer defects, then higher confidence, then more compact, then lower blob indices
    fn is_better_than(&self, other: &Chain) -> bool {
        let ord = self
            .defects()
            .cmp(&other.defects())
            .then(other.confidence.total_cmp(&self.confidence))
            .then(self.spread.total_cmp(&other.spread))
            .then(self.blob_indices().cmp(&other.blob_indices()));
        ord == Ordering::Less
    }
}

/// Depth-first search of chains of one cluster matching one color code
struct ChainSearch<'a> {
    blobs: &'a [Blob],
    members: &'a [usize],
    code: &'a [Color],
    config: &'a DecoderConfig,
}

impl<'a> ChainSearch<'a> {
    fn run(&self) -> Option<Chain> {
        let mut best: Option<Chain> = None;
        let mut slots = Vec::with_capacity(self.code.len());
        self.extend(&mut slots, 0, &mut best);
        best
    }

    fn extend(&self, slots: &mut Vec<Slot>, defects: usize, best: &mut Option<Chain>) {
        let pos = slots.len();
        if pos == self.code.len() {
            if let Some(chain) = self.evaluate(slots) {
                let replace = match best {
                    Some(current) => chain.is_better_than(current),
                    None => true,
                };
                if replace {
                    *best = Some(chain);
                }
            }
            return;
        }
        let last_present = slots
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, s)| s.blob().map(|b| (i, b)));
        for &member in self.members {
            if slots.iter().any(|s| s.blob() == Some(member)) {
                continue;
            }
            if let Some((last_pos, last_blob)) = last_present {
                let allowed = (pos - last_pos) as f32 * self.config.max_inter_blob_distance;
                if self.blobs[member].distance_to(&self.blobs[last_blob]) > allowed {
                    continue;
                }
            }
            if self.blobs[member].color == self.code[pos] {
                slots.push(Slot::Found(member));
                self.extend(slots, defects, best);
                slots.pop();
            } else if defects < MAX_DEFECTS {
                slots.push(Slot::Mismatched(member));
                self.extend(slots, defects + 1, best);
                slots.pop();
            }
        }
        if defects < MAX_DEFECTS {
            slots.push(Slot::Empty);
            self.extend(slots, defects + 1, best);
            slots.pop();
        }
    }

    fn evaluate(&self, slots: &[Slot]) -> Option<Chain> {
        let present: Vec<(usize, usize)> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.blob().map(|b| (i, b)))
            .collect();
        if present.len() < 2 {
            return None;
        }
        let centers: Vec<Point> = present.iter().map(|&(_, b)| self.blobs[b].center).collect();
        if !is_chain_straight(&centers, self.config.min_chain_angle_deg) {
            return None;
        }
        let missing = slots.iter().filter(|s| matches!(s, Slot::Empty)).count();
        let mismatched = slots
            .iter()
            .filter(|s| matches!(s, Slot::Mismatched(_)))
            .count();
        let crowded = self.members.len() > present.len();
        let mut confidence = 1.0
            - missing as f32 * self.config.missing_blob_penalty
            - mismatched as f32 * self.config.color_mismatch_penalty;
        if crowded {
            confidence -= self.config.crowding_penalty;
        }
        let spread = present
            .windows(2)
            .map(|w| {
                let d = self.blobs[w[0].1].distance_to(&self.blobs[w[1].1]);
                d / (w[1].0 - w[0].0) as f32
            })
            .sum::<f32>();
        Some(Chain {
            slots: slots.to_vec(),
            missing,
            mismatched,
            confidence: confidence.clamp(0.0, 1.0),
            spread,
        })
    }
}

/// Checks that blob centers (in chip order) could form one straight-ish barcode:
/// no blob is closer to a non-adjacent one than to its neighbours and every
/// interior angle is at least `min_angle_deg`.
pub fn is_chain_straight(centers: &[Point], min_angle_deg: f32) -> bool {
    let n = centers.len();
    if n < 3 {
        return true;
    }
    for j in 0..n - 2 {
        for k in j + 2..n {
            let d_next = euclidean_distance(&centers[j], &centers[j + 1]);
            let d_far = euclidean_distance(&centers[j], &centers[k]);
            let d_between = euclidean_distance(&centers[j + 1], &centers[k]);
            if d_far < d_next || d_far < d_between {
                return false;
            }
        }
    }
    for j in 1..n - 1 {
        let v1 = (centers[j - 1].x - centers[j].x, centers[j - 1].y - centers[j].y);
        let v2 = (centers[j + 1].x - centers[j].x, centers[j + 1].y - centers[j].y);
        let norms = f32::hypot(v1.0, v1.1) * f32::hypot(v2.0, v2.1);
        if norms == 0.0 {
            return false;
        }
        let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / norms).clamp(-1.0, 1.0);
        if cos.acos().to_degrees() < min_angle_deg {
            return false;
        }
    }
    true
}

/// Orientation of a chip sequence: principal axis of the centers, pointing from the last chip towards the first one
pub fn chain_orientation(centers: &[Point]) -> Option<f32> {
    let first = centers.first()?;
    let last = centers.last()?;
    let center = Point::centroid(centers.iter())?;
    let (mut xx, mut xy, mut yy) = (0.0f32, 0.0f32, 0.0f32);
    for p in centers {
        let dx = p.x - center.x;
        let dy = p.y - center.y;
        xx += dx * dx;
        xy += dx * dy;
        yy += dy * dy;
    }
    if xx == 0.0 && yy == 0.0 {
        return None;
    }
    let mut angle = 0.5 * f32::atan2(2.0 * xy, xx - yy);
    let front = (first.x - last.x, first.y - last.y);
    if front.0 * angle.cos() + front.1 * angle.sin() < 0.0 {
        angle += std::f32::consts::PI;
    }
    Some(normalize_angle(angle))
}

/// Turns same-frame blobs into candidate barcodes labelled with catalog identities
#[derive(Debug, Clone)]
pub struct BarcodeDecoder {
    catalog: Arc<Catalog>,
    config: DecoderConfig,
}

impl BarcodeDecoder {
    /// Basic usage:
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tagtrack_rs::barcode::{BarcodeDecoder, Blob, Catalog, Color};
    /// use tagtrack_rs::mot::DecoderConfig;
    /// let catalog = Arc::new(Catalog::from_codes(&[("rat_07", "RGB")]).unwrap());
    /// let decoder = BarcodeDecoder::new(catalog, DecoderConfig::default());
    /// let blobs = vec![
    ///     Blob::new(5, Color('R'), 100.0, 100.0, 4.0),
    ///     Blob::new(5, Color('G'), 115.0, 100.0, 4.0),
    ///     Blob::new(5, Color('B'), 130.0, 100.0, 4.0),
    /// ];
    /// let candidates = decoder.decode_frame(5, &blobs);
    /// assert_eq!(candidates.len(), 1);
    /// assert!(candidates[0].is_decoded());
    /// ```
    pub fn new(catalog: Arc<Catalog>, config: DecoderConfig) -> Self {
        BarcodeDecoder { catalog, config }
    }
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
    /// Clusters the blobs of one frame and decodes every cluster.
    /// A cluster yields one candidate per group of options sharing blobs, so two tags
    /// standing close together come back as two candidates. Nothing is dropped: blobs
    /// covered by no option come back as one `Unlabeled` candidate per cluster.
    pub fn decode_frame(&self, frame: usize, blobs: &[Blob]) -> Vec<CandidateBarcode> {
        spatial_clusters(blobs, self.config.max_inter_blob_distance)
            .into_iter()
            .flat_map(|members| self.decode_members(frame, blobs, members))
            .collect()
    }

    fn decode_members(
        &self,
        frame: usize,
        blobs: &[Blob],
        members: Vec<usize>,
    ) -> Vec<CandidateBarcode> {
        let options = self.decode_cluster(blobs, &members);
        let mut candidates = Vec::new();
        let mut covered: HashSet<usize> = HashSet::new();
        for mut group in split_overlapping(options) {
            group.sort_by(by_confidence);
            let blob_indices: Vec<usize> = group
                .iter()
                .flat_map(|o| o.blob_indices())
                .sorted()
                .dedup()
                .collect();
            covered.extend(blob_indices.iter().copied());
            let labels = CandidateLabels::from_options(group);
            candidates.push(candidate(frame, blobs, blob_indices, labels));
        }
        let leftovers: Vec<usize> = members.into_iter().filter(|m| !covered.contains(m)).collect();
        if !leftovers.is_empty() {
            candidates.push(candidate(frame, blobs, leftovers, CandidateLabels::Unlabeled));
        }
        candidates
    }

    fn decode_cluster(&self, blobs: &[Blob], members: &[usize]) -> Vec<LabelOption> {
        if members.len() < 2 {
            return Vec::new();
        }
        let options: Vec<LabelOption> = self
            .catalog
            .iter()
            .filter_map(|(identity, def)| {
                let search = ChainSearch {
                    blobs,
                    members,
                    code: &def.colors,
                    config: &self.config,
                };
                search
                    .run()
                    .map(|chain| self.label_option(identity, &chain, blobs))
            })
            .collect();
        prune_dominated(options)
    }

    fn label_option(&self, identity: IdentityIndex, chain: &Chain, blobs: &[Blob]) -> LabelOption {
        let chips = chain.slots.len();
        let present: Vec<(usize, Point)> = chain
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.blob().map(|b| (i, blobs[b].center)))
            .collect();
        let centers: Vec<Point> = present.iter().map(|(_, p)| *p).collect();
        let mut position = Point::centroid(centers.iter()).unwrap_or_default();
        let orientation = chain_orientation(&centers).unwrap_or(0.0);
        if chain.missing > 0 && present.len() >= 2 {
            // shift the centroid of the found chips back to the middle of the barcode
            let middle = (chips - 1) as f32 / 2.0;
            let offset = present.iter().map(|(i, _)| *i as f32 - middle).sum::<f32>()
                / present.len() as f32;
            let spacing = present
                .windows(2)
                .map(|w| euclidean_distance(&w[0].1, &w[1].1) / (w[1].0 - w[0].0) as f32)
                .sum::<f32>()
                / (present.len() - 1) as f32;
            position.x += offset * spacing * orientation.cos();
            position.y += offset * spacing * orientation.sin();
        }
        LabelOption {
            identity,
            confidence: chain.confidence,
            position,
            orientation,
            chips: chain.slots.iter().map(|s| s.blob()).collect(),
            missing: chain.missing,
            mismatched: chain.mismatched,
        }
    }
}

fn candidate(
    frame: usize,
    blobs: &[Blob],
    blob_indices: Vec<usize>,
    labels: CandidateLabels,
) -> CandidateBarcode {
    let centroid = Point::centroid(blob_indices.iter().map(|&i| &blobs[i].center)).unwrap_or_default();
    CandidateBarcode {
        frame,
        blob_indices,
        centroid,
        labels,
    }
}

fn by_confidence(a: &LabelOption, b: &LabelOption) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then(a.identity.cmp(&b.identity))
}

/// Drops options that reuse blobs of an option with fewer defects.
/// Equally good overlapping options are all kept (their candidate becomes ambiguous).
/// Result is ordered by confidence (descending), then identity.
fn prune_dominated(mut options: Vec<LabelOption>) -> Vec<LabelOption> {
    options.sort_by(|a, b| {
        a.defects()
            .cmp(&b.defects())
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.identity.cmp(&b.identity))
    });
    let mut kept: Vec<LabelOption> = Vec::with_capacity(options.len());
    for option in options {
        let dominated = kept
            .iter()
            .any(|k| k.defects() < option.defects() && k.shares_blob_with(&option));
        if !dominated {
            kept.push(option);
        }
    }
    kept.sort_by(by_confidence);
    kept
}

/// Partitions options into groups connected through shared blobs.
/// Groups keep the order in which their first option appears.
fn split_overlapping(options: Vec<LabelOption>) -> Vec<Vec<LabelOption>> {
    let mut groups: Vec<Vec<LabelOption>> = Vec::new();
    for option in options {
        let touching: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.iter().any(|o| o.shares_blob_with(&option)))
            .map(|(idx, _)| idx)
            .collect();
        match touching.split_first() {
            None => groups.push(vec![option]),
            Some((&first, rest)) => {
                // the option bridges several groups: merge them into the first one
                for &idx in rest.iter().rev() {
                    let merged = groups.remove(idx);
                    groups[first].extend(merged);
                }
                groups[first].push(option);
            }
        }
    }
    groups
}
