use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::Modality;

/// A hypothesis that the query starts at `offset` inside reference `video_id`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Candidate {
    pub video_id: String,
    pub offset: u32,
    pub distance: f64,
    pub modality: Modality,
    /// Set by the confidence check on the top-ranked candidate only.
    #[serde(default)]
    pub confident: bool,
}

impl Candidate {
    pub fn new(video_id: impl Into<String>, offset: u32, distance: f64, modality: Modality) -> Self {
        Self {
            video_id: video_id.into(),
            offset,
            distance,
            modality,
            confident: false,
        }
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "video: {}, offset: {}, distance: {}, modality: {}, confident: {}",
            self.video_id, self.offset, self.distance, self.modality, self.confident,
        )
    }
}

/// Bounded accumulator of the `capacity` lowest-distance candidates seen so far.
///
/// A candidate is admitted while the set has room, or when its distance is strictly less
/// than the current worst entry. Equal distances therefore never displace an entry that
/// arrived earlier, and among equal entries the earlier one keeps the better rank.
#[derive(Clone, Debug)]
pub struct TopK {
    capacity: usize,
    entries: Vec<Candidate>,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    /// Offers a candidate. Returns true if it was admitted.
    pub fn offer(&mut self, candidate: Candidate) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.entries.len() == self.capacity {
            match self.entries.last() {
                Some(worst) if candidate.distance < worst.distance => (),
                _ => return false,
            }
        }

        let idx = self
            .entries
            .partition_point(|e| e.distance <= candidate.distance);
        self.entries.insert(idx, candidate);
        self.entries.truncate(self.capacity);
        true
    }

    /// Offers every entry of `other`, in rank order.
    ///
    /// Merging per-reference sets in reference order produces the same result as offering
    /// every candidate of every reference to a single [TopK] in that order.
    pub fn merge(&mut self, other: TopK) {
        for candidate in other.entries {
            self.offer(candidate);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seals this set into a [RankedResults] for `modality`.
    pub fn into_results(self, modality: Modality) -> RankedResults {
        RankedResults {
            modality,
            entries: self.entries,
        }
    }
}

/// The ranked top candidates of one modality, best first.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RankedResults {
    modality: Modality,
    entries: Vec<Candidate>,
}

impl RankedResults {
    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn entries(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.entries.first()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Candidate> {
        self.entries.first_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the top candidate carries the confidence flag.
    pub fn is_confident(&self) -> bool {
        self.top().map(|c| c.confident).unwrap_or(false)
    }
}

/// Ranks `candidates` in arrival order, keeping the best `k`.
pub fn rank(
    candidates: impl IntoIterator<Item = Candidate>,
    k: usize,
    modality: Modality,
) -> RankedResults {
    let mut top = TopK::new(k);
    for c in candidates {
        top.offer(c);
    }
    top.into_results(modality)
}

#[cfg(test)]
mod test {
    use super::*;

    fn candidate(video_id: &str, offset: u32, distance: f64) -> Candidate {
        Candidate::new(video_id, offset, distance, Modality::Motion)
    }

    fn ids(results: &RankedResults) -> Vec<(String, u32)> {
        results
            .entries()
            .iter()
            .map(|c| (c.video_id.clone(), c.offset))
            .collect()
    }

    #[test]
    fn test_keeps_lowest_distances() {
        let results = rank(
            vec![
                candidate("a", 0, 5.0),
                candidate("a", 1, 1.0),
                candidate("b", 0, 3.0),
                candidate("b", 1, 0.5),
                candidate("c", 0, 4.0),
            ],
            3,
            Modality::Motion,
        );
        assert_eq!(
            ids(&results),
            vec![
                ("b".to_string(), 1),
                ("a".to_string(), 1),
                ("b".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let results = rank(
            vec![
                candidate("a", 0, 1.0),
                candidate("a", 1, 2.0),
                candidate("b", 0, 2.0),
                candidate("b", 1, 2.0),
                candidate("c", 0, 2.0),
            ],
            3,
            Modality::Motion,
        );
        assert_eq!(
            ids(&results),
            vec![
                ("a".to_string(), 0),
                ("a".to_string(), 1),
                ("b".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_order_independent_without_ties() {
        let sorted = vec![
            candidate("a", 3, 0.1),
            candidate("b", 7, 0.2),
            candidate("a", 4, 0.3),
            candidate("c", 1, 0.4),
            candidate("b", 2, 0.5),
        ];
        let expected = rank(sorted.clone(), 3, Modality::Motion);

        let mut shuffled = sorted.clone();
        shuffled.reverse();
        assert_eq!(rank(shuffled, 3, Modality::Motion), expected);

        let mut rotated = sorted;
        rotated.rotate_left(2);
        assert_eq!(rank(rotated, 3, Modality::Motion), expected);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut top = TopK::new(3);
        for i in 0..100 {
            top.offer(candidate("a", i, 100.0 - i as f64));
        }
        assert_eq!(top.len(), 3);
        let results = top.into_results(Modality::Motion);
        assert_eq!(results.top().unwrap().offset, 99);
    }

    #[test]
    fn test_merge_matches_sequential_scan() {
        let references = vec![
            vec![candidate("a", 0, 2.0), candidate("a", 1, 1.0), candidate("a", 2, 1.0)],
            vec![candidate("b", 0, 1.0), candidate("b", 1, 0.5), candidate("b", 2, 3.0)],
            vec![candidate("c", 0, 1.0), candidate("c", 1, 0.5)],
        ];

        let mut sequential = TopK::new(3);
        for c in references.iter().flatten() {
            sequential.offer(c.clone());
        }

        let mut merged = TopK::new(3);
        for r in &references {
            let mut local = TopK::new(3);
            for c in r {
                local.offer(c.clone());
            }
            merged.merge(local);
        }

        assert_eq!(
            merged.into_results(Modality::Motion),
            sequential.into_results(Modality::Motion)
        );
    }

    #[test]
    fn test_zero_capacity() {
        let results = rank(vec![candidate("a", 0, 1.0)], 0, Modality::Audio);
        assert!(results.is_empty());
        assert!(!results.is_confident());
        assert_eq!(results.modality(), Modality::Audio);
    }
}
