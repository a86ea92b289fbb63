use super::RankedResults;

/// Number of runner-up ranks the top candidate is compared against.
const CONFIDENCE_DEPTH: usize = 2;

/// Marks the top candidate of `ranked` as confident if rank 1 or rank 2 points at the same
/// reference one second earlier or later.
///
/// A true match that straddles a one-second boundary tends to show up twice in the ranking,
/// at two adjacent offsets. Sets with fewer than two entries are left untouched. Only the
/// top entry is ever written; the rest of the ranking is unchanged.
///
/// Returns the value of the top candidate's flag after the check.
pub fn check_confidence(ranked: &mut RankedResults) -> bool {
    let span = tracing::span!(tracing::Level::TRACE, "check_confidence");
    let _enter = span.enter();

    if ranked.len() < 2 {
        return false;
    }

    let confident = {
        let entries = ranked.entries();
        let top = &entries[0];
        entries[1..]
            .iter()
            .take(CONFIDENCE_DEPTH)
            .any(|c| c.video_id == top.video_id && c.offset.abs_diff(top.offset) == 1)
    };

    if let Some(top) = ranked.top_mut() {
        top.confident = confident;
    }

    tracing::debug!(
        modality = %ranked.modality(),
        confident,
        "finished confidence check"
    );

    confident
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matcher::{rank, Candidate, Modality};
    use crate::util::SpanRecorder;

    fn ranked(entries: &[(&str, u32)]) -> RankedResults {
        rank(
            entries
                .iter()
                .enumerate()
                .map(|(i, (video, offset))| Candidate::new(*video, *offset, i as f64, Modality::Motion)),
            3,
            Modality::Motion,
        )
    }

    #[test]
    fn test_adjacent_offset_in_rank_one() {
        let mut results = ranked(&[("a", 10), ("a", 11), ("b", 4)]);
        assert!(check_confidence(&mut results));
        assert!(results.is_confident());
        assert!(!results.entries()[1].confident);
        assert_eq!(results.entries()[1].offset, 11);
    }

    #[test]
    fn test_adjacent_offset_in_rank_two() {
        let mut results = ranked(&[("a", 10), ("b", 3), ("a", 9)]);
        assert!(check_confidence(&mut results));
        assert!(results.is_confident());
    }

    #[test]
    fn test_not_adjacent_or_other_video() {
        let mut results = ranked(&[("a", 10), ("a", 12), ("b", 11)]);
        assert!(!check_confidence(&mut results));
        assert!(!results.is_confident());

        let mut results = ranked(&[("a", 10), ("a", 10)]);
        assert!(!check_confidence(&mut results));
    }

    #[test]
    fn test_too_few_entries() {
        let mut results = ranked(&[("a", 10)]);
        assert!(!check_confidence(&mut results));
        assert!(!results.is_confident());

        let mut empty = ranked(&[]);
        assert!(!check_confidence(&mut empty));
    }

    #[test]
    fn test_check_runs_inside_span() {
        let recorder = SpanRecorder::default();
        let mut results = ranked(&[("a.mp4", 10), ("a.mp4", 11)]);
        let confident = tracing::subscriber::with_default(recorder.clone(), || {
            check_confidence(&mut results)
        });
        assert!(confident);
        assert_eq!(recorder.entered(), vec!["check_confidence"]);
    }
}
