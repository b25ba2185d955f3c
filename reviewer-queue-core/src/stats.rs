//! Fairness accounting.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::state::ReviewerId;

/// One row of the fairness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsLine {
    pub id: ReviewerId,
    pub count: u64,
    /// `floor(count * 100 / total)`.
    pub percentage: u64,
}

/// Header row of the chat rendering.
pub const REPORT_HEADER: &str = "login, percentage, num assigned";

/// Count one more assignment for `reviewer_id`.
pub fn record_assignment(
    mut counts: BTreeMap<ReviewerId, u64>,
    reviewer_id: &ReviewerId,
) -> BTreeMap<ReviewerId, u64> {
    *counts.entry(reviewer_id.clone()).or_insert(0) += 1;
    counts
}

/// Per-reviewer share of all assignments, ordered by reviewer id.
///
/// Empty when nothing has been assigned yet.
pub fn report(counts: &BTreeMap<ReviewerId, u64>) -> Vec<StatsLine> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }

    counts
        .iter()
        .map(|(id, &count)| StatsLine {
            id: id.clone(),
            count,
            percentage: count.saturating_mul(100) / total,
        })
        .collect()
}

/// Render the report as the chat table.
pub fn render_report(lines: &[StatsLine]) -> String {
    let mut out = String::from(REPORT_HEADER);
    for line in lines {
        out.push('\n');
        out.push_str(&format!("{}, {}%, {}", line.id, line.percentage, line.count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counts(pairs: &[(&str, u64)]) -> BTreeMap<ReviewerId, u64> {
        pairs
            .iter()
            .map(|(id, n)| (ReviewerId::from(*id), *n))
            .collect()
    }

    #[test]
    fn test_record_initializes_then_increments() {
        let c = record_assignment(BTreeMap::new(), &"alice".into());
        assert_eq!(c, counts(&[("alice", 1)]));
        let c = record_assignment(c, &"alice".into());
        assert_eq!(c, counts(&[("alice", 2)]));
    }

    #[test]
    fn test_empty_report_when_no_assignments() {
        assert!(report(&BTreeMap::new()).is_empty());
        // Zero counts must not divide by zero either
        assert!(report(&counts(&[("alice", 0)])).is_empty());
    }

    #[test]
    fn test_report_floors_percentages() {
        let lines = report(&counts(&[("alice", 1), ("bob", 1), ("carol", 1)]));
        assert_eq!(
            lines.iter().map(|l| l.percentage).collect::<Vec<_>>(),
            vec![33, 33, 33]
        );
    }

    #[test]
    fn test_report_sorted_by_id() {
        let lines = report(&counts(&[("carol", 3), ("alice", 1)]));
        assert_eq!(lines[0].id.as_str(), "alice");
        assert_eq!(lines[0].percentage, 25);
        assert_eq!(lines[1].id.as_str(), "carol");
        assert_eq!(lines[1].percentage, 75);
    }

    #[test]
    fn test_render_report() {
        let rendered = render_report(&report(&counts(&[("alice", 2), ("bob", 1)])));
        assert_eq!(
            rendered,
            "login, percentage, num assigned\nalice, 66%, 2\nbob, 33%, 1"
        );
    }

    #[test]
    fn test_render_empty_report_is_header_only() {
        assert_eq!(render_report(&[]), REPORT_HEADER);
    }

    proptest! {
        /// Property: floored percentages never sum above 100 and each is within
        /// one point of the exact share.
        #[test]
        fn percentages_sum_at_most_100(values in proptest::collection::vec(0u64..1000, 1..12)) {
            let c: BTreeMap<ReviewerId, u64> = values
                .iter()
                .enumerate()
                .map(|(i, n)| (ReviewerId::from(format!("r{}", i)), *n))
                .collect();
            let total: u64 = values.iter().sum();
            let lines = report(&c);

            if total == 0 {
                prop_assert!(lines.is_empty());
            } else {
                let sum: u64 = lines.iter().map(|l| l.percentage).sum();
                prop_assert!(sum <= 100);
                for line in &lines {
                    let exact = line.count as f64 * 100.0 / total as f64;
                    prop_assert!(line.percentage as f64 <= exact);
                    prop_assert!(exact - (line.percentage as f64) < 1.0);
                }
            }
        }
    }
}
