//! # Level Statistics
//!
//! Read-only aggregation over every progress record of a level.
//!
//! Integer arithmetic only: the star average is kept in hundredths
//! (`average_stars_hundredths = 233` means 2.33), rounded half up. An empty
//! record set yields all-zero statistics.

use crate::ProgressRecord;
use serde::{Deserialize, Serialize};

/// Aggregated results for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LevelStatistics {
    /// Players who submitted at least once (one record per player).
    pub total_attempts: usize,
    /// Records with a passing rating.
    pub completed_count: usize,
    /// Mean star rating over all records, in hundredths.
    pub average_stars_hundredths: u32,
    /// Records with a perfect rating.
    pub three_stars_count: usize,
    /// Mean seconds from start to completion, over records with both dates.
    pub average_duration_seconds: u64,
}

impl LevelStatistics {
    /// Aggregate a level's progress records.
    #[must_use]
    pub fn from_records(records: &[ProgressRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let total_attempts = records.len();
        let completed_count = records.iter().filter(|r| r.stars.is_passing()).count();
        let three_stars_count = records.iter().filter(|r| r.stars.is_perfect()).count();

        let star_sum: u64 = records.iter().map(|r| u64::from(r.stars.value())).sum();
        let n = total_attempts as u64;
        let average_stars_hundredths =
            u32::try_from((star_sum * 100 + n / 2) / n).unwrap_or(u32::MAX);

        let durations: Vec<u64> = records.iter().filter_map(|r| r.duration_seconds()).collect();
        let average_duration_seconds = if durations.is_empty() {
            0
        } else {
            let total: u128 = durations.iter().map(|d| u128::from(*d)).sum();
            u64::try_from(total / durations.len() as u128).unwrap_or(u64::MAX)
        };

        Self {
            total_attempts,
            completed_count,
            average_stars_hundredths,
            three_stars_count,
            average_duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LevelId, Stars};
    use chrono::{DateTime, Duration, Utc};

    fn record(uid: &str, stars: u8, seconds: Option<i64>) -> ProgressRecord {
        let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("date")
            .with_timezone(&Utc);
        ProgressRecord {
            progress_id: ProgressRecord::key(uid, LevelId(1)),
            user_id: uid.to_string(),
            level_id: LevelId(1),
            stars: Stars::new(stars),
            score: 0,
            start_date: start,
            completion_date: seconds.map(|s| start + Duration::seconds(s)),
            solution: None,
        }
    }

    #[test]
    fn no_records_yields_zeroes() {
        let stats = LevelStatistics::from_records(&[]);
        assert_eq!(stats, LevelStatistics::default());
        assert_eq!(stats.average_stars_hundredths, 0);
        assert_eq!(stats.completed_count, 0);
    }

    #[test]
    fn aggregates_counts_and_averages() {
        let records = vec![
            record("a", 3, Some(60)),
            record("b", 0, Some(120)),
            record("c", 2, None),
        ];
        let stats = LevelStatistics::from_records(&records);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.completed_count, 2);
        assert_eq!(stats.three_stars_count, 1);
        // 5 / 3 = 1.666.. -> 1.67
        assert_eq!(stats.average_stars_hundredths, 167);
        assert_eq!(stats.average_duration_seconds, 90);
    }

    #[test]
    fn records_without_durations_average_zero_seconds() {
        let stats = LevelStatistics::from_records(&[record("a", 1, None)]);
        assert_eq!(stats.average_duration_seconds, 0);
        assert_eq!(stats.average_stars_hundredths, 100);
    }

    #[test]
    fn completion_before_start_is_ignored() {
        let stats = LevelStatistics::from_records(&[record("a", 1, Some(-30)), record("b", 1, Some(30))]);
        assert_eq!(stats.average_duration_seconds, 30);
    }
}
