use serde::Serialize;

use crate::models::{ApplicationRecord, ApplicationStatus};

/// Count per status. Both interview statuses share one bucket; records with
/// an unrecognized status count toward `total` only.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub not_applied: usize,
    pub applied: usize,
    pub screening: usize,
    pub interview: usize,
    pub offer: usize,
    pub rejected: usize,
    pub withdrew: usize,
    pub accepted: usize,
}

impl Stats {
    pub fn buckets(&self) -> [(&'static str, usize); 8] {
        [
            ("Not Applied", self.not_applied),
            ("Applied", self.applied),
            ("Screening", self.screening),
            ("Interview", self.interview),
            ("Offer Received", self.offer),
            ("Rejected", self.rejected),
            ("Withdrew", self.withdrew),
            ("Accepted", self.accepted),
        ]
    }

    pub fn counted(&self) -> usize {
        self.buckets().iter().map(|(_, n)| n).sum()
    }
}

pub fn compute_stats(records: &[ApplicationRecord]) -> Stats {
    let mut stats = Stats {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        let bucket = match record.status {
            ApplicationStatus::NotApplied => &mut stats.not_applied,
            ApplicationStatus::Applied => &mut stats.applied,
            ApplicationStatus::Screening => &mut stats.screening,
            ApplicationStatus::InterviewScheduled | ApplicationStatus::Interviewed => &mut stats.interview,
            ApplicationStatus::OfferReceived => &mut stats.offer,
            ApplicationStatus::Rejected => &mut stats.rejected,
            ApplicationStatus::Withdrew => &mut stats.withdrew,
            ApplicationStatus::Accepted => &mut stats.accepted,
            ApplicationStatus::Unknown(_) => continue,
        };
        *bucket += 1;
    }
    stats
}

/// Header counters for the list view. Unlike `Stats`, Screening is folded
/// into Applied and Accepted into Offer.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct QuickStats {
    pub total: usize,
    pub applied: usize,
    pub interview: usize,
    pub offer: usize,
}

pub fn quick_stats(records: &[ApplicationRecord]) -> QuickStats {
    let mut quick = QuickStats {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        match record.status {
            ApplicationStatus::Applied | ApplicationStatus::Screening => quick.applied += 1,
            ApplicationStatus::InterviewScheduled | ApplicationStatus::Interviewed => quick.interview += 1,
            ApplicationStatus::OfferReceived | ApplicationStatus::Accepted => quick.offer += 1,
            _ => {}
        }
    }
    quick
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn with_status(status: ApplicationStatus) -> ApplicationRecord {
        let mut r = ApplicationRecord::candidate("Co", "Job", None, None, "", "", Utc::now());
        r.status = status;
        r
    }

    #[test]
    fn test_every_known_status_is_counted() {
        let records: Vec<ApplicationRecord> = ApplicationStatus::ALL.iter().cloned().map(with_status).collect();
        let stats = compute_stats(&records);
        assert_eq!(stats.total, 9);
        assert_eq!(stats.interview, 2);
        assert_eq!(stats.counted(), stats.total);
        assert!(stats.buckets().iter().all(|(_, n)| *n >= 1));
    }

    #[test]
    fn test_unknown_status_only_in_total() {
        let records = vec![
            with_status(ApplicationStatus::Applied),
            with_status(ApplicationStatus::Unknown("Ghosted".into())),
        ];
        let stats = compute_stats(&records);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.counted(), 1);
    }

    #[test]
    fn test_empty() {
        assert_eq!(compute_stats(&[]), Stats::default());
        assert_eq!(quick_stats(&[]), QuickStats::default());
    }

    #[test]
    fn test_quick_stats_merge_buckets() {
        let records = vec![
            with_status(ApplicationStatus::Applied),
            with_status(ApplicationStatus::Screening),
            with_status(ApplicationStatus::InterviewScheduled),
            with_status(ApplicationStatus::OfferReceived),
            with_status(ApplicationStatus::Accepted),
            with_status(ApplicationStatus::Rejected),
        ];
        let quick = quick_stats(&records);
        assert_eq!(quick, QuickStats { total: 6, applied: 2, interview: 1, offer: 2 });

        let full = compute_stats(&records);
        assert_eq!(full.applied, 1);
        assert_eq!(full.screening, 1);
    }
}
