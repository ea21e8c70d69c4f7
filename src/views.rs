use chrono::{DateTime, Utc};

use crate::models::{ApplicationRecord, ApplicationStatus};

/// The status tabs of the list view, in display order.
pub const TABS: [&str; 8] = [
    "all",
    "Not Applied",
    "Applied",
    "Interview",
    "Offer Received",
    "Rejected",
    "Withdrew",
    "Accepted",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    /// Applied or Screening.
    Applied,
    /// Interview Scheduled or Interviewed.
    Interview,
    /// Exact label match, including labels no status carries.
    Exact(String),
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "all" => StatusFilter::All,
            "Applied" => StatusFilter::Applied,
            "Interview" => StatusFilter::Interview,
            other => StatusFilter::Exact(other.to_string()),
        }
    }

    pub fn matches(&self, status: &ApplicationStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Applied => {
                matches!(status, ApplicationStatus::Applied | ApplicationStatus::Screening)
            }
            StatusFilter::Interview => matches!(
                status,
                ApplicationStatus::InterviewScheduled | ApplicationStatus::Interviewed
            ),
            StatusFilter::Exact(label) => status.as_str() == label,
        }
    }
}

fn matches_search(record: &ApplicationRecord, needle: &str) -> bool {
    needle.is_empty()
        || record.company_name.to_lowercase().contains(needle)
        || record.job_title.to_lowercase().contains(needle)
        || record.location.to_lowercase().contains(needle)
}

/// Records passing both the status filter and the search, newest first by
/// date added (or date found). Search is a case-insensitive substring match
/// on company, title, or location.
pub fn apply_filters<'r>(
    records: &'r [ApplicationRecord],
    filter: &StatusFilter,
    query: &str,
) -> Vec<&'r ApplicationRecord> {
    let needle = query.to_lowercase();
    let mut shown: Vec<&ApplicationRecord> = records
        .iter()
        .filter(|r| filter.matches(&r.status))
        .filter(|r| matches_search(r, &needle))
        .collect();
    shown.sort_by(|a, b| b.effective_date().cmp(&a.effective_date()));
    shown
}

/// Short human label for how long ago `when` was.
pub fn relative_date(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - when).num_days().abs();
    match days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        7..=29 => format!("{} weeks ago", days / 7),
        30..=364 => format!("{} months ago", days / 30),
        _ => when.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn rec(company: &str, title: &str, location: &str, status: ApplicationStatus, added_days: i64) -> ApplicationRecord {
        let mut r = ApplicationRecord::candidate(company, title, Some(location), None, "", "", base());
        r.status = status;
        r.date_added = Some(base() + Duration::days(added_days));
        r
    }

    fn sample() -> Vec<ApplicationRecord> {
        vec![
            rec("Google", "SRE", "Zurich", ApplicationStatus::Applied, 1),
            rec("Acme", "Engineer", "Remote", ApplicationStatus::Screening, 5),
            rec("Initech", "Googler Liaison", "Austin", ApplicationStatus::Interviewed, 3),
            rec("Globex", "Analyst", "Mountain View (goog campus)", ApplicationStatus::NotApplied, 2),
            rec("Hooli", "PM", "Palo Alto", ApplicationStatus::InterviewScheduled, 4),
            rec("Umbrella", "Chemist", "Raccoon City", ApplicationStatus::Unknown("Ghosted".into()), 0),
        ]
    }

    fn ids(shown: &[&ApplicationRecord]) -> Vec<String> {
        shown.iter().map(|r| r.company_name.clone()).collect()
    }

    #[test]
    fn test_applied_bucket_includes_screening() {
        let records = sample();
        let shown = apply_filters(&records, &StatusFilter::parse("Applied"), "");
        assert_eq!(ids(&shown), vec!["Acme", "Google"]);
    }

    #[test]
    fn test_interview_bucket() {
        let records = sample();
        let shown = apply_filters(&records, &StatusFilter::parse("Interview"), "");
        assert_eq!(ids(&shown), vec!["Hooli", "Initech"]);
    }

    #[test]
    fn test_exact_and_unknown_filters() {
        let records = sample();
        let shown = apply_filters(&records, &StatusFilter::parse("Not Applied"), "");
        assert_eq!(ids(&shown), vec!["Globex"]);
        let shown = apply_filters(&records, &StatusFilter::parse("Ghosted"), "");
        assert_eq!(ids(&shown), vec!["Umbrella"]);
        let shown = apply_filters(&records, &StatusFilter::parse("Screening"), "");
        assert_eq!(ids(&shown), vec!["Acme"]);
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let records = sample();
        let shown = apply_filters(&records, &StatusFilter::All, "GOOG");
        assert_eq!(ids(&shown), vec!["Initech", "Globex", "Google"]);
    }

    #[test]
    fn test_search_keeps_surrounding_spaces() {
        let records = sample();
        assert_eq!(ids(&apply_filters(&records, &StatusFilter::All, "goog ")), vec!["Globex"]);
        assert!(apply_filters(&records, &StatusFilter::All, " goog ").is_empty());
    }

    #[test]
    fn test_filter_and_search_combine() {
        let records = sample();
        let shown = apply_filters(&records, &StatusFilter::parse("Applied"), "goog");
        assert_eq!(ids(&shown), vec!["Google"]);
        assert!(apply_filters(&records, &StatusFilter::parse("Rejected"), "").is_empty());
    }

    #[test]
    fn test_output_always_newest_first() {
        let mut records = sample();
        records[0].date_added = None; // falls back to date_found = base()
        for tab in TABS {
            for query in ["", "o", "a"] {
                let shown = apply_filters(&records, &StatusFilter::parse(tab), query);
                assert!(shown.windows(2).all(|w| w[0].effective_date() >= w[1].effective_date()));
            }
        }
    }

    #[test]
    fn test_relative_date_labels() {
        let now = base();
        assert_eq!(relative_date(now, now), "Today");
        assert_eq!(relative_date(now - Duration::days(1), now), "Yesterday");
        assert_eq!(relative_date(now - Duration::days(4), now), "4 days ago");
        assert_eq!(relative_date(now - Duration::days(15), now), "2 weeks ago");
        assert_eq!(relative_date(now - Duration::days(95), now), "3 months ago");
        assert_eq!(relative_date(now - Duration::days(400), now), "2024-04-27");
    }
}
