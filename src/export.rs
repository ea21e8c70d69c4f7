use chrono::NaiveDate;

use crate::models::ApplicationRecord;

pub const CSV_HEADERS: [&str; 9] = [
    "Company",
    "Job Title",
    "Location",
    "Status",
    "Date Found",
    "Date Applied",
    "Follow-up Date",
    "URL",
    "Notes",
];

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn date_cell(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

/// Header row then one row per record, in storage order. Every cell is
/// quoted with embedded quotes doubled; rows are joined with `\n`.
pub fn to_csv(records: &[ApplicationRecord]) -> String {
    let header = CSV_HEADERS.join(",");
    let rows = records.iter().map(|r| {
        [
            r.company_name.clone(),
            r.job_title.clone(),
            r.location.clone(),
            r.status.to_string(),
            r.date_found.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            date_cell(r.date_applied),
            date_cell(r.follow_up_date),
            r.url.clone(),
            r.notes.clone(),
        ]
        .iter()
        .map(|cell| quote(cell))
        .collect::<Vec<_>>()
        .join(",")
    });

    std::iter::once(header).chain(rows).collect::<Vec<_>>().join("\n")
}

/// `job-applications-YYYY-MM-DD.csv`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("job-applications-{}.csv", date.format("%Y-%m-%d"))
}

/// Pretty JSON of the raw records, loadable again with `import`.
pub fn to_json(records: &[ApplicationRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use chrono::{TimeZone, Utc};

    fn record() -> ApplicationRecord {
        let found = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let mut r = ApplicationRecord::candidate(
            "Acme",
            "Engineer",
            Some("Remote"),
            None,
            "https://jobs.lever.co/acme/1",
            "jobs.lever.co",
            found,
        );
        r.status = ApplicationStatus::Applied;
        r.date_applied = NaiveDate::from_ymd_opt(2025, 1, 5);
        r
    }

    #[test]
    fn test_header_only_for_empty() {
        assert_eq!(
            to_csv(&[]),
            "Company,Job Title,Location,Status,Date Found,Date Applied,Follow-up Date,URL,Notes"
        );
    }

    #[test]
    fn test_row_layout() {
        let csv = to_csv(&[record()]);
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            r#""Acme","Engineer","Remote","Applied","2025-01-02T03:04:05.000Z","2025-01-05","","https://jobs.lever.co/acme/1","""#
        );
    }

    #[test]
    fn test_quotes_in_notes_are_doubled() {
        let mut r = record();
        r.notes = r#"He said "great fit""#.to_string();
        let csv = to_csv(&[r]);
        assert!(csv.ends_with(r#","He said ""great fit""""#));
    }

    #[test]
    fn test_quotes_escaped_in_every_column() {
        let mut r = record();
        r.company_name = r#"The "Best" Co"#.to_string();
        let csv = to_csv(&[r]);
        assert!(csv.contains(r#""The ""Best"" Co""#));
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "job-applications-2025-03-09.csv");
    }

    #[test]
    fn test_json_backup_reloads() {
        let json = to_json(&[record()]).unwrap();
        let back: Vec<ApplicationRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![record()]);
    }
}
