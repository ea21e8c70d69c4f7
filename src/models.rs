use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub const LOCATION_NOT_SPECIFIED: &str = "Location not specified";
pub const DESCRIPTION_LIMIT: usize = 500;
const ID_LIMIT: usize = 100;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]").expect("static regex"));

/// Where an application stands. Anything read from storage that isn't one of
/// the known labels is kept verbatim as `Unknown` so old or hand-edited data
/// still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationStatus {
    NotApplied,
    Applied,
    Screening,
    InterviewScheduled,
    Interviewed,
    OfferReceived,
    Accepted,
    Rejected,
    Withdrew,
    Unknown(String),
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 9] = [
        ApplicationStatus::NotApplied,
        ApplicationStatus::Applied,
        ApplicationStatus::Screening,
        ApplicationStatus::InterviewScheduled,
        ApplicationStatus::Interviewed,
        ApplicationStatus::OfferReceived,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrew,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ApplicationStatus::NotApplied => "Not Applied",
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Screening => "Screening",
            ApplicationStatus::InterviewScheduled => "Interview Scheduled",
            ApplicationStatus::Interviewed => "Interviewed",
            ApplicationStatus::OfferReceived => "Offer Received",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Withdrew => "Withdrew",
            ApplicationStatus::Unknown(raw) => raw,
        }
    }

    /// Statuses after which no follow-up reminder is scheduled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Rejected | ApplicationStatus::Withdrew | ApplicationStatus::Accepted
        )
    }

    /// Next known status in pipeline order, wrapping around. Used by the list
    /// UI to cycle a record's status with one key.
    pub fn next(&self) -> ApplicationStatus {
        let pos = Self::ALL.iter().position(|s| s == self);
        match pos {
            Some(i) => Self::ALL[(i + 1) % Self::ALL.len()].clone(),
            None => ApplicationStatus::NotApplied,
        }
    }
}

impl From<String> for ApplicationStatus {
    fn from(raw: String) -> Self {
        ApplicationStatus::ALL
            .iter()
            .find(|s| s.as_str() == raw)
            .cloned()
            .unwrap_or(ApplicationStatus::Unknown(raw))
    }
}

impl From<ApplicationStatus> for String {
    fn from(status: ApplicationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse for command-line input: case-insensitive, and `-`/`_` may
/// stand in for spaces ("interview-scheduled"). Unknown labels are rejected.
impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(s);
        ApplicationStatus::ALL
            .iter()
            .find(|status| normalize_label(status.as_str()) == wanted)
            .cloned()
            .ok_or_else(|| {
                let known: Vec<String> = ApplicationStatus::ALL.into_iter().map(String::from).collect();
                format!("unknown status '{}'. Known: {}", s, known.join(", "))
            })
    }
}

fn normalize_label(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c.to_ascii_lowercase() })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: String,
    pub company_name: String,
    pub job_title: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    pub status: ApplicationStatus,
    pub date_found: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub date_applied: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_location() -> String {
    LOCATION_NOT_SPECIFIED.to_string()
}

// Dates typed into a form arrive as "" when cleared, or occasionally as a
// full timestamp; both are accepted.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else { return Ok(None) };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part taken in UTC).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc).date_naive()))
}

/// Stable key for a posting: lowercased `company-title` with every character
/// outside `[a-z0-9]` turned into `-`, capped at 100 characters. Two postings
/// with the same company and title collide on purpose.
pub fn job_id(company: &str, title: &str) -> String {
    let joined = format!("{}-{}", company, title).to_lowercase();
    let mut id = NON_ALNUM.replace_all(&joined, "-").into_owned();
    // Only ASCII remains after the replacement, so byte truncation is safe.
    id.truncate(ID_LIMIT);
    id
}

impl ApplicationRecord {
    /// Builds a freshly captured record. Location and description degrade to
    /// the sentinel and the empty string.
    pub fn candidate(
        company: &str,
        title: &str,
        location: Option<&str>,
        description: Option<&str>,
        url: &str,
        source: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: job_id(company, title),
            company_name: company.to_string(),
            job_title: title.to_string(),
            location: location
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(default_location),
            description: description
                .map(|d| d.chars().take(DESCRIPTION_LIMIT).collect())
                .unwrap_or_default(),
            url: url.to_string(),
            source: source.to_string(),
            status: ApplicationStatus::NotApplied,
            date_found: now,
            date_added: None,
            date_applied: None,
            follow_up_date: None,
            notes: String::new(),
            last_updated: None,
        }
    }

    /// The date lists are ordered and labelled by.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.date_added.unwrap_or(self.date_found)
    }

    /// Follow-up dates carry no time of day; they fall due at midnight UTC.
    pub fn follow_up_at(&self) -> Option<DateTime<Utc>> {
        self.follow_up_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

/// Partial update merged into a stored record. `None` leaves a field alone;
/// for the date fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<ApplicationStatus>,
    pub notes: Option<String>,
    pub follow_up_date: Option<Option<NaiveDate>>,
    pub date_applied: Option<Option<NaiveDate>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &RecordPatch::default()
    }

    pub fn apply(&self, record: &mut ApplicationRecord, now: DateTime<Utc>) {
        if let Some(status) = &self.status {
            record.status = status.clone();
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
        if let Some(date) = self.follow_up_date {
            record.follow_up_date = date;
        }
        if let Some(date) = self.date_applied {
            record.date_applied = date;
        }
        record.last_updated = Some(now);
    }
}
