use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::models::ApplicationRecord;
use crate::notify::{Notifier, Urgency};
use crate::store::{RecordStore, APPLICATIONS_KEY};

/// Namespace for follow-up timers. Timers with any other key are never
/// touched by reconciliation.
pub const REMINDER_PREFIX: &str = "followup-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub key: String,
    /// Epoch milliseconds.
    pub fire_at: i64,
}

/// One-shot timers keyed by name.
pub trait TimerBackend {
    /// Schedules `key`, replacing any timer already under that key.
    fn create_timer(&self, key: &str, fire_at: i64) -> Result<()>;
    fn cancel_timer(&self, key: &str) -> Result<()>;
    fn list_timers(&self) -> Result<Vec<Timer>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingReminder {
    pub key: String,
    pub record_id: String,
    pub fire_at: DateTime<Utc>,
    pub job_title: String,
    pub company_name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub cancelled: usize,
    pub kept: usize,
}

pub fn reminder_key(record_id: &str) -> String {
    format!("{}{}", REMINDER_PREFIX, record_id)
}

/// Records with a follow-up date still ahead of `now` and a status that
/// hasn't closed the application, soonest first.
pub fn pending_reminders(records: &[ApplicationRecord], now: DateTime<Utc>) -> Vec<PendingReminder> {
    let mut pending: Vec<PendingReminder> = records
        .iter()
        .filter(|r| !r.status.is_terminal())
        .filter_map(|r| {
            let fire_at = r.follow_up_at()?;
            (fire_at > now).then(|| PendingReminder {
                key: reminder_key(&r.id),
                record_id: r.id.clone(),
                fire_at,
                job_title: r.job_title.clone(),
                company_name: r.company_name.clone(),
            })
        })
        .collect();
    pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.key.cmp(&b.key)));
    pending
}

/// Brings the scheduled follow-up timers in line with `records`: timers that
/// are no longer wanted (or whose time moved) are cancelled, missing ones are
/// created, matching ones are left alone. Timers already due are kept for
/// `take_due` to deliver. Running it twice on the same input changes nothing
/// the second time.
pub fn reconcile<B: TimerBackend + ?Sized>(
    backend: &B,
    records: &[ApplicationRecord],
    now: DateTime<Utc>,
) -> Result<ReconcileReport> {
    let desired: HashMap<String, i64> = pending_reminders(records, now)
        .into_iter()
        .map(|p| (p.key, p.fire_at.timestamp_millis()))
        .collect();

    let current: HashMap<String, i64> = backend
        .list_timers()?
        .into_iter()
        .filter(|t| t.key.starts_with(REMINDER_PREFIX))
        .map(|t| (t.key, t.fire_at))
        .collect();

    let now_ms = now.timestamp_millis();
    let mut report = ReconcileReport::default();

    for (key, fire_at) in &current {
        if *fire_at <= now_ms && !desired.contains_key(key) {
            report.kept += 1;
        } else if desired.get(key) != Some(fire_at) {
            backend.cancel_timer(key)?;
            report.cancelled += 1;
        }
    }

    for (key, fire_at) in &desired {
        if current.get(key) == Some(fire_at) {
            report.kept += 1;
        } else {
            backend.create_timer(key, *fire_at)?;
            report.created += 1;
        }
    }

    debug!(
        created = report.created,
        cancelled = report.cancelled,
        kept = report.kept,
        "reminders reconciled"
    );
    Ok(report)
}

/// Delivers one fired timer. Looks the record up again so the alert shows
/// current names; a record deleted since scheduling is ignored. Returns
/// whether an alert was shown.
pub fn fire(timer: &Timer, records: &[ApplicationRecord], notifier: &dyn Notifier) -> bool {
    let Some(id) = timer.key.strip_prefix(REMINDER_PREFIX) else {
        return false;
    };
    let Some(job) = records.iter().find(|r| r.id == id) else {
        debug!(id, "reminder fired for a removed job");
        return false;
    };
    notifier.show(
        "Follow-up Reminder",
        &format!("Time to follow up on: {} at {}", job.job_title, job.company_name),
        Urgency::High,
    );
    true
}

/// Background reconciler: keeps timers in step with the store and delivers
/// them as they fall due.
pub struct ReminderDaemon<'a> {
    db: &'a Database,
    notifier: &'a dyn Notifier,
    last_revision: Option<i64>,
}

impl<'a> ReminderDaemon<'a> {
    pub fn new(db: &'a Database, notifier: &'a dyn Notifier) -> Self {
        Self {
            db,
            notifier,
            last_revision: None,
        }
    }

    /// Fires whatever is due, then reconciles if the store changed since the
    /// previous tick (always on the first). Returns how many alerts were shown.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let store = RecordStore::new(self.db);
        let revision = self.db.revision(APPLICATIONS_KEY)?;
        let records = store.load()?;

        let due = self.db.take_due(now.timestamp_millis())?;
        let shown = due
            .iter()
            .filter(|timer| fire(timer, &records, self.notifier))
            .count();

        if self.last_revision != Some(revision) {
            let report = reconcile(self.db, &records, now)?;
            info!(revision, scheduled = report.created + report.kept, "reminder set refreshed");
            self.last_revision = Some(revision);
        }

        Ok(shown)
    }

    /// Ticks forever. Storage failures are logged and retried on the next
    /// interval rather than ending the loop.
    pub fn run(&mut self, interval: Duration) -> ! {
        loop {
            if let Err(e) = self.tick(Utc::now()) {
                warn!(error = %e, "reminder tick failed");
            }
            std::thread::sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use crate::notify::RecordingNotifier;
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn record(company: &str, status: ApplicationStatus, follow_up: Option<NaiveDate>) -> ApplicationRecord {
        let mut rec = ApplicationRecord::candidate(company, "Engineer", None, None, "", "", now());
        rec.status = status;
        rec.follow_up_date = follow_up;
        rec
    }

    fn day(offset: i64) -> Option<NaiveDate> {
        Some((now() + ChronoDuration::days(offset)).date_naive())
    }

    #[test]
    fn test_past_follow_up_is_not_scheduled() {
        let records = vec![record("Acme", ApplicationStatus::Applied, day(-1))];
        assert!(pending_reminders(&records, now()).is_empty());
    }

    #[test]
    fn test_terminal_status_is_not_scheduled() {
        let records = vec![
            record("Acme", ApplicationStatus::Rejected, day(1)),
            record("Initech", ApplicationStatus::Withdrew, day(2)),
            record("Globex", ApplicationStatus::Accepted, day(3)),
        ];
        assert!(pending_reminders(&records, now()).is_empty());
    }

    #[test]
    fn test_pending_reminders_sorted_soonest_first() {
        let records = vec![
            record("Acme", ApplicationStatus::Applied, day(5)),
            record("Initech", ApplicationStatus::Interviewed, day(2)),
            record("Globex", ApplicationStatus::NotApplied, None),
        ];
        let pending = pending_reminders(&records, now());
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].key, "followup-initech-engineer");
        assert_eq!(pending[1].key, "followup-acme-engineer");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let records = vec![
            record("Acme", ApplicationStatus::Applied, day(1)),
            record("Initech", ApplicationStatus::Screening, day(3)),
        ];

        let first = reconcile(&db, &records, now()).unwrap();
        assert_eq!(first, ReconcileReport { created: 2, cancelled: 0, kept: 0 });
        let timers_after_first = db.list_timers().unwrap();

        let second = reconcile(&db, &records, now()).unwrap();
        assert_eq!(second, ReconcileReport { created: 0, cancelled: 0, kept: 2 });
        assert_eq!(db.list_timers().unwrap(), timers_after_first);
    }

    #[test]
    fn test_reconcile_diffs_against_current_set() {
        let db = Database::open_in_memory().unwrap();
        db.create_timer("unrelated-timer", 1).unwrap();
        let mut records = vec![
            record("Acme", ApplicationStatus::Applied, day(1)),
            record("Initech", ApplicationStatus::Applied, day(3)),
        ];
        reconcile(&db, &records, now()).unwrap();

        records[0].status = ApplicationStatus::Rejected;
        records[1].follow_up_date = day(4);
        records.push(record("Globex", ApplicationStatus::Applied, day(2)));

        let report = reconcile(&db, &records, now()).unwrap();
        assert_eq!(report, ReconcileReport { created: 2, cancelled: 2, kept: 0 });

        let keys: Vec<String> = db.list_timers().unwrap().into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["unrelated-timer", "followup-globex-engineer", "followup-initech-engineer"]);
    }

    #[test]
    fn test_fire_shows_title_and_company() {
        let notifier = RecordingNotifier::default();
        let records = vec![record("Acme", ApplicationStatus::Applied, day(1))];
        let timer = Timer { key: reminder_key("acme-engineer"), fire_at: 0 };

        assert!(fire(&timer, &records, &notifier));
        let shown = notifier.shown.borrow();
        assert_eq!(shown[0].0, "Follow-up Reminder");
        assert_eq!(shown[0].1, "Time to follow up on: Engineer at Acme");
        assert_eq!(shown[0].2, Urgency::High);
    }

    #[test]
    fn test_fire_ignores_removed_records() {
        let notifier = RecordingNotifier::default();
        let timer = Timer { key: reminder_key("gone"), fire_at: 0 };
        assert!(!fire(&timer, &[], &notifier));
        assert!(notifier.shown.borrow().is_empty());
    }

    #[test]
    fn test_daemon_schedules_then_fires_once() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let mut store = RecordStore::new(&db);
        store
            .import(vec![record("Acme", ApplicationStatus::Applied, day(1))])
            .unwrap();

        let mut daemon = ReminderDaemon::new(&db, &notifier);
        assert_eq!(daemon.tick(now()).unwrap(), 0);
        assert_eq!(db.list_timers().unwrap().len(), 1);

        let later = now() + ChronoDuration::days(2);
        assert_eq!(daemon.tick(later).unwrap(), 1);
        assert_eq!(daemon.tick(later).unwrap(), 0);
        assert_eq!(notifier.shown.borrow().len(), 1);
        assert!(db.list_timers().unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_keeps_due_timers() {
        let db = Database::open_in_memory().unwrap();
        let records = vec![record("Acme", ApplicationStatus::Applied, day(1))];
        reconcile(&db, &records, now()).unwrap();

        let later = now() + ChronoDuration::days(2);
        let report = reconcile(&db, &records, later).unwrap();
        assert_eq!(report, ReconcileReport { created: 0, cancelled: 0, kept: 1 });
        assert_eq!(db.take_due(later.timestamp_millis()).unwrap().len(), 1);
    }

    #[test]
    fn test_fresh_daemon_delivers_timer_scheduled_earlier() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let mut store = RecordStore::new(&db);
        store
            .import(vec![record("Acme", ApplicationStatus::Applied, day(1))])
            .unwrap();
        reconcile(&db, &store.load().unwrap(), now()).unwrap();

        let mut daemon = ReminderDaemon::new(&db, &notifier);
        assert_eq!(daemon.tick(now() + ChronoDuration::days(2)).unwrap(), 1);
        assert_eq!(notifier.shown.borrow().len(), 1);
        assert!(db.list_timers().unwrap().is_empty());
    }

    #[test]
    fn test_store_write_after_due_time_keeps_reminder() {
        let db = Database::open_in_memory().unwrap();
        let notifier = RecordingNotifier::default();
        let mut store = RecordStore::new(&db);
        store
            .import(vec![record("Acme", ApplicationStatus::Applied, day(1))])
            .unwrap();

        let mut daemon = ReminderDaemon::new(&db, &notifier);
        assert_eq!(daemon.tick(now()).unwrap(), 0);

        let later = now() + ChronoDuration::days(2);
        let other = ApplicationRecord::candidate("Globex", "Analyst", None, None, "", "", later);
        store.insert(other, later).unwrap();

        assert_eq!(daemon.tick(later).unwrap(), 1);
        assert_eq!(notifier.shown.borrow()[0].1, "Time to follow up on: Engineer at Acme");
    }
}
