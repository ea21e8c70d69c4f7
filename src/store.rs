use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::models::{ApplicationRecord, ApplicationStatus, RecordPatch};

/// Every record lives in one JSON array under this key.
pub const APPLICATIONS_KEY: &str = "applications";

/// What a `transact` closure decided to do with the collection it was given.
pub enum Mutation<T> {
    /// Write the collection back and notify subscribers.
    Commit(T),
    /// Leave storage untouched.
    Skip(T),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(ApplicationRecord),
    AlreadyTracked(ApplicationRecord),
}

/// The tracked applications, read and written as a whole.
pub struct RecordStore<'a> {
    db: &'a Database,
    subscribers: Vec<Sender<Vec<ApplicationRecord>>>,
}

impl<'a> RecordStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            subscribers: Vec::new(),
        }
    }

    pub fn database(&self) -> &'a Database {
        self.db
    }

    pub fn load(&self) -> Result<Vec<ApplicationRecord>> {
        Ok(self.db.get(APPLICATIONS_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, records: &[ApplicationRecord]) -> Result<()> {
        self.db.set(APPLICATIONS_KEY, records)
    }

    pub fn find(&self, id: &str) -> Result<Option<ApplicationRecord>> {
        Ok(self.load()?.into_iter().find(|r| r.id == id))
    }

    /// Each receiver gets the full collection after every committed change.
    pub fn subscribe(&mut self) -> Receiver<Vec<ApplicationRecord>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Read the whole collection, let `f` change it, write it back.
    ///
    /// Nothing locks the collection between the read and the write. Two
    /// writers (say the list UI and a `jobtrack update` in another shell)
    /// can interleave, and whichever writes last wins. There is a single
    /// user, so this is accepted rather than guarded against.
    pub fn transact<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<ApplicationRecord>) -> Mutation<T>,
    {
        let mut records = self.load()?;
        match f(&mut records) {
            Mutation::Commit(value) => {
                self.save(&records)?;
                self.broadcast(&records);
                Ok(value)
            }
            Mutation::Skip(value) => Ok(value),
        }
    }

    fn broadcast(&mut self, records: &[ApplicationRecord]) {
        self.subscribers
            .retain(|tx| tx.send(records.to_vec()).is_ok());
    }

    /// Saves a captured record unless its id is already tracked. New records
    /// always start as Not Applied with no notes or follow-up.
    pub fn insert(&mut self, candidate: ApplicationRecord, now: DateTime<Utc>) -> Result<InsertOutcome> {
        self.transact(|records| {
            if let Some(existing) = records.iter().find(|r| r.id == candidate.id) {
                debug!(id = %existing.id, "already tracked");
                return Mutation::Skip(InsertOutcome::AlreadyTracked(existing.clone()));
            }
            let record = ApplicationRecord {
                status: ApplicationStatus::NotApplied,
                date_added: Some(now),
                notes: String::new(),
                follow_up_date: None,
                ..candidate
            };
            info!(id = %record.id, company = %record.company_name, "job saved");
            records.push(record.clone());
            Mutation::Commit(InsertOutcome::Inserted(record))
        })
    }

    /// Merges `patch` into the record with `id`. Returns the updated record,
    /// or `None` without writing if there is no such record.
    pub fn update(&mut self, id: &str, patch: &RecordPatch, now: DateTime<Utc>) -> Result<Option<ApplicationRecord>> {
        self.transact(|records| match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                patch.apply(record, now);
                info!(id, status = %record.status, "job updated");
                Mutation::Commit(Some(record.clone()))
            }
            None => {
                debug!(id, "update target not found");
                Mutation::Skip(None)
            }
        })
    }

    pub fn delete(&mut self, id: &str) -> Result<bool> {
        self.transact(|records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                debug!(id, "delete target not found");
                Mutation::Skip(false)
            } else {
                info!(id, "job removed");
                Mutation::Commit(true)
            }
        })
    }

    /// Deletes every record. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        self.transact(|records| {
            let removed = records.len();
            if removed == 0 {
                return Mutation::Skip(0);
            }
            records.clear();
            info!(removed, "all jobs removed");
            Mutation::Commit(removed)
        })
    }

    /// Restores records from a backup, keeping their status and dates.
    /// Records whose id is already tracked (or repeated in the input) are
    /// skipped. Returns how many were added.
    pub fn import(&mut self, incoming: Vec<ApplicationRecord>) -> Result<usize> {
        self.transact(|records| {
            let mut seen: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
            let mut added = 0;
            for record in incoming {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                    added += 1;
                }
            }
            if added == 0 {
                Mutation::Skip(0)
            } else {
                info!(added, "jobs imported");
                Mutation::Commit(added)
            }
        })
    }
}
