// src/repository/memory.rs

//! In-process store with optimistic concurrency: every record carries a version,
//! transactions remember the versions they read and buffer their writes, and commit
//! validates the read set before applying anything.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{attempt::Attempt, question::Question, stats::UserExamStats},
    repository::{Store, Transaction},
};

/// Version number reported for a record that does not exist.
const ABSENT: u64 = 0;

struct Versioned<T> {
    version: u64,
    value: T,
}

#[derive(Default)]
struct Tables {
    questions: BTreeMap<String, Question>,
    attempts: HashMap<String, Versioned<Attempt>>,
    stats: HashMap<(String, String), Versioned<UserExamStats>>,
}

impl Tables {
    fn version_of(&self, key: &RecordKey) -> u64 {
        match key {
            RecordKey::Attempt(id) => self.attempts.get(id).map_or(ABSENT, |r| r.version),
            RecordKey::Stats(user_id, exam_id) => self
                .stats
                .get(&(user_id.clone(), exam_id.clone()))
                .map_or(ABSENT, |r| r.version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RecordKey {
    Attempt(String),
    Stats(String, String),
}

enum PendingWrite {
    Attempt(Attempt),
    Stats(UserExamStats),
}

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, AppError> {
    tables
        .lock()
        .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
}

/// Shared in-memory store. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads catalog questions. Each question is validated before anything is stored.
    pub fn insert_questions(&self, questions: Vec<Question>) -> Result<(), AppError> {
        for question in &questions {
            question.validate()?;
        }

        let mut tables = lock(&self.tables)?;
        for question in questions {
            tables.questions.insert(question.id.clone(), question);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            read_versions: HashMap::new(),
            pending: HashMap::new(),
        }))
    }
}

pub struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    read_versions: HashMap<RecordKey, u64>,
    pending: HashMap<RecordKey, PendingWrite>,
}

impl MemoryTransaction {
    /// Remembers the first version observed for `key`.
    fn observe(&mut self, key: RecordKey, version: u64) {
        self.read_versions.entry(key).or_insert(version);
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn find_attempt(
        &mut self,
        user_id: &str,
        attempt_id: &str,
    ) -> Result<Option<Attempt>, AppError> {
        let key = RecordKey::Attempt(attempt_id.to_string());

        let found = if let Some(PendingWrite::Attempt(attempt)) = self.pending.get(&key) {
            Some(attempt.clone())
        } else {
            let (version, found) = {
                let tables = lock(&self.tables)?;
                match tables.attempts.get(attempt_id) {
                    Some(record) => (record.version, Some(record.value.clone())),
                    None => (ABSENT, None),
                }
            };
            self.observe(key, version);
            found
        };

        Ok(found.filter(|attempt| attempt.user_id == user_id))
    }

    async fn find_questions_by_set_id(
        &mut self,
        exam_set_id: &str,
    ) -> Result<Vec<Question>, AppError> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .questions
            .values()
            .filter(|q| q.exam_set_id == exam_set_id)
            .cloned()
            .collect())
    }

    async fn find_user_exam_stats(
        &mut self,
        user_id: &str,
        exam_id: &str,
    ) -> Result<Option<UserExamStats>, AppError> {
        let key = RecordKey::Stats(user_id.to_string(), exam_id.to_string());

        if let Some(PendingWrite::Stats(stats)) = self.pending.get(&key) {
            return Ok(Some(stats.clone()));
        }

        let (version, found) = {
            let tables = lock(&self.tables)?;
            match tables.stats.get(&(user_id.to_string(), exam_id.to_string())) {
                Some(record) => (record.version, Some(record.value.clone())),
                None => (ABSENT, None),
            }
        };
        self.observe(key, version);
        Ok(found)
    }

    async fn save_attempt(&mut self, attempt: &Attempt) -> Result<(), AppError> {
        if attempt.id.is_empty() || attempt.user_id.is_empty() {
            return Err(AppError::InvalidArgument(
                "attempt id and user id are required to save an attempt".to_string(),
            ));
        }
        self.pending.insert(
            RecordKey::Attempt(attempt.id.clone()),
            PendingWrite::Attempt(attempt.clone()),
        );
        Ok(())
    }

    async fn save_user_exam_stats(&mut self, stats: &UserExamStats) -> Result<(), AppError> {
        if stats.user_id.is_empty() || stats.exam_id.is_empty() {
            return Err(AppError::InvalidArgument(
                "user id and exam id are required to save exam stats".to_string(),
            ));
        }
        self.pending.insert(
            RecordKey::Stats(stats.user_id.clone(), stats.exam_id.clone()),
            PendingWrite::Stats(stats.clone()),
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction {
            tables,
            read_versions,
            pending,
        } = *self;
        let mut tables = lock(&tables)?;

        for (key, seen) in &read_versions {
            if tables.version_of(key) != *seen {
                return Err(AppError::Aborted(format!(
                    "{:?} was modified by a concurrent transaction",
                    key
                )));
            }
        }

        for (key, write) in pending {
            let version = tables.version_of(&key) + 1;
            match write {
                PendingWrite::Attempt(value) => {
                    tables
                        .attempts
                        .insert(value.id.clone(), Versioned { version, value });
                }
                PendingWrite::Stats(value) => {
                    tables.stats.insert(
                        (value.user_id.clone(), value.exam_id.clone()),
                        Versioned { version, value },
                    );
                }
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        // Buffered writes are simply dropped.
        Ok(())
    }
}
