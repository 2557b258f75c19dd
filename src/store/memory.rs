use super::{StoreError, SubmissionStore};
use crate::model::{EmailAddress, SubmissionRecord, SurveyResponses};
use ahash::RandomState;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

/// Process-local store. Records live as long as the process.
///
/// The entry API makes the duplicate check and the insert one step, so two
/// concurrent first submissions of the same email yield one record and one
/// [`StoreError::Conflict`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, SubmissionRecord, RandomState>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the record for `email`, if any.
    pub fn get(&self, email: &str) -> Option<SubmissionRecord> {
        self.records.get(email).map(|r| r.value().clone())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_email(&self, email: &EmailAddress) -> Result<SubmissionRecord, StoreError> {
        match self.records.entry(email.as_str().to_owned()) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                let record = SubmissionRecord::new(email, Utc::now());
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn complete_survey(
        &self,
        email: &EmailAddress,
        responses: &SurveyResponses,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(match self.records.get_mut(email.as_str()) {
            Some(mut record) => {
                record.complete_survey(responses.clone());
                vec![record.clone()]
            }
            None => Vec::new(),
        })
    }

    async fn list_recent(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
