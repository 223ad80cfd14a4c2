use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use uuid::Uuid;

use crate::models::SignupRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("signup already exists for {0}")]
    Duplicate(String),

    #[error("signup {0} not found")]
    NotFound(String),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct NewSignup {
    pub email: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub recaptcha_score: f64,
}

#[derive(Debug, Clone)]
pub struct InsertOutcome {
    pub acknowledged: bool,
    pub inserted_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub source: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl ListFilter {
    fn matches(&self, record: &SignupRecord) -> bool {
        self.source.as_deref().is_none_or(|s| record.source == s)
            && self.since.is_none_or(|since| record.timestamp >= since)
    }
}

#[async_trait]
pub trait SignupStore: Send + Sync {
    // emails are stored normalized
    async fn find_by_email(&self, email: &str) -> Result<Option<SignupRecord>, StoreError>;

    async fn insert(&self, signup: NewSignup) -> Result<InsertOutcome, StoreError>;

    async fn mark_welcome_sent(&self, id: &str, provider_id: Option<String>) -> Result<(), StoreError>;

    async fn delete_by_email(&self, email: &str) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    // newest first
    async fn list(&self, filter: &ListFilter) -> Result<Vec<SignupRecord>, StoreError>;
}

// In-process store keyed by normalized email
#[derive(Default)]
pub struct MemoryStore {
    by_email: DashMap<String, SignupRecord>,
    ids: DashMap<String, String>, // id -> email
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignupStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<SignupRecord>, StoreError> {
        Ok(self.by_email.get(email).map(|r| r.value().clone()))
    }

    async fn insert(&self, signup: NewSignup) -> Result<InsertOutcome, StoreError> {
        let id = Uuid::new_v4().to_string();

        match self.by_email.entry(signup.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate(signup.email)),
            Entry::Vacant(vacant) => {
                vacant.insert(SignupRecord {
                    id: id.clone(),
                    email: signup.email.clone(),
                    source: signup.source,
                    timestamp: signup.timestamp,
                    ip_address: signup.ip_address,
                    recaptcha_score: signup.recaptcha_score,
                    welcome_email_sent: false,
                    welcome_email_id: None,
                });
            }
        }
        self.ids.insert(id.clone(), signup.email);

        Ok(InsertOutcome {
            acknowledged: true,
            inserted_id: id,
        })
    }

    async fn mark_welcome_sent(&self, id: &str, provider_id: Option<String>) -> Result<(), StoreError> {
        let email = self
            .ids
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut record = self
            .by_email
            .get_mut(&email)
            .filter(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.welcome_email_sent = true;
        record.welcome_email_id = provider_id;
        Ok(())
    }

    async fn delete_by_email(&self, email: &str) -> Result<bool, StoreError> {
        match self.by_email.remove(email) {
            Some((_, record)) => {
                self.ids.remove(&record.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.by_email.len())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<SignupRecord>, StoreError> {
        let mut records: Vec<SignupRecord> = self
            .by_email
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}
