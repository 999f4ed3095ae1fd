use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{Sample, SampleRow, Session, SessionStatus, TestType};

/// Append-only lager for samples, partisjonert per økt.
pub trait SampleStore: Send + Sync {
    fn append_sample(&self, session_id: &str, sample: Sample) -> Result<(), StoreError>;

    /// Tidsordnet kopi av øktens samples (tom liste for ukjent økt).
    fn read_samples(&self, session_id: &str) -> Result<Vec<Sample>, StoreError>;

    fn sample_count(&self) -> Result<usize, StoreError>;

    /// Antall samples for én økt.
    fn session_sample_count(&self, session_id: &str) -> Result<usize, StoreError> {
        Ok(self.read_samples(session_id)?.len())
    }

    /// Nyeste sample (etter tidsstempel) for økten.
    fn latest_sample(&self, session_id: &str) -> Result<Option<Sample>, StoreError> {
        Ok(self.read_samples(session_id)?.pop())
    }
}

/// Registeret eier øktenes livssyklus.
pub trait SessionRegistry: Send + Sync {
    fn create_session(&self, session: Session) -> Result<(), StoreError>;
    fn session_exists(&self, session_id: &str) -> bool;
    fn session_test_types(&self, session_id: &str) -> Option<BTreeSet<TestType>>;
    fn get_session(&self, session_id: &str) -> Option<Session>;
    fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        end_time: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Session, StoreError>;
    fn sessions_for_user(&self, user_id: &str) -> Vec<Session>;
    fn all_sessions(&self) -> Vec<Session>;
}

#[derive(Debug, Default)]
pub struct InMemorySampleStore {
    samples: Mutex<HashMap<String, Vec<Sample>>>,
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleStore for InMemorySampleStore {
    fn append_sample(&self, session_id: &str, sample: Sample) -> Result<(), StoreError> {
        sample.validate()?;
        // eneste kritiske seksjon: selve append-operasjonen
        let mut map = self.samples.lock().map_err(|_| StoreError::Poisoned)?;
        map.entry(session_id.to_string()).or_default().push(sample);
        Ok(())
    }

    fn read_samples(&self, session_id: &str) -> Result<Vec<Sample>, StoreError> {
        let mut out = {
            let map = self.samples.lock().map_err(|_| StoreError::Poisoned)?;
            map.get(session_id).cloned().unwrap_or_default()
        };
        out.sort_by_key(|s| s.timestamp);
        Ok(out)
    }

    fn sample_count(&self) -> Result<usize, StoreError> {
        let map = self.samples.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map.values().map(Vec::len).sum())
    }

    fn session_sample_count(&self, session_id: &str) -> Result<usize, StoreError> {
        let map = self.samples.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(session_id).map_or(0, Vec::len))
    }

    fn latest_sample(&self, session_id: &str) -> Result<Option<Sample>, StoreError> {
        let map = self.samples.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map
            .get(session_id)
            .and_then(|v| v.iter().max_by_key(|s| s.timestamp))
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn create_session(&self, session: Session) -> Result<(), StoreError> {
        let mut map = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        if map.contains_key(&session.session_id) {
            return Err(StoreError::DuplicateSession(session.session_id));
        }
        map.insert(session.session_id.clone(), session);
        Ok(())
    }

    fn session_exists(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|m| m.contains_key(session_id))
            .unwrap_or(false)
    }

    fn session_test_types(&self, session_id: &str) -> Option<BTreeSet<TestType>> {
        self.get_session(session_id).map(|s| s.test_types)
    }

    fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().ok()?.get(session_id).cloned()
    }

    fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        end_time: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Session, StoreError> {
        let mut map = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        let session = map
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        if !session.is_active() {
            return Err(StoreError::SessionClosed(session_id.to_string()));
        }
        session.end_time = Some(end_time);
        session.duration_secs = Some((end_time - session.start_time).num_seconds());
        session.status = status;
        session.notes = notes;
        Ok(session.clone())
    }

    fn sessions_for_user(&self, user_id: &str) -> Vec<Session> {
        let mut out: Vec<Session> = self
            .sessions
            .lock()
            .map(|m| m.values().filter(|s| s.user_id == user_id).cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|s| s.start_time);
        out
    }

    fn all_sessions(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Historiske rader for en bruker: alle samples fra brukerens økter.
pub fn user_rows(
    registry: &dyn SessionRegistry,
    store: &dyn SampleStore,
    user_id: &str,
) -> Result<Vec<SampleRow>, StoreError> {
    let mut rows = Vec::new();
    for session in registry.sessions_for_user(user_id) {
        for sample in store.read_samples(&session.session_id)? {
            rows.push(SampleRow::new(session.session_id.clone(), sample));
        }
    }
    rows.sort_by_key(|r| r.sample.timestamp);
    Ok(rows)
}
