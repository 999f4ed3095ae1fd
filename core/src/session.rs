use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collector::{spawn_collector, CollectionHandle, CollectionSummary};
use crate::config::CollectorConfig;
use crate::device::SensorDevice;
use crate::error::{CoreError, StoreError};
use crate::models::{Sample, Session, SessionStatus, TestType};
use crate::store::{SampleStore, SessionRegistry};

/// `session_YYYYMMDD_HHMMSS_<8 hex>`
pub fn new_session_id(now: DateTime<Utc>) -> String {
    format!("session_{}_{:08x}", now.format("%Y%m%d_%H%M%S"), rand::random::<u32>())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_samples: usize,
    pub live_collectors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoppedSession {
    pub session: Session,
    /// None når økten aldri hadde en innsamlingstråd.
    pub collection: Option<CollectionSummary>,
}

/// Sanntidsvisning av en økt: siste måling og antall så langt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveView {
    pub session_id: String,
    pub data_count: usize,
    /// None før første sample er skrevet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Sample>,
}

/// Eier øktenes livssyklus: oppretter ved start, én innsamlingstråd per økt,
/// lukker ved stopp. Ingenting ryddes bort bak ryggen på en analyse.
pub struct SessionManager {
    registry: Arc<dyn SessionRegistry>,
    store: Arc<dyn SampleStore>,
    collectors: Mutex<HashMap<String, CollectionHandle>>,
}

impl SessionManager {
    pub fn new(registry: Arc<dyn SessionRegistry>, store: Arc<dyn SampleStore>) -> Self {
        Self {
            registry,
            store,
            collectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> Arc<dyn SessionRegistry> {
        self.registry.clone()
    }

    pub fn store(&self) -> Arc<dyn SampleStore> {
        self.store.clone()
    }

    /// Oppretter en aktiv økt uten innsamling (f.eks. ved import av data).
    pub fn open_session(&self, user_id: &str, test_types: &[TestType]) -> Result<String, CoreError> {
        if test_types.is_empty() {
            return Err(CoreError::InvalidRequest("økten trenger minst én testtype".into()));
        }
        let now = Utc::now();
        let session_id = new_session_id(now);
        let session = Session {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            start_time: now,
            end_time: None,
            duration_secs: None,
            status: SessionStatus::Active,
            test_types: test_types.iter().copied().collect::<BTreeSet<_>>(),
            notes: None,
        };
        self.registry.create_session(session)?;
        log::info!("økt {session_id} opprettet for {user_id} ({} testtyper)", test_types.len());
        Ok(session_id)
    }

    /// Oppretter økten og starter nøyaktig én innsamlingstråd for den.
    pub fn start_session<D>(
        &self,
        user_id: &str,
        test_types: &[TestType],
        device: D,
        cfg: CollectorConfig,
    ) -> Result<String, CoreError>
    where
        D: SensorDevice + 'static,
    {
        let session_id = self.open_session(user_id, test_types)?;
        let types: Vec<TestType> = test_types
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let handle = match spawn_collector(
            session_id.clone(),
            types,
            device,
            self.store.clone(),
            cfg,
            rand::random(),
        ) {
            Ok(h) => h,
            Err(e) => {
                log::error!("kunne ikke starte innsamling for {session_id}: {e}");
                let _ = self.registry.close_session(
                    &session_id,
                    SessionStatus::Cancelled,
                    Utc::now(),
                    Some("innsamling kunne ikke startes".into()),
                );
                return Err(StoreError::Io(e).into());
            }
        };

        self.collectors
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(session_id.clone(), handle);
        Ok(session_id)
    }

    /// Stopper innsamlingen, venter til den er tømt og lukker økten som fullført.
    pub fn stop_session(&self, session_id: &str, notes: Option<String>) -> Result<StoppedSession, CoreError> {
        self.finish(session_id, SessionStatus::Completed, notes)
    }

    pub fn cancel_session(&self, session_id: &str) -> Result<StoppedSession, CoreError> {
        self.finish(session_id, SessionStatus::Cancelled, None)
    }

    fn finish(
        &self,
        session_id: &str,
        status: SessionStatus,
        notes: Option<String>,
    ) -> Result<StoppedSession, CoreError> {
        if !self.registry.session_exists(session_id) {
            return Err(StoreError::SessionNotFound(session_id.to_string()).into());
        }

        // ta handtaket ut av kartet før join, så låsen ikke holdes mens tråden tømmes
        let handle = self
            .collectors
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .remove(session_id);
        let collection = handle.map(CollectionHandle::stop);

        let session = self
            .registry
            .close_session(session_id, status, Utc::now(), notes)?;
        log::info!(
            "økt {session_id} lukket som {:?} ({} s)",
            session.status,
            session.duration_secs.unwrap_or(0)
        );
        Ok(StoppedSession { session, collection })
    }

    /// Antall og siste sample leses hver for seg; en samtidig innsamler kan
    /// ha skrevet én sample til mellom de to.
    pub fn live_view(&self, session_id: &str) -> Result<LiveView, CoreError> {
        if !self.registry.session_exists(session_id) {
            return Err(StoreError::SessionNotFound(session_id.to_string()).into());
        }
        Ok(LiveView {
            session_id: session_id.to_string(),
            data_count: self.store.session_sample_count(session_id)?,
            latest: self.store.latest_sample(session_id)?,
        })
    }

    pub fn diagnostics(&self) -> Result<Diagnostics, CoreError> {
        let sessions = self.registry.all_sessions();
        let live_collectors = self
            .collectors
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .values()
            .filter(|h| !h.is_finished())
            .count();
        Ok(Diagnostics {
            total_sessions: sessions.len(),
            active_sessions: sessions.iter().filter(|s| s.is_active()).count(),
            total_samples: self.store.sample_count()?,
            live_collectors,
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut map) = self.collectors.lock() {
            for (_, handle) in map.drain() {
                let _ = handle.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_id_format() {
        let now = Utc.with_ymd_and_hms(2025, 7, 5, 16, 11, 41).unwrap();
        let id = new_session_id(now);
        assert!(id.starts_with("session_20250705_161141_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
