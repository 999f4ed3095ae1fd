use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;

use crate::config::{CollectorConfig, FallbackPolicy};
use crate::device::{SensorDevice, SimulatedSensorDevice};
use crate::error::CoreError;
use crate::metrics;
use crate::models::TestType;
use crate::store::SampleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    DurationElapsed,
    TooManyErrors,
    NoTestTypes,
    /// Tråden panikket; summary er rekonstruert fra tellerne.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub session_id: String,
    pub samples_written: u64,
    pub errors: u64,
    pub simulated: u64,
    pub reason: StopReason,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    errors: AtomicU64,
    simulated: AtomicU64,
}

impl Counters {
    fn summary(&self, session_id: &str, reason: StopReason) -> CollectionSummary {
        CollectionSummary {
            session_id: session_id.to_string(),
            samples_written: self.written.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            simulated: self.simulated.load(Ordering::Relaxed),
            reason,
        }
    }
}

/// Eier innsamlingstråden for én økt. Stopp-signalet går over en kanal,
/// så tråden våkner med en gang i stedet for å vente ut intervallet.
pub struct CollectionHandle {
    session_id: String,
    stop_tx: Sender<()>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<CollectionSummary>>,
}

impl CollectionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn samples_written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    /// Tråden har avsluttet av seg selv (varighet/feil) eller etter stopp.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signaliserer stopp og venter til tråden har tømt seg.
    pub fn stop(mut self) -> CollectionSummary {
        // full kanal eller allerede avsluttet tråd er begge greit
        let _ = self.stop_tx.try_send(());
        self.join()
    }

    /// Venter uten å signalisere (for økter som går til varigheten er ute).
    pub fn wait(mut self) -> CollectionSummary {
        self.join()
    }

    fn join(&mut self) -> CollectionSummary {
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(summary)) => summary,
            Some(Err(_)) => {
                log::error!("innsamlingstråd for {} panikket", self.session_id);
                self.counters.summary(&self.session_id, StopReason::Aborted)
            }
            None => self.counters.summary(&self.session_id, StopReason::Requested),
        }
    }
}

impl Drop for CollectionHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop_tx.try_send(());
            let _ = self.join();
        }
    }
}

/// Starter én innsamlingstråd for økten. Testtypene polles round-robin,
/// én sample per vellykket poll.
pub fn spawn_collector<D>(
    session_id: impl Into<String>,
    test_types: Vec<TestType>,
    device: D,
    store: Arc<dyn SampleStore>,
    cfg: CollectorConfig,
    fallback_seed: u64,
) -> std::io::Result<CollectionHandle>
where
    D: SensorDevice + 'static,
{
    let session_id = session_id.into();
    let (stop_tx, stop_rx) = channel::bounded(1);
    let counters = Arc::new(Counters::default());

    let worker = Worker {
        session_id: session_id.clone(),
        test_types,
        device,
        fallback: SimulatedSensorDevice::new(fallback_seed),
        store,
        cfg,
        counters: counters.clone(),
    };
    let worker = thread::Builder::new()
        .name(format!("collector-{session_id}"))
        .spawn(move || worker.run(stop_rx))?;

    log::info!("innsamling startet for {session_id}");
    Ok(CollectionHandle {
        session_id,
        stop_tx,
        counters,
        worker: Some(worker),
    })
}

struct Worker<D> {
    session_id: String,
    test_types: Vec<TestType>,
    device: D,
    fallback: SimulatedSensorDevice,
    store: Arc<dyn SampleStore>,
    cfg: CollectorConfig,
    counters: Arc<Counters>,
}

impl<D: SensorDevice> Worker<D> {
    fn run(mut self, stop_rx: Receiver<()>) -> CollectionSummary {
        let reason = self.poll_loop(&stop_rx);
        let summary = self.counters.summary(&self.session_id, reason);
        log::info!(
            "innsamling for {} stoppet ({:?}): {} samples, {} feil, {} simulert",
            self.session_id,
            summary.reason,
            summary.samples_written,
            summary.errors,
            summary.simulated
        );
        summary
    }

    fn poll_loop(&mut self, stop_rx: &Receiver<()>) -> StopReason {
        if self.test_types.is_empty() {
            log::warn!("økt {} har ingen testtyper å polle", self.session_id);
            return StopReason::NoTestTypes;
        }

        let interval = Duration::from_millis(self.cfg.interval_ms);
        let deadline = Instant::now() + Duration::from_secs(self.cfg.duration_secs);
        let mut consecutive_errors: u32 = 0;
        let mut next = 0usize;

        loop {
            if Instant::now() >= deadline {
                return StopReason::DurationElapsed;
            }

            let test_type = self.test_types[next % self.test_types.len()];
            match self.poll_once(test_type) {
                Ok(()) => {
                    consecutive_errors = 0;
                    next = next.wrapping_add(1);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    metrics::inc_collector_error();
                    log::warn!(
                        "innsamling {}: feil {}/{}: {e}",
                        self.session_id,
                        consecutive_errors,
                        self.cfg.max_consecutive_errors
                    );
                    if consecutive_errors >= self.cfg.max_consecutive_errors {
                        log::error!(
                            "innsamling {}: {} feil på rad, avslutter",
                            self.session_id,
                            consecutive_errors
                        );
                        return StopReason::TooManyErrors;
                    }
                }
            }

            let wait = interval.min(deadline.saturating_duration_since(Instant::now()));
            match stop_rx.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return StopReason::Requested,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn poll_once(&mut self, test_type: TestType) -> Result<(), CoreError> {
        let reading = match self.device.read(test_type) {
            Ok(r) => r,
            Err(e) => match self.cfg.fallback {
                FallbackPolicy::Stop => return Err(e.into()),
                FallbackPolicy::Simulate => {
                    log::debug!(
                        "sensor {} feilet for {} ({e}), bruker simulert måling",
                        self.device.name(),
                        self.session_id
                    );
                    self.counters.simulated.fetch_add(1, Ordering::Relaxed);
                    metrics::inc_simulated_fallback();
                    self.fallback.read(test_type)?
                }
            },
        };

        let sample = reading.into_sample(Utc::now(), test_type);
        self.store.append_sample(&self.session_id, sample)?;
        self.counters.written.fetch_add(1, Ordering::Relaxed);
        metrics::inc_sample_collected();
        Ok(())
    }
}
