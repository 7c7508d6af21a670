//! Session registry
//!
//! A session owns its sampler, gaze tracker, behavioral window and
//! counters. Sessions are created explicitly through
//! [`SessionRegistry::get_or_create`] and released by
//! [`SessionRegistry::remove`]; nothing is shared across sessions.

use crate::processing::{BehaviorAggregator, BoundedWindow, FrameSampler, GazeTracker};
use argus_core::{
    BehaviorConfig, GazeConfig, PerformanceCounters, ProctorConfig, ProctorError, Result,
    SamplingConfig, SessionId, SessionPerformance,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::gauge;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Mutable per-session state that is not needed by the detector tasks
pub struct SessionState {
    pub behavior: BehaviorAggregator,
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    processing_ms: BoundedWindow<f64>,
}

impl SessionState {
    pub fn record_processed(&mut self, processing_ms: f64) {
        self.frames_processed += 1;
        self.processing_ms.push(processing_ms);
    }

    pub fn counters(&self) -> PerformanceCounters {
        PerformanceCounters {
            total_frames: self.frames_received,
            processed_frames: self.frames_processed,
            skipped_frames: self.frames_skipped,
        }
    }

    pub fn performance(&self) -> SessionPerformance {
        SessionPerformance {
            frames_received: self.frames_received,
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            avg_processing_time_ms: self.processing_ms.mean(),
        }
    }
}

pub struct Session {
    id: SessionId,
    created_at: Instant,
    /// Held for the whole of a frame so frames of one session never interleave
    pub frame_gate: tokio::sync::Mutex<()>,
    pub sampler: Arc<Mutex<FrameSampler>>,
    pub tracker: Arc<Mutex<GazeTracker>>,
    pub state: Mutex<SessionState>,
}

pub type SessionHandle = Arc<Session>;

impl Session {
    fn new(id: &str, template: &SessionTemplate) -> Self {
        Self {
            id: id.to_string(),
            created_at: Instant::now(),
            frame_gate: tokio::sync::Mutex::new(()),
            sampler: Arc::new(Mutex::new(FrameSampler::new(template.sampling.clone()))),
            tracker: Arc::new(Mutex::new(GazeTracker::new(template.gaze.clone()))),
            state: Mutex::new(SessionState {
                behavior: BehaviorAggregator::new(&template.behavior),
                frames_received: 0,
                frames_processed: 0,
                frames_skipped: 0,
                processing_ms: BoundedWindow::new(template.stats_window),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age_secs(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }
}

/// Configuration each new session is built from
#[derive(Debug, Clone)]
struct SessionTemplate {
    gaze: GazeConfig,
    sampling: SamplingConfig,
    behavior: BehaviorConfig,
    stats_window: usize,
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    /// Slots reserved by inserted sessions; bounded by `max_sessions`
    active: AtomicUsize,
    max_sessions: usize,
    template: SessionTemplate,
}

impl SessionRegistry {
    pub fn new(config: &ProctorConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            active: AtomicUsize::new(0),
            max_sessions: config.pipeline.max_sessions,
            template: SessionTemplate {
                gaze: config.gaze.clone(),
                sampling: config.sampling.clone(),
                behavior: config.behavior.clone(),
                stats_window: config.pipeline.stats_window,
            },
        }
    }

    /// Return the session, creating it if the registry has room
    pub fn get_or_create(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(session) = self.sessions.get(session_id) {
            return Ok(session.value().clone());
        }

        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let max = self.max_sessions;
                self.active
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
                    .map_err(|_| ProctorError::SessionLimit(max))?;

                info!("Session created: {}", session_id);
                let session = Arc::new(Session::new(session_id, &self.template));
                entry.insert(session.clone());
                gauge!("argus_active_sessions").set(self.active.load(Ordering::Acquire) as f64);
                Ok(session)
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Release a session. Removing an unknown id is a no-op.
    pub fn remove(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return false;
        };
        self.active.fetch_sub(1, Ordering::AcqRel);

        info!(
            "Session cleared: {} (active {:.1}s)",
            session_id,
            session.age_secs()
        );
        gauge!("argus_active_sessions").set(self.sessions.len() as f64);
        true
    }

    /// Release every session, returning how many were active
    pub fn clear(&self) -> usize {
        let mut count = 0;
        self.sessions.retain(|_, _| {
            count += 1;
            false
        });
        self.active.fetch_sub(count, Ordering::AcqRel);
        gauge!("argus_active_sessions").set(self.active.load(Ordering::Acquire) as f64);
        count
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
