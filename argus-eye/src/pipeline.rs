//! Proctoring pipeline service
//!
//! One [`ProctorPipeline`] serves many sessions. Per frame:
//! admission, conditioning, concurrent detection, behavioral window
//! update, risk scoring. Frames of the same session are serialized by
//! the session's frame gate; different sessions never wait on each other.

use crate::frame::{decode_frame, now_secs};
use crate::models::{
    DisabledLandmarkEstimator, DisabledObjectDetector, LandmarkEstimator, ObjectDetector,
    RemoteLandmarkEstimator, RemoteObjectDetector,
};
use crate::processing::{DetectionFanout, FrameConditioner, ObjectFilter, RiskScorer};
use crate::session::{SessionHandle, SessionRegistry};
use crate::stats::ProcessingStats;
use argus_core::{
    BehaviorSummary, FrameAnalysis, FrameMetadata, GazeReading, ObjectReading, PipelineInfo,
    ProctorConfig, ProctorError, Result, RiskAssessment, SamplingInfo, SessionId, SessionSummary,
};
use image::RgbImage;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const SKIPPED_NOTE: &str = "Frame skipped (low motion)";
const ERROR_NOTE: &str = "Error in analysis";

pub struct ProctorPipeline {
    config: ProctorConfig,
    registry: SessionRegistry,
    conditioner: Arc<FrameConditioner>,
    fanout: DetectionFanout,
    scorer: RiskScorer,
    stats: Mutex<ProcessingStats>,
    running: AtomicBool,
}

impl ProctorPipeline {
    /// Build a pipeline around explicit detector backends
    pub fn new(
        config: ProctorConfig,
        landmarks: Arc<dyn LandmarkEstimator>,
        detector: Arc<dyn ObjectDetector>,
    ) -> Result<Self> {
        config.validate()?;

        let filter = ObjectFilter::new(config.objects.clone());
        info!(
            "Pipeline ready: landmarks={}, objects={}, window={}, max_sessions={}",
            landmarks.model_name(),
            detector.model_name(),
            config.behavior.window_size,
            config.pipeline.max_sessions
        );

        Ok(Self {
            registry: SessionRegistry::new(&config),
            conditioner: Arc::new(FrameConditioner::new(config.conditioning.clone())),
            fanout: DetectionFanout::new(landmarks, detector, filter),
            scorer: RiskScorer::new(config.scoring.clone()),
            stats: Mutex::new(ProcessingStats::new(config.pipeline.stats_window)),
            running: AtomicBool::new(true),
            config,
        })
    }

    /// Build a pipeline with backends chosen from `config.detectors`
    pub fn from_config(config: ProctorConfig) -> Result<Self> {
        let detectors = &config.detectors;

        let landmarks: Arc<dyn LandmarkEstimator> = match &detectors.landmark_endpoint {
            Some(endpoint) => Arc::new(RemoteLandmarkEstimator::new(endpoint, detectors)?),
            None => {
                warn!("No landmark endpoint configured; gaze stream will report no face");
                Arc::new(DisabledLandmarkEstimator)
            }
        };

        let detector: Arc<dyn ObjectDetector> = match &detectors.object_endpoint {
            Some(endpoint) => Arc::new(RemoteObjectDetector::new(endpoint, detectors)?),
            None => {
                warn!("No object endpoint configured; object stream will report an empty scene");
                Arc::new(DisabledObjectDetector)
            }
        };

        Self::new(config, landmarks, detector)
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.config
    }

    /// Decode and process an encoded frame.
    ///
    /// A payload that fails to decode is rejected before any session
    /// state is touched.
    pub async fn process_encoded(
        &self,
        session_id: &str,
        bytes: &[u8],
        timestamp: Option<f64>,
    ) -> Result<FrameAnalysis> {
        let frame = decode_frame(bytes).map_err(|e| {
            counter!("argus_frames_rejected_total").increment(1);
            warn!("Rejected frame for session {}: {}", session_id, e);
            e
        })?;
        Ok(self.process_frame(session_id, frame, timestamp).await)
    }

    /// Process one decoded frame. Always yields a result; failures are
    /// reported through the error variant.
    pub async fn process_frame(
        &self,
        session_id: &str,
        frame: RgbImage,
        timestamp: Option<f64>,
    ) -> FrameAnalysis {
        let started = Instant::now();
        let timestamp = timestamp.unwrap_or_else(now_secs);
        counter!("argus_frames_total").increment(1);

        match self.run(session_id, frame, timestamp, started).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!("Pipeline processing error for session {}: {}", session_id, e);
                counter!("argus_frames_failed_total").increment(1);
                error_result(session_id, timestamp, &e)
            }
        }
    }

    async fn run(
        &self,
        session_id: &str,
        frame: RgbImage,
        timestamp: f64,
        started: Instant,
    ) -> Result<FrameAnalysis> {
        if !self.running.load(Ordering::Acquire) {
            return Err(ProctorError::Pipeline("Pipeline is shut down".to_string()));
        }

        let session = self.registry.get_or_create(session_id)?;
        let _gate = session.frame_gate.lock().await;

        let frame = Arc::new(frame);

        let sampler = session.sampler.clone();
        let sample_frame = frame.clone();
        let decision = tokio::task::spawn_blocking(move || sampler.lock().evaluate(&sample_frame, timestamp))
            .await
            .map_err(|e| ProctorError::Pipeline(format!("Admission task failed: {}", e)))?;

        session.state.lock().frames_received += 1;

        if !decision.admit {
            counter!("argus_frames_skipped_total").increment(1);
            return Ok(self.skipped_result(&session, timestamp, decision.info));
        }

        let preprocess_started = Instant::now();
        let conditioner = self.conditioner.clone();
        let source = frame.clone();
        let conditioned = tokio::task::spawn_blocking(move || conditioner.condition(&source))
            .await
            .map_err(|e| ProctorError::Pipeline(format!("Conditioning task failed: {}", e)))??;
        let preprocessing_ms = preprocess_started.elapsed().as_secs_f64() * 1000.0;
        let roi = conditioned.roi.clone();

        let bundle = self
            .fanout
            .dispatch(frame, conditioned, session.tracker.clone(), timestamp)
            .await;

        let behavior = session.state.lock().behavior.update_and_analyze(&bundle);
        let risk = self.scorer.score(&bundle, &behavior);

        let elapsed = started.elapsed().as_secs_f64();
        let processing_ms = elapsed * 1000.0;
        let within_timeout = elapsed < self.config.pipeline.frame_timeout_secs;
        if !within_timeout {
            warn!(
                "Frame for session {} exceeded soft timeout: {:.1}ms",
                session_id, processing_ms
            );
        }

        let (avg_processing_ms, avg_preprocessing_ms) = {
            let mut stats = self.stats.lock();
            stats.record(processing_ms, preprocessing_ms);
            (stats.avg_processing_ms(), stats.avg_preprocessing_ms())
        };

        let performance = {
            let mut state = session.state.lock();
            state.record_processed(processing_ms);
            state.counters()
        };

        counter!("argus_frames_processed_total").increment(1);
        histogram!("argus_frame_processing_ms").record(processing_ms);

        Ok(FrameAnalysis {
            metadata: FrameMetadata {
                session_id: session_id.to_string(),
                timestamp,
                frame_skipped: false,
                processing_time_ms: processing_ms,
                preprocessing_time_ms: preprocessing_ms,
                detection_time_ms: processing_ms - preprocessing_ms,
                avg_processing_time_ms: avg_processing_ms,
                avg_preprocessing_time_ms: avg_preprocessing_ms,
                frame_within_timeout: within_timeout,
                conditioning_enabled: self.config.conditioning.enabled,
                degraded_streams: bundle.degraded_streams.clone(),
                roi: Some(roi),
                sampling: decision.info,
                performance,
                error: None,
            },
            gaze: bundle.gaze,
            objects: bundle.objects,
            behavior,
            risk,
        })
    }

    /// Process frames of one session in order, one result per frame.
    ///
    /// Frames are stamped `1 / target_fps` seconds apart starting now.
    pub async fn process_frame_batch(
        &self,
        session_id: &str,
        frames: Vec<RgbImage>,
    ) -> Vec<FrameAnalysis> {
        let base = now_secs();
        let interval = 1.0 / self.config.pipeline.target_fps as f64;

        let mut results = Vec::with_capacity(frames.len());
        for (i, frame) in frames.into_iter().enumerate() {
            let timestamp = base + i as f64 * interval;
            results.push(self.process_frame(session_id, frame, Some(timestamp)).await);
        }
        results
    }

    pub fn session_summary(&self, session_id: &str) -> Result<SessionSummary> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| ProctorError::SessionNotFound(session_id.to_string()))?;

        let state = session.state.lock();
        Ok(SessionSummary {
            session_id: session_id.to_string(),
            behavior_statistics: state.behavior.statistics(),
            scoring_config: self.scorer.config().clone(),
            performance: state.performance(),
        })
    }

    pub fn pipeline_info(&self) -> PipelineInfo {
        let object_detector = self
            .fanout
            .filter()
            .read()
            .model_info(&self.fanout.object_model());

        PipelineInfo {
            gaze_detector: self.fanout.landmark_model(),
            object_detector,
            window_size: self.config.behavior.window_size,
            active_sessions: self.registry.len(),
            scoring_config: self.scorer.config().clone(),
            avg_processing_time_ms: self.stats.lock().avg_processing_ms(),
            target_fps: self.config.pipeline.target_fps,
            timeout_ms: self.config.pipeline.frame_timeout_secs * 1000.0,
            conditioning_enabled: self.config.conditioning.enabled,
            sampling_enabled: self.config.sampling.enabled,
        }
    }

    /// Release a session's state. Idempotent.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.registry.remove(session_id)
    }

    pub fn clear_all_sessions(&self) {
        let cleared = self.registry.clear();
        self.stats.lock().clear();
        info!("Cleared all sessions ({})", cleared);
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.registry.get(session_id).is_some()
    }

    pub fn add_forbidden_class(&self, class_name: &str, label: &str) {
        self.fanout.filter().write().add_forbidden_class(class_name, label);
        info!("Forbidden class added: {} -> {}", class_name, label);
    }

    pub fn remove_forbidden_class(&self, class_name: &str) -> bool {
        self.fanout.filter().write().remove_forbidden_class(class_name)
    }

    /// Stop accepting frames and release all sessions
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            self.clear_all_sessions();
            info!("Pipeline shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn skipped_result(
        &self,
        session: &SessionHandle,
        timestamp: f64,
        sampling: SamplingInfo,
    ) -> FrameAnalysis {
        let performance = {
            let mut state = session.state.lock();
            state.frames_skipped += 1;
            state.counters()
        };

        FrameAnalysis {
            gaze: GazeReading::no_face(),
            objects: ObjectReading::default(),
            behavior: BehaviorSummary::with_note(SKIPPED_NOTE),
            risk: RiskAssessment::skipped(),
            metadata: FrameMetadata {
                session_id: session.id().to_string(),
                timestamp,
                frame_skipped: true,
                frame_within_timeout: true,
                conditioning_enabled: self.config.conditioning.enabled,
                avg_processing_time_ms: self.stats.lock().avg_processing_ms(),
                sampling,
                performance,
                ..FrameMetadata::default()
            },
        }
    }
}

fn error_result(session_id: &str, timestamp: f64, err: &ProctorError) -> FrameAnalysis {
    FrameAnalysis {
        gaze: GazeReading::no_face(),
        objects: ObjectReading::default(),
        behavior: BehaviorSummary::with_note(ERROR_NOTE),
        risk: RiskAssessment::failed(),
        metadata: FrameMetadata {
            session_id: session_id.to_string(),
            timestamp,
            error: Some(err.to_string()),
            ..FrameMetadata::default()
        },
    }
}
