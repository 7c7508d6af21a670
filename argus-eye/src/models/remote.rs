//! HTTP inference backends
//!
//! Both clients POST the frame as a JPEG body to a model server and
//! parse a JSON reply. Transport and decoding faults surface as
//! `ProctorError::Detector` so the fan-out stage can substitute defaults.

use super::{FaceLandmarks, LandmarkEstimator, ObjectDetector, RawDetection};
use argus_core::{DetectorConfig, ProctorError, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Deserialize)]
struct LandmarkResponse {
    face: Option<FaceLandmarks>,
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

fn build_client(timeout_ms: u64, stream: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| ProctorError::detector(stream, e.to_string()))
}

fn encode_jpeg(frame: &RgbImage, stream: &str) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
        .map_err(|e| ProctorError::detector(stream, format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

async fn post_frame<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: &str,
    frame: &RgbImage,
    stream: &str,
) -> Result<T> {
    let body = encode_jpeg(frame, stream)?;
    debug!("Posting {} byte frame to {} model at {}", body.len(), stream, endpoint);

    let response = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
        .body(body)
        .send()
        .await
        .map_err(|e| ProctorError::detector(stream, e.to_string()))?;

    if !response.status().is_success() {
        return Err(ProctorError::detector(
            stream,
            format!("Inference request failed: HTTP {}", response.status()),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProctorError::detector(stream, format!("Invalid model response: {}", e)))
}

/// Landmark estimator backed by a remote face-mesh service
pub struct RemoteLandmarkEstimator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl RemoteLandmarkEstimator {
    pub fn new(endpoint: &str, config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.request_timeout_ms, "gaze")?,
            endpoint: endpoint.to_string(),
            model: config.landmark_model.clone(),
        })
    }
}

#[async_trait]
impl LandmarkEstimator for RemoteLandmarkEstimator {
    async fn estimate(&self, frame: &RgbImage) -> Result<Option<FaceLandmarks>> {
        let response: LandmarkResponse =
            post_frame(&self.client, &self.endpoint, frame, "gaze").await?;
        Ok(response.face)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Object detector backed by a remote YOLO-style service
pub struct RemoteObjectDetector {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl RemoteObjectDetector {
    pub fn new(endpoint: &str, config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.request_timeout_ms, "objects")?,
            endpoint: endpoint.to_string(),
            model: config.object_model.clone(),
        })
    }
}

#[async_trait]
impl ObjectDetector for RemoteObjectDetector {
    async fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let response: DetectionResponse =
            post_frame(&self.client, &self.endpoint, frame, "objects").await?;
        Ok(response.detections)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
