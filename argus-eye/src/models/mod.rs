//! External model contracts and backends
//!
//! The landmark estimator and object detector are third-party models.
//! The pipeline only sees them through the traits defined here.

pub mod detector;
pub mod landmarks;
pub mod remote;

pub use detector::{DisabledObjectDetector, ObjectDetector, RawDetection};
pub use landmarks::{DisabledLandmarkEstimator, FaceLandmarks, LandmarkEstimator};
pub use remote::{RemoteLandmarkEstimator, RemoteObjectDetector};
