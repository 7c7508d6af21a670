//! argus-eye: Real-time proctoring analytics
//!
//! Turns a stream of webcam frames per exam session into gaze, object,
//! behavioral and risk readings. Landmark estimation and object
//! detection are external models reached through the traits in
//! [`models`]; everything downstream of them lives here.

pub mod frame;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod session;
pub mod stats;

pub use frame::decode_frame;
pub use models::{FaceLandmarks, LandmarkEstimator, ObjectDetector, RawDetection};
pub use pipeline::ProctorPipeline;
pub use session::{Session, SessionHandle, SessionRegistry};
