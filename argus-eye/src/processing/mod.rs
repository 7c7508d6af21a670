//! Analytics stages, leaves first

pub mod behavior;
pub mod conditioning;
pub mod fanout;
pub mod gaze;
pub mod head_pose;
pub mod objects;
pub mod risk;
pub mod sampling;
pub mod window;

pub use behavior::{BehaviorAggregator, WindowEntry};
pub use conditioning::{ConditionedFrame, FrameConditioner};
pub use fanout::DetectionFanout;
pub use gaze::{DeviationState, DeviationTimer, GazeTracker};
pub use head_pose::{HeadPose, HeadPoseSolver};
pub use objects::ObjectFilter;
pub use risk::RiskScorer;
pub use sampling::{AdmissionDecision, FrameSampler};
pub use window::BoundedWindow;
