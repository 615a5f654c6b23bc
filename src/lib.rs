//! Fuses face, hand, body-pose and sign-detector outputs into one record per
//! video frame and ships it as a JSON datagram.

pub mod body_pose;
pub mod char_classifier;
pub mod config;
pub mod error;
pub mod expression;
pub mod fusion;
pub mod gesture;
pub mod head_pose;
pub mod pipeline;
pub mod scheduler;
pub mod sign;
pub mod transport;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use expression::Expression;
pub use fusion::{FusionOrchestrator, RunStats};
pub use gesture::{GestureLabel, GestureTracker};
pub use scheduler::{DualModelScheduler, InferenceSnapshot};
pub use types::{FusedFrame, Frame, OutputRecord};
