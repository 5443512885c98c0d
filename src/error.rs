//! Error types for the simulator core

use crate::core::PointId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    /// Engine was shut down, or no runtime is available to drive its timers.
    #[error("simulation engine is out of service")]
    OutOfService,

    /// Continuation token is unknown, expired, or bound to another point.
    /// The caller has to restart the read from scratch.
    #[error("continuation point is invalid")]
    ContinuationInvalid,

    #[error("value {value} written to {point} is outside [{low}, {high}]")]
    OutOfRange {
        point: PointId,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("value written to {point} does not match its category (expected {expected})")]
    TypeMismatch { point: PointId, expected: String },

    #[error("unknown category tag {0}")]
    UnknownCategory(u32),

    #[error("point {0} cannot be historized")]
    NotHistorizable(PointId),

    #[error("no history record for {0}")]
    NoHistory(PointId),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
