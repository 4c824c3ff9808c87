use crate::{LinkId, NodeId};
use thiserror::Error;

/// Errors raised while building a network or loading a scenario.
///
/// All of these are configuration errors: they are detected once, before
/// the first step is simulated, and are never recovered from.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter `{name}`: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("link {0:?} does not exist")]
    UnknownLink(LinkId),

    #[error("no node named `{0}`")]
    UnknownNodeName(String),

    #[error("no link named `{0}`")]
    UnknownLinkName(String),

    #[error("the name `{0}` is used more than once")]
    DuplicateName(String),

    #[error("link length {length} is shorter than the jam spacing of one platoon ({spacing})")]
    LinkTooShort { length: f64, spacing: f64 },

    #[error(
        "wave speed {given} is inconsistent with the reaction time and jam density \
         (expected {expected})"
    )]
    InconsistentWaveSpeed { given: f64, expected: f64 },

    #[error("signal cycle has no phases or a total duration of zero")]
    EmptySignalCycle,

    #[error("no route from {0:?} to {1:?}")]
    NoRoute(NodeId, NodeId),

    #[error("route does not lead from the origin to the destination")]
    InvalidRoute,

    #[error("the network cannot be modified once the simulation has started")]
    AlreadyStarted,

    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for network construction and scenario loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Checks that a parameter is finite and strictly positive.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidParameter {
            name,
            value,
            reason: "must be positive",
        })
    }
}

/// Checks that a parameter is finite and not negative.
pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidParameter {
            name,
            value,
            reason: "must not be negative",
        })
    }
}
