//! Error types for locator system

use crate::{healer::ActionFailure, tracer::Attempt, types::Technique};
use soulheal_core_types::{AoiError, Classification};
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// No technique can handle the target with the session's backends
    #[error("No applicable strategy for '{target}' ({classification})")]
    NoApplicableStrategy {
        target: String,
        classification: Classification,
        skipped: Vec<String>,
    },

    /// Target could not be classified
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Area of interest rejected at call time
    #[error("Invalid area of interest: {0}")]
    InvalidArea(#[from] AoiError),

    /// Strategy execution failed
    #[error("Strategy '{technique}' failed: {reason}")]
    StrategyFailed { technique: Technique, reason: String },

    /// Every applicable technique ran and none located the target
    #[error("Element not found: '{target}' after {} attempt(s)", .attempts.len())]
    NoLocationFound { target: String, attempts: Vec<Attempt> },

    /// Candidates were located but the action failed on each
    #[error("Action failed on all {attempts} candidate(s) for '{target}': {last_error}")]
    AllAttemptsFailed {
        target: String,
        attempts: usize,
        last_error: String,
        failures: Vec<ActionFailure>,
        /// Technique attempts of the cycle, including skipped and not-found ones
        technique_attempts: Vec<Attempt>,
    },

    /// Screen capture failed outside a resolution cycle
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Presence assertion deadline exceeded while a backend still hung
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    pub(crate) fn strategy(technique: Technique, reason: impl ToString) -> Self {
        LocatorError::StrategyFailed {
            technique,
            reason: reason.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::Timeout(_)
                | LocatorError::Capture(_)
                | LocatorError::NoLocationFound { .. }
                | LocatorError::AllAttemptsFailed { .. }
        )
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Internal(_) => 3,
            LocatorError::Capture(_)
            | LocatorError::Timeout(_)
            | LocatorError::NoApplicableStrategy { .. } => 2,
            LocatorError::NoLocationFound { .. }
            | LocatorError::AllAttemptsFailed { .. }
            | LocatorError::StrategyFailed { .. } => 1,
            LocatorError::InvalidTarget(_) | LocatorError::InvalidArea(_) => 0,
        }
    }
}
