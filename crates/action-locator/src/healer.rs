//! Self-healing action execution
//!
//! Locates a target and runs the caller's action on each candidate location
//! in turn. A failed action moves on to the next technique's candidate; the
//! first successful action ends the cycle.

use crate::{
    errors::LocatorError,
    manager::StrategyManager,
    params::{CandidateSet, ParamFallbackError, ParameterFallback},
    tracer::Attempt,
    types::*,
};
use serde::Serialize;
use soulheal_core_types::{AreaOfInterest, LocateValue};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Action failure on one located candidate
#[derive(Debug, Clone, Serialize)]
pub struct ActionFailure {
    pub technique: Technique,
    pub value: LocateValue,
    pub error: String,
}

/// Successful self-healed action
#[derive(Debug, Clone)]
pub struct Healed<T> {
    pub value: T,

    /// Candidate the action succeeded on
    pub located: LocateResult,

    /// Number of action invocations, including the successful one
    pub action_attempts: usize,

    /// Technique attempts of the cycle up to the success
    pub attempts: Vec<Attempt>,
}

impl<T> Healed<T> {
    /// Whether a technique other than the first candidate's was needed
    pub fn healed(&self) -> bool {
        self.action_attempts > 1
    }
}

/// Runs actions against resolved locations with automatic fallback
#[derive(Clone)]
pub struct SelfHealer {
    manager: Arc<StrategyManager>,
}

impl SelfHealer {
    pub fn new(manager: Arc<StrategyManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<StrategyManager> {
        &self.manager
    }

    /// Locate `request.target` and run `action` on candidates until it succeeds.
    pub async fn act<T, E, F, Fut>(&self, request: ResolveRequest, mut action: F) -> Result<Healed<T>, LocatorError>
    where
        F: FnMut(LocateResult) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let target = request.target.raw().to_string();
        let mut stream = self.manager.resolve(request).await?;
        let mut failures: Vec<ActionFailure> = Vec::new();

        while let Some(located) = stream.next().await {
            match action(located.clone()).await {
                Ok(value) => {
                    let action_attempts = failures.len() + 1;
                    if action_attempts > 1 {
                        info!(
                            target_id = %target,
                            technique = %located.technique,
                            failed = failures.len(),
                            "action healed by fallback technique"
                        );
                    } else {
                        debug!(target_id = %target, technique = %located.technique, "action succeeded");
                    }
                    return Ok(Healed {
                        value,
                        located,
                        action_attempts,
                        attempts: stream.into_attempts(),
                    });
                }
                Err(err) => {
                    warn!(
                        target_id = %target,
                        technique = %located.technique,
                        location = %located.value,
                        error = %err,
                        "action failed on candidate"
                    );
                    failures.push(ActionFailure {
                        technique: located.technique,
                        value: located.value,
                        error: err.to_string(),
                    });
                }
            }
        }

        let attempts = stream.into_attempts();
        match failures.last().map(|f| f.error.clone()) {
            None => Err(LocatorError::NoLocationFound { target, attempts }),
            Some(last_error) => Err(LocatorError::AllAttemptsFailed {
                target,
                attempts: failures.len(),
                last_error,
                failures,
                technique_attempts: attempts,
            }),
        }
    }

    /// First candidate location of the target
    pub async fn locate(&self, request: ResolveRequest) -> Result<LocateResult, LocatorError> {
        let healed = self
            .act(request, |located| async move { Ok::<_, LocatorError>(located) })
            .await?;
        Ok(healed.value)
    }

    /// Try each alternative target in order, healing within each.
    pub async fn act_any<T, E, F, Fut>(
        &self,
        targets: CandidateSet,
        index: usize,
        aoi: AreaOfInterest,
        action: F,
    ) -> Result<Healed<T>, ParamFallbackError<LocatorError>>
    where
        F: Fn(LocateResult) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let action = &action;
        ParameterFallback::new()
            .required("target", targets)
            .execute(move |combination| async move {
                let raw = combination
                    .get_str("target")
                    .ok_or_else(|| LocatorError::InvalidTarget(format!("not a string: {}", combination)))?;
                let request = ResolveRequest::new(raw)?.with_index(index).with_aoi(aoi);
                self.act(request, action).await
            })
            .await
    }
}
