//! Strategy manager
//!
//! Drives one resolution cycle per request: looks up the classification's
//! plan, captures the screen at most once, then yields candidate locations
//! lazily, one technique at a time in priority order.

use crate::errors::LocatorError;
use crate::registry::{PlanEntry, SessionBackends, StrategyRegistry};
use crate::snapshot::CycleSnapshot;
use crate::strategies::LocateRequest;
use crate::tracer::{Attempt, AttemptOutcome, ExecutionTracer};
use crate::types::*;
use perceiver_visual::{Region, Snapshot};
use soulheal_core_types::{Classification, SessionId, Target};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-session engine: registry, backends and tracer
pub struct StrategyManager {
    session: SessionId,
    backends: SessionBackends,
    registry: StrategyRegistry,
    tracer: ExecutionTracer,
}

impl StrategyManager {
    pub fn new(backends: SessionBackends, tracer: ExecutionTracer) -> Self {
        let session = SessionId::new();
        let registry = StrategyRegistry::build(&backends);
        info!(session = %session, source = backends.source().name(), "strategy manager ready");
        Self {
            session,
            backends,
            registry,
            tracer,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn tracer(&self) -> &ExecutionTracer {
        &self.tracer
    }

    /// Ordered plan that a resolution of `target` would follow
    pub fn plan_for(&self, target: &Target) -> &[PlanEntry] {
        self.registry.plan(target.classification())
    }

    /// Start a resolution cycle.
    ///
    /// Fails with [`LocatorError::NoApplicableStrategy`] before any capture when
    /// no technique is active for the target's classification.
    pub async fn resolve(&self, request: ResolveRequest) -> Result<CandidateStream<'_>, LocatorError> {
        let classification = request.target.classification();
        let plan = self.registry.plan(classification);

        if !plan.iter().any(PlanEntry::is_active) {
            let skipped = skip_reasons(plan);
            warn!(target_id = request.target.raw(), %classification, "no applicable strategy");
            return Err(LocatorError::NoApplicableStrategy {
                target: request.target.raw().to_string(),
                classification,
                skipped,
            });
        }

        let needs_capture = plan
            .iter()
            .any(|entry| entry.is_active() && entry.technique().is_vision());
        let snapshot = if needs_capture {
            CycleSnapshot::capture(self.backends.source().as_ref(), &request.aoi).await
        } else {
            CycleSnapshot::without_capture()
        };

        debug!(
            session = %self.session,
            target_id = request.target.raw(),
            %classification,
            index = request.index,
            aoi = %request.aoi,
            captured = snapshot.snapshot().is_some(),
            "resolution cycle started"
        );

        Ok(CandidateStream {
            manager: self,
            request,
            entries: plan.iter(),
            snapshot,
            attempts: Vec::new(),
            yielded: 0,
            exhausted: false,
        })
    }

    /// Full-screen capture outside a resolution cycle
    pub async fn capture_screen(&self) -> Result<Snapshot, LocatorError> {
        let image = self
            .backends
            .source()
            .capture()
            .await
            .map_err(|e| LocatorError::Capture(e.to_string()))?;
        Ok(Snapshot::new(image))
    }

    /// Assert presence of one or more targets within `timeout`.
    ///
    /// Targets are grouped by classification; each group is tried with its
    /// active techniques in priority order until one reports presence. The
    /// timeout is a budget shared by the whole call.
    pub async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<PresenceReport, LocatorError> {
        if targets.is_empty() {
            return Err(LocatorError::InvalidTarget("no presence targets given".into()));
        }
        let started = Instant::now();

        let mut groups: BTreeMap<Classification, Vec<Target>> = BTreeMap::new();
        for target in targets {
            groups
                .entry(target.classification())
                .or_default()
                .push(target.clone());
        }

        if !groups.keys().any(|c| self.registry.has_active(*c)) {
            let (classification, group) = groups
                .iter()
                .next()
                .map(|(c, g)| (*c, join_targets(g)))
                .ok_or_else(|| LocatorError::InvalidTarget("no presence targets given".into()))?;
            let skipped = groups
                .keys()
                .flat_map(|c| skip_reasons(self.registry.plan(*c)))
                .collect();
            warn!(targets = %group, %classification, "no applicable strategy for any presence target");
            return Err(LocatorError::NoApplicableStrategy {
                target: group,
                classification,
                skipped,
            });
        }

        let mut report = PresenceReport::default();
        let mut group_verdicts = Vec::with_capacity(groups.len());

        for (classification, group) in groups {
            let label = join_targets(&group);
            let strategies: Vec<&Arc<dyn crate::strategies::Strategy>> =
                self.registry.active(classification).collect();

            // unsupported group counts as absent; the other groups still decide
            if strategies.is_empty() {
                for entry in self.registry.plan(classification) {
                    self.trace(
                        entry.technique(),
                        &label,
                        AttemptOutcome::Skipped {
                            reason: entry.skip_reason().unwrap_or("inactive").to_string(),
                        },
                        Duration::ZERO,
                    );
                }
                debug!(targets = %label, %classification, "no active technique for presence group");
                group_verdicts.push(false);
                report.missing.extend(group.iter().map(|t| t.raw().to_string()));
                continue;
            }

            let mut verdict: Option<PresenceReport> = None;
            for strategy in strategies {
                let remaining = timeout.saturating_sub(started.elapsed());
                let attempt_started = Instant::now();
                match strategy.assert_presence(&group, remaining, rule).await {
                    Ok(found) => {
                        let outcome = if found.present {
                            AttemptOutcome::Success
                        } else {
                            AttemptOutcome::NotFound
                        };
                        self.trace(strategy.technique(), &label, outcome, attempt_started.elapsed());
                        let present = found.present;
                        verdict = Some(found);
                        if present {
                            break;
                        }
                    }
                    Err(err) => {
                        self.trace(
                            strategy.technique(),
                            &label,
                            AttemptOutcome::Failed {
                                reason: err.to_string(),
                            },
                            attempt_started.elapsed(),
                        );
                    }
                }
            }

            match verdict {
                Some(found) => {
                    group_verdicts.push(found.present);
                    report.techniques.extend(found.techniques);
                    report.matched.extend(found.matched);
                    report.missing.extend(found.missing);
                }
                None => {
                    group_verdicts.push(false);
                    report.missing.extend(group.iter().map(|t| t.raw().to_string()));
                }
            }
        }

        report.present = match rule {
            PresenceRule::Any => group_verdicts.iter().any(|v| *v),
            PresenceRule::All => group_verdicts.iter().all(|v| *v),
        };
        report.elapsed = started.elapsed();
        info!(
            session = %self.session,
            present = report.present,
            ?rule,
            targets = targets.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "presence asserted"
        );
        Ok(report)
    }

    fn trace(&self, technique: Technique, target: &str, outcome: AttemptOutcome, duration: Duration) -> Attempt {
        let attempt = Attempt::new(self.session.clone(), technique, target, outcome, duration);
        self.tracer.record(&attempt);
        attempt
    }
}

fn skip_reasons(plan: &[PlanEntry]) -> Vec<String> {
    plan.iter()
        .map(|entry| {
            format!(
                "{}: {}",
                entry.technique(),
                entry.skip_reason().unwrap_or("inactive")
            )
        })
        .collect()
}

fn join_targets(targets: &[Target]) -> String {
    targets
        .iter()
        .map(Target::raw)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Lazily evaluated candidate locations of one resolution cycle
pub struct CandidateStream<'a> {
    manager: &'a StrategyManager,
    request: ResolveRequest,
    entries: std::slice::Iter<'a, PlanEntry>,
    snapshot: CycleSnapshot,
    attempts: Vec<Attempt>,
    yielded: usize,
    exhausted: bool,
}

impl<'a> CandidateStream<'a> {
    pub fn request(&self) -> &ResolveRequest {
        &self.request
    }

    /// Attempts recorded so far, in execution order
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }

    /// Run techniques until the next one locates the target.
    ///
    /// Returns `None` once every technique in the plan has run.
    pub async fn next(&mut self) -> Option<LocateResult> {
        while let Some(entry) = self.entries.next() {
            let strategy = match entry {
                PlanEntry::Skipped { spec, reason } => {
                    self.record(
                        spec.technique,
                        AttemptOutcome::Skipped {
                            reason: reason.clone(),
                        },
                        Duration::ZERO,
                    );
                    continue;
                }
                PlanEntry::Active(strategy) => Arc::clone(strategy),
            };
            let technique = strategy.technique();

            let region: Option<Region> = if technique.is_vision() {
                match self.snapshot.region() {
                    Ok(region) => Some(region.clone()),
                    Err(reason) => {
                        let reason = format!("snapshot unavailable: {}", reason);
                        self.record(technique, AttemptOutcome::Failed { reason }, Duration::ZERO);
                        continue;
                    }
                }
            } else {
                None
            };

            let started = Instant::now();
            let result = strategy
                .locate(&LocateRequest {
                    target: &self.request.target,
                    index: self.request.index,
                    region: region.as_ref(),
                })
                .await;
            let elapsed = started.elapsed();

            match result {
                Ok(Some(value)) => {
                    let value = match &region {
                        Some(region) => value.offset_by(region.origin()),
                        None => value,
                    };
                    self.record(technique, AttemptOutcome::Success, elapsed);
                    self.yielded += 1;
                    return Some(LocateResult::new(value, technique));
                }
                Ok(None) => self.record(technique, AttemptOutcome::NotFound, elapsed),
                Err(err) => self.record(
                    technique,
                    AttemptOutcome::Failed {
                        reason: err.to_string(),
                    },
                    elapsed,
                ),
            }
        }

        if !self.exhausted {
            self.exhausted = true;
            if self.yielded == 0 {
                let source = self.manager.backends.source();
                match self.snapshot.page_source(source.as_ref()).await {
                    Some(dump) => debug!(
                        target_id = self.request.target.raw(),
                        page_source = dump,
                        "no technique located the target"
                    ),
                    None => debug!(
                        target_id = self.request.target.raw(),
                        "no technique located the target"
                    ),
                }
            }
        }
        None
    }

    /// Drain every remaining candidate
    pub async fn collect_all(mut self) -> (Vec<LocateResult>, Vec<Attempt>) {
        let mut results = Vec::new();
        while let Some(result) = self.next().await {
            results.push(result);
        }
        (results, self.attempts)
    }

    fn record(&mut self, technique: Technique, outcome: AttemptOutcome, duration: Duration) {
        let attempt = self
            .manager
            .trace(technique, self.request.target.raw(), outcome, duration);
        self.attempts.push(attempt);
    }
}
