//! Fallback groups of interchangeable backend instances
//!
//! A group forwards each operation to its members in order and returns the
//! first success. A member answering "not found" is treated like a failure so
//! the next member gets a chance; if every member answered "not found" the
//! group answers "not found" too.

use crate::source::{ElementSource, SourceCapabilities, SourceError};
use crate::types::PresenceRule;
use async_trait::async_trait;
use image::DynamicImage;
use perceiver_visual::{TemplateMatch, TemplateMatcher, TextBlock, TextDetector, VisualError};
use soulheal_core_types::{LocateValue, Target};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Error returned when a group is built without members
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fallback group '{0}' has no instances")]
pub struct EmptyFallbackGroup(pub String);

/// Every member failed; errors keyed by member index, in call order
#[derive(Debug, Clone)]
pub struct AllInstancesFailed<E> {
    pub failures: Vec<(usize, E)>,
}

impl<E: fmt::Display> fmt::Display for AllInstancesFailed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} instance(s) failed", self.failures.len())?;
        for (index, err) in &self.failures {
            write!(f, "; [{}] {}", index, err)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AllInstancesFailed<E> {}

/// Ordered, non-empty list of interchangeable backend instances
pub struct FallbackGroup<B: ?Sized> {
    label: String,
    instances: Vec<Arc<B>>,
}

impl<B: ?Sized + Send + Sync> FallbackGroup<B> {
    pub fn new(label: impl Into<String>, instances: Vec<Arc<B>>) -> Result<Self, EmptyFallbackGroup> {
        let label = label.into();
        if instances.is_empty() {
            return Err(EmptyFallbackGroup(label));
        }
        Ok(Self { label, instances })
    }

    /// Group of exactly one instance
    pub fn single(label: impl Into<String>, instance: Arc<B>) -> Self {
        Self {
            label: label.into(),
            instances: vec![instance],
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[Arc<B>] {
        &self.instances
    }

    /// Invoke `op` on each member in order until one succeeds.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, AllInstancesFailed<E>>
    where
        F: FnMut(Arc<B>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.call_where(|_| true, op).await
    }

    /// Like [`call`](Self::call) but skips members for which `eligible` is false.
    pub async fn call_where<T, E, P, F, Fut>(
        &self,
        eligible: P,
        mut op: F,
    ) -> Result<T, AllInstancesFailed<E>>
    where
        P: Fn(&B) -> bool,
        F: FnMut(Arc<B>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut failures = Vec::new();
        for (index, instance) in self.instances.iter().enumerate() {
            if !eligible(instance.as_ref()) {
                trace!(group = %self.label, instance = index, "instance not eligible; skipped");
                continue;
            }
            match op(Arc::clone(instance)).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        debug!(
                            group = %self.label,
                            instance = index,
                            failed = failures.len(),
                            "fallback instance succeeded"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    debug!(group = %self.label, instance = index, error = %err, "instance failed");
                    failures.push((index, err));
                }
            }
        }
        Err(AllInstancesFailed { failures })
    }
}

fn source_failure(err: AllInstancesFailed<SourceError>) -> SourceError {
    if err.failures.is_empty() {
        return SourceError::Unsupported("no eligible instance");
    }
    SourceError::AllInstancesFailed(err.failures)
}

#[async_trait]
impl ElementSource for FallbackGroup<dyn ElementSource> {
    fn name(&self) -> &str {
        &self.label
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.instances
            .iter()
            .fold(SourceCapabilities::default(), |acc, source| {
                acc.union(source.capabilities())
            })
    }

    async fn capture(&self) -> Result<DynamicImage, SourceError> {
        self.call_where(
            |source| source.capabilities().capture,
            |source: Arc<dyn ElementSource>| async move { source.capture().await },
        )
        .await
        .map_err(source_failure)
    }

    async fn page_source(&self) -> Result<String, SourceError> {
        self.call_where(
            |source| source.capabilities().page_source,
            |source: Arc<dyn ElementSource>| async move { source.page_source().await },
        )
        .await
        .map_err(source_failure)
    }

    async fn locate(&self, target: &Target, index: usize) -> Result<Option<LocateValue>, SourceError> {
        let classification = target.classification();
        let result = self
            .call_where(
                |source| source.capabilities().can_locate(classification),
                move |source: Arc<dyn ElementSource>| async move {
                    match source.locate(target, index).await {
                        Ok(Some(value)) => Ok(value),
                        Ok(None) => Err(SourceError::NotFound(target.raw().to_string())),
                        Err(err) => Err(err),
                    }
                },
            )
            .await
            .map_err(source_failure);
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The first member able to assert presence gives the verdict; a `false`
    /// answer is not retried so the caller's timeout stays bounded.
    async fn assert_presence(
        &self,
        targets: &[Target],
        timeout: Duration,
        rule: PresenceRule,
    ) -> Result<bool, SourceError> {
        self.call_where(
            |source| source.capabilities().presence,
            move |source: Arc<dyn ElementSource>| async move {
                source.assert_presence(targets, timeout, rule).await
            },
        )
        .await
        .map_err(source_failure)
    }
}

fn visual_failure(err: AllInstancesFailed<VisualError>) -> VisualError {
    VisualError::AllInstancesFailed(err.failures)
}

#[async_trait]
impl TextDetector for FallbackGroup<dyn TextDetector> {
    fn name(&self) -> &str {
        &self.label
    }

    async fn detect_text(&self, image: &DynamicImage) -> Result<Vec<TextBlock>, VisualError> {
        self.call(move |detector: Arc<dyn TextDetector>| async move {
            detector.detect_text(image).await
        })
        .await
        .map_err(visual_failure)
    }
}

#[async_trait]
impl TemplateMatcher for FallbackGroup<dyn TemplateMatcher> {
    fn name(&self) -> &str {
        &self.label
    }

    async fn find_template(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<TemplateMatch, VisualError> {
        let result = self
            .call(move |matcher: Arc<dyn TemplateMatcher>| async move {
                match matcher.find_template(image, template_id).await {
                    Ok(hit) if hit.found => Ok(hit),
                    Ok(_) => Err(VisualError::NoMatch(template_id.to_string())),
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(visual_failure);
        match result {
            Err(err) if err.is_no_match() => Ok(TemplateMatch::not_found()),
            other => other,
        }
    }

    async fn find_all(
        &self,
        image: &DynamicImage,
        template_id: &str,
    ) -> Result<Vec<TemplateMatch>, VisualError> {
        let result = self
            .call(move |matcher: Arc<dyn TemplateMatcher>| async move {
                match matcher.find_all(image, template_id).await {
                    Ok(hits) if hits.is_empty() => {
                        Err(VisualError::NoMatch(template_id.to_string()))
                    }
                    other => other,
                }
            })
            .await
            .map_err(visual_failure);
        match result {
            Err(err) if err.is_no_match() => Ok(Vec::new()),
            other => other,
        }
    }
}
