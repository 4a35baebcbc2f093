//! Parameter-level fallback
//!
//! Each parameter of an operation may carry an ordered list of candidate
//! values. The operation is retried with every combination, the first
//! parameter varying slowest, until one call succeeds.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// Ordered candidate values of one parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet(Vec<Value>);

impl CandidateSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn one(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn many<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// `null` is no candidate, an array is a list, anything else is a single value
impl From<Value> for CandidateSet {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::empty(),
            Value::Array(values) => Self(values),
            scalar => Self(vec![scalar]),
        }
    }
}

/// One concrete value per parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Combination {
    entries: Vec<(String, Value)>,
}

impl Combination {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Deserialize a parameter into `T`; `None` if absent or mistyped
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get(name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        f.write_str("}")
    }
}

/// A required parameter was given no candidates
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("parameter '{parameter}' has an empty fallback list")]
pub struct EmptyFallbackList {
    pub parameter: String,
}

/// Parameter fallback failure
#[derive(Debug, Error)]
pub enum ParamFallbackError<E: fmt::Debug + fmt::Display> {
    #[error("parameter '{parameter}' has an empty fallback list")]
    EmptyFallbackList { parameter: String },

    #[error("all {} parameter combination(s) failed; last error: {}", .attempts.len(), last_error(.attempts))]
    AllCombinationsFailed { attempts: Vec<(Combination, E)> },
}

fn last_error<E: fmt::Display>(attempts: &[(Combination, E)]) -> String {
    attempts
        .last()
        .map(|(_, err)| err.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl<E: fmt::Debug + fmt::Display> From<EmptyFallbackList> for ParamFallbackError<E> {
    fn from(err: EmptyFallbackList) -> Self {
        ParamFallbackError::EmptyFallbackList {
            parameter: err.parameter,
        }
    }
}

/// Lexicographic product of the declared candidate lists
#[derive(Debug, Clone)]
pub struct CombinationPlan {
    names: Vec<String>,
    sets: Vec<Vec<Value>>,
}

impl CombinationPlan {
    pub fn len(&self) -> usize {
        self.sets.iter().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Combinations<'_> {
        Combinations {
            plan: self,
            cursor: Some(vec![0; self.sets.len()]),
        }
    }
}

/// Iterator over a [`CombinationPlan`]; the last parameter varies fastest
pub struct Combinations<'a> {
    plan: &'a CombinationPlan,
    cursor: Option<Vec<usize>>,
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let cursor = self.cursor.as_mut()?;
        let entries = cursor
            .iter()
            .enumerate()
            .map(|(param, choice)| (self.plan.names[param].clone(), self.plan.sets[param][*choice].clone()))
            .collect();

        let mut advanced = false;
        for param in (0..cursor.len()).rev() {
            cursor[param] += 1;
            if cursor[param] < self.plan.sets[param].len() {
                advanced = true;
                break;
            }
            cursor[param] = 0;
        }
        if !advanced {
            self.cursor = None;
        }
        Some(Combination { entries })
    }
}

#[derive(Debug, Clone)]
struct FallbackParam {
    name: String,
    candidates: CandidateSet,
    required: bool,
}

/// Builder for parameter-level fallback
#[derive(Debug, Clone, Default)]
pub struct ParameterFallback {
    params: Vec<FallbackParam>,
}

impl ParameterFallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter that must have at least one candidate
    pub fn required(self, name: impl Into<String>, candidates: impl Into<CandidateSet>) -> Self {
        self.declare(name.into(), candidates.into(), true)
    }

    /// Declare a parameter that is left out when it has no candidates
    pub fn optional(self, name: impl Into<String>, candidates: impl Into<CandidateSet>) -> Self {
        self.declare(name.into(), candidates.into(), false)
    }

    fn declare(mut self, name: String, candidates: CandidateSet, required: bool) -> Self {
        let param = FallbackParam {
            name,
            candidates,
            required,
        };
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        self
    }

    pub fn plan(&self) -> Result<CombinationPlan, EmptyFallbackList> {
        let mut names = Vec::new();
        let mut sets = Vec::new();
        for param in &self.params {
            if param.candidates.is_empty() {
                if param.required {
                    return Err(EmptyFallbackList {
                        parameter: param.name.clone(),
                    });
                }
                continue;
            }
            names.push(param.name.clone());
            sets.push(param.candidates.values().to_vec());
        }
        Ok(CombinationPlan { names, sets })
    }

    /// Invoke `op` with each combination until one succeeds.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, ParamFallbackError<E>>
    where
        F: FnMut(Combination) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug + fmt::Display,
    {
        let plan = self.plan()?;
        let total = plan.len();
        let mut attempts = Vec::new();
        for combination in plan.iter() {
            match op(combination.clone()).await {
                Ok(value) => {
                    if !attempts.is_empty() {
                        debug!(
                            combination = %combination,
                            failed = attempts.len(),
                            total,
                            "parameter fallback succeeded"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    debug!(combination = %combination, error = %err, "parameter combination failed");
                    attempts.push((combination, err));
                }
            }
        }
        Err(ParamFallbackError::AllCombinationsFailed { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_sets_from_json() {
        assert_eq!(CandidateSet::from(json!(null)).len(), 0);
        assert_eq!(CandidateSet::from(json!("a")).values(), &[json!("a")]);
        assert_eq!(CandidateSet::from(json!([1, 2, 3])).len(), 3);
    }

    #[test]
    fn product_is_lexicographic_first_slowest() {
        let fallback = ParameterFallback::new()
            .required("target", CandidateSet::many(["a", "b", "c"]))
            .required("index", CandidateSet::many([0, 1]));
        let plan = fallback.plan().unwrap();
        assert_eq!(plan.len(), 6);
        let order: Vec<String> = plan.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "{target=\"a\", index=0}",
                "{target=\"a\", index=1}",
                "{target=\"b\", index=0}",
                "{target=\"b\", index=1}",
                "{target=\"c\", index=0}",
                "{target=\"c\", index=1}",
            ]
        );
    }

    #[test]
    fn zero_parameters_yield_one_empty_combination() {
        let plan = ParameterFallback::new().plan().unwrap();
        let all: Vec<Combination> = plan.iter().collect();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_empty());
    }

    #[test]
    fn absent_optional_is_omitted_and_empty_required_is_rejected() {
        let plan = ParameterFallback::new()
            .required("target", CandidateSet::one("Login"))
            .optional("area", json!(null))
            .plan()
            .unwrap();
        let only: Vec<Combination> = plan.iter().collect();
        assert_eq!(only.len(), 1);
        assert!(only[0].get("area").is_none());

        let err = ParameterFallback::new()
            .required("target", CandidateSet::empty())
            .plan()
            .unwrap_err();
        assert_eq!(err.parameter, "target");
    }

    #[tokio::test]
    async fn execute_returns_first_success() {
        let fallback = ParameterFallback::new()
            .required("target", CandidateSet::many(["a", "b", "c"]))
            .required("index", CandidateSet::many([0, 1]));
        let mut seen = Vec::new();
        let result = fallback
            .execute(|combo| {
                seen.push(combo.to_string());
                let hit = combo.get_str("target") == Some("b") && combo.get_as::<u32>("index") == Some(1);
                async move {
                    if hit {
                        Ok("clicked")
                    } else {
                        Err("nope".to_string())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "clicked");
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn all_failures_are_reported_per_combination() {
        let fallback = ParameterFallback::new()
            .required("target", CandidateSet::many(["a", "b", "c"]))
            .required("index", CandidateSet::many([0, 1]));
        let err = fallback
            .execute(|combo| async move { Err::<(), _>(format!("failed {}", combo)) })
            .await
            .unwrap_err();
        match err {
            ParamFallbackError::AllCombinationsFailed { attempts } => {
                assert_eq!(attempts.len(), 6);
                assert_eq!(attempts[5].0.get_str("target"), Some("c"));
                assert!(attempts[5].1.ends_with("index=1}"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn empty_required_list_fails_before_any_call() {
        let fallback = ParameterFallback::new().required("target", CandidateSet::empty());
        let mut calls = 0;
        let err = fallback
            .execute(|_| {
                calls += 1;
                async { Ok::<(), String>(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ParamFallbackError::EmptyFallbackList { .. }));
        assert_eq!(calls, 0);
    }
}
