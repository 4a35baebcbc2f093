use action_locator::{CandidateSet, Combination, ParameterFallback};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use super::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    /// Required parameter as name=v1,v2,...; repeat for more parameters
    #[arg(short, long = "param", value_name = "NAME=VALUES", value_parser = parse_param)]
    pub params: Vec<ParamSpec>,

    /// Optional parameter, dropped when its list is empty
    #[arg(long = "optional", value_name = "NAME=VALUES", value_parser = parse_param)]
    pub optional: Vec<ParamSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub values: Vec<Value>,
}

/// Values are read as JSON scalars when possible, else as plain strings
pub fn parse_param(raw: &str) -> Result<ParamSpec, String> {
    let (name, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUES, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }

    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| serde_json::from_str(v).unwrap_or_else(|_| Value::String(v.to_string())))
        .collect();

    Ok(ParamSpec {
        name: name.to_string(),
        values,
    })
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub total: usize,
    pub combinations: Vec<Combination>,
}

pub fn build_fallback(args: &PlanArgs) -> ParameterFallback {
    let fallback = args.params.iter().fold(ParameterFallback::new(), |acc, spec| {
        acc.required(spec.name.clone(), CandidateSet::many(spec.values.clone()))
    });
    args.optional.iter().fold(fallback, |acc, spec| {
        acc.optional(spec.name.clone(), CandidateSet::many(spec.values.clone()))
    })
}

pub fn cmd_plan(args: PlanArgs, output: OutputFormat) -> Result<()> {
    let plan = build_fallback(&args)
        .plan()
        .context("Cannot build parameter combinations")?;
    let report = PlanReport {
        total: plan.len(),
        combinations: plan.iter().collect(),
    };

    output.emit(&report, |report| {
        println!("Combinations: {}", report.total);
        for (idx, combination) in report.combinations.iter().enumerate() {
            println!("  {:>3}. {}", idx + 1, combination);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mixed_values() {
        let spec = parse_param("index=0, 2,submit").unwrap();
        assert_eq!(spec.name, "index");
        assert_eq!(spec.values, vec![json!(0), json!(2), json!("submit")]);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(parse_param("target").is_err());
        assert!(parse_param("=a,b").is_err());
    }

    #[test]
    fn builds_lexicographic_plan() {
        let args = PlanArgs {
            params: vec![
                parse_param("target=a,b,c").unwrap(),
                parse_param("index=0,1").unwrap(),
            ],
            optional: vec![parse_param("aoi=").unwrap()],
        };
        let plan = build_fallback(&args).plan().unwrap();
        assert_eq!(plan.len(), 6);
        let rendered: Vec<String> = plan.iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered[0], r#"{target="a", index=0}"#);
        assert_eq!(rendered[5], r#"{target="c", index=1}"#);
    }

    #[test]
    fn empty_required_list_is_an_error() {
        let args = PlanArgs {
            params: vec![parse_param("target=").unwrap()],
            optional: Vec::new(),
        };
        assert!(build_fallback(&args).plan().is_err());
    }
}
