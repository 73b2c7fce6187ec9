//! Guardrail expressions
//!
//! A guardrail is a string of the form `<metric><op><threshold>`, e.g.
//! `cpu_pct<=80`. Parsing never fails: malformed text becomes
//! [`Guardrail::Unparseable`] so callers branch on the outcome instead of
//! handling errors.
//!
//! Two consumers apply guardrails with different strictness:
//! - batch scoring counts only breaches of parseable guardrails whose metric
//!   was measured ([`Guardrail::breached_by`])
//! - activation verification reports every problem ([`evaluate_guardrails`])

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Comparison operator of a guardrail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Gt => ">",
        }
    }

    /// True if `actual` violates the bound. Non-finite values always do.
    pub fn is_breached(&self, actual: f64, threshold: f64) -> bool {
        if !actual.is_finite() {
            return true;
        }
        match self {
            Comparator::Le => actual > threshold,
            Comparator::Ge => actual < threshold,
            Comparator::Lt => actual >= threshold,
            Comparator::Gt => actual <= threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed guardrail expression
#[derive(Debug, Clone, PartialEq)]
pub enum Guardrail {
    Bound {
        metric: String,
        comparator: Comparator,
        threshold: f64,
    },
    Unparseable(String),
}

// Two-character operators first so `<=` is not read as `<` followed by `=80`
const OPERATORS: [(&str, Comparator); 4] = [
    ("<=", Comparator::Le),
    (">=", Comparator::Ge),
    ("<", Comparator::Lt),
    (">", Comparator::Gt),
];

impl Guardrail {
    pub fn parse(expression: &str) -> Self {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();

        for (symbol, comparator) in OPERATORS {
            let Some(pos) = compact.find(symbol) else {
                continue;
            };
            let metric = &compact[..pos];
            let value = &compact[pos + symbol.len()..];
            if metric.is_empty() || metric.contains(['<', '>', '=']) {
                break;
            }
            return match value.parse::<f64>() {
                Ok(threshold) if threshold.is_finite() => Guardrail::Bound {
                    metric: metric.to_string(),
                    comparator,
                    threshold,
                },
                _ => Guardrail::Unparseable(expression.to_string()),
            };
        }
        Guardrail::Unparseable(expression.to_string())
    }

    pub fn metric(&self) -> Option<&str> {
        match self {
            Guardrail::Bound { metric, .. } => Some(metric),
            Guardrail::Unparseable(_) => None,
        }
    }

    /// Scoring-time check: `Some(breached)` when the guardrail is parseable
    /// and its metric is in `metrics`, otherwise `None` (skipped).
    pub fn breached_by(&self, metrics: &BTreeMap<String, f64>) -> Option<bool> {
        match self {
            Guardrail::Bound {
                metric,
                comparator,
                threshold,
            } => metrics
                .get(metric)
                .map(|actual| comparator.is_breached(*actual, *threshold)),
            Guardrail::Unparseable(_) => None,
        }
    }
}

/// Why a guardrail failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    Unparseable,
    MetricMissing,
    Breached,
}

/// One failed guardrail, with whatever detail was available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub guardrail: String,
    pub reason: ViolationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Comparator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
    pub message: String,
}

/// Evaluate every guardrail against `metrics`, reporting all violations.
///
/// `overrides` replaces the threshold of guardrails on the named metric.
pub fn evaluate_guardrails(
    guardrails: &[String],
    metrics: &BTreeMap<String, f64>,
    overrides: &BTreeMap<String, f64>,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for expression in guardrails {
        let (metric, comparator, threshold) = match Guardrail::parse(expression) {
            Guardrail::Bound {
                metric,
                comparator,
                threshold,
            } => (metric, comparator, threshold),
            Guardrail::Unparseable(_) => {
                violations.push(Violation {
                    guardrail: expression.clone(),
                    reason: ViolationReason::Unparseable,
                    metric: None,
                    operator: None,
                    threshold: None,
                    actual: None,
                    message: format!("cannot parse guardrail '{expression}'"),
                });
                continue;
            }
        };

        let threshold = overrides.get(&metric).copied().unwrap_or(threshold);

        let Some(actual) = metrics.get(&metric).copied() else {
            violations.push(Violation {
                guardrail: expression.clone(),
                reason: ViolationReason::MetricMissing,
                message: format!("metric '{metric}' was not supplied"),
                metric: Some(metric),
                operator: Some(comparator),
                threshold: Some(threshold),
                actual: None,
            });
            continue;
        };

        if comparator.is_breached(actual, threshold) {
            violations.push(Violation {
                guardrail: expression.clone(),
                reason: ViolationReason::Breached,
                message: format!("{metric}={actual} violates {comparator} {threshold}"),
                metric: Some(metric),
                operator: Some(comparator),
                threshold: Some(threshold),
                actual: Some(actual),
            });
        }
    }

    violations
}

/// Verification result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Accepted,
    Rejected,
}

/// Result of verifying a policy for activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub policy_id: String,
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_token: Option<String>,
    pub violations: Vec<Violation>,
}

impl VerificationOutcome {
    pub fn is_accepted(&self) -> bool {
        self.status == VerificationStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_parse_all_operators() {
        let cases = [
            ("cpu_pct<=80", Comparator::Le, 80.0),
            ("mem_used_pct >= 10.5", Comparator::Ge, 10.5),
            ("load1<4", Comparator::Lt, 4.0),
            ("disk_used_pct>-1", Comparator::Gt, -1.0),
        ];
        for (expr, comparator, threshold) in cases {
            match Guardrail::parse(expr) {
                Guardrail::Bound {
                    comparator: c,
                    threshold: t,
                    ..
                } => {
                    assert_eq!(c, comparator, "{expr}");
                    assert_eq!(t, threshold, "{expr}");
                }
                other => panic!("{expr} parsed as {other:?}"),
            }
        }
        assert_eq!(Guardrail::parse("cpu_pct<=80").metric(), Some("cpu_pct"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for expr in ["", "cpu_pct", "<=80", "cpu_pct<=", "cpu_pct<=high", "cpu_pct==80", "a<=b<=3", "x<=NaN"] {
            assert!(
                matches!(Guardrail::parse(expr), Guardrail::Unparseable(_)),
                "{expr} should be unparseable"
            );
        }
    }

    #[test]
    fn test_le_boundary_is_inclusive() {
        let g = Guardrail::parse("cpu_pct<=80");
        assert_eq!(g.breached_by(&metrics(&[("cpu_pct", 85.0)])), Some(true));
        assert_eq!(g.breached_by(&metrics(&[("cpu_pct", 80.0)])), Some(false));
        assert_eq!(g.breached_by(&metrics(&[("cpu_pct", f64::NAN)])), Some(true));
    }

    #[test]
    fn test_breach_semantics_per_operator() {
        assert!(Comparator::Ge.is_breached(9.0, 10.0));
        assert!(!Comparator::Ge.is_breached(10.0, 10.0));
        assert!(Comparator::Lt.is_breached(10.0, 10.0));
        assert!(!Comparator::Lt.is_breached(9.9, 10.0));
        assert!(Comparator::Gt.is_breached(10.0, 10.0));
        assert!(!Comparator::Gt.is_breached(10.1, 10.0));
        for op in [Comparator::Le, Comparator::Ge, Comparator::Lt, Comparator::Gt] {
            assert!(op.is_breached(f64::NAN, 0.0));
            assert!(op.is_breached(f64::INFINITY, 0.0));
        }
    }

    #[test]
    fn test_scoring_skips_unknown_and_missing() {
        let m = metrics(&[("cpu_pct", 99.0)]);
        assert_eq!(Guardrail::parse("gpu_pct<=50").breached_by(&m), None);
        assert_eq!(Guardrail::parse("cpu_pct is low").breached_by(&m), None);
    }

    #[test]
    fn test_evaluate_reports_single_breach() {
        let violations = evaluate_guardrails(
            &["mem_used_pct<=80".to_string()],
            &metrics(&[("mem_used_pct", 90.0)]),
            &BTreeMap::new(),
        );
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.reason, ViolationReason::Breached);
        assert_eq!(v.actual, Some(90.0));
        assert_eq!(v.threshold, Some(80.0));
        assert_eq!(v.operator.map(|o| o.symbol()), Some("<="));
    }

    #[test]
    fn test_evaluate_reports_every_kind_of_violation() {
        let guardrails = vec![
            "cpu_pct<=80".to_string(),
            "gpu_pct<=50".to_string(),
            "garbage".to_string(),
            "load1<4".to_string(),
        ];
        let violations = evaluate_guardrails(
            &guardrails,
            &metrics(&[("cpu_pct", 70.0), ("load1", 6.0)]),
            &BTreeMap::new(),
        );
        let reasons: Vec<ViolationReason> = violations.iter().map(|v| v.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ViolationReason::MetricMissing,
                ViolationReason::Unparseable,
                ViolationReason::Breached
            ]
        );
    }

    #[test]
    fn test_overrides_replace_threshold() {
        let guardrails = vec!["cpu_pct<=80".to_string()];
        let m = metrics(&[("cpu_pct", 85.0)]);

        assert_eq!(evaluate_guardrails(&guardrails, &m, &BTreeMap::new()).len(), 1);
        let relaxed = metrics(&[("cpu_pct", 90.0)]);
        assert!(evaluate_guardrails(&guardrails, &m, &relaxed).is_empty());
    }

    #[test]
    fn test_operator_serializes_as_symbol() {
        assert_eq!(serde_json::to_string(&Comparator::Le).unwrap(), "\"<=\"");
        assert_eq!(Comparator::Gt.to_string(), ">");
    }
}
