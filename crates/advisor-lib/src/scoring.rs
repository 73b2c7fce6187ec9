//! Policy scoring for job batches
//!
//! Each candidate policy starts from a base score, gains points for workload
//! overlap, run history and verification, and loses points for guardrails
//! the current cluster metrics breach. Candidates are ranked by final score;
//! ties keep the order the candidates were given in.

use crate::guardrail::Guardrail;
use crate::models::PolicyRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const BASE_SCORE: f64 = 1.0;
pub const OVERLAP_WEIGHT: f64 = 2.0;
pub const HISTORY_WEIGHT: f64 = 0.25;
/// Runs beyond this count earn no further history bonus
pub const HISTORY_CAP: usize = 5;
pub const VERIFIED_BONUS: f64 = 0.5;
pub const BREACH_PENALTY: f64 = 1.5;

/// Number of runner-up policies reported alongside the winner
pub const ALTERNATIVES: usize = 3;

/// Score breakdown for one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyScore {
    pub policy_id: String,
    pub name: String,
    pub score: f64,
    pub overlap: usize,
    pub history_bonus: f64,
    pub verified_bonus: f64,
    pub penalty: f64,
    /// Guardrail expressions the supplied metrics breach
    pub breached_guardrails: Vec<String>,
}

/// Winner plus ranked runners-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub best: PolicyScore,
    pub alternatives: Vec<PolicyScore>,
}

/// Score one policy against the batch's workload tags and cluster metrics
pub fn score_policy_for_batch(
    policy: &PolicyRecord,
    workload_tags: &BTreeSet<String>,
    metrics: &BTreeMap<String, f64>,
) -> PolicyScore {
    let targets: BTreeSet<&str> = policy.target_workloads.iter().map(String::as_str).collect();
    let overlap = workload_tags
        .iter()
        .filter(|tag| targets.contains(tag.as_str()))
        .count();

    let history_bonus = HISTORY_WEIGHT * policy.history.len().min(HISTORY_CAP) as f64;
    let verified_bonus = if policy.is_verified() { VERIFIED_BONUS } else { 0.0 };

    let breached_guardrails: Vec<String> = policy
        .guardrails
        .iter()
        .filter(|expr| Guardrail::parse(expr).breached_by(metrics) == Some(true))
        .cloned()
        .collect();
    let penalty = BREACH_PENALTY * breached_guardrails.len() as f64;

    let score = BASE_SCORE + OVERLAP_WEIGHT * overlap as f64 + history_bonus + verified_bonus
        - penalty;

    PolicyScore {
        policy_id: policy.id.clone(),
        name: policy.name.clone(),
        score,
        overlap,
        history_bonus,
        verified_bonus,
        penalty,
        breached_guardrails,
    }
}

/// Score every candidate, highest first. The sort is stable.
pub fn rank_policies(
    candidates: &[PolicyRecord],
    workload_tags: &BTreeSet<String>,
    metrics: &BTreeMap<String, f64>,
) -> Vec<PolicyScore> {
    let mut scored: Vec<PolicyScore> = candidates
        .iter()
        .map(|policy| score_policy_for_batch(policy, workload_tags, metrics))
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Pick the best policy and up to three alternatives; `None` without candidates
pub fn select_policy(
    candidates: &[PolicyRecord],
    workload_tags: &BTreeSet<String>,
    metrics: &BTreeMap<String, f64>,
) -> Option<Selection> {
    let mut ranked = rank_policies(candidates, workload_tags, metrics).into_iter();
    let best = ranked.next()?;
    Some(Selection {
        best,
        alternatives: ranked.take(ALTERNATIVES).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicyRun;
    use chrono::Utc;

    fn policy(id: &str, workloads: &[&str], guardrails: &[&str]) -> PolicyRecord {
        let mut record = PolicyRecord::new(id, format!("policy {id}"), Utc::now());
        record.target_workloads = workloads.iter().map(|s| s.to_string()).collect();
        record.guardrails = guardrails.iter().map(|s| s.to_string()).collect();
        record
    }

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn add_runs(record: &mut PolicyRecord, count: usize) {
        for _ in 0..count {
            record.history.push(PolicyRun {
                timestamp: Utc::now(),
                workload_label: None,
                kpis: BTreeMap::new(),
                notes: None,
            });
        }
    }

    #[test]
    fn test_single_overlap_no_penalty() {
        let p = policy("p1", &["web"], &["cpu_pct<=80"]);
        let score = score_policy_for_batch(&p, &tags(&["web"]), &metrics(&[("cpu_pct", 50.0)]));
        assert_eq!(score.overlap, 1);
        assert_eq!(score.penalty, 0.0);
        assert!((score.score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_is_case_sensitive() {
        let p = policy("p1", &["Web"], &[]);
        let score = score_policy_for_batch(&p, &tags(&["web"]), &BTreeMap::new());
        assert_eq!(score.overlap, 0);
        assert!((score.score - BASE_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_history_bonus_is_capped() {
        let mut p = policy("p1", &[], &[]);
        add_runs(&mut p, 3);
        let three = score_policy_for_batch(&p, &tags(&[]), &BTreeMap::new());
        assert!((three.history_bonus - 0.75).abs() < 1e-9);

        add_runs(&mut p, 10);
        let capped = score_policy_for_batch(&p, &tags(&[]), &BTreeMap::new());
        assert!((capped.history_bonus - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_verified_bonus() {
        let mut p = policy("p1", &[], &[]);
        p.last_verified_at = Some(Utc::now());
        let score = score_policy_for_batch(&p, &tags(&[]), &BTreeMap::new());
        assert!((score.score - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_penalty_counts_only_measured_breaches() {
        let p = policy(
            "p1",
            &["web"],
            &["cpu_pct<=80", "mem_used_pct<=70", "gpu_pct<=10", "nonsense", "load1<2"],
        );
        let m = metrics(&[("cpu_pct", 95.0), ("mem_used_pct", 60.0), ("load1", f64::NAN)]);
        let score = score_policy_for_batch(&p, &tags(&["web"]), &m);

        assert_eq!(
            score.breached_guardrails,
            vec!["cpu_pct<=80".to_string(), "load1<2".to_string()]
        );
        assert!((score.penalty - 3.0).abs() < 1e-9);
        assert!((score.score - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_overlap_and_breaches() {
        let m = metrics(&[("cpu_pct", 90.0)]);
        let batch = tags(&["a", "b", "c"]);

        let mut previous = f64::NEG_INFINITY;
        for workloads in [vec![], vec!["a"], vec!["a", "b"], vec!["a", "b", "c"]] {
            let p = policy("p", &workloads, &["cpu_pct<=80"]);
            let s = score_policy_for_batch(&p, &batch, &m).score;
            assert!(s >= previous);
            previous = s;
        }

        let mut previous = f64::INFINITY;
        let breaching = ["cpu_pct<=80", "cpu_pct<=70", "cpu_pct<60"];
        for n in 0..=breaching.len() {
            let p = policy("p", &["a"], &breaching[..n]);
            let s = score_policy_for_batch(&p, &batch, &m).score;
            assert!(s <= previous);
            previous = s;
        }
    }

    #[test]
    fn test_selection_ranks_and_keeps_enumeration_order_on_ties() {
        let candidates = vec![
            policy("tie-a", &["batch"], &[]),
            policy("winner", &["web", "api"], &[]),
            policy("tie-b", &["batch"], &[]),
            policy("low", &[], &["cpu_pct<=10"]),
            policy("lowest", &[], &["cpu_pct<=10", "cpu_pct<5"]),
        ];
        let selection = select_policy(
            &candidates,
            &tags(&["web", "api", "batch"]),
            &metrics(&[("cpu_pct", 50.0)]),
        )
        .unwrap();

        assert_eq!(selection.best.policy_id, "winner");
        let alt_ids: Vec<&str> = selection
            .alternatives
            .iter()
            .map(|s| s.policy_id.as_str())
            .collect();
        assert_eq!(alt_ids, vec!["tie-a", "tie-b", "low"]);
    }

    #[test]
    fn test_select_without_candidates() {
        assert!(select_policy(&[], &tags(&["web"]), &BTreeMap::new()).is_none());
    }
}
