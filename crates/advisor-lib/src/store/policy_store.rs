//! File-backed policy catalog with seeding and hybrid search

use super::persist::{read_document, write_atomic};
use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{PolicyRecord, PolicyRun};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Weight of the lexical token score in search results
pub const TOKEN_WEIGHT: f64 = 0.6;

/// Weight of the embedding cosine similarity in search results
pub const EMBEDDING_WEIGHT: f64 = 0.4;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    policies: Vec<PolicyRecord>,
}

/// Fields for a new policy record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPolicy {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub target_workloads: Vec<String>,
    #[serde(default)]
    pub guardrails: Vec<String>,
    #[serde(default)]
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub kpis: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Replacement values for policy metadata; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    #[serde(default)]
    pub guardrails: Option<Vec<String>>,
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
    #[serde(default)]
    pub notes: Option<Vec<String>>,
}

/// A search request against the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub query_embedding: Option<Vec<f64>>,
}

fn default_search_limit() -> usize {
    5
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: default_search_limit(),
            tags: Vec::new(),
            query_embedding: None,
        }
    }
}

/// A search hit with its component scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub policy: PolicyRecord,
    pub score: f64,
    pub token_score: f64,
    pub embedding_score: f64,
}

/// Durable policy catalog keyed by policy id
pub struct PolicyStore {
    path: PathBuf,
    policies: Mutex<BTreeMap<String, PolicyRecord>>,
}

impl PolicyStore {
    /// Open the store, then insert any seed policies whose id is not present
    pub fn open(path: impl Into<PathBuf>, seeds_path: Option<&Path>) -> AdvisorResult<Self> {
        let path = path.into();
        let document: PolicyDocument = read_document(&path)?.unwrap_or_default();

        let mut policies: BTreeMap<String, PolicyRecord> = document
            .policies
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        info!(path = %path.display(), policies = policies.len(), "Policy store loaded");

        if let Some(seeds_path) = seeds_path {
            match read_document::<PolicyDocument>(seeds_path)? {
                Some(seeds) => {
                    let mut inserted = 0;
                    for seed in seeds.policies {
                        if !policies.contains_key(&seed.id) {
                            policies.insert(seed.id.clone(), seed);
                            inserted += 1;
                        }
                    }
                    if inserted > 0 {
                        write_atomic(&path, &snapshot(&policies))?;
                        info!(seeds = %seeds_path.display(), inserted, "Seed policies added");
                    }
                }
                None => warn!(seeds = %seeds_path.display(), "Seed file not found, skipping"),
            }
        }

        Ok(Self {
            path,
            policies: Mutex::new(policies),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a policy, replacing any record with the same id
    pub async fn create(&self, id: impl Into<String>, new: NewPolicy) -> AdvisorResult<PolicyRecord> {
        let record = build_record(id.into(), new);

        let mut policies = self.policies.lock().await;
        self.commit(&mut policies, record.clone())?;

        debug!(policy_id = %record.id, "Policy created");
        Ok(record)
    }

    /// Insert a policy only if its id is not taken
    pub async fn insert_new(&self, id: impl Into<String>, new: NewPolicy) -> AdvisorResult<PolicyRecord> {
        let record = build_record(id.into(), new);

        let mut policies = self.policies.lock().await;
        if policies.contains_key(&record.id) {
            return Err(AdvisorError::PolicyExists(record.id));
        }
        self.commit(&mut policies, record.clone())?;

        debug!(policy_id = %record.id, "Policy created");
        Ok(record)
    }

    pub async fn get(&self, policy_id: &str) -> Option<PolicyRecord> {
        self.policies.lock().await.get(policy_id).cloned()
    }

    pub async fn contains(&self, policy_id: &str) -> bool {
        self.policies.lock().await.contains_key(policy_id)
    }

    /// All policies, ordered by id
    pub async fn list(&self) -> Vec<PolicyRecord> {
        self.policies.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.policies.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.policies.lock().await.is_empty()
    }

    /// Append a run to the policy's history and merge its KPIs
    pub async fn add_run(
        &self,
        policy_id: &str,
        workload_label: Option<String>,
        kpis: BTreeMap<String, f64>,
        notes: Option<String>,
    ) -> AdvisorResult<PolicyRecord> {
        self.mutate(policy_id, |record| {
            let now = Utc::now();
            for (key, value) in &kpis {
                record.kpis.insert(key.clone(), *value);
            }
            record.history.push(PolicyRun {
                timestamp: now,
                workload_label,
                kpis,
                notes,
            });
            record.updated_at = now;
        })
        .await
    }

    pub async fn update_metadata(
        &self,
        policy_id: &str,
        update: MetadataUpdate,
    ) -> AdvisorResult<PolicyRecord> {
        self.mutate(policy_id, |record| {
            if let Some(guardrails) = update.guardrails {
                record.guardrails = guardrails;
            }
            if let Some(embedding) = update.embedding {
                record.embedding = embedding;
            }
            if let Some(notes) = update.notes {
                record.notes = notes;
            }
            record.updated_at = Utc::now();
        })
        .await
    }

    /// Mark the policy verified now with the issued activation token
    pub async fn register_verification(
        &self,
        policy_id: &str,
        token: impl Into<String>,
    ) -> AdvisorResult<PolicyRecord> {
        let token = token.into();
        self.mutate(policy_id, |record| stamp_verification(record, token)).await
    }

    /// Run `accept` against the current record and register the verification
    /// only if it passes, all under one lock. `None` means nothing was written.
    pub async fn register_verification_if<F>(
        &self,
        policy_id: &str,
        token: impl Into<String>,
        accept: F,
    ) -> AdvisorResult<Option<PolicyRecord>>
    where
        F: FnOnce(&PolicyRecord) -> bool,
    {
        let mut policies = self.policies.lock().await;
        let mut record = policies
            .get(policy_id)
            .cloned()
            .ok_or_else(|| AdvisorError::PolicyNotFound(policy_id.to_string()))?;
        if !accept(&record) {
            return Ok(None);
        }
        stamp_verification(&mut record, token.into());
        self.commit(&mut policies, record.clone())?;
        Ok(Some(record))
    }

    /// Rank policies by a weighted mix of token overlap and embedding similarity
    pub async fn search(&self, query: &SearchQuery) -> Vec<SearchHit> {
        let tags: HashSet<String> = query.tags.iter().map(|t| t.to_lowercase()).collect();
        let query_tokens: HashSet<String> = query
            .query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut hits: Vec<SearchHit> = self
            .list()
            .await
            .into_iter()
            .filter(|record| tags.is_empty() || matches_any_tag(record, &tags))
            .map(|record| {
                let token_score = token_score(&query_tokens, &record);
                let embedding_score = query
                    .query_embedding
                    .as_deref()
                    .zip(record.embedding())
                    .map(|(q, r)| cosine_similarity(q, r))
                    .unwrap_or(0.0);
                SearchHit {
                    score: TOKEN_WEIGHT * token_score + EMBEDDING_WEIGHT * embedding_score,
                    token_score,
                    embedding_score,
                    policy: record,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit);
        hits
    }

    async fn mutate<F>(&self, policy_id: &str, apply: F) -> AdvisorResult<PolicyRecord>
    where
        F: FnOnce(&mut PolicyRecord),
    {
        let mut policies = self.policies.lock().await;
        let mut record = policies
            .get(policy_id)
            .cloned()
            .ok_or_else(|| AdvisorError::PolicyNotFound(policy_id.to_string()))?;
        apply(&mut record);
        self.commit(&mut policies, record.clone())?;
        Ok(record)
    }

    /// Persist `policies` with `record` in place, then swap the result in.
    /// A failed write leaves the map exactly as it was.
    fn commit(
        &self,
        policies: &mut BTreeMap<String, PolicyRecord>,
        record: PolicyRecord,
    ) -> AdvisorResult<()> {
        let mut staged = policies.clone();
        staged.insert(record.id.clone(), record);
        write_atomic(&self.path, &snapshot(&staged))?;
        *policies = staged;
        Ok(())
    }
}

fn stamp_verification(record: &mut PolicyRecord, token: String) {
    let now = Utc::now();
    record.last_verified_at = Some(now);
    record.last_activation_token = Some(token);
    record.updated_at = now;
}

fn build_record(id: String, new: NewPolicy) -> PolicyRecord {
    let mut record = PolicyRecord::new(id, new.name, Utc::now());
    record.description = new.description;
    record.intent = new.intent;
    record.target_workloads = new.target_workloads;
    record.guardrails = new.guardrails;
    record.embedding = new.embedding;
    record.kpis = new.kpis;
    record.notes = new.notes;
    record
}

fn snapshot(policies: &BTreeMap<String, PolicyRecord>) -> PolicyDocument {
    PolicyDocument {
        policies: policies.values().cloned().collect(),
    }
}

/// Case-insensitive intersection of target workloads with `tags_lower`
pub fn matches_any_tag(record: &PolicyRecord, tags_lower: &HashSet<String>) -> bool {
    record
        .target_workloads
        .iter()
        .any(|w| tags_lower.contains(&w.to_lowercase()))
}

fn token_score(query_tokens: &HashSet<String>, record: &PolicyRecord) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let workloads = record.target_workloads.join(" ");
    let guardrails = record.guardrails.join(" ");
    let text = [
        record.name.as_str(),
        record.description.as_str(),
        record.intent.as_str(),
        workloads.as_str(),
        guardrails.as_str(),
    ]
    .join(" ")
    .to_lowercase();

    let record_tokens: HashSet<&str> = text.split_whitespace().collect();
    let overlap = query_tokens
        .iter()
        .filter(|t| record_tokens.contains(t.as_str()))
        .count();
    overlap as f64 / query_tokens.len().max(1) as f64
}

/// Cosine similarity; 0.0 for mismatched lengths, zero-norm vectors or a
/// non-finite result
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        let similarity = dot / (norm_a * norm_b);
        if similarity.is_finite() {
            similarity
        } else {
            0.0
        }
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::persist::temp_path;
    use std::fs;
    use tempfile::TempDir;

    fn new_policy(name: &str, workloads: &[&str], guardrails: &[&str]) -> NewPolicy {
        NewPolicy {
            name: name.to_string(),
            description: format!("{name} policy"),
            intent: "keep latency low".to_string(),
            target_workloads: workloads.iter().map(|s| s.to_string()).collect(),
            guardrails: guardrails.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn open_store(dir: &TempDir) -> PolicyStore {
        PolicyStore::open(dir.path().join("policies.json"), None).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let created = store
            .create("p1", new_policy("latency", &["web"], &["cpu_pct<=80"]))
            .await
            .unwrap();
        assert_eq!(created.created_at, created.updated_at);

        let fetched = store.get("p1").await.unwrap();
        assert_eq!(fetched.name, "latency");
        assert_eq!(fetched.guardrails, vec!["cpu_pct<=80".to_string()]);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_insert_new_rejects_taken_id() {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::open(dir.path().join("policies.json"), None).unwrap();

        store.insert_new("p1", NewPolicy { name: "first".to_string(), ..NewPolicy::default() }).await.unwrap();
        let err = store
            .insert_new("p1", NewPolicy { name: "second".to_string(), ..NewPolicy::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::PolicyExists(id) if id == "p1"));
        assert_eq!(store.get("p1").await.unwrap().name, "first");
    }

    #[tokio::test]
    async fn test_add_run_merges_kpis_and_appends_history() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let created = store.create("p1", new_policy("latency", &["web"], &[])).await.unwrap();

        let first = BTreeMap::from([
            ("p99_latency_ms".to_string(), 50.0),
            ("throughput_rps".to_string(), 900.0),
        ]);
        store.add_run("p1", Some("web".to_string()), first, None).await.unwrap();

        let second = BTreeMap::from([("p99_latency_ms".to_string(), 41.0)]);
        let updated = store
            .add_run("p1", None, second, Some("tuned".to_string()))
            .await
            .unwrap();

        assert_eq!(updated.history.len(), 2);
        assert_eq!(updated.history[0].workload_label.as_deref(), Some("web"));
        assert_eq!(updated.history[1].notes.as_deref(), Some("tuned"));
        assert_eq!(updated.kpis["p99_latency_ms"], 41.0);
        assert_eq!(updated.kpis["throughput_rps"], 900.0);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_mutations_on_missing_policy_are_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let run = store.add_run("nope", None, BTreeMap::new(), None).await;
        assert!(matches!(run, Err(AdvisorError::PolicyNotFound(id)) if id == "nope"));

        let meta = store.update_metadata("nope", MetadataUpdate::default()).await;
        assert!(matches!(meta, Err(AdvisorError::PolicyNotFound(_))));

        let verify = store.register_verification("nope", "token").await;
        assert!(matches!(verify, Err(AdvisorError::PolicyNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_metadata_replaces_only_supplied_fields() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .create("p1", new_policy("latency", &["web"], &["cpu_pct<=80", "mem_used_pct<=75"]))
            .await
            .unwrap();

        let updated = store
            .update_metadata(
                "p1",
                MetadataUpdate {
                    guardrails: Some(vec!["cpu_pct<=70".to_string()]),
                    embedding: None,
                    notes: Some(vec!["tightened".to_string()]),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.guardrails, vec!["cpu_pct<=70".to_string()]);
        assert_eq!(updated.notes, vec!["tightened".to_string()]);
        assert!(updated.embedding.is_empty());
        assert_eq!(updated.target_workloads, vec!["web".to_string()]);
    }

    #[tokio::test]
    async fn test_register_verification() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.create("p1", new_policy("latency", &["web"], &[])).await.unwrap();

        let verified = store.register_verification("p1", "tok-123").await.unwrap();
        assert!(verified.last_verified_at.is_some());
        assert_eq!(verified.last_activation_token.as_deref(), Some("tok-123"));
        assert_eq!(verified.last_verified_at, Some(verified.updated_at));
    }

    #[tokio::test]
    async fn test_register_verification_if_checks_under_lock() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .create("p1", new_policy("latency", &["web"], &["cpu_pct<=80"]))
            .await
            .unwrap();

        let refused = store
            .register_verification_if("p1", "tok-1", |record| record.guardrails.is_empty())
            .await
            .unwrap();
        assert!(refused.is_none());
        assert!(store.get("p1").await.unwrap().last_activation_token.is_none());

        let accepted = store
            .register_verification_if("p1", "tok-2", |record| {
                record.guardrails == vec!["cpu_pct<=80".to_string()]
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.last_activation_token.as_deref(), Some("tok-2"));

        let missing = store.register_verification_if("nope", "tok", |_| true).await;
        assert!(matches!(missing, Err(AdvisorError::PolicyNotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_committed_policies_visible() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.create("p1", new_policy("latency", &["web"], &[])).await.unwrap();
        let before = store.get("p1").await.unwrap();

        // A directory at the temp path makes the next write fail
        fs::create_dir(temp_path(store.path())).unwrap();

        let verify = store.register_verification("p1", "tok").await;
        assert!(matches!(verify, Err(AdvisorError::Persistence { .. })));
        let run = store
            .add_run("p1", None, BTreeMap::from([("latency_ms".to_string(), 9.0)]), None)
            .await;
        assert!(run.is_err());
        let meta = store
            .update_metadata(
                "p1",
                MetadataUpdate {
                    guardrails: Some(vec!["cpu_pct<=10".to_string()]),
                    ..MetadataUpdate::default()
                },
            )
            .await;
        assert!(meta.is_err());
        assert!(store.insert_new("p2", new_policy("other", &[], &[])).await.is_err());
        assert!(store.create("p3", new_policy("third", &[], &[])).await.is_err());

        assert_eq!(store.get("p1").await.unwrap(), before);
        assert_eq!(store.len().await, 1);

        fs::remove_dir(temp_path(store.path())).unwrap();
        let reopened = open_store(&dir);
        assert_eq!(reopened.get("p1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            let mut policy = new_policy("batch", &["batch-mixed"], &["load1<4", "disk_used_pct<=85"]);
            policy.kpis.insert("throughput_jobs_per_min".to_string(), 90.0);
            store.create("p1", policy).await.unwrap();
            store
                .add_run("p1", None, BTreeMap::from([("throughput_jobs_per_min".to_string(), 95.0)]), None)
                .await
                .unwrap();
        }

        let reopened = open_store(&dir);
        let record = reopened.get("p1").await.unwrap();
        assert_eq!(record.id, "p1");
        assert_eq!(
            record.guardrails,
            vec!["load1<4".to_string(), "disk_used_pct<=85".to_string()]
        );
        assert_eq!(record.kpis["throughput_jobs_per_min"], 95.0);
        assert_eq!(record.history.len(), 1);
    }

    #[tokio::test]
    async fn test_seeding_inserts_only_missing_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policies.json");
        let seeds = dir.path().join("seeds.json");
        fs::write(
            &seeds,
            r#"{"policies": [
                {"id": "p1", "name": "seeded p1", "target_workloads": ["web"], "guardrails": ["cpu_pct<=80"]},
                {"id": "p2", "name": "seeded p2"}
            ]}"#,
        )
        .unwrap();

        {
            let store = PolicyStore::open(&path, None).unwrap();
            store.create("p1", new_policy("existing p1", &["web"], &[])).await.unwrap();
        }

        let store = PolicyStore::open(&path, Some(seeds.as_path())).unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("p1").await.unwrap().name, "existing p1");
        assert_eq!(store.get("p2").await.unwrap().name, "seeded p2");

        // Seeds were persisted with the store
        let reopened = PolicyStore::open(&path, None).unwrap();
        assert!(reopened.contains("p2").await);
    }

    #[tokio::test]
    async fn test_missing_seed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::open(
            dir.path().join("policies.json"),
            Some(dir.path().join("absent.json").as_path()),
        )
        .unwrap();
        assert!(store.is_empty().await);
        assert!(!dir.path().join("policies.json").exists());
    }

    #[tokio::test]
    async fn test_search_token_score_and_tag_filter() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.create("p1", new_policy("latency guard", &["Web"], &["cpu_pct<=80"])).await.unwrap();
        store.create("p2", new_policy("batch packer", &["batch"], &[])).await.unwrap();

        let hits = store
            .search(&SearchQuery {
                query: "Latency guard".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(hits[0].policy.id, "p1");
        assert!((hits[0].token_score - 1.0).abs() < 1e-9);
        assert!((hits[0].score - TOKEN_WEIGHT).abs() < 1e-9);

        let filtered = store
            .search(&SearchQuery {
                query: "latency".to_string(),
                tags: vec!["web".to_string()],
                ..Default::default()
            })
            .await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].policy.id, "p1");
    }

    #[tokio::test]
    async fn test_search_embedding_self_similarity() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut p1 = new_policy("one", &["web"], &[]);
        p1.embedding = vec![0.2, 0.4, 0.1];
        store.create("p1", p1).await.unwrap();

        let mut p2 = new_policy("two", &["web"], &[]);
        p2.embedding = vec![0.5, 0.5];
        store.create("p2", p2).await.unwrap();

        let hits = store
            .search(&SearchQuery {
                query_embedding: Some(vec![0.2, 0.4, 0.1]),
                ..Default::default()
            })
            .await;

        assert_eq!(hits[0].policy.id, "p1");
        assert!((hits[0].embedding_score - 1.0).abs() < 1e-9);
        assert!((hits[0].score - EMBEDDING_WEIGHT).abs() < 1e-9);
        // Length mismatch contributes nothing
        assert_eq!(hits[1].embedding_score, 0.0);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for i in 0..4 {
            store.create(format!("p{i}"), new_policy("web", &["web"], &[])).await.unwrap();
        }
        let hits = store
            .search(&SearchQuery {
                query: "web".to_string(),
                limit: 2,
                ..Default::default()
            })
            .await;
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_ranks_overflowing_embeddings_last() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut huge = new_policy("huge", &["web"], &[]);
        huge.embedding = vec![1e200, 1e200];
        store.create("a-huge", huge).await.unwrap();

        let mut plain = new_policy("plain", &["web"], &[]);
        plain.embedding = vec![1.0, 1.0];
        store.create("b-plain", plain).await.unwrap();

        let hits = store
            .search(&SearchQuery {
                query_embedding: Some(vec![1.0, 1.0]),
                ..Default::default()
            })
            .await;
        assert_eq!(hits[0].policy.id, "b-plain");
        assert!(hits.iter().all(|hit| hit.score.is_finite()));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1e200, 1e200], &[1e200, 1e200]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-12);
    }
}
