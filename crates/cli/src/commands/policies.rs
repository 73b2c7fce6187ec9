//! Policy catalog CLI commands

use advisor_lib::{
    MetadataUpdate, NewPolicy, PolicyRecord, PolicyRunRequest, SearchHit, SearchQuery,
    VerificationOutcome, VerifyRequest,
};
use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_info, print_json, print_rows, print_success,
    print_warning, truncate_id, OutputFormat,
};

/// Row for policies table
#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Workloads")]
    workloads: String,
    #[tabled(rename = "Guardrails")]
    guardrails: usize,
    #[tabled(rename = "Runs")]
    runs: usize,
    #[tabled(rename = "Verified")]
    verified: String,
}

impl From<&PolicyRecord> for PolicyRow {
    fn from(p: &PolicyRecord) -> Self {
        Self {
            id: truncate_id(&p.id),
            name: p.name.clone(),
            workloads: p.target_workloads.join(", "),
            guardrails: p.guardrails.len(),
            runs: p.history.len(),
            verified: p
                .last_verified_at
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_default(),
        }
    }
}

/// Row for search results table
#[derive(Tabled)]
struct SearchRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Tokens")]
    token_score: String,
    #[tabled(rename = "Embedding")]
    embedding_score: String,
}

/// Row for verification violations table
#[derive(Tabled)]
struct ViolationRow {
    #[tabled(rename = "Guardrail")]
    guardrail: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Detail")]
    message: String,
}

/// Fields accepted by `padv policies create`
pub struct CreateArgs {
    pub name: String,
    pub id: Option<String>,
    pub description: Option<String>,
    pub intent: Option<String>,
    pub workloads: Vec<String>,
    pub guardrails: Vec<String>,
    pub notes: Vec<String>,
}

/// List all policies
pub async fn list_policies(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let policies: Vec<PolicyRecord> = client.get("policies").await?;

    match format {
        OutputFormat::Json => print_json(&policies)?,
        OutputFormat::Table => {
            let rows: Vec<PolicyRow> = policies.iter().map(PolicyRow::from).collect();
            print_rows(rows, "No policies found");
            if !policies.is_empty() {
                println!("\nTotal: {} policies", policies.len());
            }
        }
    }

    Ok(())
}

/// Show one policy in detail
pub async fn get_policy(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let policy: PolicyRecord = client.get(&format!("policies/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&policy)?,
        OutputFormat::Table => print_policy(&policy),
    }

    Ok(())
}

/// Create a policy
pub async fn create_policy(client: &ApiClient, args: CreateArgs, format: OutputFormat) -> Result<()> {
    let request = NewPolicy {
        id: args.id,
        name: args.name,
        description: args.description.unwrap_or_default(),
        intent: args.intent.unwrap_or_default(),
        target_workloads: args.workloads,
        guardrails: args.guardrails,
        notes: args.notes,
        ..NewPolicy::default()
    };

    let policy: PolicyRecord = client.post("policies", &request).await?;

    match format {
        OutputFormat::Json => print_json(&policy)?,
        OutputFormat::Table => print_success(&format!("Policy {} created", policy.id.cyan())),
    }

    Ok(())
}

/// Replace guardrails or notes of a policy
pub async fn update_policy(
    client: &ApiClient,
    id: &str,
    guardrails: Option<Vec<String>>,
    notes: Option<Vec<String>>,
    format: OutputFormat,
) -> Result<()> {
    if guardrails.is_none() && notes.is_none() {
        anyhow::bail!("Nothing to update: pass --guardrail or --note");
    }
    let update = MetadataUpdate {
        guardrails,
        embedding: None,
        notes,
    };

    let policy: PolicyRecord = client.patch(&format!("policies/{}", id), &update).await?;

    match format {
        OutputFormat::Json => print_json(&policy)?,
        OutputFormat::Table => {
            print_success(&format!("Policy {} updated", policy.id));
            print_policy(&policy);
        }
    }

    Ok(())
}

/// Record KPIs from a run of a policy
pub async fn record_run(
    client: &ApiClient,
    id: &str,
    kpis: BTreeMap<String, f64>,
    workload_label: Option<String>,
    notes: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = PolicyRunRequest {
        workload_label,
        kpis,
        notes,
    };

    let policy: PolicyRecord = client.post(&format!("policies/{}/runs", id), &request).await?;

    match format {
        OutputFormat::Json => print_json(&policy)?,
        OutputFormat::Table => print_success(&format!(
            "Run recorded for {} ({} runs total)",
            policy.id,
            policy.history.len()
        )),
    }

    Ok(())
}

/// Verify a policy's guardrails against supplied metrics
pub async fn verify_policy(
    client: &ApiClient,
    id: &str,
    metrics: BTreeMap<String, f64>,
    overrides: BTreeMap<String, f64>,
    format: OutputFormat,
) -> Result<()> {
    let request = VerifyRequest { metrics, overrides };
    let outcome: VerificationOutcome = client
        .post(&format!("policies/{}/verify", id), &request)
        .await?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => {
            let status = if outcome.is_accepted() { "accepted" } else { "rejected" };
            println!("Policy {}: {}", outcome.policy_id.cyan(), color_status(status));
            if let Some(token) = &outcome.activation_token {
                print_success(&format!("Activation token: {}", token));
            }
            if !outcome.violations.is_empty() {
                let rows: Vec<ViolationRow> = outcome
                    .violations
                    .iter()
                    .map(|v| ViolationRow {
                        guardrail: v.guardrail.clone(),
                        reason: serde_json::to_value(v.reason)
                            .ok()
                            .and_then(|r| r.as_str().map(str::to_string))
                            .unwrap_or_default(),
                        message: v.message.clone(),
                    })
                    .collect();
                print_rows(rows, "No violations");
            }
        }
    }

    Ok(())
}

/// Search the catalog by text, tags and optional embedding
pub async fn search_policies(
    client: &ApiClient,
    query: String,
    limit: usize,
    tags: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = SearchQuery {
        query,
        limit,
        tags,
        query_embedding: None,
    };
    let hits: Vec<SearchHit> = client.post("policies/search", &request).await?;

    match format {
        OutputFormat::Json => print_json(&hits)?,
        OutputFormat::Table => {
            let rows: Vec<SearchRow> = hits
                .iter()
                .map(|h| SearchRow {
                    id: truncate_id(&h.policy.id),
                    name: h.policy.name.clone(),
                    score: format!("{:.3}", h.score),
                    token_score: format!("{:.3}", h.token_score),
                    embedding_score: format!("{:.3}", h.embedding_score),
                })
                .collect();
            print_rows(rows, "No matching policies");
        }
    }

    Ok(())
}

fn print_policy(policy: &PolicyRecord) {
    println!("{}", "Policy".bold());
    println!("{}", "=".repeat(60));
    println!("ID:          {}", policy.id.cyan());
    println!("Name:        {}", policy.name);
    if !policy.description.is_empty() {
        println!("Description: {}", policy.description);
    }
    if !policy.intent.is_empty() {
        println!("Intent:      {}", policy.intent);
    }
    println!("Workloads:   {}", policy.target_workloads.join(", "));
    println!("Created:     {}", format_timestamp(&policy.created_at));
    println!("Updated:     {}", format_timestamp(&policy.updated_at));
    match &policy.last_verified_at {
        Some(at) => println!("Verified:    {}", format_timestamp(at)),
        None => print_info("Not verified"),
    }

    println!("\n{}", "Guardrails".bold());
    if policy.guardrails.is_empty() {
        print_warning("No guardrails");
    }
    for guardrail in &policy.guardrails {
        println!("  - {}", guardrail);
    }

    if !policy.kpis.is_empty() {
        println!("\n{}", "KPIs".bold());
        for (name, value) in &policy.kpis {
            println!("  {:<20} {}", name, value);
        }
    }

    if !policy.notes.is_empty() {
        println!("\n{}", "Notes".bold());
        for note in &policy.notes {
            println!("  - {}", note);
        }
    }

    println!("\nRuns recorded: {}", policy.history.len());
}
