//! Batch assignment, profiling and service health commands

use advisor_lib::{
    AssignRequest, AssignmentOutcome, ContainerUsage, HealthResponse, JobDescriptor,
    PolicyScore, WorkloadProfile,
};
use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_score, color_status, print_info, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Policy")]
    policy: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Overlap")]
    overlap: usize,
    #[tabled(rename = "History")]
    history: String,
    #[tabled(rename = "Verified")]
    verified: String,
    #[tabled(rename = "Penalty")]
    penalty: String,
}

impl From<&PolicyScore> for ScoreRow {
    fn from(s: &PolicyScore) -> Self {
        Self {
            policy: s.policy_id.clone(),
            score: color_score(s.score),
            overlap: s.overlap,
            history: format!("{:.2}", s.history_bonus),
            verified: format!("{:.2}", s.verified_bonus),
            penalty: format!("{:.2}", s.penalty),
        }
    }
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    name: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Rate")]
    value: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Assign a policy to a batch of jobs
pub async fn assign(
    client: &ApiClient,
    jobs: Vec<JobDescriptor>,
    policy_tags: Vec<String>,
    window: Option<String>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut request = AssignRequest::new(jobs);
    request.policy_tags = policy_tags;
    request.record_assignments = !dry_run;
    if let Some(window) = window {
        request.profile_window = window;
    }

    let outcome: AssignmentOutcome = client.post("scheduler/assign", &request).await?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Selected {} ({}) with score {}",
                outcome.policy.id.cyan(),
                outcome.policy.name,
                color_score(outcome.score.score)
            ));
            if !outcome.score.breached_guardrails.is_empty() {
                print_warning(&format!(
                    "Breached guardrails: {}",
                    outcome.score.breached_guardrails.join(", ")
                ));
            }
            if outcome.recorded {
                println!("Recorded {} scheduled jobs", outcome.assignments.len());
            } else {
                print_info("Dry-run: assignments not recorded");
            }

            let rows: Vec<ScoreRow> = std::iter::once(&outcome.score)
                .chain(outcome.alternatives.iter())
                .map(ScoreRow::from)
                .collect();
            println!();
            print_rows(rows, "No scores");
        }
    }

    Ok(())
}

/// Show the current workload profile
pub async fn profile(
    client: &ApiClient,
    window: String,
    top_k: usize,
    include_network: bool,
    format: OutputFormat,
) -> Result<()> {
    let query = [
        ("window", window),
        ("top_k", top_k.to_string()),
        ("include_network", include_network.to_string()),
    ];
    let profile: WorkloadProfile = client.get_with_query("profile", &query).await?;

    match format {
        OutputFormat::Json => print_json(&profile)?,
        OutputFormat::Table => print_profile(&profile),
    }

    Ok(())
}

/// Show service health
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            let overall = serde_json::to_value(health.status)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            println!("Service: {}", color_status(&overall));

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| {
                    let status = serde_json::to_value(component.status)
                        .ok()
                        .and_then(|s| s.as_str().map(str::to_string))
                        .unwrap_or_default();
                    ComponentRow {
                        name: name.clone(),
                        status: color_status(&status),
                        message: component.message.clone().unwrap_or_default(),
                    }
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_rows(rows, "No components registered");
        }
    }

    Ok(())
}

fn print_profile(profile: &WorkloadProfile) {
    println!("{}", "Workload Profile".bold());
    println!("{}", "=".repeat(60));
    println!("Window:    {}", profile.window.cyan());
    println!("Generated: {}", profile.generated_at.format("%Y-%m-%d %H:%M:%S"));

    println!("\n{}", "Cluster".bold());
    if profile.cluster_metrics.is_empty() {
        print_warning("No cluster metrics available");
    }
    for (name, value) in &profile.cluster_metrics {
        println!("  {:<16} {:.2}", name, value);
    }

    if profile.contention.is_empty() {
        println!("\n{}", "No contention signals".green());
    } else {
        println!("\n{}", "Contention".bold());
        for signal in &profile.contention {
            println!(
                "  {} {} ({:.2} >= {})",
                "⚠".yellow(),
                signal.description,
                signal.observed,
                signal.threshold
            );
        }
    }

    println!("\n{}", "Top containers by CPU".bold());
    print_rows(container_rows(&profile.top_cpu_containers), "No container data");
    if !profile.top_network_containers.is_empty() {
        println!("\n{}", "Top containers by network".bold());
        print_rows(container_rows(&profile.top_network_containers), "No container data");
    }

    let history = &profile.job_history;
    println!("\n{}", "Job history".bold());
    println!("  Total runs: {}", history.total_runs);
    for (status, count) in &history.status_counts {
        println!("  {:<12} {}", color_status(status), count);
    }
    for usage in &history.policy_usage {
        println!(
            "  policy {} ({}) used {} times",
            usage.policy_id,
            usage.name.as_deref().unwrap_or("unknown"),
            usage.count
        );
    }
}

fn container_rows(containers: &[ContainerUsage]) -> Vec<ContainerRow> {
    containers
        .iter()
        .map(|c| ContainerRow {
            name: c.name.clone(),
            instance: c.instance.clone(),
            value: format!("{:.4}", c.value),
        })
        .collect()
}
