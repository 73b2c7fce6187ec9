//! Job lifecycle CLI commands

use advisor_lib::{FinishRequest, JobRun};
use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_success, truncate_id,
    OutputFormat,
};

/// Row for jobs table
#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Job")]
    job_id: String,
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Policy")]
    policy: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Submitted")]
    submitted: String,
    #[tabled(rename = "Finished")]
    finished: String,
}

impl From<&JobRun> for JobRow {
    fn from(job: &JobRun) -> Self {
        Self {
            job_id: truncate_id(&job.job_id),
            workload: job.workload.clone(),
            policy: job.policy_id.as_deref().map(truncate_id).unwrap_or_default(),
            status: color_status(&job.status),
            submitted: format_timestamp(&job.submitted_at),
            finished: job
                .finished_at
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_default(),
        }
    }
}

/// List the most recent jobs
pub async fn list_jobs(client: &ApiClient, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let query: Vec<(&str, String)> = limit
        .map(|l| vec![("limit", l.to_string())])
        .unwrap_or_default();
    let jobs: Vec<JobRun> = client.get_with_query("jobs", &query).await?;

    match format {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Table => {
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            print_rows(rows, "No jobs recorded");
        }
    }

    Ok(())
}

/// Show one job
pub async fn get_job(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let job: JobRun = client.get(&format!("jobs/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Table => print_job(&job),
    }

    Ok(())
}

/// Move a scheduled job to running
pub async fn start_job(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let job: JobRun = client.post_empty(&format!("jobs/{}/start", id)).await?;

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Table => print_success(&format!("Job {} is {}", job.job_id, color_status(&job.status))),
    }

    Ok(())
}

/// Close a job as succeeded or failed
pub async fn finish_job(
    client: &ApiClient,
    id: &str,
    failed: bool,
    metrics: BTreeMap<String, f64>,
    notes: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = FinishRequest {
        success: !failed,
        metrics,
        notes,
    };
    let job: JobRun = client.post(&format!("jobs/{}/finish", id), &request).await?;

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Table => print_success(&format!("Job {} {}", job.job_id, color_status(&job.status))),
    }

    Ok(())
}

fn print_job(job: &JobRun) {
    println!("{}", "Job".bold());
    println!("{}", "=".repeat(60));
    println!("ID:        {}", job.job_id.cyan());
    println!("Workload:  {}", job.workload);
    println!("Policy:    {}", job.policy_id.as_deref().unwrap_or("-"));
    println!("Status:    {}", color_status(&job.status));
    println!("Submitted: {}", format_timestamp(&job.submitted_at));
    if let Some(started) = &job.started_at {
        println!("Started:   {}", format_timestamp(started));
    }
    if let Some(finished) = &job.finished_at {
        println!("Finished:  {}", format_timestamp(finished));
    }
    if !job.tags.is_empty() {
        println!("Tags:      {}", job.tags.join(", "));
    }
    if let Some(notes) = &job.notes {
        println!("Notes:     {}", notes);
    }
    if !job.metrics.is_empty() {
        println!("\n{}", "Metrics".bold());
        for (name, value) in &job.metrics {
            println!("  {:<20} {}", name, value);
        }
    }
}
