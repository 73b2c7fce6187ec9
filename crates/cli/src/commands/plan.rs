//! Planner CLI commands: reports, capacity checks and window suggestions

use advisor_lib::planner::{
    CapacityRequest, ReportFilters, ReportRequest, Requirements, SuggestWindowRequest,
};
use advisor_lib::{PlanRequest, PlanResponse};
use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_bytes, format_optional, print_json, print_rows, print_warning, OutputFormat};

#[derive(Tabled)]
struct CapacityRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Can Run")]
    can_run: String,
    #[tabled(rename = "CPU Free")]
    cpu: String,
    #[tabled(rename = "Mem Free")]
    mem: String,
    #[tabled(rename = "Disk Free")]
    disk: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Produce a fact report for a window
pub async fn report(
    client: &ApiClient,
    window: String,
    top_k: usize,
    instance: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = PlanRequest::Report(ReportRequest {
        window,
        top_k,
        filters: ReportFilters { instance },
    });
    execute(client, &request, format).await
}

/// Check which instances can take a job right now
pub async fn can_run(
    client: &ApiClient,
    requirements: Requirements,
    duration: String,
    host: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = PlanRequest::CanRun(CapacityRequest {
        requirements,
        duration,
        host,
    });
    execute(client, &request, format).await
}

/// Suggest start windows within a horizon
pub async fn suggest_window(
    client: &ApiClient,
    requirements: Requirements,
    duration: String,
    horizon_hours: u32,
    host: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = PlanRequest::SuggestWindow(SuggestWindowRequest {
        requirements,
        duration,
        horizon_hours,
        host,
    });
    execute(client, &request, format).await
}

async fn execute(client: &ApiClient, request: &PlanRequest, format: OutputFormat) -> Result<()> {
    let response: PlanResponse = client.post("plan/execute", request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_response(&response),
    }

    Ok(())
}

fn print_response(response: &PlanResponse) {
    match response {
        PlanResponse::Report(report) => {
            println!("{} ({})", "Report".bold(), report.window.cyan());
            println!("{}", "=".repeat(60));
            for fact in &report.facts {
                println!("  • {}", fact);
            }
        }
        PlanResponse::CanRun { results } => {
            let rows: Vec<CapacityRow> = results
                .iter()
                .map(|r| CapacityRow {
                    instance: r.instance.clone(),
                    can_run: if r.can_run_now {
                        "yes".green().to_string()
                    } else {
                        "no".red().to_string()
                    },
                    cpu: format_optional(r.headroom_now.cpu_pct, |v| format!("{:.1}%", v)),
                    mem: format_optional(r.headroom_now.mem_bytes, |v| format_bytes(v as u64)),
                    disk: format_optional(r.headroom_now.disk_free_bytes, |v| {
                        format_bytes(v as u64)
                    }),
                    reasons: r.reasons.join("; "),
                })
                .collect();
            print_rows(rows, "No instances reported telemetry");
        }
        PlanResponse::SuggestWindow { results } => {
            let rows: Vec<WindowRow> = results
                .iter()
                .flat_map(|instance| {
                    instance.windows.iter().map(|w| WindowRow {
                        instance: instance.instance.clone(),
                        start: w.start.clone(),
                        duration: w.duration.clone(),
                        reason: w.reason.clone(),
                    })
                })
                .collect();
            print_rows(rows, "No windows found within the horizon");
        }
        PlanResponse::Clarify { message } => print_warning(message),
    }
}
