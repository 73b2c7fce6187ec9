//! Policy advisor CLI
//!
//! A command-line tool for managing policies, driving job lifecycles,
//! assigning batches and asking the planner about capacity.

mod client;
mod commands;
mod config;
mod output;

use advisor_lib::planner::Requirements;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{jobs, metric_map, parse_job, parse_metric, plan, policies, scheduler};
use config::Config;
use output::OutputFormat;

/// Policy advisor CLI
#[derive(Parser)]
#[command(name = "padv")]
#[command(author, version, about = "CLI for the policy advisor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via ADVISOR_API_URL env var)
    #[arg(long, env = "ADVISOR_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the policy catalog
    #[command(subcommand)]
    Policies(PolicyCommands),

    /// Inspect and drive job lifecycles
    #[command(subcommand)]
    Jobs(JobCommands),

    /// Assign a policy to a batch of jobs
    Assign {
        /// Jobs as job_id:workload[:tag,tag]
        #[arg(required = true, value_parser = parse_job)]
        jobs: Vec<advisor_lib::JobDescriptor>,

        /// Only consider policies targeting one of these workloads
        #[arg(long = "policy-tag")]
        policy_tags: Vec<String>,

        /// Telemetry window used for the profile (e.g. 15m)
        #[arg(long)]
        window: Option<String>,

        /// Score without recording scheduled jobs
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current workload profile
    Profile {
        /// Telemetry window (e.g. 15m, 1h)
        #[arg(long, default_value = "15m")]
        window: String,

        /// Number of top containers to show
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Skip the network ranking
        #[arg(long)]
        no_network: bool,
    },

    /// Ask the planner for reports, capacity checks and windows
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Show service health
    Health,

    /// Show or change CLI defaults
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List policies
    List,

    /// Show a policy
    Get {
        /// Policy ID
        id: String,
    },

    /// Create a policy
    Create {
        /// Display name
        name: String,

        /// Explicit ID (derived from the name if omitted)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        intent: Option<String>,

        /// Target workload (repeatable)
        #[arg(long = "workload")]
        workloads: Vec<String>,

        /// Guardrail such as cpu_pct<=80 (repeatable)
        #[arg(long = "guardrail")]
        guardrails: Vec<String>,

        /// Note (repeatable)
        #[arg(long = "note")]
        notes: Vec<String>,
    },

    /// Replace guardrails or notes of a policy
    Update {
        /// Policy ID
        id: String,

        /// New guardrail list (repeatable)
        #[arg(long = "guardrail")]
        guardrails: Vec<String>,

        /// New note list (repeatable)
        #[arg(long = "note")]
        notes: Vec<String>,
    },

    /// Record KPIs from a run of a policy
    Run {
        /// Policy ID
        id: String,

        /// KPI as name=value (repeatable)
        #[arg(long = "kpi", required = true, value_parser = parse_metric)]
        kpis: Vec<(String, f64)>,

        #[arg(long)]
        workload_label: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Verify a policy's guardrails against observed metrics
    Verify {
        /// Policy ID
        id: String,

        /// Observed metric as name=value (repeatable)
        #[arg(long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, f64)>,

        /// Threshold override as name=value (repeatable)
        #[arg(long = "override", value_parser = parse_metric)]
        overrides: Vec<(String, f64)>,
    },

    /// Search policies by text and tags
    Search {
        /// Free-text query
        query: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Restrict to policies targeting these workloads (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// List the most recent jobs
    List {
        /// Maximum number of jobs
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show a job
    Get {
        /// Job ID
        id: String,
    },

    /// Move a scheduled job to running
    Start {
        /// Job ID
        id: String,
    },

    /// Finish a running job
    Finish {
        /// Job ID
        id: String,

        /// Mark the job as failed
        #[arg(long)]
        failed: bool,

        /// Observed metric as name=value (repeatable)
        #[arg(long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, f64)>,

        #[arg(long)]
        notes: Option<String>,
    },
}

/// Resource needs shared by capacity commands
#[derive(Args)]
pub struct RequirementArgs {
    /// Required CPU headroom percent
    #[arg(long, default_value_t = 0.0)]
    cpu_pct: f64,

    /// Required free memory in bytes
    #[arg(long, default_value_t = 0.0)]
    mem_bytes: f64,

    /// Required free disk in bytes
    #[arg(long, default_value_t = 0.0)]
    disk_bytes: f64,

    /// Expected job duration
    #[arg(long, default_value = "45m")]
    duration: String,

    /// Only consider this instance
    #[arg(long)]
    host: Option<String>,
}

impl RequirementArgs {
    fn requirements(&self) -> Requirements {
        Requirements {
            cpu_pct: self.cpu_pct,
            mem_bytes: self.mem_bytes,
            disk_free_bytes: self.disk_bytes,
        }
    }
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Summarize cluster facts over a window
    Report {
        #[arg(long, default_value = "1h")]
        window: String,

        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Only rank containers on this instance
        #[arg(long)]
        instance: Option<String>,
    },

    /// Check whether a job fits right now
    CanRun(RequirementArgs),

    /// Suggest start windows for a job
    Suggest {
        #[command(flatten)]
        needs: RequirementArgs,

        /// How far ahead to look
        #[arg(long, default_value_t = 24)]
        horizon_hours: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Persist defaults to ~/.config/padv/config.json
    Set {
        #[arg(long)]
        api_url: Option<String>,

        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let api_url = config.api_url(cli.api_url);
    let format = config.format(cli.format)?;

    if let Commands::Config(command) = cli.command {
        return run_config(config, &api_url, format, command);
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Policies(command) => match command {
            PolicyCommands::List => policies::list_policies(&client, format).await?,
            PolicyCommands::Get { id } => policies::get_policy(&client, &id, format).await?,
            PolicyCommands::Create {
                name,
                id,
                description,
                intent,
                workloads,
                guardrails,
                notes,
            } => {
                let args = policies::CreateArgs {
                    name,
                    id,
                    description,
                    intent,
                    workloads,
                    guardrails,
                    notes,
                };
                policies::create_policy(&client, args, format).await?;
            }
            PolicyCommands::Update {
                id,
                guardrails,
                notes,
            } => {
                let guardrails = (!guardrails.is_empty()).then_some(guardrails);
                let notes = (!notes.is_empty()).then_some(notes);
                policies::update_policy(&client, &id, guardrails, notes, format).await?;
            }
            PolicyCommands::Run {
                id,
                kpis,
                workload_label,
                notes,
            } => {
                policies::record_run(&client, &id, metric_map(kpis), workload_label, notes, format)
                    .await?;
            }
            PolicyCommands::Verify {
                id,
                metrics,
                overrides,
            } => {
                policies::verify_policy(
                    &client,
                    &id,
                    metric_map(metrics),
                    metric_map(overrides),
                    format,
                )
                .await?;
            }
            PolicyCommands::Search { query, limit, tags } => {
                policies::search_policies(&client, query, limit, tags, format).await?;
            }
        },
        Commands::Jobs(command) => match command {
            JobCommands::List { limit } => jobs::list_jobs(&client, limit, format).await?,
            JobCommands::Get { id } => jobs::get_job(&client, &id, format).await?,
            JobCommands::Start { id } => jobs::start_job(&client, &id, format).await?,
            JobCommands::Finish {
                id,
                failed,
                metrics,
                notes,
            } => {
                jobs::finish_job(&client, &id, failed, metric_map(metrics), notes, format).await?;
            }
        },
        Commands::Assign {
            jobs,
            policy_tags,
            window,
            dry_run,
        } => {
            scheduler::assign(&client, jobs, policy_tags, window, dry_run, format).await?;
        }
        Commands::Profile {
            window,
            top_k,
            no_network,
        } => {
            scheduler::profile(&client, window, top_k, !no_network, format).await?;
        }
        Commands::Plan(command) => match command {
            PlanCommands::Report {
                window,
                top_k,
                instance,
            } => plan::report(&client, window, top_k, instance, format).await?,
            PlanCommands::CanRun(needs) => {
                let requirements = needs.requirements();
                plan::can_run(&client, requirements, needs.duration, needs.host, format).await?;
            }
            PlanCommands::Suggest {
                needs,
                horizon_hours,
            } => {
                let requirements = needs.requirements();
                plan::suggest_window(
                    &client,
                    requirements,
                    needs.duration,
                    horizon_hours,
                    needs.host,
                    format,
                )
                .await?;
            }
        },
        Commands::Health => scheduler::health(&client, format).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}

fn run_config(
    mut config: Config,
    api_url: &str,
    format: OutputFormat,
    command: ConfigCommands,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            output::print_info(&format!("Config file: {}", Config::config_path()?.display()));
            println!("api_url: {}", api_url);
            println!("format:  {:?}", format);
        }
        ConfigCommands::Set { api_url, format } => {
            if api_url.is_none() && format.is_none() {
                anyhow::bail!("Nothing to set: pass --api-url or --format");
            }
            if let Some(url) = api_url {
                url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid API URL: {}", e))?;
                config.api_url = Some(url);
            }
            if let Some(format) = format {
                config.default_format = Some(
                    match format {
                        OutputFormat::Table => "table",
                        OutputFormat::Json => "json",
                    }
                    .to_string(),
                );
            }
            let path = Config::config_path()?;
            config.save_to(&path)?;
            output::print_success(&format!("Saved {}", path.display()));
        }
    }
    Ok(())
}
