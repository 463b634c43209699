//! cadence - time-based job scheduler.
//!
//! Usage:
//!   cadence validate <config>                   Validate a configuration file
//!   cadence list <config> [--json]              List the jobs it schedules
//!   cadence fire-times <config> [--from] [--to] Print upcoming fire times per job
//!   cadence run <config>                        Run the scheduler until Ctrl+C

use cadence::{
    EventBus, EventHandler, InMemoryTriggerStore, JobRequestBuilder, Scheduler, SchedulerConfig,
    YamlLoader,
};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// cadence - time-based job scheduler
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and build every trigger
    Validate {
        /// Path to the scheduler YAML file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Schedule every job and list them
    List {
        /// Path to the scheduler YAML file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the fire times of every job in a range
    FireTimes {
        /// Path to the scheduler YAML file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Start of the range, RFC 3339 (default: now)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// End of the range, RFC 3339 (default: seven days after the start)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },

    /// Run the scheduler, logging every fired trigger
    Run {
        /// Path to the scheduler YAML file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Tick interval in seconds (default: 1)
        #[arg(long, default_value = "1")]
        tick_interval: u64,
    },
}

/// Simple logging event handler that prints job events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &cadence::Event) {
        match event {
            cadence::Event::JobScheduled {
                key,
                first_fire_time,
                ..
            } => match first_fire_time {
                Some(t) => info!("Job '{}' scheduled, first fire at {}", key, t),
                None => warn!("Job '{}' scheduled but will never fire", key),
            },
            cadence::Event::TriggerFired {
                key,
                fire_time,
                payload,
                ..
            } => {
                info!(
                    "Job '{}' fired for {} (subject: {}, {} parameter(s))",
                    key,
                    fire_time,
                    payload.subject,
                    payload.parameters.len()
                );
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            validate(config)?;
        }
        Commands::List { config, json } => {
            list_jobs(config, json).await?;
        }
        Commands::FireTimes { config, from, to } => {
            print_fire_times(config, from, to).await?;
        }
        Commands::Run {
            config,
            tick_interval,
        } => {
            run_scheduler(config, tick_interval).await?;
        }
    }

    Ok(())
}

/// Build a scheduler over an in-memory store as the configuration asks.
fn build_scheduler(
    config: &SchedulerConfig,
    event_bus: EventBus,
) -> Result<Scheduler<InMemoryTriggerStore>, Box<dyn std::error::Error>> {
    let store = InMemoryTriggerStore::new().with_misfire_threshold(config.misfire_threshold());
    Ok(Scheduler::new(store)
        .with_settings(Arc::new(config.clone()))
        .with_timezone(config.tz()?)
        .with_event_bus(event_bus))
}

/// Schedule every configured job. Jobs that fail are logged and skipped.
async fn schedule_all(
    scheduler: &Scheduler<InMemoryTriggerStore>,
    config: &SchedulerConfig,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut failures = 0;
    for request in JobRequestBuilder::build_all(config)? {
        if let Err(e) = scheduler.schedule(&request.payload, &request.spec).await {
            error!(
                "Failed to schedule '{}' ({}): {}",
                request.payload.subject,
                request.payload.job_id().unwrap_or_default(),
                e
            );
            failures += 1;
        }
    }
    Ok(failures)
}

/// Validate a configuration file without running.
fn validate(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating: {}", path.display());

    let config = match YamlLoader::load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("Validation failed: {}", e);
            return Err(e.into());
        }
    };
    let scheduler = build_scheduler(&config, EventBus::new())?;
    let ctx = scheduler.build_context();

    let mut invalid = 0;
    for job in &config.jobs {
        let key = job.identity()?.key();
        match job.schedule.build(&ctx) {
            Ok(trigger) => match trigger.first_fire_time() {
                Some(t) => info!("  - {}: OK (first fire at {})", key, t),
                None => warn!("  - {}: OK, but it never fires", key),
            },
            Err(e) => {
                error!("  - {}: {}", key, e);
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        return Err(format!("{} of {} job(s) are invalid", invalid, config.jobs.len()).into());
    }
    info!("All {} job(s) are valid", config.jobs.len());
    Ok(())
}

/// Schedule every job and print the listing.
async fn list_jobs(path: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(&path)?;
    let scheduler = build_scheduler(&config, EventBus::new())?;
    schedule_all(&scheduler, &config).await?;

    let infos = scheduler.query().list_jobs_basic_info().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if infos.is_empty() {
        println!("No jobs in {}", path.display());
        return Ok(());
    }

    println!(
        "{:<40} {:<10} {:<12} {:<8} {:<20} {:<20} {:<20} INFO",
        "NAME", "TYPE", "ACTIVITY", "STATUS", "START", "NEXT FIRE", "END"
    );
    for info in &infos {
        println!(
            "{:<40} {:<10} {:<12} {:<8} {:<20} {:<20} {:<20} {}",
            info.name,
            info.job_type,
            info.activity,
            info.status,
            info.start_date,
            info.next_fire_date,
            info.end_date,
            info.info
        );
    }

    Ok(())
}

/// Print the fire times of every job in `[from, to]`.
async fn print_fire_times(
    path: PathBuf,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(&path)?;
    let scheduler = build_scheduler(&config, EventBus::new())?;
    schedule_all(&scheduler, &config).await?;

    let from = from.unwrap_or_else(|| scheduler.now());
    let to = to.unwrap_or(from + Duration::days(7));
    if to < from {
        return Err(format!("--to ({}) is before --from ({})", to, from).into());
    }

    let query = scheduler.query();
    let tz = scheduler.timezone();
    for job in &config.jobs {
        let identity = job.identity()?;
        let times = query.fire_times_in_range(&identity, from, to).await;
        println!("{} ({} fire time(s))", identity.key(), times.len());
        for t in times {
            println!("  {}", t.with_timezone(&tz).format(cadence::scheduler::DATE_FORMAT));
        }
    }

    Ok(())
}

/// Run the scheduler until Ctrl+C.
async fn run_scheduler(path: PathBuf, tick_interval: u64) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading configuration from: {}", path.display());
    let config = YamlLoader::load_config(&path)?;

    // Create event bus with logging handler
    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let scheduler = build_scheduler(&config, event_bus)?;
    let failures = schedule_all(&scheduler, &config).await?;
    info!(
        "Scheduled {} of {} job(s)",
        config.jobs.len() - failures,
        config.jobs.len()
    );

    info!("Starting scheduler (tick interval: {}s)...", tick_interval);
    info!("Press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(tick_interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = scheduler.fire_due().await {
                    warn!("Failed to fire due triggers: {}", e);
                }
            }
        }
    }

    info!("Goodbye!");
    Ok(())
}
