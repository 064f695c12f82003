//! Autodeploy - Kepware Modbus/MQTT provisioning tool

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use autodeploy::{
    DeployResult, DryRunApi, HttpConfigApi, PreparedDeployment, RunConfig, TagFailurePolicy,
};
use clap::{Parser, Subcommand};
use colored::*;
use common::{init_with_config, LogConfig};
use tracing::{debug, error, warn, Level};

#[derive(Parser)]
#[command(name = "autodeploy")]
#[command(about = "Provision Modbus channels, devices, tags and an MQTT agent on Kepware")]
#[command(long_about = "Provision Modbus channels, devices, tags and an MQTT agent on Kepware

Commands:
  deploy      Create channel, agent, devices and tags on the server
  plan        Show the requests a deployment would send (no network)
  check       Validate setup, templates and point table

Examples:
  autodeploy deploy                         # Deploy using ./setup.json
  autodeploy -c site/setup.json plan        # Preview requests
  autodeploy deploy --tag-policy best-effort

Exit codes: 0 success, 1 setup/template/table failure, 2 server failure.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Setup file
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        env = "AUTODEPLOY_CONFIG",
        default_value = "setup.json"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Also write daily-rotated log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Write log files as JSON lines (requires --log-dir)
    #[arg(long, global = true, requires = "log_dir")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create channel, agent, devices and tags on the server
    Deploy {
        /// Override the per-channel device limit
        #[arg(long)]
        device_limit: Option<usize>,

        /// Tag stage failure policy: fail-fast or best-effort
        #[arg(long)]
        tag_policy: Option<TagFailurePolicy>,
    },

    /// Show the requests a deployment would send, in order
    Plan {
        /// Print every request body
        #[arg(short = 'p', long)]
        show_payloads: bool,

        /// Override the per-channel device limit
        #[arg(long)]
        device_limit: Option<usize>,
    },

    /// Validate setup, templates and point table without contacting the server
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let console_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let guard = init_with_config(LogConfig {
        console_level,
        log_dir: cli.log_dir.clone(),
        enable_json: cli.log_json,
        ansi: !cli.no_color,
        ..LogConfig::default()
    })
    .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    if let Err(e) = execute(&cli).await {
        if e.log_level() == Level::WARN {
            warn!("Run aborted: {}", e);
        } else {
            error!("Run aborted: {}", e);
        }
        eprintln!("{} [{}] {}", "ERROR".red(), e.error_code(), e);
        // Flush file logs before exiting
        drop(guard);
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn execute(cli: &Cli) -> DeployResult<()> {
    let config = RunConfig::load(&cli.config)?;
    debug!("Run configuration: {:?}", config);

    match &cli.command {
        Commands::Deploy {
            device_limit,
            tag_policy,
        } => {
            let config = config.with_overrides(*device_limit, *tag_policy)?;
            deploy(&config).await
        },
        Commands::Plan {
            show_payloads,
            device_limit,
        } => {
            let config = config.with_overrides(*device_limit, None)?;
            plan(&config, *show_payloads).await
        },
        Commands::Check => check(&config),
    }
}

async fn deploy(config: &RunConfig) -> DeployResult<()> {
    let prepared = PreparedDeployment::prepare(config)?;
    let api = HttpConfigApi::new(config.request_timeout)?;
    let report = prepared.run(&api).await?;

    println!();
    println!("{}", "Deployment Summary".bright_cyan());
    println!("  Channel/agent: {}", report.channel_name.green());
    println!("  Devices:       {}", report.devices.devices.len());
    if report.devices.dropped > 0 {
        println!(
            "  Dropped:       {} {}",
            report.devices.dropped,
            "(over device limit)".yellow()
        );
    }
    println!("  Tags:          {}", report.tags.tag_count());

    for outcome in report.tags.devices.iter().filter(|d| !d.succeeded()) {
        println!(
            "  {} {}: {}",
            "FAIL".red(),
            outcome.device,
            outcome.error.as_deref().unwrap_or_default()
        );
    }

    report.ensure_complete()?;
    println!("{}", "DONE".green());
    Ok(())
}

async fn plan(config: &RunConfig, show_payloads: bool) -> DeployResult<()> {
    let prepared = PreparedDeployment::prepare(config)?;
    let api = DryRunApi::new();
    prepared.run(&api).await?;

    println!();
    println!("{}", "Planned Requests".bright_cyan());
    for (idx, request) in api.requests().iter().enumerate() {
        println!(
            "  {:>3}. {:<10} POST {} ({} items)",
            idx + 1,
            request.stage,
            request.url,
            autodeploy::client::item_count(&request.body)
        );
        if show_payloads {
            println!("{}", serde_json::to_string_pretty(&request.body)?);
        }
    }
    Ok(())
}

fn check(config: &RunConfig) -> DeployResult<()> {
    let prepared = PreparedDeployment::prepare(config)?;

    println!();
    println!("{}", "Configuration Check".bright_cyan());
    println!(
        "  Server:        {}://{}:{}",
        config.scheme, config.server_address, config.port
    );
    println!("  Channel/agent: {}", prepared.context.channel_name.green());
    println!("  Table rows:    {}", prepared.rows.len());
    println!("  Devices:       {}", prepared.devices.len());
    println!("  Device limit:  {}", prepared.context.device_limit);
    println!("  Tag policy:    {}", prepared.policy);

    for device in prepared.devices_within_limit() {
        println!(
            "    {:<24} {:<18} {} tags",
            device.name,
            device.address,
            prepared.tag_rows_for(&device.name)
        );
    }
    let dropped = prepared.dropped_devices();
    if !dropped.is_empty() {
        println!(
            "  {} {} devices over the limit will not be created",
            "WARN".yellow(),
            dropped.len()
        );
        for device in dropped {
            println!("    {}", device.name.yellow());
        }
    }

    println!("{}", "OK".green());
    Ok(())
}
