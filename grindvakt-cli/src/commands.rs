use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use grindvakt_config::GrindvaktConfig;
use grindvakt_engine::{
    create_shutdown_token, dispatch, ChannelError, ControlClient, ControlRequest,
    ControlResponse, Runtime,
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "grindvakt", version, about)]
pub struct Cli {
    /// Explicit configuration file instead of `config/grindvakt.yaml` + environment
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan connections and enforce blocks until interrupted
    Run,
    /// Inspect or revert installed block rules
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Manage blocking criteria
    #[command(subcommand)]
    Criteria(CriteriaCommand),
    /// Print ledger totals and the metrics snapshot
    Status,
    /// Print the effective configuration as YAML
    Config,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Print every recorded block rule as JSON
    List,
    /// Remove a block rule by name (e.g. `Block_IP_52.95.110.1`)
    Unblock(UnblockArgs),
}

#[derive(Args, Debug)]
pub struct UnblockArgs {
    pub rule_name: String,
}

#[derive(Subcommand, Debug)]
pub enum CriteriaCommand {
    List,
    Add(CriterionArgs),
    /// Remove a criterion and unblock every IP blocked because of it
    Remove(CriterionArgs),
}

#[derive(Args, Debug)]
pub struct CriterionArgs {
    pub criterion: String,
}

pub fn load_config(path: Option<&PathBuf>) -> Result<GrindvaktConfig> {
    let config = match path {
        Some(path) => GrindvaktConfig::load_from_path(path),
        None => GrindvaktConfig::load(),
    };
    config.context("loading configuration")
}

fn print_config(config: &GrindvaktConfig) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

pub async fn run_command(command: Commands, config: &GrindvaktConfig) -> Result<()> {
    let request = match command {
        // no runtime, so no ledger file is created just to show settings
        Commands::Config => return print_config(config),
        Commands::Run => return run_daemon(config).await,
        Commands::Rules(RulesCommand::List) => ControlRequest::ListRules,
        Commands::Rules(RulesCommand::Unblock(args)) => ControlRequest::UnblockRule {
            rule_name: args.rule_name,
        },
        Commands::Criteria(CriteriaCommand::List) => ControlRequest::ListCriteria,
        Commands::Criteria(CriteriaCommand::Add(args)) => ControlRequest::AddCriterion {
            criterion: args.criterion,
        },
        Commands::Criteria(CriteriaCommand::Remove(args)) => ControlRequest::RemoveCriterion {
            criterion: args.criterion,
        },
        Commands::Status => ControlRequest::Status,
    };
    render(deliver(request, config).await?)
}

async fn run_daemon(config: &GrindvaktConfig) -> Result<()> {
    let runtime = Runtime::from_config(config)
        .await
        .context("initializing runtime")?;
    let shutdown = create_shutdown_token();
    runtime.run(shutdown).await?;
    info!("Exited cleanly");
    Ok(())
}

/// Sends `request` to the running daemon. Without one, this process is the
/// only owner of the ledger and applies the request itself.
async fn deliver(request: ControlRequest, config: &GrindvaktConfig) -> Result<ControlResponse> {
    let client = ControlClient::new(
        config.control.listen,
        Duration::from_millis(config.control.request_timeout_ms),
    );
    match client.send(&request).await {
        Ok(response) => Ok(response),
        Err(ChannelError::Unavailable { addr, .. }) => {
            debug!(%addr, "No daemon running, applying to the ledger directly");
            let runtime = Runtime::from_config(config)
                .await
                .context("initializing runtime")?;
            Ok(dispatch(&runtime.control, request).await)
        }
        Err(e) => Err(e).context("contacting the running daemon"),
    }
}

fn render(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Rules { rules } => {
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        ControlResponse::Criteria { criteria } => {
            for criterion in criteria {
                println!("{criterion}");
            }
        }
        ControlResponse::CriterionAdded { criterion } => println!("Added {criterion:?}"),
        ControlResponse::CriterionRemoved {
            criterion,
            unblocked,
            not_blocked,
            failures,
        } => {
            println!(
                "Removed {criterion:?}: {} unblocked, {} not installed, {} failed",
                unblocked.len(),
                not_blocked.len(),
                failures.len()
            );
            for failure in &failures {
                eprintln!("  {}: {}", failure.ip, failure.error);
            }
            if !failures.is_empty() {
                bail!("{} unblock(s) failed", failures.len());
            }
        }
        ControlResponse::RuleUnblocked { rule_name, .. } => println!("Unblocked {rule_name}"),
        ControlResponse::RuleNotInstalled { rule_name } => {
            println!("{rule_name} is not installed in the firewall")
        }
        ControlResponse::Status {
            block_rules,
            criteria,
            metrics,
        } => {
            println!("block rules: {block_rules}");
            println!("criteria:    {criteria}");
            print!("{metrics}");
        }
        ControlResponse::Failed { kind, message } => bail!("{kind:?}: {message}"),
    }
    Ok(())
}
