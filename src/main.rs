//! Cloudplan CLI entrypoint.
//!
//! This is the main entrypoint for the cloudplan command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cloudplan::cli::{Cli, Commands, OutputFormatter, StateCommands};
use cloudplan::cloud::{Ec2CloudClient, KeyPairStorage, SshExecutor};
use cloudplan::error::{ConfigurationError, ProvisionError, Result};
use cloudplan::plan::{Plan, PlanExecutor};
use cloudplan::provision::GlobalContext;
use cloudplan::provisioners::{builtin_registry, Collaborators};
use cloudplan::state::StateStore;

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    // load .env before clap reads env-backed arguments
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Setup { ref plan, dry_run } => {
            cmd_run(&cli, plan, dry_run, false, &formatter).await
        }
        Commands::Teardown { ref plan, dry_run } => {
            cmd_run(&cli, plan, dry_run, true, &formatter).await
        }
        Commands::Docs => cmd_docs(&cli, &formatter),
        Commands::State { ref command } => cmd_state(&cli, command, &formatter),
    }
}

/// Runs a plan forwards or backwards.
async fn cmd_run(
    cli: &Cli,
    plan_path: &PathBuf,
    dry_run: bool,
    teardown: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let plan = Plan::from_file(plan_path)?;
    let collaborators = build_collaborators(cli)?;
    let registry = builtin_registry(&collaborators)?;
    let mut state = open_state(cli)?;
    let globals = build_globals(cli);

    let mut executor = PlanExecutor::new(&plan, &registry, &mut state, globals);
    let report = match (teardown, dry_run) {
        (false, false) => executor.setup().await?,
        (false, true) => executor.dry_run_setup().await?,
        (true, false) => executor.teardown().await?,
        (true, true) => executor.dry_run_teardown().await?,
    };

    println!("{}", formatter.format_report(&report));
    Ok(())
}

/// Prints documentation for the registered provisioners.
fn cmd_docs(cli: &Cli, formatter: &OutputFormatter) -> Result<()> {
    let collaborators = build_collaborators(cli)?;
    let registry = builtin_registry(&collaborators)?;

    let docs = PlanExecutor::documentation(&registry);
    println!("{}", formatter.format_docs(&docs));
    Ok(())
}

/// Inspects the state store.
fn cmd_state(cli: &Cli, command: &StateCommands, formatter: &OutputFormatter) -> Result<()> {
    match command {
        StateCommands::Show => {
            let state = open_state(cli)?;
            println!("{}", formatter.format_state(&state));
            Ok(())
        }
    }
}

/// Opens the state store at the configured or default path.
fn open_state(cli: &Cli) -> Result<StateStore> {
    let path = match &cli.state_path {
        Some(path) => path.clone(),
        None => StateStore::default_path()?,
    };
    debug!("Using state file: {}", path.display());
    Ok(StateStore::open(path)?)
}

/// Builds the production collaborators from CLI credentials.
fn build_collaborators(cli: &Cli) -> Result<Collaborators> {
    let cloud = match (&cli.aws_access_key, &cli.aws_secret_key) {
        (Some(access), Some(secret)) => {
            debug!("Using explicit static AWS credentials");
            Ec2CloudClient::with_credentials(access, secret)
        }
        (None, None) => Ec2CloudClient::new(),
        (Some(_), None) => {
            return Err(ConfigurationError::MissingEnvVar {
                name: String::from("AWS_SECRET_ACCESS_KEY"),
            }
            .into());
        }
        (None, Some(_)) => {
            return Err(ConfigurationError::MissingEnvVar {
                name: String::from("AWS_ACCESS_KEY_ID"),
            }
            .into());
        }
    };

    Ok(Collaborators {
        cloud: Arc::new(cloud),
        remote: Arc::new(SshExecutor::default()),
        key_storage: KeyPairStorage::open().map_err(ProvisionError::from)?,
    })
}

/// Builds the run-wide global context from CLI credentials.
fn build_globals(cli: &Cli) -> GlobalContext {
    let mut globals = GlobalContext::new();
    if let Some(access) = &cli.aws_access_key {
        globals.insert("aws_access_key", serde_yaml::Value::from(access.as_str()));
    }
    if let Some(secret) = &cli.aws_secret_key {
        globals.insert("aws_secret_key", serde_yaml::Value::from(secret.as_str()));
    }
    globals
}
