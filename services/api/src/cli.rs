use crate::demo::{run_demo, DemoArgs};
use crate::infra::RegistrationBackend;
use crate::server;
use clap::{Args, Parser, Subcommand};
use ippis_registration::config::AppConfig;
use ippis_registration::error::AppError;
use ippis_registration::telemetry;
use ippis_registration::workflows::registration::{
    RegistrationId, RegistrationStore, RegistrationWorkflow,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "IPPIS Registration",
    about = "Run and operate the IPPIS employee registration service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Create or update the registration tables in DATABASE_URL
    Migrate,
    /// Walk a sample registration through every step using the in-memory store
    Demo(DemoArgs),
    /// Print the stored state and history of one registration as JSON
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct InspectArgs {
    /// Registration id, e.g. IPPIS-20261019143015123-0042
    pub(crate) registration_id: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate => run_migrate().await,
        Command::Demo(args) => run_demo(args).await,
        Command::Inspect(args) => run_inspect(args).await,
    }
}

async fn run_migrate() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;
    RegistrationBackend::migrate(&config.database).await
}

async fn run_inspect(args: InspectArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let backend = Arc::new(RegistrationBackend::from_config(&config.database).await?);
    let workflow = RegistrationWorkflow::new(backend.clone(), &config.registration);
    let id = RegistrationId(args.registration_id);
    let aggregate = workflow.get_registration(&id, true).await;
    backend.close().await;
    let aggregate = aggregate?;

    if !aggregate.exists() {
        println!("Registration {} not found in {} store", id, backend.label());
        return Ok(());
    }
    match serde_json::to_string_pretty(&aggregate) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("Registration payload unavailable: {err}"),
    }
    Ok(())
}
