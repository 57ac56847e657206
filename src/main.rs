use anyhow::Context;
use clap::{Parser, Subcommand};
use data_transfer::config::LoggingConfig;
use data_transfer::error::ErrorMapper;
use data_transfer::tools::{ResolveDoiInput, StorageInput, TransferFieldInput, TransferInfoInput};
use data_transfer::{AccessToken, Config, ConfigOverrides, Facade, StorageAuth, ToolResult};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "data-transfer")]
#[command(about = "Transfers, storage elements and DOI datasets behind one interface")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(long, short = 'c', env = "TRANSFER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Base URL bare DOIs are resolved against
    #[arg(long, global = true)]
    doi_resolver: Option<String>,

    /// Bearer token for the backend
    #[arg(long, short = 't', env = "TRANSFER_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files published under a DOI
    Resolve {
        doi: String,
        /// Folder levels to descend for hierarchical records
        #[arg(long, short = 'd', default_value_t = 1)]
        depth: u32,
    },
    /// Describe a transfer job
    Info { destination: String, job: String },
    /// Read one field of a transfer job, e.g. `jobState`
    Field {
        destination: String,
        job: String,
        field: String,
    },
    /// List a folder of a storage element
    Ls {
        destination: String,
        uri: String,
        #[arg(long, env = "TRANSFER_ACCESS_KEY")]
        access_key: Option<String>,
        #[arg(long, env = "TRANSFER_SECRET_KEY", hide_env_values = true)]
        secret_key: Option<String>,
    },
    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSummary {
    valid: bool,
    destinations: Vec<(String, String)>,
    services: Vec<(String, String)>,
    parsers: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let path = cli
                .config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return emit::<()>(Err(ErrorMapper::map(e, &[("configPath", path.as_str())])));
        }
    };
    config.apply_overrides(&ConfigOverrides {
        log_level: cli.log_level.clone(),
        json_logs: cli.json_logs.then_some(true),
        doi_resolver: cli.doi_resolver.clone(),
    });
    init_logging(&config.logging)?;

    let summary = summarize(&config);
    let facade = match Facade::from_config(config) {
        Ok(facade) => facade,
        Err(e) => return emit::<()>(Err(e)),
    };
    info!("data-transfer {} ready", env!("CARGO_PKG_VERSION"));

    let token = cli.token.map(AccessToken::new);
    match cli.command {
        Command::Resolve { doi, depth } => {
            emit(facade.doi.resolve_doi(token.as_ref(), ResolveDoiInput { doi, depth }).await)
        }
        Command::Info { destination, job } => {
            let token = token.context("A bearer token is required, pass --token or set TRANSFER_TOKEN")?;
            let input = TransferInfoInput {
                destination,
                job_id: job,
            };
            emit(facade.transfers.get_transfer_info(&token, input).await)
        }
        Command::Field {
            destination,
            job,
            field,
        } => {
            let token = token.context("A bearer token is required, pass --token or set TRANSFER_TOKEN")?;
            let input = TransferFieldInput {
                destination,
                job_id: job,
                field_name: field,
            };
            emit(facade.transfers.get_transfer_field(&token, input).await)
        }
        Command::Ls {
            destination,
            uri,
            access_key,
            secret_key,
        } => {
            // Object stores authenticate with storage credentials, not the bearer token
            let token = token.unwrap_or_else(|| AccessToken::new(""));
            let storage_auth = access_key
                .zip(secret_key)
                .map(|(access_key, secret_key)| StorageAuth {
                    access_key,
                    secret_key,
                });
            let input = StorageInput {
                destination,
                se_url: uri,
                storage_auth,
            };
            emit(facade.storage.list_folder(&token, input).await)
        }
        Command::CheckConfig => emit(Ok(summary)),
    }
}

fn summarize(config: &Config) -> ConfigSummary {
    let mut destinations: Vec<_> = config
        .destinations
        .iter()
        .map(|(destination, service)| (destination.clone(), service.clone()))
        .collect();
    destinations.sort();

    let mut services: Vec<_> = config
        .services
        .iter()
        .map(|(id, service)| (id.clone(), service.implementation.clone()))
        .collect();
    services.sort();

    ConfigSummary {
        valid: true,
        destinations,
        services,
        parsers: config.parsers.iter().map(|p| p.id.clone()).collect(),
    }
}

/// Print a result or its canonical error as JSON on stdout
fn emit<T: Serialize>(result: ToolResult<T>) -> anyhow::Result<ExitCode> {
    let (json, code) = match result {
        Ok(value) => (serde_json::to_string_pretty(&value)?, ExitCode::SUCCESS),
        Err(error) => {
            debug!("Command failed: {}", error);
            (serde_json::to_string_pretty(&error)?, ExitCode::FAILURE)
        }
    };
    println!("{json}");
    Ok(code)
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    // Logs go to stderr so stdout carries only JSON results
    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
