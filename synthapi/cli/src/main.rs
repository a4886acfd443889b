//! SynthAPI CLI - describe an API in plain text and mock it

use std::collections::BTreeMap;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use synthapi_lib::{
    CaptureError, CaptureServer, Config, ConfigError, DocParser, ExtractionError, OpenAiExtractor,
    RegistryError, RemoteTargets, SynthClient, SynthError, begin_generate, extend_api,
    initialize_api, mock_get, store_capture,
};
use thiserror::Error;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default time the capture form waits for a save.
const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 1800;

#[derive(Parser)]
#[command(name = "synthapi")]
#[command(version)]
#[command(about = "Describe an API in plain text, then query a mock of it", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the documentation form and capture a new API specification
    Generate {
        /// Name of the API to create
        #[arg(short, long = "api", value_name = "NAME")]
        api: String,

        /// Print the form URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Seconds to wait for the specification to be saved
        #[arg(long, value_name = "SECS", default_value_t = DEFAULT_CAPTURE_TIMEOUT_SECS)]
        timeout: u64,
    },

    /// Extract the parameters of one endpoint from documentation text
    Parse {
        /// HTTP method of the endpoint
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Path of the endpoint
        #[arg(short, long, default_value = "/")]
        path: String,

        /// Documentation file (reads stdin when omitted)
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Upload a generated API and start remote sample-data generation
    Init {
        /// Name of the API to initialize
        #[arg(short, long = "api", value_name = "NAME")]
        api: String,
    },

    /// Generate more sample data for an initialized API
    Extend {
        /// Name of the API to extend
        #[arg(short, long = "api", value_name = "NAME")]
        api: String,

        /// Description of the additional sample data
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read the description from a file
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// List APIs awaiting initialization
    List {
        /// Show every API with its status
        #[arg(long)]
        all: bool,
    },

    /// Query a mocked endpoint
    Get {
        /// Name of the API to query
        #[arg(short, long = "api", value_name = "NAME")]
        api: String,

        /// Endpoint path (e.g. /v1/users)
        #[arg(short, long)]
        endpoint: String,

        /// HTTP method whose parameters are validated
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Query parameter (repeatable: -p term=pizza -p limit=5)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Delete the registry and every generated specification
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("no input text provided")]
    EmptyInput,

    #[error("mock endpoint answered with status {0}")]
    MockStatus(u16),
}

/// Parses a `KEY=VALUE` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn read_file(path: &PathBuf) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn read_stdin() -> io::Result<String> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn extractor(config: &Config) -> Result<OpenAiExtractor, CliError> {
    Ok(OpenAiExtractor::new(
        config.openai_base_url.clone(),
        config.require_api_key()?,
        config.model.clone(),
        config.timeout,
    ))
}

async fn generate(
    config: &Config,
    api: &str,
    no_browser: bool,
    timeout: Duration,
) -> Result<(), CliError> {
    let registry = config.registry();
    begin_generate(&registry, api)?;

    let parser = DocParser::new(extractor(config)?);
    let handle = CaptureServer::new(parser, config.port).start().await?;
    let url = handle.url();

    println!("Describe '{api}' at {url}");
    if !no_browser && let Err(e) = open::that(&url) {
        tracing::warn!("Could not open a browser: {}", e);
        println!("Open the URL above in your browser.");
    }
    println!("Waiting for the specification to be saved (Ctrl+C to abort)...");

    let outcome = handle.wait(timeout).await?;
    let path = store_capture(&config.workspace(), api, &outcome)?;

    println!("Saved specification to {}", path.display());
    println!("Run `synthapi init --api {api}` to upload it and generate sample data.");
    Ok(())
}

async fn parse(
    config: &Config,
    method: &str,
    path: &str,
    file: Option<PathBuf>,
) -> Result<(), CliError> {
    let documentation = match file {
        Some(file) => read_file(&file)?,
        None => read_stdin()?,
    };
    if documentation.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }

    let parser = DocParser::new(extractor(config)?);
    let parameters = parser.try_parse(&documentation, method, path).await?;

    let json = serde_json::to_string_pretty(&parameters).map_err(io::Error::other)?;
    println!("{json}");
    Ok(())
}

async fn init(config: &Config, api: &str) -> Result<(), CliError> {
    let targets = RemoteTargets {
        bucket: config.require_bucket_url()?,
        init: config.require_init_url()?,
    };
    let client = SynthClient::new(config.timeout);

    let report = initialize_api(
        &config.registry(),
        &config.workspace(),
        &client,
        targets,
        api,
    )
    .await?;

    for url in &report.uploaded {
        println!("Uploaded {url}");
    }
    println!("Initialized '{}'", report.api_name);
    if !report.response.trim().is_empty() {
        println!("{}", report.response.trim());
    }
    Ok(())
}

async fn extend(
    config: &Config,
    api: &str,
    text: Option<String>,
    file: Option<PathBuf>,
) -> Result<(), CliError> {
    let description = match (text, file) {
        (Some(text), _) => text,
        (None, Some(file)) => read_file(&file)?,
        (None, None) => return Err(CliError::EmptyInput),
    };
    if description.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }

    let targets = RemoteTargets {
        bucket: config.require_bucket_url()?,
        init: config.require_init_url()?,
    };
    let client = SynthClient::new(config.timeout);

    let report = extend_api(
        &config.registry(),
        &config.workspace(),
        &client,
        targets,
        api,
        &description,
    )
    .await?;

    println!("Requested more sample data for '{}'", report.api_name);
    Ok(())
}

fn list(config: &Config, all: bool) -> Result<(), CliError> {
    let registry = config.registry();

    if all {
        let apis = registry.list_all()?;
        if apis.is_empty() {
            println!("No APIs registered.");
            return Ok(());
        }
        println!("APIs:");
        for (name, initialized) in apis {
            let status = if initialized { "initialized" } else { "pending" };
            println!("  {name:<24} {status}");
        }
    } else {
        let apis = registry.list_available()?;
        if apis.is_empty() {
            println!("No APIs awaiting initialization.");
            return Ok(());
        }
        println!("APIs awaiting initialization:");
        for name in apis {
            println!("  {name}");
        }
    }
    Ok(())
}

async fn get(
    config: &Config,
    api: &str,
    endpoint: &str,
    method: &str,
    params: Vec<(String, String)>,
) -> Result<(), CliError> {
    let mock_url = config.require_mock_url()?;
    let params: BTreeMap<String, String> = params.into_iter().collect();
    let client = SynthClient::new(config.timeout);

    let response = mock_get(
        &config.workspace(),
        &client,
        mock_url,
        api,
        method,
        endpoint,
        &params,
    )
    .await?;

    println!("Request URL: {}", response.url);
    println!("Status: {}", response.status);
    println!();
    println!("{}", response.pretty_body());

    if !(200..300).contains(&response.status) {
        return Err(CliError::MockStatus(response.status));
    }
    Ok(())
}

fn reset(config: &Config, yes: bool) -> Result<(), CliError> {
    if !yes
        && !confirm(&format!(
            "Delete the registry and every generated specification in {}?",
            config.home().display()
        ))?
    {
        println!("Reset cancelled.");
        return Ok(());
    }

    let removed = config.registry().reset(&config.workspace())?;
    println!("Reset complete: removed {removed} generated files");
    Ok(())
}

async fn run(command: Commands) -> Result<(), CliError> {
    let config = Config::from_env()?;
    tracing::debug!("Using data directory {}", config.home().display());

    match command {
        Commands::Generate {
            api,
            no_browser,
            timeout,
        } => generate(&config, &api, no_browser, Duration::from_secs(timeout)).await,
        Commands::Parse { method, path, file } => parse(&config, &method, &path, file).await,
        Commands::Init { api } => init(&config, &api).await,
        Commands::Extend { api, text, file } => extend(&config, &api, text, file).await,
        Commands::List { all } => list(&config, all),
        Commands::Get {
            api,
            endpoint,
            method,
            params,
        } => get(&config, &api, &endpoint, &method, params).await,
        Commands::Reset { yes } => reset(&config, yes),
    }
}

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool) {
    // RUST_LOG wins over -v flags
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,synthapi=info,synthapi_lib=info".to_string(),
            2 => "info,synthapi=debug,synthapi_lib=debug".to_string(),
            _ => "debug,synthapi=trace,synthapi_lib=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_verbosity, cli.json);

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
