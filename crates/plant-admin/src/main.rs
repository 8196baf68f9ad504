//! One-shot admin tasks against the Plant Share storage bucket.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use plant_storage::Credential;
use plant_storage::firebase::{CorsRule, Endpoints, FirebaseStorage};

#[derive(Parser)]
#[command(name = "plant-admin")]
#[command(about = "Admin tasks for the Plant Share storage bucket")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the bucket's CORS configuration with a single rule
    SetCors(SetCorsArgs),
}

#[derive(Args, Debug)]
struct SetCorsArgs {
    /// Bucket to configure
    #[arg(long, env = "PLANT_STORAGE_BUCKET")]
    bucket: String,

    /// OAuth access token with storage admin rights
    #[arg(long, env = "PLANT_ADMIN_TOKEN", hide_env_values = true)]
    token: String,

    /// Allowed origin (repeatable)
    #[arg(long = "origin", default_values_t = ["*".to_string()])]
    origins: Vec<String>,

    /// Allowed method (repeatable)
    #[arg(
        long = "method",
        default_values_t = ["GET", "HEAD", "DELETE", "POST", "PUT"].map(String::from)
    )]
    methods: Vec<String>,

    /// Response header exposed to the browser (repeatable)
    #[arg(long = "response-header", default_values_t = ["Content-Type".to_string()])]
    response_headers: Vec<String>,

    /// Preflight cache lifetime
    #[arg(long, default_value_t = 3600)]
    max_age: u32,

    /// Storage JSON API base URL
    #[arg(long, default_value = "https://storage.googleapis.com")]
    endpoint: String,
}

impl SetCorsArgs {
    fn rule(&self) -> Result<CorsRule> {
        if self.origins.is_empty() || self.methods.is_empty() {
            bail!("at least one origin and one method are required");
        }
        Ok(CorsRule {
            origin: self.origins.clone(),
            method: self.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
            response_header: self.response_headers.clone(),
            max_age_seconds: self.max_age,
        })
    }
}

async fn set_cors(args: SetCorsArgs) -> Result<()> {
    let rule = args.rule()?;
    let endpoints = Endpoints {
        storage_api: args.endpoint.trim_end_matches('/').to_string(),
        ..Endpoints::default()
    };
    let storage = FirebaseStorage::new(reqwest::Client::new(), args.bucket.as_str(), endpoints);

    info!("Setting CORS on bucket {}: {:?}", storage.bucket(), rule);
    storage
        .set_cors(&[rule], &Credential::bearer(args.token))
        .await
        .with_context(|| format!("setting CORS on bucket {}", args.bucket))
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plant_admin=info,plant_storage=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::SetCors(args) => set_cors(args).await,
    };

    match result {
        Ok(()) => {
            info!("CORS configuration set successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error setting CORS: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
