//! scripter CLI: operator interface to the generation backend.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scripter_rs::config::Config;
use scripter_rs::generate::Generator;
use scripter_rs::model::GenerateRequest;
use scripter_rs::telemetry::{TelemetryConfig, init_telemetry};
use scripter_rs::upload::{UploadClient, UploadRequest, UploadStage, new_nonce, object_path_for};

#[derive(Parser)]
#[command(name = "scripter", about = "Generate video ideas from a creator profile")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one idea card and print it as JSON
    Generate {
        /// Creator profile text, or @path to read it from a file
        #[arg(long)]
        profile: String,
        /// Macro theme (repeat for several, order is kept)
        #[arg(long = "theme", required = true)]
        themes: Vec<String>,
        /// Extra instruction for the generator
        #[arg(long)]
        prompt: Option<String>,
        /// Sequence number of the card
        #[arg(long, default_value_t = 1)]
        next_id: u64,
        /// Session deadline in seconds (0 waits forever)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Upload an onboarding video and print its storage URI
    Upload {
        /// Onboarding session the file belongs to
        #[arg(long)]
        session_id: String,
        /// Stage: taste, performance or low_performance
        #[arg(long)]
        stage: String,
        /// File to upload
        file: PathBuf,
        /// Position of the file within its stage
        #[arg(long)]
        stage_index: Option<u32>,
        /// Uploader name used in the object path
        #[arg(long)]
        user_name: Option<String>,
        /// MIME type of the file
        #[arg(long, default_value = "video/mp4")]
        content_type: String,
        /// Compute the object path locally so repeated uploads land on the same key
        #[arg(long)]
        pin_path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "scripter".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Generate {
            profile,
            themes,
            prompt,
            next_id,
            timeout_secs,
        } => cmd_generate(&config, profile, themes, prompt, next_id, timeout_secs).await,
        Command::Upload {
            session_id,
            stage,
            file,
            stage_index,
            user_name,
            content_type,
            pin_path,
        } => {
            let stage: UploadStage = stage.parse()?;
            let mut request = UploadRequest::new(session_id, stage, &file_name_of(&file))
                .content_type(content_type);
            if let Some(index) = stage_index {
                request = request.stage_index(index);
            }
            if let Some(name) = user_name {
                request = request.user_name(name);
            }
            if pin_path {
                let path = object_path_for(&request, chrono::Utc::now(), &new_nonce());
                request = request.object_path(&path)?;
            }
            cmd_upload(&config, request, file).await
        }
    }
}

async fn cmd_generate(
    config: &Config,
    profile: String,
    themes: Vec<String>,
    prompt: Option<String>,
    next_id: u64,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let profile = match profile.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => profile,
    };

    let mut request = GenerateRequest::new(profile, themes);
    if let Some(prompt) = prompt {
        request = request.user_prompt(prompt);
    }

    let mut generator = Generator::new(config)?;
    if let Some(secs) = timeout_secs {
        generator =
            generator.session_timeout((secs > 0).then(|| std::time::Duration::from_secs(secs)));
    }

    let card = generator.next_card(&request, next_id).await?;
    println!("{}", serde_json::to_string_pretty(&card)?);
    Ok(())
}

async fn cmd_upload(config: &Config, request: UploadRequest, file: PathBuf) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&file).await?;
    let client = UploadClient::new(config)?;
    let uri = client.upload(&request, bytes).await?;
    println!("{uri}");
    Ok(())
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
