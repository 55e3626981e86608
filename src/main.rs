use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use groqbot::config::{Config, ConfigError};
use groqbot::llm::LlmClient;
use groqbot::session::{ChatSession, Settings};

const LOG_ENV: &str = "GROQBOT_LOG";

#[derive(Parser)]
#[command(name = "groqbot")]
#[command(version)]
#[command(about = "Chat with Groq-hosted language models in the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Model to start with
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature, 0.0 to 1.0
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Read prompts line by line instead of opening the full-screen UI
    #[arg(long)]
    plain: bool,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured models
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(Commands::Models) = cli.command {
        for model in &config.models {
            let marker = if *model == config.default_model { "*" } else { " " };
            println!("{marker} {model}");
        }
        return Ok(());
    }

    init_tracing(cli.plain)?;

    let client = match LlmClient::new(&config) {
        Ok(client) => client,
        Err(err @ ConfigError::MissingApiKey) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    let mut settings = Settings::from_config(&config)?;
    if let Some(model) = cli.model.as_deref() {
        settings.set_model(model)?;
    }
    if let Some(temperature) = cli.temperature {
        settings.set_temperature(temperature)?;
    }

    let mut session = ChatSession::new(client, settings, config.system_prompt.clone());

    tracing::info!(
        model = %session.settings().model(),
        temperature = session.settings().temperature(),
        plain = cli.plain,
        "starting groqbot"
    );

    if cli.plain {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        groqbot::repl::run(&mut session, stdin, std::io::stdout()).await
    } else {
        groqbot::ui::run(&mut session).await
    }
}

/// Log to stderr in plain mode; the full-screen UI owns the terminal, so it
/// logs to a file under the config directory instead.
fn init_tracing(plain: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("groqbot=info"));

    if plain {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    let log_dir = Config::home_dir()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join("groqbot.log");
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    Ok(())
}
