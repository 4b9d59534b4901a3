use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ragline_core::App;
use ragline_core::config::{Config, resolve_config_path};
use ragline_gateway::GatewayServer;
use ragline_memory::document::{DocumentLoader, TextLoader, discover};
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "ragline", version, about)]
struct Cli {
    /// Configuration file (default: `RAGLINE_CONFIG` or config/default.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Load text and Markdown files into the corpus.
    Ingest {
        /// Files or directories; directories are walked recursively.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a single question and print the result as JSON.
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    config.validate()?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let app = App::build(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&app).await,
        Command::Ingest { paths } => ingest(&app, &paths).await,
        Command::Ask { question } => ask(&app, &question.join(" ")).await,
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries command output; logs go to stderr
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn serve(app: &App) -> anyhow::Result<()> {
    app.health_check().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let gateway = &app.config().gateway;
    if gateway.auth_token.is_none() {
        tracing::info!("gateway auth disabled; set gateway.auth_token to require a bearer token");
    }

    GatewayServer::new(
        gateway,
        std::sync::Arc::clone(app.pipeline()),
        std::sync::Arc::clone(app.corpus()),
        shutdown_rx,
    )?
    .serve()
    .await?;

    Ok(())
}

async fn ingest(app: &App, paths: &[PathBuf]) -> anyhow::Result<()> {
    if app.config().storage.sqlite_path.is_none() {
        tracing::warn!("storage.sqlite_path is unset; ingested documents are discarded on exit");
    }

    let loader = TextLoader::default();
    let mut files = Vec::new();
    for path in paths {
        let found = discover(path, loader.supported_extensions())
            .await
            .with_context(|| format!("failed to scan {}", path.display()))?;
        if found.is_empty() {
            tracing::warn!(path = %path.display(), "no text or markdown files found");
        }
        files.extend(found);
    }

    let mut chunks = 0usize;
    let mut failed = 0usize;
    for file in &files {
        match ingest_file(app, &loader, file).await {
            Ok(count) => chunks += count,
            Err(e) => {
                failed += 1;
                tracing::error!(file = %file.display(), "{e:#}");
            }
        }
    }

    println!(
        "ingested {} of {} files ({chunks} chunks)",
        files.len() - failed,
        files.len()
    );
    if failed > 0 {
        bail!("{failed} file(s) failed to ingest");
    }
    Ok(())
}

async fn ingest_file(app: &App, loader: &TextLoader, file: &Path) -> anyhow::Result<usize> {
    let document = loader
        .load(file)
        .await
        .with_context(|| format!("failed to load {}", file.display()))?;
    let ids = app.corpus().ingest(document).await?;
    Ok(ids.len())
}

async fn ask(app: &App, question: &str) -> anyhow::Result<()> {
    let answer = app.pipeline().answer(question).await?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["ragline"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["ragline", "ingest", "docs", "--config", "custom.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Some(Command::Ingest { paths }) => assert_eq!(paths, vec![PathBuf::from("docs")]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ask_joins_words() {
        let cli = Cli::try_parse_from(["ragline", "ask", "what", "is", "this?"]).unwrap();
        match cli.command {
            Some(Command::Ask { question }) => assert_eq!(question.join(" "), "what is this?"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ingest_requires_paths() {
        assert!(Cli::try_parse_from(["ragline", "ingest"]).is_err());
    }
}
