mod app;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use autoquest_core::{Config, Resolution};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "autoquest", version)]
#[command(about = "Answers job application questions from a cached answer sheet")]
struct Cli {
    /// TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "autoquest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Resolve a question, or start an interactive prompt when none is given.
    Ask {
        #[arg(long)]
        question: Option<String>,
    },
    /// Embed answer-sheet rows missing from the similarity index.
    Embed,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_resolution(res: &Resolution) {
    if res.low_confidence {
        println!("{} (low confidence)", res.answer);
    } else {
        println!("{}", res.answer);
    }
}

async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let resolver = Arc::new(app::bootstrap(config).await?);
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("Starting AutoQuest HTTP server on {addr}");
    axum::serve(listener, http::router(resolver))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")
}

async fn ask(config: &Config, question: Option<String>) -> Result<()> {
    let resolver = app::bootstrap(config).await?;

    if let Some(question) = question {
        let res = resolver.resolve(&question).await?;
        print_resolution(&res);
        return Ok(());
    }

    let mut editor = DefaultEditor::new().context("start line editor")?;
    loop {
        let line = match editor.readline("Ask a question (or type 'exit'): ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(question);

        match resolver.resolve(question).await {
            Ok(res) => print_resolution(&res),
            Err(err) => eprintln!("error: {err}"),
        }
    }

    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve { bind } => serve(&config, bind).await,
        Commands::Ask { question } => ask(&config, question).await,
        Commands::Embed => {
            let embedded = app::embed_only(&config).await?;
            println!("embedded={embedded}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
