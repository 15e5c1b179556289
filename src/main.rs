//! ttsspeaker entry point
//!
//! `ttsspeaker` (or `ttsspeaker speak`) runs the interactive session,
//! `ttsspeaker serve` starts the web API, `ttsspeaker voices` lists the
//! voices of one backend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use ttsspeaker::cli::{self, CliOptions};
use ttsspeaker::config::Config;
use ttsspeaker::session::SessionRegistry;
use ttsspeaker::speech::{BackendKind, ProviderFactory};

#[derive(Parser, Debug)]
#[command(name = "ttsspeaker")]
#[command(about = "Speak text with system voices, ElevenLabs, or XTTS voice cloning", long_about = None)]
#[command(version)]
struct Args {
    /// Write debug logs to ttsspeaker.log
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Config file (default: ~/.ttsspeaker.cfg)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive session (default)
    Speak {
        /// Backend: local, online, or xtts (prompted if omitted)
        #[arg(short, long, value_parser = parse_backend)]
        backend: Option<BackendKind>,

        /// Voice name (prompted if omitted)
        #[arg(short, long)]
        voice: Option<String>,

        /// Reference recording to clone (xtts only)
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },
    /// Serve the web API
    Serve {
        /// Listen address (default from config, 127.0.0.1:5000)
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// List the voices of a backend
    Voices {
        #[arg(value_parser = parse_backend)]
        backend: BackendKind,
    },
}

fn parse_backend(s: &str) -> std::result::Result<BackendKind, String> {
    s.parse().map_err(|e: ttsspeaker::SpeakerError| e.to_string())
}

fn init_logging(debug: bool) {
    if debug {
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("ttsspeaker.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open ttsspeaker.log for debug logging: {}", e);
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }
        info!(
            "ttsspeaker version {} starting (debug mode, logging to ttsspeaker.log)",
            ttsspeaker::VERSION
        );
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;
    if let Some(path) = config.path() {
        info!("Configuration loaded from {:?}", path);
    }

    let factory = ProviderFactory::from_config(&config);

    match args.command.unwrap_or(Commands::Speak {
        backend: None,
        voice: None,
        reference: None,
    }) {
        Commands::Speak {
            backend,
            voice,
            reference,
        } => {
            let options = CliOptions {
                backend,
                voice,
                reference,
            };
            let stdin = io::stdin();
            let stdout = io::stdout();
            cli::run(&factory, options, &mut stdin.lock(), &mut stdout.lock())
                .context("interactive session failed")?;
        }
        Commands::Serve { addr } => {
            let server = config.server_settings();
            let address = addr.unwrap_or(server.address);
            let registry = Arc::new(SessionRegistry::new(Arc::new(factory), server.session_keys));

            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime
                .block_on(ttsspeaker::web::serve(registry, &address))
                .context("web server failed")?;
        }
        Commands::Voices { backend } => {
            let voices = factory
                .list_voices(backend)
                .with_context(|| format!("listing {} voices", backend))?;
            for voice in voices {
                println!("{}", voice);
            }
        }
    }

    Ok(())
}
