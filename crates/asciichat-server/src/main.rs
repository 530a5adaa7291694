use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use asciichat_crypto::identity;
use asciichat_crypto::Whitelist;

use asciichat_server::config::ServerConfig;
use asciichat_server::listener::bind_listener;
use asciichat_server::palette::PaletteKind;
use asciichat_server::server;
use asciichat_server::shutdown::ShutdownToken;
use asciichat_server::state::ServerState;
use asciichat_server::stats::run_stats;

// Exit codes; 0 is a clean shutdown.
const EXIT_PLATFORM: u8 = 1;
const EXIT_CRYPTO: u8 = 2;
const EXIT_BIND: u8 = 3;
const EXIT_CONFIG: u8 = 4;

#[derive(Parser)]
#[command(name = "asciichat-server", about = "ASCII-Chat multi-client A/V server")]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port, overrides config
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (IP), overrides config
    #[arg(long)]
    bind: Option<String>,

    /// Maximum concurrent clients (1-32), overrides config
    #[arg(long)]
    max_clients: Option<u32>,

    /// Disable the audio mixer entirely
    #[arg(long)]
    no_audio: bool,

    /// Log file path (lines also go to stderr by default)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Palette: standard|blocks|digital|minimal|cool|custom
    #[arg(long)]
    palette: Option<String>,

    /// Ramp characters for --palette custom
    #[arg(long)]
    palette_chars: Option<String>,

    /// Disable the handshake and per-packet encryption
    #[arg(long)]
    no_encrypt: bool,

    /// Path to the server identity key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Path to the client whitelist (JSON array of hex keys)
    #[arg(long)]
    whitelist: Option<PathBuf>,

    /// Pre-shared password for client authentication
    #[arg(long)]
    password: Option<String>,

    /// Target video frame rate
    #[arg(long)]
    fps: Option<u32>,
}

struct Fatal {
    code: u8,
    error: anyhow::Error,
}

fn fatal(code: u8) -> impl FnOnce(anyhow::Error) -> Fatal {
    move |error| Fatal { code, error }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(fatal) => {
            // Tracing may not be initialized yet; stderr always works.
            eprintln!("asciichat-server: {:#}", fatal.error);
            ExitCode::from(fatal.code)
        }
    }
}

async fn run(args: Args) -> Result<(), Fatal> {
    let config = load_config(&args).map_err(fatal(EXIT_CONFIG))?;
    config
        .validate()
        .map_err(|e| fatal(EXIT_CONFIG)(e.into()))?;

    init_tracing(&config).map_err(fatal(EXIT_PLATFORM))?;

    let identity = if config.no_encrypt {
        None
    } else {
        match &config.identity_key {
            Some(path) => {
                let passphrase = identity::passphrase_from_env();
                let key = identity::load_or_generate(path, passphrase.as_deref().map(|s| &**s))
                    .map_err(fatal(EXIT_CRYPTO))?;
                Some(key)
            }
            None => None,
        }
    };

    let whitelist = config
        .whitelist
        .as_deref()
        .map(Whitelist::load)
        .transpose()
        .map_err(fatal(EXIT_CRYPTO))?
        .map(Arc::new);

    let listener = bind_listener(&config.bind, config.port).map_err(fatal(EXIT_BIND))?;

    let state = ServerState::new(config, identity, whitelist);
    spawn_signal_listener(state.shutdown.clone());
    tokio::spawn(run_stats(state.clone()));

    server::run(state, listener).await.map_err(fatal(EXIT_PLATFORM))
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("malformed config file")?
        }
        None => ServerConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(max) = args.max_clients {
        config.max_clients = max;
    }
    if args.no_audio {
        config.audio_enabled = false;
    }
    if let Some(path) = &args.log_file {
        config.log_file = Some(path.clone());
    }
    if let Some(palette) = &args.palette {
        config.palette = parse_palette(palette)?;
    }
    if let Some(chars) = &args.palette_chars {
        config.palette_custom = Some(chars.clone());
    }
    if args.no_encrypt {
        config.no_encrypt = true;
    }
    if let Some(path) = &args.key {
        config.identity_key = Some(path.clone());
    }
    if let Some(path) = &args.whitelist {
        config.whitelist = Some(path.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    Ok(config)
}

fn parse_palette(s: &str) -> Result<PaletteKind> {
    match s {
        "standard" => Ok(PaletteKind::Standard),
        "blocks" => Ok(PaletteKind::Blocks),
        "digital" => Ok(PaletteKind::Digital),
        "minimal" => Ok(PaletteKind::Minimal),
        "cool" => Ok(PaletteKind::Cool),
        "custom" => Ok(PaletteKind::Custom),
        other => anyhow::bail!("unknown palette {other:?}"),
    }
}

fn init_tracing(config: &ServerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "asciichat_server=info".into());
    match &config.log_file {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

/// SIGINT/SIGTERM turn into one shutdown trigger. The handler body does
/// nothing beyond one line of output and flipping the token; all real
/// cleanup happens in the accept loop.
fn spawn_signal_listener(shutdown: ShutdownToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        println!("shutdown requested");
        shutdown.trigger();
    });
}
