use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use anki_voice::api::ApiServer;
use anki_voice::remote::CardService;
use anki_voice::remote::http::HttpBackend;
use anki_voice::session::{Event, SessionServices, spawn_session};
use anki_voice::voice::console::{ConsoleHardware, ConsoleSynthesizer, ConsoleTranscriptSource};
use anki_voice::voice::{AudioArbiter, Locale};
use anki_voice::Config;

/// Anki Voice - hands-free voice review for Anki flashcards
#[derive(Parser)]
#[command(name = "anki-voice", version, about)]
struct Cli {
    /// Base URL of the anki-voice server
    #[arg(long)]
    server: Option<String>,

    /// Interaction language (en, es)
    #[arg(short, long)]
    locale: Option<Locale>,

    /// Port for the presentation API
    #[arg(long)]
    port: Option<u16>,

    /// Do not start the presentation API
    #[arg(long)]
    no_api: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the server, the Anki add-on and AnkiConnect are reachable
    Check,
    /// List decks
    Decks,
    /// Switch the reviewer to another deck
    SwitchDeck {
        /// Deck name
        name: String,
    },
    /// Show new and due counts for a deck
    Stats {
        /// Deck name
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,anki_voice=info",
        1 => "info,anki_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.server {
        config.server.url = url.trim_end_matches('/').to_string();
    }
    if let Some(locale) = cli.locale {
        config.voice.locale = locale;
    }
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    if cli.no_api {
        config.api_server.enabled = false;
    }
    tracing::debug!(?config, "loaded configuration");

    let backend = Arc::new(HttpBackend::new(&config.server.url, &config.remote));

    match cli.command {
        Some(Command::Check) => check(backend.as_ref()).await,
        Some(Command::Decks) => {
            for deck in backend.list_decks().await? {
                println!("{deck}");
            }
            Ok(())
        }
        Some(Command::SwitchDeck { name }) => {
            backend.switch_deck(&name).await?;
            println!("Switched to {name}");
            Ok(())
        }
        Some(Command::Stats { name }) => {
            let stats = backend.deck_stats(&name).await?;
            println!("{name}: {} new, {} due", stats.new, stats.due);
            Ok(())
        }
        None => review(&config, backend).await,
    }
}

async fn check(backend: &dyn CardService) -> anyhow::Result<()> {
    let health = backend.health().await?;

    println!("server:       {}", health.server);
    println!("anki add-on:  {}", health.anki_addon);
    println!("ankiconnect:  {}", health.ankiconnect);
    println!("anki running: {}", health.anki_running);

    if !health.is_ok() {
        anyhow::bail!("backend is not ready");
    }
    Ok(())
}

/// Run a review session on the console until interrupted
async fn review(config: &Config, backend: Arc<HttpBackend>) -> anyhow::Result<()> {
    tracing::info!(
        server = %config.server.url,
        locale = %config.voice.locale,
        api = config.api_server.enabled,
        "starting review"
    );

    if let Err(e) = check(backend.as_ref()).await {
        tracing::warn!(error = %e, "backend check failed, starting anyway");
    }

    let arbiter = AudioArbiter::new(
        Arc::new(ConsoleSynthesizer::new()),
        ConsoleTranscriptSource::spawn(),
        Arc::new(ConsoleHardware),
        config.voice.quiet_fence,
    );
    let services = SessionServices {
        cards: backend.clone(),
        grader: backend.clone(),
        arbiter,
    };
    let (session, driver) = spawn_session(services, config);

    let api = config
        .api_server
        .enabled
        .then(|| ApiServer::new(session.clone(), backend, config.api_server.port).spawn());

    println!("Type answers and commands while the microphone is open. Ctrl-C quits.");
    session.send(Event::Start).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    session.send(Event::Stop).await?;
    session.shutdown().await?;
    driver.await?;

    if let Some(api) = api {
        api.abort();
    }
    Ok(())
}
