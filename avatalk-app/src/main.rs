//! Avatalk terminal host.
//!
//! Runs the conversation engine against console stand-ins for speech
//! recognition, speech synthesis and avatar media, with an optional real
//! microphone feeding the voice activity monitor. Type `/help` at the prompt.

mod commands;
mod console;
mod settings;
mod state;
mod view;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use avatalk_core::session::parse_slot_id;
use avatalk_core::{
    AvatalkEngine, MicrophoneMonitor, Platform, SessionIdentity, SessionNegotiator,
};
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commands::Flow;
use console::{ConsoleMediaTransport, ConsoleRecognizer, ConsoleSynthesizer};
use settings::{default_settings_path, load_settings, AppSettings, DispatchKind, OutputKind};
use state::{AppState, Diagnostics};

const METER_INTERVAL: Duration = Duration::from_millis(250);

/// Avatalk - talk to an animated AI avatar
#[derive(Parser, Debug)]
#[command(name = "avatalk", version, about)]
struct Cli {
    /// Chat and media service base URL
    #[arg(long, env = "AVATALK_BASE_URL")]
    base_url: Option<String>,

    /// Display name sent when the session is negotiated
    #[arg(short, long, env = "AVATALK_USER")]
    user: Option<String>,

    /// Media slot id; blank or invalid is 0
    #[arg(long, env = "AVATALK_SLOT")]
    slot: Option<String>,

    /// Where replies come from
    #[arg(long, value_enum, env = "AVATALK_DISPATCH")]
    dispatch: Option<DispatchKind>,

    /// How replies are voiced
    #[arg(long, value_enum, env = "AVATALK_OUTPUT")]
    output: Option<OutputKind>,

    /// Watch the microphone for speech (barge-in and restart gating)
    #[arg(long)]
    mic: bool,

    /// Show a microphone level meter while you speak (needs --mic)
    #[arg(long)]
    meter: bool,

    /// Preferred input device name
    #[arg(long, env = "AVATALK_INPUT_DEVICE")]
    device: Option<String>,

    /// Settings file (defaults to the user data directory)
    #[arg(long, env = "AVATALK_SETTINGS")]
    settings: Option<PathBuf>,

    /// Connect immediately instead of waiting for /start
    #[arg(long)]
    connect: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(url) = &self.base_url {
            settings.service_base_url = Some(url.clone());
        }
        if let Some(user) = &self.user {
            settings.user_name = user.clone();
        }
        if let Some(slot) = &self.slot {
            settings.slot_id = parse_slot_id(slot);
        }
        if let Some(dispatch) = self.dispatch {
            settings.dispatch = dispatch;
        }
        if let Some(output) = self.output {
            settings.output = output;
        }
        if self.mic {
            settings.use_microphone = true;
        }
        if self.meter {
            settings.show_level_meter = true;
        }
        if let Some(device) = &self.device {
            settings.preferred_input_device = Some(device.clone());
        }
        settings.normalize();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,avatalk=info,avatalk_core=info",
        1 => "info,avatalk=debug,avatalk_core=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    cli.apply(&mut settings);
    let config = settings.engine_config()?;
    info!(
        path = %settings_path.display(),
        dispatch = ?settings.dispatch,
        output = ?settings.output,
        "settings loaded"
    );

    // One negotiation per process; failure leaves the remote id absent.
    let identity = match &settings.service_base_url {
        Some(base_url) => {
            SessionNegotiator::new(base_url)?
                .negotiate(&settings.user_name, settings.slot_id)
                .await
        }
        None => SessionIdentity::local(settings.slot_id),
    };
    info!(
        slot = identity.slot_id,
        negotiated = identity.is_negotiated(),
        "session ready"
    );

    let recognizer = ConsoleRecognizer::new();
    let platform = Platform {
        recognizer: Box::new(recognizer.clone()),
        synthesizer: Some(Box::new(ConsoleSynthesizer::new(
            settings.speech_chars_per_second,
        ))),
        media: Some(Box::new(ConsoleMediaTransport::default())),
    };
    let vad = config.vad;
    let engine = AvatalkEngine::new(config, platform, identity).context("building engine")?;
    let handle = engine.handle();

    let diagnostics = Arc::new(Diagnostics::default());
    let mut renderers = vec![
        tokio::spawn(view::follow_history(
            handle.history().clone(),
            handle.subscribe_turns(),
        )),
        tokio::spawn(view::follow_status(handle.subscribe_status())),
        tokio::spawn(view::follow_avatar(handle.subscribe_avatar())),
        tokio::spawn(view::follow_dispatches(
            Arc::clone(&diagnostics),
            handle.subscribe_dispatches(),
        )),
    ];
    let engine_task = tokio::spawn(engine.run());

    let monitor = MicrophoneMonitor::new(vad, settings.preferred_input_device.clone());
    if settings.use_microphone {
        if settings.show_level_meter {
            renderers.push(tokio::spawn(view::follow_activity(
                monitor.subscribe_activity(),
                METER_INTERVAL,
            )));
        }
        // A failed open is reported to the engine, which goes offline.
        if let Err(e) = monitor.start(handle.events()) {
            warn!("microphone unavailable: {e}");
        }
    }

    let state = AppState {
        engine: handle.clone(),
        recognizer,
        settings: Arc::new(Mutex::new(settings)),
        settings_path,
        diagnostics,
    };
    if cli.connect {
        handle.connect();
    }
    println!("avatalk ready. /start to begin, /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        match commands::parse(&line) {
            Ok(Some(command)) => match commands::execute(command, &state) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => warn!("{e:#}"),
            },
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
        if handle.is_closed() {
            break;
        }
    }

    if monitor.is_running() {
        let _ = monitor.stop();
    }
    handle.shutdown();
    engine_task.await.context("engine task panicked")?;
    for renderer in renderers {
        renderer.abort();
    }

    let diag = state.diagnostics_snapshot();
    info!(
        turns = handle.history().len(),
        dispatches = diag.dispatches,
        fallbacks = diag.fallbacks,
        p50_reply_ms = diag.reply_ms.p50_ms,
        "session ended"
    );
    Ok(())
}
