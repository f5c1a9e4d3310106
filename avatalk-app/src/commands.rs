//! REPL command parsing and handlers.
//!
//! Plain lines are sent as manual text; lines starting with `/` are commands.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use avatalk_core::audio::list_input_devices;
use tracing::info;

use crate::settings::save_settings;
use crate::state::AppState;
use crate::view;

/// The three quick-reply buttons, in order.
pub const QUICK_REPLIES: [&str; 3] = ["Apa kabar?", "Siapa kamu?", "Nyanyi dong!"];

const HELP: &str = "\
commands:
  /start            connect and start listening
  /stop             disconnect
  /mute             toggle mute
  /mic              restart listening
  /speak <words>    say something to the live recognition pass
  /quick <1-3>      send a quick reply (1 Apa kabar? 2 Siapa kamu? 3 Nyanyi dong!)
  /history          print the conversation so far
  /export [path]    write the history as JSON
  /stats            dispatch counters and reply latency
  /devices          list microphones
  /save             persist current settings
  /quit             exit
anything else is sent as text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Mute,
    Mic,
    Speak(String),
    /// Zero-based index into `QUICK_REPLIES`.
    Quick(usize),
    Send(String),
    History,
    Export(Option<PathBuf>),
    Stats,
    Devices,
    Save,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "start" | "connect" => Command::Start,
        "stop" | "disconnect" => Command::Stop,
        "mute" => Command::Mute,
        "mic" => Command::Mic,
        "speak" | "say" => {
            if arg.is_empty() {
                bail!("/speak needs some words");
            }
            Command::Speak(arg.to_string())
        }
        "quick" | "q" => {
            let n: usize = arg
                .parse()
                .with_context(|| format!("/quick expects 1-{}", QUICK_REPLIES.len()))?;
            if n == 0 || n > QUICK_REPLIES.len() {
                bail!("/quick expects 1-{}", QUICK_REPLIES.len());
            }
            Command::Quick(n - 1)
        }
        "history" => Command::History,
        "export" => Command::Export((!arg.is_empty()).then(|| PathBuf::from(arg))),
        "stats" => Command::Stats,
        "devices" => Command::Devices,
        "save" => Command::Save,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command /{other} (try /help)"),
    };
    Ok(Some(command))
}

pub fn execute(command: Command, state: &AppState) -> Result<Flow> {
    match command {
        Command::Start => state.engine.connect(),
        Command::Stop => state.engine.disconnect(),
        Command::Mute => state.engine.toggle_mute(),
        Command::Mic => state.engine.toggle_mic(),
        Command::Speak(words) => {
            if !state.recognizer.hear(&words) {
                println!("(not listening, nothing was heard)");
            }
        }
        Command::Quick(index) => state.engine.send_text(QUICK_REPLIES[index]),
        Command::Send(text) => state.engine.send_text(text),
        Command::History => {
            let turns = state.engine.history().snapshot();
            if turns.is_empty() {
                println!("(no messages yet)");
            }
            for (index, turn) in turns.iter().enumerate() {
                println!("{}", view::format_turn(index, turn));
            }
        }
        Command::Export(path) => {
            let path = path.unwrap_or_else(default_export_path);
            let json = state.engine.history().to_json()?;
            std::fs::write(&path, json)
                .with_context(|| format!("writing history to {}", path.display()))?;
            info!(path = %path.display(), turns = state.engine.history().len(), "history exported");
        }
        Command::Stats => {
            let snapshot = state.diagnostics_snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Devices => {
            let devices = list_input_devices();
            if devices.is_empty() {
                println!("(no input devices)");
            }
            for device in devices {
                println!("{}", view::format_device(&device));
            }
        }
        Command::Save => {
            let settings = state.settings.lock().clone();
            save_settings(&state.settings_path, &settings).with_context(|| {
                format!("saving settings to {}", state.settings_path.display())
            })?;
            info!(path = %state.settings_path.display(), "settings saved");
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn default_export_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("avatalk-history-{stamp}.json"))
}
