//! Persistent host settings (JSON file in the user data directory).
//!
//! Every field has a default, so a partial or missing file is fine. CLI flags
//! override values after loading; `normalize()` runs last either way.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use avatalk_core::{
    conversation::TimingConfig, AvatarClips, DispatchMode, EngineConfig, OutputMode, VadConfig,
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const MAX_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchKind {
    /// Canned replies after a delay; no network.
    Simulation,
    /// `POST {base}/human`.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Console text-to-speech with a local avatar.
    Local,
    /// Server-streamed avatar media.
    Media,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub user_name: String,
    pub slot_id: i64,
    pub service_base_url: Option<String>,
    pub dispatch: DispatchKind,
    pub output: OutputKind,
    pub simulation_delay_ms: u64,
    pub speech_end_debounce_ms: u64,
    pub auto_restart_ms: u64,
    pub unmute_resume_ms: u64,
    pub connect_warmup_ms: u64,
    pub use_microphone: bool,
    pub preferred_input_device: Option<String>,
    /// Print a microphone level line while the user is speaking.
    pub show_level_meter: bool,
    pub vad: VadConfig,
    pub clips: AvatarClips,
    /// Pace of the console synthesizer.
    pub speech_chars_per_second: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        let timing = TimingConfig::default();
        Self {
            user_name: String::new(),
            slot_id: 0,
            service_base_url: None,
            dispatch: DispatchKind::Simulation,
            output: OutputKind::Local,
            simulation_delay_ms: 1_000,
            speech_end_debounce_ms: timing.speech_end_debounce.as_millis() as u64,
            auto_restart_ms: timing.auto_restart.as_millis() as u64,
            unmute_resume_ms: timing.unmute_resume.as_millis() as u64,
            connect_warmup_ms: timing.connect_warmup.as_millis() as u64,
            use_microphone: false,
            preferred_input_device: None,
            show_level_meter: false,
            vad: VadConfig::default(),
            clips: AvatarClips::default(),
            speech_chars_per_second: 15.0,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.user_name = self.user_name.trim().to_string();
        self.service_base_url = trimmed(self.service_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.preferred_input_device = trimmed(self.preferred_input_device.take());
        self.simulation_delay_ms = self.simulation_delay_ms.min(MAX_DELAY_MS);
        self.speech_end_debounce_ms = self.speech_end_debounce_ms.min(MAX_DELAY_MS);
        self.auto_restart_ms = self.auto_restart_ms.min(MAX_DELAY_MS);
        self.unmute_resume_ms = self.unmute_resume_ms.min(MAX_DELAY_MS);
        self.connect_warmup_ms = self.connect_warmup_ms.min(MAX_DELAY_MS);
        self.vad.threshold = self.vad.threshold.clamp(0.001, 0.5);
        self.vad.hangover_frames = self.vad.hangover_frames.min(100);
        self.vad.min_speech_frames = self.vad.min_speech_frames.clamp(1, 50);
        self.vad.frame_ms = self.vad.frame_ms.clamp(10, 100);
        self.speech_chars_per_second = if self.speech_chars_per_second.is_finite() {
            self.speech_chars_per_second.clamp(1.0, 200.0)
        } else {
            15.0
        };
    }

    pub fn timing(&self) -> TimingConfig {
        TimingConfig {
            speech_end_debounce: Duration::from_millis(self.speech_end_debounce_ms),
            auto_restart: Duration::from_millis(self.auto_restart_ms),
            unmute_resume: Duration::from_millis(self.unmute_resume_ms),
            connect_warmup: Duration::from_millis(self.connect_warmup_ms),
        }
    }

    /// Engine configuration for these settings.
    ///
    /// Fails when remote dispatch or media output is selected without a
    /// service base URL.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let dispatch = match self.dispatch {
            DispatchKind::Simulation => DispatchMode::Simulation {
                delay_ms: self.simulation_delay_ms,
            },
            DispatchKind::Remote => match &self.service_base_url {
                Some(base_url) => DispatchMode::Remote {
                    base_url: base_url.clone(),
                },
                None => bail!("remote dispatch needs a service base URL (--base-url)"),
            },
        };
        let (output, media_endpoint) = match self.output {
            OutputKind::Local => (OutputMode::LocalSynthesis, None),
            OutputKind::Media => match &self.service_base_url {
                Some(base_url) => (OutputMode::RemoteMedia, Some(format!("{base_url}/whep/"))),
                None => bail!("media output needs a service base URL (--base-url)"),
            },
        };
        Ok(EngineConfig {
            timing: self.timing(),
            output,
            dispatch,
            vad: self.vad,
            media_endpoint,
            clips: self.clips.clone(),
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Avatalk")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("avatalk")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = ?path, "ignoring malformed settings file: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"userName":"Budi","dispatch":"remote"}"#).unwrap();
        assert_eq!(settings.user_name, "Budi");
        assert_eq!(settings.dispatch, DispatchKind::Remote);
        assert_eq!(settings.speech_end_debounce_ms, 150);
        assert_eq!(settings.connect_warmup_ms, 400);
        assert_eq!(settings.clips.talking, "assets/talk.mp4");
    }

    #[test]
    fn normalize_trims_and_clamps() {
        let mut settings = AppSettings {
            service_base_url: Some(" https://live.example/ ".into()),
            preferred_input_device: Some("  ".into()),
            auto_restart_ms: 99_999,
            speech_chars_per_second: f32::NAN,
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(
            settings.service_base_url.as_deref(),
            Some("https://live.example")
        );
        assert_eq!(settings.preferred_input_device, None);
        assert_eq!(settings.auto_restart_ms, MAX_DELAY_MS);
        assert_eq!(settings.speech_chars_per_second, 15.0);
    }

    #[test]
    fn remote_modes_require_base_url() {
        let remote = AppSettings {
            dispatch: DispatchKind::Remote,
            ..AppSettings::default()
        };
        assert!(remote.engine_config().is_err());

        let media = AppSettings {
            output: OutputKind::Media,
            service_base_url: Some("https://live.example".into()),
            ..AppSettings::default()
        };
        let config = media.engine_config().unwrap();
        assert_eq!(config.output, OutputMode::RemoteMedia);
        assert_eq!(
            config.media_endpoint.as_deref(),
            Some("https://live.example/whep/")
        );
    }

    #[test]
    fn save_then_load_roundtrips_through_disk() {
        let dir = std::env::temp_dir().join(format!("avatalk-settings-{}", std::process::id()));
        let path = dir.join("settings.json");
        let settings = AppSettings {
            user_name: "Sari".into(),
            slot_id: 3,
            ..AppSettings::default()
        };
        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path);
        assert_eq!(loaded.user_name, "Sari");
        assert_eq!(loaded.slot_id, 3);
        let _ = fs::remove_dir_all(dir);
    }
}
