//! Input device enumeration for the host's device picker.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Likely captures system output rather than a voice; the avatar's own
    /// speech would trip the VAD on such a device.
    pub is_loopback_like: bool,
    pub is_recommended: bool,
}

impl DeviceInfo {
    fn new(name: String, is_default: bool) -> Self {
        Self {
            is_loopback_like: is_loopback_like_name(&name),
            name,
            is_default,
            is_recommended: false,
        }
    }

    fn score(&self) -> i32 {
        mic_preference_score(&self.name) + if self.is_default { 2 } else { 0 }
    }
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "virtual output",
    "speakers (",
    "headphones (",
];

const MIC_KEYWORDS: &[&str] = &["microphone", "mic", "array", "headset", "usb", "webcam"];

pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Higher is a better speech microphone.
pub fn mic_preference_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if MIC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    score
}

/// Mark the best candidate and order recommended, real mics, default first.
pub fn rank_devices(mut devices: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    let best = devices
        .iter()
        .enumerate()
        .max_by_key(|(_, d)| d.score())
        .map(|(i, _)| i);
    if let Some(best) = best.and_then(|i| devices.get_mut(i)) {
        best.is_recommended = !best.is_loopback_like;
    }
    devices.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
    devices
}

/// List input devices. Empty if the host reports none or cannot enumerate.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => rank_devices(
            devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    DeviceInfo::new(name, is_default)
                })
                .collect(),
        ),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            default_name
                .map(|name| rank_devices(vec![DeviceInfo::new(name, true)]))
                .unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}
