//! Microphone capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block or perform I/O. The callback here only downmixes into a
//! scratch buffer (resized once per device period size) and pushes into the
//! SPSC ring, whose `push_slice` is lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread;
//! `MicrophoneMonitor` does both inside `spawn_blocking`.

pub mod device;

#[cfg(feature = "audio-cpal")]
mod capture;

#[cfg(feature = "audio-cpal")]
pub use capture::AudioCapture;
pub use device::{list_input_devices, DeviceInfo};
