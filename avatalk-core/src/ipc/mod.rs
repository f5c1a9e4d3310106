//! Serializable event types shared with hosts.
//!
//! Every type derives `serde::Serialize` + `serde::Deserialize` so a host can
//! forward it over whatever bus it uses (terminal renderer, websocket, UI bridge).

pub mod events;
