#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-exported so callers can inspect descriptions with the same types
pub use sdp;

#[macro_use]
mod w3c_enum;

pub mod api;
pub mod data_channel;
pub mod dtls_transport;
pub mod error;
pub mod event_handler;
pub mod ice_transport;
pub mod media_stream;
pub mod peer_connection;
pub mod rtp_transceiver;

pub use error::Error;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";
