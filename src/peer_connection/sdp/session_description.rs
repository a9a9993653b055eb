use std::io::Cursor;

use sdp::SessionDescription;
use serde::{Deserialize, Serialize};

use super::sdp_type::RTCSdpType;
use crate::error::Result;

/// RTCSessionDescription is a description together with its type, as it
/// travels through the application's signaling channel. Values are never
/// mutated once handed out; the session keeps its own copies.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    #[serde(skip)]
    pub(crate) parsed: Option<SessionDescription>,
}

impl PartialEq for RTCSessionDescription {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_type == other.sdp_type && self.sdp == other.sdp
    }
}

impl RTCSessionDescription {
    /// answer wraps and parses answer SDP.
    pub fn answer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::with_type(RTCSdpType::Answer, sdp)
    }

    /// offer wraps and parses offer SDP.
    pub fn offer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::with_type(RTCSdpType::Offer, sdp)
    }

    /// pranswer wraps and parses a provisional answer.
    pub fn pranswer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::with_type(RTCSdpType::Pranswer, sdp)
    }

    /// A rollback carries no SDP.
    pub fn rollback() -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Rollback,
            ..Default::default()
        }
    }

    fn with_type(sdp_type: RTCSdpType, sdp: String) -> Result<RTCSessionDescription> {
        let parsed = parse_sdp(&sdp)?;
        Ok(RTCSessionDescription {
            sdp_type,
            sdp,
            parsed: Some(parsed),
        })
    }

    /// unmarshal parses `sdp`, ignoring any cached parse.
    pub fn unmarshal(&self) -> Result<SessionDescription> {
        parse_sdp(&self.sdp)
    }

    /// parsed_or_unmarshal returns the cached parse when present.
    pub(crate) fn parsed_or_unmarshal(&self) -> Result<SessionDescription> {
        match &self.parsed {
            Some(parsed) => Ok(parsed.clone()),
            None => self.unmarshal(),
        }
    }
}

fn parse_sdp(raw: &str) -> Result<SessionDescription> {
    Ok(SessionDescription::unmarshal(&mut Cursor::new(raw.as_bytes()))?)
}
