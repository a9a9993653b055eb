use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

w3c_enum! {
    /// RTCIceCandidateType is where a candidate address came from
    /// (RFC 8445 section 5.1.1).
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum RTCIceCandidateType {
        /// an address bound on a local interface.
        #[serde(rename = "host")]
        Host = 1 => "host",
        /// a NAT binding learned from a STUN server.
        #[serde(rename = "srflx")]
        Srflx = 2 => "srflx",
        /// learned from a connectivity check of the peer.
        #[serde(rename = "prflx")]
        Prflx = 3 => "prflx",
        /// allocated on a TURN server.
        #[serde(rename = "relay")]
        Relay = 4 => "relay",
    }
}

impl RTCIceCandidateType {
    /// parse is the strict form of `From<&str>`.
    pub fn parse(raw: &str) -> Result<Self> {
        match RTCIceCandidateType::from(raw) {
            RTCIceCandidateType::Unspecified => Err(Error::ErrICECandidateTypeUnknown),
            typ => Ok(typ),
        }
    }

    /// preference returns the type preference of RFC 8445 section 5.1.2.2.
    pub fn preference(&self) -> u16 {
        match *self {
            RTCIceCandidateType::Host => 126,
            RTCIceCandidateType::Prflx => 110,
            RTCIceCandidateType::Srflx => 100,
            RTCIceCandidateType::Relay | RTCIceCandidateType::Unspecified => 0,
        }
    }
}
