use std::fmt;

use serde::{Deserialize, Serialize};

/// RTCIceProtocol is the transport protocol of a candidate.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RTCIceProtocol {
    #[default]
    Unspecified,
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "tcp")]
    Tcp,
}

/// Candidate lines may carry the protocol in either case (RFC 8839
/// section 5.1), so parsing ignores it.
impl From<&str> for RTCIceProtocol {
    fn from(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "udp" => RTCIceProtocol::Udp,
            "tcp" => RTCIceProtocol::Tcp,
            _ => RTCIceProtocol::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RTCIceProtocol::Udp => "udp",
            RTCIceProtocol::Tcp => "tcp",
            RTCIceProtocol::Unspecified => crate::UNSPECIFIED_STR,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_protocol_ignores_case() {
        let tests = vec![
            ("udp", RTCIceProtocol::Udp),
            ("UDP", RTCIceProtocol::Udp),
            ("Tcp", RTCIceProtocol::Tcp),
            ("sctp", RTCIceProtocol::Unspecified),
        ];

        for (raw, want) in tests {
            assert_eq!(RTCIceProtocol::from(raw), want, "{raw}");
        }
        assert_eq!(RTCIceProtocol::Tcp.to_string(), "tcp");
    }
}
