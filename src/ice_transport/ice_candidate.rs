use std::fmt;

use crc::{Crc, CRC_32_ISCSI};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;
use crate::ice_transport::ice_parameters::generate_cand_id;
use crate::ice_transport::ice_protocol::RTCIceProtocol;

/// Component IDs of RFC 8445 section 4.
pub const COMPONENT_RTP: u16 = 1;
pub const COMPONENT_RTCP: u16 = 2;

const CANDIDATE_PREFIX: &str = "candidate:";

/// RTCIceCandidate is one transport address, local or remote, in the
/// `a=candidate` grammar of RFC 8839 section 5.1.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCIceCandidate {
    pub stats_id: String,
    pub foundation: String,
    pub priority: u32,
    pub address: String,
    pub protocol: RTCIceProtocol,
    pub port: u16,
    pub typ: RTCIceCandidateType,
    pub component: u16,
    pub related_address: String,
    pub related_port: u16,
    pub tcp_type: String,

    /// Media section the candidate belongs to, filled in by the gatherer.
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl RTCIceCandidate {
    /// unmarshal parses the `candidate-attribute` grammar of RFC 8839
    /// section 5.1. The leading `candidate:` (or `a=candidate:`) is optional
    /// and unknown extension attributes are skipped.
    pub fn unmarshal(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix("a=").unwrap_or(raw);
        let raw = raw.strip_prefix(CANDIDATE_PREFIX).unwrap_or(raw);

        let split: Vec<&str> = raw.split_whitespace().collect();
        if split.len() < 8 {
            return Err(Error::ErrAttributeTooShortICECandidate);
        }

        let foundation = split[0].to_owned();
        let component: u16 = split[1].parse().map_err(|_| Error::ErrParseComponent)?;
        if component == 0 || component > 256 {
            return Err(Error::ErrParseComponent);
        }

        let protocol = RTCIceProtocol::from(split[2]);
        if protocol == RTCIceProtocol::Unspecified {
            return Err(Error::ErrICEProtocolUnknown);
        }

        let priority: u32 = split[3].parse().map_err(|_| Error::ErrParsePriority)?;
        let address = split[4].to_owned();
        let port: u16 = split[5].parse().map_err(|_| Error::ErrParsePort)?;

        if split[6] != "typ" {
            return Err(Error::ErrICECandidateTypeUnknown);
        }
        let typ = RTCIceCandidateType::parse(split[7])?;

        let mut related_address = String::new();
        let mut related_port = 0;
        let mut tcp_type = String::new();

        for pair in split[8..].chunks(2) {
            match pair {
                ["raddr", addr] => related_address = (*addr).to_owned(),
                ["rport", port] => {
                    related_port = port.parse().map_err(|_| Error::ErrParseRelatedAddr)?;
                }
                ["tcptype", value] => tcp_type = (*value).to_owned(),
                [key] if *key == "raddr" || *key == "rport" || *key == "tcptype" => {
                    return Err(Error::ErrParseRelatedAddr);
                }
                _ => {}
            }
        }

        Ok(RTCIceCandidate {
            stats_id: generate_cand_id(),
            foundation,
            priority,
            address,
            protocol,
            port,
            typ,
            component,
            related_address,
            related_port,
            tcp_type,
            ..Default::default()
        })
    }

    /// marshal returns the candidate attribute value, without the
    /// `candidate:` prefix.
    pub fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.typ
        );

        if !self.tcp_type.is_empty() {
            val += format!(" tcptype {}", self.tcp_type).as_str();
        }

        if !self.related_address.is_empty() {
            val += format!(
                " raddr {} rport {}",
                self.related_address, self.related_port,
            )
            .as_str();
        }

        val
    }

    /// local_preference is the maximum for UDP. TCP candidates rank by
    /// tcptype as in RFC 6544 section 4.2.
    pub fn local_preference(&self) -> u16 {
        if self.protocol != RTCIceProtocol::Tcp {
            return u16::MAX;
        }

        // (2^13) * direction-pref + other-pref
        let other_pref: u16 = 8191;
        let direction_pref: u16 = match self.typ {
            RTCIceCandidateType::Host | RTCIceCandidateType::Relay => {
                match self.tcp_type.as_str() {
                    "active" => 6,
                    "passive" => 4,
                    "so" => 2,
                    _ => 0,
                }
            }
            _ => match self.tcp_type.as_str() {
                "so" => 6,
                "active" => 4,
                "passive" => 2,
                _ => 0,
            },
        };

        (1 << 13) * direction_pref + other_pref
    }

    /// compute_priority applies RFC 8445 section 5.1.2.1.
    pub fn compute_priority(&self) -> u32 {
        (1 << 24) * u32::from(self.typ.preference())
            + (1 << 8) * u32::from(self.local_preference())
            + (256 - u32::from(self.component.clamp(1, 256)))
    }

    /// compute_foundation groups candidates of the same type, base address
    /// and transport.
    pub fn compute_foundation(&self) -> String {
        let mut buf = vec![];
        buf.extend_from_slice(self.typ.to_string().as_bytes());
        buf.extend_from_slice(self.address.as_bytes());
        buf.extend_from_slice(self.protocol.to_string().as_bytes());

        let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);

        format!("{checksum}")
    }

    /// finalize fills whatever a candidate source left blank.
    pub(crate) fn finalize(&mut self) {
        if self.stats_id.is_empty() {
            self.stats_id = generate_cand_id();
        }
        if self.component == 0 {
            self.component = COMPONENT_RTP;
        }
        if self.protocol == RTCIceProtocol::Unspecified {
            self.protocol = RTCIceProtocol::Udp;
        }
        if self.priority == 0 {
            self.priority = self.compute_priority();
        }
        if self.foundation.is_empty() {
            self.foundation = self.compute_foundation();
        }
    }

    /// to_json is the form handed to the application's signaling channel.
    pub fn to_json(&self) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: format!("{CANDIDATE_PREFIX}{}", self.marshal()),
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_mline_index,
            username_fragment: self.username_fragment.clone(),
        }
    }

    /// same_transport_address reports whether both candidates name the same
    /// address, port, protocol and component.
    pub(crate) fn same_transport_address(&self, other: &RTCIceCandidate) -> bool {
        self.address == other.address
            && self.port == other.port
            && self.protocol == other.protocol
            && self.component == other.component
    }
}

impl fmt::Display for RTCIceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}{}",
            self.protocol, self.typ, self.address, self.port, self.related_address,
        )
    }
}

/// RTCIceCandidateInit is a candidate as it travels over signaling.
/// An empty `candidate` marks the end of candidates.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_candidate_serialization() {
        let tests = vec![
            (
                RTCIceCandidateInit {
                    candidate: "candidate:abc123".to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                    username_fragment: Some("def".to_string()),
                },
                r#"{"candidate":"candidate:abc123","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"def"}"#,
            ),
            (
                RTCIceCandidateInit {
                    candidate: "candidate:abc123".to_string(),
                    sdp_mid: None,
                    sdp_mline_index: None,
                    username_fragment: None,
                },
                r#"{"candidate":"candidate:abc123","sdpMid":null,"sdpMLineIndex":null,"usernameFragment":null}"#,
            ),
        ];

        for (candidate_init, expected_string) in tests {
            let candidate_data = serde_json::to_string(&candidate_init).expect("marshal");
            assert_eq!(candidate_data, expected_string, "string is not expected");

            let actual_candidate_init =
                serde_json::from_str::<RTCIceCandidateInit>(&candidate_data).expect("unmarshal");
            assert_eq!(actual_candidate_init, candidate_init);
        }
    }

    #[test]
    fn test_ice_candidate_unmarshal() -> Result<()> {
        let host = RTCIceCandidate::unmarshal(
            "candidate:4207374052 1 udp 2130706431 192.168.1.2 50000 typ host generation 0",
        )?;
        assert_eq!(host.foundation, "4207374052");
        assert_eq!(host.component, COMPONENT_RTP);
        assert_eq!(host.protocol, RTCIceProtocol::Udp);
        assert_eq!(host.priority, 2130706431);
        assert_eq!(host.address, "192.168.1.2");
        assert_eq!(host.port, 50000);
        assert_eq!(host.typ, RTCIceCandidateType::Host);

        let srflx = RTCIceCandidate::unmarshal(
            "a=candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx raddr 10.0.0.1 rport 46154",
        )?;
        assert_eq!(srflx.typ, RTCIceCandidateType::Srflx);
        assert_eq!(srflx.related_address, "10.0.0.1");
        assert_eq!(srflx.related_port, 46154);

        let tcp = RTCIceCandidate::unmarshal(
            "1052353102 1 tcp 1518280447 192.168.1.2 9 typ host tcptype active",
        )?;
        assert_eq!(tcp.protocol, RTCIceProtocol::Tcp);
        assert_eq!(tcp.tcp_type, "active");

        Ok(())
    }

    #[test]
    fn test_ice_candidate_unmarshal_failure() {
        let tests = vec![
            ("candidate:1 1 udp 1 1.2.3.4 5 typ", Error::ErrAttributeTooShortICECandidate),
            ("1 x udp 1 1.2.3.4 5 typ host", Error::ErrParseComponent),
            ("1 1 sctp 1 1.2.3.4 5 typ host", Error::ErrICEProtocolUnknown),
            ("1 1 udp -1 1.2.3.4 5 typ host", Error::ErrParsePriority),
            ("1 1 udp 1 1.2.3.4 70000 typ host", Error::ErrParsePort),
            ("1 1 udp 1 1.2.3.4 5 kind host", Error::ErrICECandidateTypeUnknown),
            ("1 1 udp 1 1.2.3.4 5 typ nat", Error::ErrICECandidateTypeUnknown),
            ("1 1 udp 1 1.2.3.4 5 typ srflx raddr", Error::ErrParseRelatedAddr),
            ("1 1 udp 1 1.2.3.4 5 typ srflx raddr 1.1.1.1 rport x", Error::ErrParseRelatedAddr),
        ];

        for (raw, expected_err) in tests {
            assert_eq!(RTCIceCandidate::unmarshal(raw), Err(expected_err), "{raw}");
        }
    }

    #[test]
    fn test_ice_candidate_marshal() -> Result<()> {
        let raw = "842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx raddr 10.0.0.1 rport 46154";
        let candidate = RTCIceCandidate::unmarshal(raw)?;
        assert_eq!(candidate.marshal(), raw);

        let json = candidate.to_json();
        assert_eq!(json.candidate, format!("candidate:{raw}"));

        Ok(())
    }

    #[test]
    fn test_ice_candidate_priority() {
        let mut host = RTCIceCandidate {
            typ: RTCIceCandidateType::Host,
            address: "192.168.1.2".to_owned(),
            port: 5000,
            ..Default::default()
        };
        host.finalize();
        assert_eq!(host.component, COMPONENT_RTP);
        assert_eq!(host.protocol, RTCIceProtocol::Udp);
        assert_eq!(host.priority, 2130706431);

        let mut relay = RTCIceCandidate {
            typ: RTCIceCandidateType::Relay,
            address: "203.0.113.9".to_owned(),
            port: 5000,
            ..Default::default()
        };
        relay.finalize();
        assert!(host.priority > relay.priority);
        assert_ne!(host.foundation, relay.foundation);

        let rtcp = RTCIceCandidate {
            component: COMPONENT_RTCP,
            ..host.clone()
        };
        assert_eq!(rtcp.compute_priority() + 1, host.compute_priority());
        assert_eq!(rtcp.compute_foundation(), host.compute_foundation());
    }
}
