use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ice_transport::ice_candidate::{COMPONENT_RTCP, COMPONENT_RTP};

/// RTCRtcpMuxPolicy decides whether RTCP gets its own ICE component.
/// See <https://w3c.github.io/webrtc-pc/#rtcrtcpmuxpolicy-enum>.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum RTCRtcpMuxPolicy {
    Unspecified = 0,
    /// gather for RTP and RTCP, multiplex if the remote can.
    #[serde(rename = "negotiate")]
    Negotiate = 1,
    /// gather for RTP only; a remote without rtcp-mux cannot be answered.
    #[default]
    #[serde(rename = "require")]
    Require = 2,
}

impl From<&str> for RTCRtcpMuxPolicy {
    fn from(raw: &str) -> Self {
        match raw {
            "negotiate" => RTCRtcpMuxPolicy::Negotiate,
            "require" => RTCRtcpMuxPolicy::Require,
            _ => RTCRtcpMuxPolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCRtcpMuxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RTCRtcpMuxPolicy::Negotiate => "negotiate",
            RTCRtcpMuxPolicy::Require => "require",
            RTCRtcpMuxPolicy::Unspecified => crate::UNSPECIFIED_STR,
        })
    }
}

impl RTCRtcpMuxPolicy {
    /// components lists the ICE components candidates are gathered for.
    pub fn components(&self) -> Vec<u16> {
        match *self {
            RTCRtcpMuxPolicy::Negotiate => vec![COMPONENT_RTP, COMPONENT_RTCP],
            _ => vec![COMPONENT_RTP],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rtcp_mux_policy_components() {
        let tests = vec![
            ("require", RTCRtcpMuxPolicy::Require, vec![COMPONENT_RTP]),
            (
                "negotiate",
                RTCRtcpMuxPolicy::Negotiate,
                vec![COMPONENT_RTP, COMPONENT_RTCP],
            ),
        ];

        for (raw, policy, components) in tests {
            assert_eq!(RTCRtcpMuxPolicy::from(raw), policy);
            assert_eq!(policy.to_string(), raw);
            assert_eq!(policy.components(), components);
        }
        assert_eq!(RTCRtcpMuxPolicy::default(), RTCRtcpMuxPolicy::Require);
    }
}
