use serde::{Deserialize, Serialize};

use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;

w3c_enum! {
    /// RTCIceTransportPolicy limits which candidates are gathered and
    /// paired. See <https://w3c.github.io/webrtc-pc/#rtcicetransportpolicy-enum>.
    #[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
    pub enum RTCIceTransportPolicy {
        #[serde(rename = "all")]
        All = 1 => "all",
        /// only TURN relay candidates.
        #[serde(rename = "relay")]
        Relay = 2 => "relay",
    }
}

impl RTCIceTransportPolicy {
    /// permits reports whether a candidate of `typ` may be gathered and paired.
    pub fn permits(&self, typ: RTCIceCandidateType) -> bool {
        *self != RTCIceTransportPolicy::Relay || typ == RTCIceCandidateType::Relay
    }
}
