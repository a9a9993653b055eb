use serde::{Deserialize, Serialize};

w3c_enum! {
    /// RTCSdpType says how a description is to be applied.
    /// See <https://w3c.github.io/webrtc-pc/#dom-rtcsdptype>.
    #[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
    pub enum RTCSdpType {
        #[serde(rename = "offer")]
        Offer = 1 => "offer",
        /// a provisional answer; later answers may replace it.
        #[serde(rename = "pranswer")]
        Pranswer = 2 => "pranswer",
        /// the final answer, completing the exchange.
        #[serde(rename = "answer")]
        Answer = 3 => "answer",
        /// cancels the pending offer and returns to the last stable state.
        #[serde(rename = "rollback")]
        Rollback = 4 => "rollback",
    }
}

impl RTCSdpType {
    /// is_answer reports whether a description of this type answers an offer,
    /// provisionally or finally.
    pub fn is_answer(&self) -> bool {
        matches!(self, RTCSdpType::Answer | RTCSdpType::Pranswer)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sdp_type() {
        let tests = vec![
            ("offer", RTCSdpType::Offer, false),
            ("pranswer", RTCSdpType::Pranswer, true),
            ("answer", RTCSdpType::Answer, true),
            ("rollback", RTCSdpType::Rollback, false),
            ("Offer", RTCSdpType::Unspecified, false),
        ];

        for (raw, typ, is_answer) in tests {
            assert_eq!(RTCSdpType::from(raw), typ, "{raw}");
            assert_eq!(typ.is_answer(), is_answer, "{raw}");
        }
    }
}
