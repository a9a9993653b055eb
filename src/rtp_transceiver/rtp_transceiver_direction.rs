w3c_enum! {
    /// RTCRtpTransceiverDirection is which way media is meant to flow, as
    /// written in the `a=` direction attribute of a media section.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum RTCRtpTransceiverDirection {
        Sendrecv = 1 => "sendrecv",
        Sendonly = 2 => "sendonly",
        Recvonly = 3 => "recvonly",
        Inactive = 4 => "inactive",
    }
}

impl RTCRtpTransceiverDirection {
    /// reverse is the direction as seen from the other peer.
    pub fn reverse(&self) -> RTCRtpTransceiverDirection {
        match *self {
            RTCRtpTransceiverDirection::Sendonly => RTCRtpTransceiverDirection::Recvonly,
            RTCRtpTransceiverDirection::Recvonly => RTCRtpTransceiverDirection::Sendonly,
            d => d,
        }
    }

    /// intersect keeps only what both directions allow.
    pub fn intersect(&self, other: RTCRtpTransceiverDirection) -> RTCRtpTransceiverDirection {
        Self::from_send_recv(
            self.has_send() && other.has_send(),
            self.has_recv() && other.has_recv(),
        )
    }

    pub fn from_send_recv(send: bool, recv: bool) -> RTCRtpTransceiverDirection {
        match (send, recv) {
            (true, true) => Self::Sendrecv,
            (true, false) => Self::Sendonly,
            (false, true) => Self::Recvonly,
            (false, false) => Self::Inactive,
        }
    }

    pub fn has_send(&self) -> bool {
        matches!(self, Self::Sendrecv | Self::Sendonly)
    }

    pub fn has_recv(&self) -> bool {
        matches!(self, Self::Sendrecv | Self::Recvonly)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use RTCRtpTransceiverDirection::*;

    #[test]
    fn test_rtp_transceiver_direction_string() {
        let tests = vec![
            ("sendrecv", Sendrecv),
            ("sendonly", Sendonly),
            ("recvonly", Recvonly),
            ("inactive", Inactive),
        ];

        for (raw, d) in tests {
            assert_eq!(RTCRtpTransceiverDirection::from(raw), d);
            assert_eq!(d.to_string(), raw);
        }
        assert_eq!(RTCRtpTransceiverDirection::from("both"), Unspecified);
        assert_eq!(Unspecified.to_string(), crate::UNSPECIFIED_STR);
    }

    #[test]
    fn test_rtp_transceiver_direction_send_recv() {
        let tests = vec![
            (Unspecified, false, false),
            (Sendrecv, true, true),
            (Sendonly, true, false),
            (Recvonly, false, true),
            (Inactive, false, false),
        ];

        for (d, send, recv) in tests {
            assert_eq!(d.has_send(), send, "{d}");
            assert_eq!(d.has_recv(), recv, "{d}");
            if d != Unspecified {
                assert_eq!(RTCRtpTransceiverDirection::from_send_recv(send, recv), d);
            }
        }
    }

    #[test]
    fn test_rtp_transceiver_direction_reverse_and_intersect() {
        assert_eq!(Sendonly.reverse(), Recvonly);
        assert_eq!(Recvonly.reverse(), Sendonly);
        assert_eq!(Sendrecv.reverse(), Sendrecv);

        let tests = vec![
            (Sendrecv, Recvonly, Recvonly),
            (Sendrecv, Sendonly, Sendonly),
            (Sendonly, Recvonly, Inactive),
            (Recvonly, Inactive, Inactive),
            (Sendrecv, Sendrecv, Sendrecv),
        ];

        for (a, b, expected) in tests {
            assert_eq!(a.intersect(b), expected, "{a} & {b}");
        }
    }
}
