w3c_enum! {
    /// RTCIceTransportState is the connectivity of one ICE transport.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum RTCIceTransportState {
        /// waiting for remote credentials and candidates.
        New = 1 => "new",
        /// pairs are being checked.
        Checking = 2 => "checking",
        /// a pair validated; checks may continue for a better one.
        Connected = 3 => "connected",
        /// checks are over and a pair was selected.
        Completed = 4 => "completed",
        /// nothing validated before the failed timeout, or consent never
        /// came back. Only an ICE restart leaves this state.
        Failed = 5 => "failed",
        /// the selected pair lost consent; may return to connected.
        Disconnected = 6 => "disconnected",
        Closed = 7 => "closed",
    }
}

impl RTCIceTransportState {
    /// is_connected reports whether media may flow over the transport.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            RTCIceTransportState::Connected | RTCIceTransportState::Completed
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_transport_state_string() {
        let tests = vec![
            (RTCIceTransportState::New, "new"),
            (RTCIceTransportState::Checking, "checking"),
            (RTCIceTransportState::Connected, "connected"),
            (RTCIceTransportState::Completed, "completed"),
            (RTCIceTransportState::Failed, "failed"),
            (RTCIceTransportState::Disconnected, "disconnected"),
            (RTCIceTransportState::Closed, "closed"),
        ];

        for (state, raw) in tests {
            assert_eq!(state.to_string(), raw);
            assert_eq!(RTCIceTransportState::from(raw), state);
        }
    }

    #[test]
    fn test_ice_transport_state_is_connected() {
        assert!(RTCIceTransportState::Connected.is_connected());
        assert!(RTCIceTransportState::Completed.is_connected());
        assert!(!RTCIceTransportState::Checking.is_connected());
        assert!(!RTCIceTransportState::Disconnected.is_connected());
    }
}
