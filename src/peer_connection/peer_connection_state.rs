use serde::{Deserialize, Serialize};

w3c_enum! {
    /// RTCPeerConnectionState folds every ICE and DTLS transport of the
    /// session into one value; see
    /// [`connection_state`](crate::peer_connection::state_reducer::connection_state).
    /// It is derived, never set directly, except for `closed`.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum RTCPeerConnectionState {
        /// nothing has started, everything is closed, or there are no
        /// transports.
        #[serde(rename = "new")]
        New = 1 => "new",
        /// some transport is checking or handshaking and none failed.
        #[serde(rename = "connecting")]
        Connecting = 2 => "connecting",
        /// every transport is connected, completed or closed, and at least
        /// one is connected or completed.
        #[serde(rename = "connected")]
        Connected = 3 => "connected",
        /// some transport lost consent, none failed and none is connecting.
        #[serde(rename = "disconnected")]
        Disconnected = 4 => "disconnected",
        #[serde(rename = "failed")]
        Failed = 5 => "failed",
        #[serde(rename = "closed")]
        Closed = 6 => "closed",
    }
}

/// NegotiationNeededState tracks the negotiation-needed check that runs on
/// the operations queue.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum NegotiationNeededState {
    /// not running and queue is empty
    #[default]
    Empty,
    /// running and queue is empty
    Run,
    /// running and another check is queued
    Queue,
}

impl From<u8> for NegotiationNeededState {
    fn from(v: u8) -> Self {
        match v {
            1 => NegotiationNeededState::Run,
            2 => NegotiationNeededState::Queue,
            _ => NegotiationNeededState::Empty,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_peer_connection_state_strings() {
        let tests = vec![
            ("new", RTCPeerConnectionState::New),
            ("connecting", RTCPeerConnectionState::Connecting),
            ("connected", RTCPeerConnectionState::Connected),
            ("disconnected", RTCPeerConnectionState::Disconnected),
            ("failed", RTCPeerConnectionState::Failed),
            ("closed", RTCPeerConnectionState::Closed),
        ];

        for (raw, state) in tests {
            assert_eq!(RTCPeerConnectionState::from(raw), state);
            assert_eq!(state.to_string(), raw);
            assert_eq!(RTCPeerConnectionState::from(state as u8), state);
        }
        assert_eq!(
            RTCPeerConnectionState::from(42u8),
            RTCPeerConnectionState::Unspecified
        );
    }

    #[test]
    fn test_negotiation_needed_state_from_u8() {
        let tests = vec![
            (0u8, NegotiationNeededState::Empty),
            (1, NegotiationNeededState::Run),
            (2, NegotiationNeededState::Queue),
            (7, NegotiationNeededState::Empty),
        ];

        for (v, want) in tests {
            assert_eq!(NegotiationNeededState::from(v), want);
        }
        assert_eq!(NegotiationNeededState::Queue as u8, 2);
    }
}
