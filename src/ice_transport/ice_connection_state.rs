w3c_enum! {
    /// RTCIceConnectionState is the aggregate of every ICE transport of a
    /// session, as folded by
    /// [`ice_connection_state`](crate::peer_connection::state_reducer::ice_connection_state).
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum RTCIceConnectionState {
        /// every transport is `new` or `closed`, or there are none.
        New = 1 => "new",
        /// some transport is still `new` or `checking`.
        Checking = 2 => "checking",
        /// every transport is `connected`, `completed` or `closed`.
        Connected = 3 => "connected",
        /// every transport is `completed` or `closed`.
        Completed = 4 => "completed",
        /// some transport lost consent and none failed.
        Disconnected = 5 => "disconnected",
        Failed = 6 => "failed",
        /// the session was closed.
        Closed = 7 => "closed",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_connection_state_strings() {
        let tests = vec![
            ("new", RTCIceConnectionState::New),
            ("checking", RTCIceConnectionState::Checking),
            ("connected", RTCIceConnectionState::Connected),
            ("completed", RTCIceConnectionState::Completed),
            ("disconnected", RTCIceConnectionState::Disconnected),
            ("failed", RTCIceConnectionState::Failed),
            ("closed", RTCIceConnectionState::Closed),
        ];

        for (raw, state) in tests {
            assert_eq!(RTCIceConnectionState::from(raw), state);
            assert_eq!(state.to_string(), raw);
            assert_eq!(RTCIceConnectionState::from(state as u8), state);
        }
    }
}
