w3c_enum! {
    /// RTCDtlsTransportState is the handshake progress of one DTLS
    /// transport. See <https://w3c.github.io/webrtc-pc/#dom-rtcdtlstransportstate>.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum RTCDtlsTransportState {
        /// the handshake has not started.
        New = 1 => "new",
        /// the handshake is running or waiting for ICE.
        Connecting = 2 => "connecting",
        /// the handshake finished and the remote fingerprint matched.
        Connected = 3 => "connected",
        Closed = 4 => "closed",
        /// the handshake failed or the remote certificate did not match.
        Failed = 5 => "failed",
    }
}

impl RTCDtlsTransportState {
    /// is_terminal reports whether the transport can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RTCDtlsTransportState::Closed | RTCDtlsTransportState::Failed
        )
    }
}
