w3c_enum! {
    /// RTCDataChannelState is the life cycle of one data channel.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum RTCDataChannelState {
        /// created but not yet announced and connected.
        Connecting = 1 => "connecting",
        Open = 2 => "open",
        /// close() was called; teardown is running.
        Closing = 3 => "closing",
        Closed = 4 => "closed",
    }
}
