w3c_enum! {
    /// RTCIceRole is the agent's part in nominating the candidate pair
    /// (RFC 8445 section 6.1.1). Full agents that send the first offer
    /// control; a full agent facing a lite agent always controls.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum RTCIceRole {
        Controlling = 1 => "controlling",
        Controlled = 2 => "controlled",
    }
}
