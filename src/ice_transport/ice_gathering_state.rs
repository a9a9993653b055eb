w3c_enum! {
    /// RTCIceGatheringState is the aggregate of every gatherer of a session.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum RTCIceGatheringState {
        /// nothing is gathering and not everything is complete, or there
        /// are no gatherers.
        New = 1 => "new",
        /// some gatherer is gathering.
        Gathering = 2 => "gathering",
        /// there is at least one gatherer and all of them are complete.
        Complete = 3 => "complete",
    }
}
