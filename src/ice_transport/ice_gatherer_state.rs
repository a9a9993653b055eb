w3c_enum! {
    /// RTCIceGathererState is the progress of one gatherer.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum RTCIceGathererState {
        /// gather() has not been called.
        New = 1 => "new",
        /// at least one candidate source is still running. Adding a source
        /// to a complete gatherer comes back here.
        Gathering = 2 => "gathering",
        Complete = 3 => "complete",
        Closed = 4 => "closed",
    }
}
