/// RTCDataChannelInit are the options of `create_data_channel`. At most one
/// of `max_packet_life_time` and `max_retransmits` may be set.
#[derive(Default, Debug, Clone)]
pub struct RTCDataChannelInit {
    /// ordered indicates if data is allowed to be delivered out of order.
    /// Unset means ordered.
    pub ordered: Option<bool>,

    /// partial reliability bound, in milliseconds
    pub max_packet_life_time: Option<u16>,

    /// partial reliability bound, in retransmissions
    pub max_retransmits: Option<u16>,

    /// subprotocol name, at most 65535 bytes
    pub protocol: Option<String>,

    /// negotiated set to true means the application negotiates the channel
    /// out of band and creates it on both peers with the same `id`.
    pub negotiated: bool,

    /// id is the stream id of the channel. It is required when `negotiated`
    /// is set and chosen by the transport otherwise.
    pub id: Option<u16>,
}
