
pub mod data_channel_init;
pub mod data_channel_state;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use data_channel_init::RTCDataChannelInit;
use data_channel_state::RTCDataChannelState;

use crate::error::{Error, Result};
use crate::event_handler::{EventHandlerFn, EventHandlers, HandlerId};

/// Labels and protocols are limited to what an SCTP DATA_CHANNEL_OPEN
/// message can carry.
pub(crate) const MAX_STRING_SIZE: usize = 65535;

/// Stream id 65535 is reserved.
pub(crate) const MAX_DATA_CHANNEL_ID: u16 = 65534;

pub type OnOpenHdlrFn = EventHandlerFn<()>;
pub type OnCloseHdlrFn = EventHandlerFn<()>;

/// RTCDataChannel is the negotiation-side view of a data channel.
///
/// Framing and delivery belong to the SCTP stack, which lives outside this
/// crate. A channel is announced by the `application` media section and
/// waits in `connecting` until that stack calls [`open`](Self::open).
pub struct RTCDataChannel {
    pub(crate) stats_id: String,
    pub(crate) label: String,
    pub(crate) ordered: bool,
    pub(crate) max_packet_lifetime: Option<u16>,
    pub(crate) max_retransmits: Option<u16>,
    pub(crate) protocol: String,
    pub(crate) negotiated: bool,
    pub(crate) id: Option<u16>,
    ready_state: AtomicU8,

    on_open_handlers: EventHandlers<()>,
    on_close_handlers: EventHandlers<()>,
}

impl RTCDataChannel {
    /// new validates `options` the way createDataChannel does and builds a
    /// channel in the connecting state.
    pub(crate) fn new(label: &str, options: Option<RTCDataChannelInit>) -> Result<Self> {
        let options = options.unwrap_or_default();

        if label.len() > MAX_STRING_SIZE {
            return Err(Error::ErrStringSizeLimit);
        }

        let protocol = options.protocol.unwrap_or_default();
        if protocol.len() > MAX_STRING_SIZE {
            return Err(Error::ErrProtocolTooLarge);
        }

        if options.negotiated && options.id.is_none() {
            return Err(Error::ErrNegotiatedWithoutID);
        }

        if options.max_packet_life_time.is_some() && options.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }

        if let Some(id) = options.id {
            if id > MAX_DATA_CHANNEL_ID {
                return Err(Error::ErrMaxDataChannelID);
            }
        }

        let ids = Arc::new(AtomicU64::new(1));
        Ok(RTCDataChannel {
            stats_id: format!(
                "DataChannel-{}",
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos())
            ),
            label: label.to_owned(),
            ordered: options.ordered.unwrap_or(true),
            max_packet_lifetime: options.max_packet_life_time,
            max_retransmits: options.max_retransmits,
            protocol,
            negotiated: options.negotiated,
            id: if options.negotiated { options.id } else { None },
            ready_state: AtomicU8::new(RTCDataChannelState::Connecting as u8),
            on_open_handlers: EventHandlers::sharing_ids(&ids),
            on_close_handlers: EventHandlers::sharing_ids(&ids),
        })
    }

    /// label need not be unique within a session.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn max_packet_lifetime(&self) -> Option<u16> {
        self.max_packet_lifetime
    }

    pub fn max_retransmits(&self) -> Option<u16> {
        self.max_retransmits
    }

    pub fn protocol(&self) -> &str {
        self.protocol.as_str()
    }

    /// negotiated is true for channels the application set up out of band.
    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    /// id is the stream id. Channels announced in-band get theirs from the
    /// transport once it opens, so it is None until then.
    pub fn id(&self) -> Option<u16> {
        self.id
    }

    pub fn ready_state(&self) -> RTCDataChannelState {
        self.ready_state.load(Ordering::SeqCst).into()
    }

    pub fn on_open(&self, f: OnOpenHdlrFn) -> HandlerId {
        self.on_open_handlers.register(f)
    }

    pub fn on_close(&self, f: OnCloseHdlrFn) -> HandlerId {
        self.on_close_handlers.register(f)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.on_open_handlers.unregister(id) || self.on_close_handlers.unregister(id)
    }

    /// open is called by the SCTP stack once the channel is usable.
    pub async fn open(&self) -> Result<()> {
        let swapped = self.ready_state.compare_exchange(
            RTCDataChannelState::Connecting as u8,
            RTCDataChannelState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if swapped.is_err() {
            return Err(Error::ErrConnectionClosed);
        }

        log::debug!("data channel {} open", self.label);
        self.on_open_handlers.emit(()).await;
        Ok(())
    }

    /// close moves the channel straight to `closed` and fires `on_close`
    /// once. Closing again is a no-op.
    pub async fn close(&self) -> Result<()> {
        // nothing is buffered here, so closing completes at once
        let mut current = self.ready_state.load(Ordering::SeqCst);
        loop {
            match RTCDataChannelState::from(current) {
                RTCDataChannelState::Closing | RTCDataChannelState::Closed => return Ok(()),
                _ => {}
            }
            match self.ready_state.compare_exchange(
                current,
                RTCDataChannelState::Closed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        log::debug!("data channel {} closed", self.label);
        self.on_close_handlers.emit(()).await;
        Ok(())
    }
}

impl std::fmt::Debug for RTCDataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCDataChannel")
            .field("label", &self.label)
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("negotiated", &self.negotiated)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

pub(crate) fn id_in_use(channels: &[Arc<RTCDataChannel>], id: u16) -> bool {
    channels.iter().any(|d| d.id == Some(id))
}
