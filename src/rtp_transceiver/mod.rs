
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use log::trace;
use tokio::sync::{Mutex, OnceCell};

use crate::api::media_engine::MediaEngine;
use crate::error::{Error, Result};
use crate::media_stream::media_stream_track::MediaStreamTrack;
use crate::rtp_transceiver::rtp_codec::*;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;

pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver_direction;

/// PayloadType is the RTP payload type number a codec is announced under
/// (RFC 3550 section 3).
pub type PayloadType = u8;

/// RTCRtpTransceiverInit carries the options of `add_transceiver_from_kind`
/// and `add_transceiver_from_track`.
#[derive(Default, Debug, Clone)]
pub struct RTCRtpTransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
    /// ids of the streams the sender's track is announced with.
    pub stream_ids: Vec<String>,
}

pub type NegotiationTrigger =
    Option<Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>>;

/// RTCRtpTransceiver pairs a sender and a receiver behind one media section.
/// Its mid is fixed the first time a description assigns one.
pub struct RTCRtpTransceiver {
    mid: OnceCell<String>,
    sender: Mutex<Arc<RTCRtpSender>>,
    receiver: Arc<RTCRtpReceiver>,

    direction: AtomicU8,
    current_direction: AtomicU8,

    // empty means every codec of `kind` in the media engine
    codecs: Mutex<Vec<RTCRtpCodecParameters>>,

    pub(crate) stopped: AtomicBool,
    pub(crate) kind: RTPCodecType,

    media_engine: Arc<MediaEngine>,

    trigger_negotiation_needed: Mutex<NegotiationTrigger>,
}

impl RTCRtpTransceiver {
    pub(crate) fn new(
        receiver: Arc<RTCRtpReceiver>,
        sender: Arc<RTCRtpSender>,
        direction: RTCRtpTransceiverDirection,
        kind: RTPCodecType,
        media_engine: Arc<MediaEngine>,
        trigger_negotiation_needed: NegotiationTrigger,
    ) -> Arc<Self> {
        Arc::new(RTCRtpTransceiver {
            mid: OnceCell::new(),
            sender: Mutex::new(sender),
            receiver,

            direction: AtomicU8::new(direction as u8),
            current_direction: AtomicU8::new(RTCRtpTransceiverDirection::Unspecified as u8),

            codecs: Mutex::new(vec![]),
            stopped: AtomicBool::new(false),
            kind,
            media_engine,
            trigger_negotiation_needed: Mutex::new(trigger_negotiation_needed),
        })
    }

    /// set_codec_preferences restricts the codecs offered for this
    /// transceiver. Every codec must be known to the media engine; an empty
    /// list restores the engine defaults.
    pub async fn set_codec_preferences(&self, codecs: Vec<RTCRtpCodecParameters>) -> Result<()> {
        let media_engine_codecs = self.media_engine.get_codecs_by_kind(self.kind);
        for codec in &codecs {
            let (_, match_type) = codec_parameters_fuzzy_search(codec, &media_engine_codecs);
            if match_type == CodecMatch::None {
                return Err(Error::ErrRTPTransceiverCodecUnsupported);
            }
        }

        let mut c = self.codecs.lock().await;
        *c = codecs;
        Ok(())
    }

    /// get_codecs returns the preferred codecs, or every codec of this kind
    /// the MediaEngine knows when no preference was set.
    pub(crate) async fn get_codecs(&self) -> Vec<RTCRtpCodecParameters> {
        let codecs = self.codecs.lock().await;
        if codecs.is_empty() {
            self.media_engine.get_codecs_by_kind(self.kind)
        } else {
            codecs.clone()
        }
    }

    /// sender is the current sender. It is replaced when a remote offer
    /// reuses this transceiver.
    pub async fn sender(&self) -> Arc<RTCRtpSender> {
        let sender = self.sender.lock().await;
        sender.clone()
    }

    pub(crate) async fn set_sender(&self, s: Arc<RTCRtpSender>) {
        let mut sender = self.sender.lock().await;
        *sender = s;
    }

    pub fn receiver(&self) -> &Arc<RTCRtpReceiver> {
        &self.receiver
    }

    /// set_mid fixes the mid. A second call fails.
    pub(crate) fn set_mid(&self, mid: String) -> Result<()> {
        self.mid
            .set(mid)
            .map_err(|_| Error::ErrRTPTransceiverCannotChangeMid)
    }

    /// mid is unset until the first offer or answer that includes this
    /// transceiver.
    pub fn mid(&self) -> Option<String> {
        self.mid.get().cloned()
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// direction is the direction the application asked for.
    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction.load(Ordering::SeqCst).into()
    }

    /// set_direction changes the desired direction and flags negotiation
    /// as needed when it actually changed.
    pub async fn set_direction(&self, d: RTCRtpTransceiverDirection) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ErrRTPTransceiverStopped);
        }

        if self.set_direction_internal(d) {
            self.trigger_negotiation_needed().await;
        }
        Ok(())
    }

    pub(crate) fn set_direction_internal(&self, d: RTCRtpTransceiverDirection) -> bool {
        let previous: RTCRtpTransceiverDirection =
            self.direction.swap(d as u8, Ordering::SeqCst).into();

        let changed = d != previous;
        if changed {
            trace!("transceiver {:?} direction {previous} -> {d}", self.mid());
        }
        changed
    }

    /// current_direction is the direction agreed by the last applied answer,
    /// or `Unspecified` before that and once stopped.
    pub fn current_direction(&self) -> RTCRtpTransceiverDirection {
        if self.stopped.load(Ordering::SeqCst) {
            return RTCRtpTransceiverDirection::Unspecified;
        }

        self.current_direction.load(Ordering::SeqCst).into()
    }

    pub(crate) fn set_current_direction(&self, d: RTCRtpTransceiverDirection) {
        let previous: RTCRtpTransceiverDirection = self
            .current_direction
            .swap(d as u8, Ordering::SeqCst)
            .into();

        if d != previous {
            trace!("transceiver {:?} negotiated direction {previous} -> {d}", self.mid());
        }
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// stop irreversibly stops the RTPTransceiver. Its media section is
    /// rejected in the next offer.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.sender().await.stop().await?;
        self.receiver.stop().await?;

        self.set_direction_internal(RTCRtpTransceiverDirection::Inactive);
        self.trigger_negotiation_needed().await;

        Ok(())
    }

    /// set_sending_track swaps the sender's track and moves the direction
    /// between sending and not sending accordingly.
    pub(crate) async fn set_sending_track(&self, track: Option<Arc<MediaStreamTrack>>) -> Result<()> {
        let should_send = track.is_some();
        self.sender().await.replace_track(track).await?;

        let should_recv = self.direction().has_recv();
        self.set_direction_internal(RTCRtpTransceiverDirection::from_send_recv(
            should_send,
            should_recv,
        ));

        Ok(())
    }

    async fn trigger_negotiation_needed(&self) {
        let trigger = self.trigger_negotiation_needed.lock().await;
        if let Some(trigger) = &*trigger {
            (trigger)().await;
        }
    }
}

impl fmt::Debug for RTCRtpTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCRtpTransceiver")
            .field("mid", &self.mid)
            .field("receiver", &self.receiver)
            .field("direction", &self.direction())
            .field("current_direction", &self.current_direction())
            .field("stopped", &self.stopped)
            .field("kind", &self.kind)
            .finish()
    }
}

/// find_by_mid removes and returns the transceiver carrying `mid`.
pub(crate) fn find_by_mid(
    mid: &str,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Option<Arc<RTCRtpTransceiver>> {
    let i = local_transceivers
        .iter()
        .position(|t| t.mid().as_deref() == Some(mid))?;
    Some(local_transceivers.remove(i))
}

/// satisfy_type_and_direction removes and returns an unassociated
/// transceiver of `remote_kind` whose direction best answers
/// `remote_direction`.
pub(crate) fn satisfy_type_and_direction(
    remote_kind: RTPCodecType,
    remote_direction: RTCRtpTransceiverDirection,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Option<Arc<RTCRtpTransceiver>> {
    // most preferred first
    let preferred_directions = match remote_direction {
        RTCRtpTransceiverDirection::Sendrecv => vec![
            RTCRtpTransceiverDirection::Recvonly,
            RTCRtpTransceiverDirection::Sendrecv,
        ],
        RTCRtpTransceiverDirection::Sendonly => vec![RTCRtpTransceiverDirection::Recvonly],
        RTCRtpTransceiverDirection::Recvonly => vec![
            RTCRtpTransceiverDirection::Sendonly,
            RTCRtpTransceiverDirection::Sendrecv,
        ],
        _ => vec![],
    };

    for possible_direction in preferred_directions {
        if let Some(i) = local_transceivers.iter().position(|t| {
            t.mid().is_none()
                && !t.stopped()
                && t.kind == remote_kind
                && possible_direction == t.direction()
        }) {
            return Some(local_transceivers.remove(i));
        }
    }

    None
}
