use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::media_stream::media_stream_track::MediaStreamTrack;
use crate::peer_connection::math_rand_alpha;
use crate::rtp_transceiver::rtp_codec::RTPCodecType;

/// RTPSender allows an application to control how a given Track is encoded
/// and transmitted to a remote peer. Here it only holds what negotiation
/// announces: the track and the streams it belongs to.
pub struct RTCRtpSender {
    id: String,
    kind: RTPCodecType,
    track: Mutex<Option<Arc<MediaStreamTrack>>>,
    stream_ids: Vec<String>,
    stopped: AtomicBool,
}

impl fmt::Debug for RTCRtpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCRtpSender")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_ids", &self.stream_ids)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl RTCRtpSender {
    pub(crate) fn new(
        kind: RTPCodecType,
        track: Option<Arc<MediaStreamTrack>>,
        stream_ids: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(RTCRtpSender {
            id: format!("RTCRtpSender-{}", math_rand_alpha(12)),
            kind,
            track: Mutex::new(track),
            stream_ids,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// track returns the RTCRtpTransceiver track, or None
    pub async fn track(&self) -> Option<Arc<MediaStreamTrack>> {
        let track = self.track.lock().await;
        track.clone()
    }

    /// stream_ids are the ids of the streams announced with the track.
    pub fn stream_ids(&self) -> &[String] {
        &self.stream_ids
    }

    /// replace_track replaces the track currently being used as the sender's
    /// source with a new track. It never triggers renegotiation.
    pub async fn replace_track(&self, track: Option<Arc<MediaStreamTrack>>) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::ErrRTPTransceiverStopped);
        }
        if let Some(t) = &track {
            if t.kind() != self.kind {
                return Err(Error::ErrRTPSenderNewTrackHasIncorrectKind);
            }
        }

        let mut current = self.track.lock().await;
        *current = track;
        Ok(())
    }

    /// stop irreversibly stops the RTPSender
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::trace!("sender {} stopped", self.id);
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// msid is the `a=msid` value announcing the current track, if any.
    pub(crate) async fn msid(&self) -> Option<String> {
        let track = self.track().await?;
        let stream_id = self
            .stream_ids
            .first()
            .map(String::as_str)
            .unwrap_or("-");
        Some(format!("{stream_id} {}", track.id()))
    }
}
