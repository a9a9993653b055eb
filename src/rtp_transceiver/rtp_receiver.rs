use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::media_stream::media_stream_track::MediaStreamTrack;
use crate::peer_connection::math_rand_alpha;
use crate::rtp_transceiver::rtp_codec::RTPCodecType;

/// RTPReceiver allows an application to inspect the receipt of a Track.
/// Its track exists from the start and ends when the receiver stops.
#[derive(Debug)]
pub struct RTCRtpReceiver {
    kind: RTPCodecType,
    track: Arc<MediaStreamTrack>,
    stopped: AtomicBool,
}

impl RTCRtpReceiver {
    /// new creates a receiver whose track takes `track_id`, or a random id
    /// when the remote side did not name one.
    pub(crate) fn new(kind: RTPCodecType, track_id: Option<String>) -> Arc<Self> {
        let id = track_id.unwrap_or_else(|| math_rand_alpha(16));
        Arc::new(RTCRtpReceiver {
            kind,
            track: MediaStreamTrack::new(id, "remote".to_owned(), kind),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn track(&self) -> &Arc<MediaStreamTrack> {
        &self.track
    }

    /// stop irreversibly stops the RTPReceiver; its track ends.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.track.end().await;
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
