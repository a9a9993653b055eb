use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::event_handler::{EventHandlerFn, EventHandlers, HandlerId};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;

w3c_enum! {
    /// MediaStreamTrackState is the `readyState` of a track.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum MediaStreamTrackState {
        /// the source is attached and may produce media.
        Live = 1 => "live",
        /// the source is detached for good.
        Ended = 2 => "ended",
    }
}

pub type OnEndedHdlrFn = EventHandlerFn<()>;

/// MediaStreamTrack is a single audio or video source. The crate never
/// touches media: a track only carries identity and lifecycle, which is
/// what negotiation needs.
pub struct MediaStreamTrack {
    id: String,
    label: String,
    kind: RTPCodecType,
    enabled: AtomicBool,
    ready_state: AtomicU8,
    on_ended_handlers: EventHandlers<()>,
}

impl fmt::Debug for MediaStreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamTrack")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl MediaStreamTrack {
    pub fn new(id: String, label: String, kind: RTPCodecType) -> Arc<Self> {
        Arc::new(MediaStreamTrack {
            id,
            label,
            kind,
            enabled: AtomicBool::new(true),
            ready_state: AtomicU8::new(MediaStreamTrackState::Live as u8),
            on_ended_handlers: EventHandlers::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// set_enabled toggles whether the track renders its source; a disabled
    /// track stays negotiated.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn ready_state(&self) -> MediaStreamTrackState {
        self.ready_state.load(Ordering::SeqCst).into()
    }

    /// on_ended sets a handler fired when the source of the track ends on
    /// its own, for instance when the remote side stops sending it.
    pub fn on_ended(&self, f: OnEndedHdlrFn) -> HandlerId {
        self.on_ended_handlers.register(f)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.on_ended_handlers.unregister(id)
    }

    /// stop detaches the track from its source. Stopping by the application
    /// does not fire `ended`.
    pub fn stop(&self) {
        if self.set_ended() {
            log::debug!("track {} stopped", self.id);
        }
    }

    /// end is the source going away: the track ends and `ended` fires once.
    pub(crate) async fn end(&self) {
        if self.set_ended() {
            log::debug!("track {} ended", self.id);
            self.on_ended_handlers.emit(()).await;
        }
    }

    fn set_ended(&self) -> bool {
        let previous = self
            .ready_state
            .swap(MediaStreamTrackState::Ended as u8, Ordering::SeqCst);
        previous != MediaStreamTrackState::Ended as u8
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_track_lifecycle() {
        let track = MediaStreamTrack::new(
            "audio-1".to_owned(),
            "microphone".to_owned(),
            RTPCodecType::Audio,
        );
        assert_eq!(track.ready_state(), MediaStreamTrackState::Live);
        assert!(track.enabled());

        let ended = Arc::new(AtomicUsize::new(0));
        let ended2 = Arc::clone(&ended);
        track.on_ended(Box::new(move |_| {
            let ended = Arc::clone(&ended2);
            Box::pin(async move {
                ended.fetch_add(1, Ordering::SeqCst);
            })
        }));

        track.set_enabled(false);
        assert!(!track.enabled());
        assert_eq!(track.ready_state(), MediaStreamTrackState::Live);

        track.end().await;
        track.end().await;
        track.stop();
        assert_eq!(track.ready_state(), MediaStreamTrackState::Ended);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_track_stop_is_silent() {
        let track = MediaStreamTrack::new("v".to_owned(), "camera".to_owned(), RTPCodecType::Video);

        let ended = Arc::new(AtomicUsize::new(0));
        let ended2 = Arc::clone(&ended);
        track.on_ended(Box::new(move |_| {
            let ended = Arc::clone(&ended2);
            Box::pin(async move {
                ended.fetch_add(1, Ordering::SeqCst);
            })
        }));

        track.stop();
        track.end().await;
        assert_eq!(track.ready_state(), MediaStreamTrackState::Ended);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
        assert_eq!(track.ready_state().to_string(), "ended");
    }
}
