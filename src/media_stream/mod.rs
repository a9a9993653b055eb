use std::sync::Arc;

use media_stream_track::{MediaStreamTrack, MediaStreamTrackState};
use tokio::sync::Mutex;

use crate::rtp_transceiver::rtp_codec::RTPCodecType;

pub mod media_stream_track;

/// MediaStream groups tracks that are meant to be rendered together. Its id
/// is what `a=msid` carries in a media section.
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: Mutex<Vec<Arc<MediaStreamTrack>>>,
}

impl MediaStream {
    pub fn new(id: String, tracks: Vec<Arc<MediaStreamTrack>>) -> Self {
        let mut unique: Vec<Arc<MediaStreamTrack>> = vec![];
        for t in tracks {
            if !unique.iter().any(|u| u.id() == t.id()) {
                unique.push(t);
            }
        }

        MediaStream {
            id,
            tracks: Mutex::new(unique),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn get_tracks(&self) -> Vec<Arc<MediaStreamTrack>> {
        let tracks = self.tracks.lock().await;
        tracks.clone()
    }

    pub async fn get_audio_tracks(&self) -> Vec<Arc<MediaStreamTrack>> {
        self.tracks_of_kind(RTPCodecType::Audio).await
    }

    pub async fn get_video_tracks(&self) -> Vec<Arc<MediaStreamTrack>> {
        self.tracks_of_kind(RTPCodecType::Video).await
    }

    async fn tracks_of_kind(&self, kind: RTPCodecType) -> Vec<Arc<MediaStreamTrack>> {
        let tracks = self.tracks.lock().await;
        tracks.iter().filter(|t| t.kind() == kind).cloned().collect()
    }

    pub async fn get_track_by_id(&self, id: &str) -> Option<Arc<MediaStreamTrack>> {
        let tracks = self.tracks.lock().await;
        tracks.iter().find(|t| t.id() == id).cloned()
    }

    /// add_track returns false when a track with the same id is already part
    /// of the stream.
    pub async fn add_track(&self, track: Arc<MediaStreamTrack>) -> bool {
        let mut tracks = self.tracks.lock().await;
        if tracks.iter().any(|t| t.id() == track.id()) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub async fn remove_track(&self, track: &MediaStreamTrack) -> bool {
        let mut tracks = self.tracks.lock().await;
        let before = tracks.len();
        tracks.retain(|t| t.id() != track.id());
        tracks.len() != before
    }

    /// active reports whether at least one track is still live.
    pub async fn active(&self) -> bool {
        let tracks = self.tracks.lock().await;
        tracks
            .iter()
            .any(|t| t.ready_state() == MediaStreamTrackState::Live)
    }
}
