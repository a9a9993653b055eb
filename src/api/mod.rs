pub mod media_engine;
pub mod setting_engine;

use std::sync::Arc;

use media_engine::MediaEngine;
use setting_engine::SettingEngine;

use crate::error::Result;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::RTCPeerConnection;

/// API is the factory for peer connections. Every connection it creates
/// shares its engines, which are frozen once the API is built.
pub struct API {
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: Arc<MediaEngine>,
}

impl API {
    /// new_peer_connection validates `configuration` and returns a session
    /// in the `stable` signaling state.
    pub async fn new_peer_connection(
        &self,
        configuration: RTCConfiguration,
    ) -> Result<RTCPeerConnection> {
        RTCPeerConnection::new(self, configuration).await
    }

    pub fn setting_engine(&self) -> Arc<SettingEngine> {
        Arc::clone(&self.setting_engine)
    }

    pub fn media_engine(&self) -> Arc<MediaEngine> {
        Arc::clone(&self.media_engine)
    }
}

/// APIBuilder assembles an [`API`]. Engines left unset fall back to their
/// defaults, which for the media engine means no codecs at all.
#[derive(Default)]
pub struct APIBuilder {
    setting_engine: SettingEngine,
    media_engine: MediaEngine,
}

impl APIBuilder {
    pub fn new() -> Self {
        APIBuilder::default()
    }

    pub fn with_setting_engine(self, setting_engine: SettingEngine) -> Self {
        APIBuilder {
            setting_engine,
            ..self
        }
    }

    pub fn with_media_engine(self, media_engine: MediaEngine) -> Self {
        APIBuilder {
            media_engine,
            ..self
        }
    }

    pub fn build(self) -> API {
        API {
            setting_engine: Arc::new(self.setting_engine),
            media_engine: Arc::new(self.media_engine),
        }
    }
}
