#[cfg(test)]
mod media_engine_test;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::{
    codec_parameters_fuzzy_search, CodecMatch, RTCPFeedback, RTCRtpCodecCapability,
    RTCRtpCodecParameters, RTPCodecType,
};

// mime types compare case-insensitively
pub const MIME_TYPE_H264: &str = "video/H264";
pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_VP9: &str = "video/VP9";
pub const MIME_TYPE_AV1: &str = "video/AV1";
pub const MIME_TYPE_G722: &str = "audio/G722";
pub const MIME_TYPE_PCMU: &str = "audio/PCMU";
pub const MIME_TYPE_PCMA: &str = "audio/PCMA";

/// MediaEngine lists the codecs written into media sections. It only
/// describes them: encoding and packetization are left to the application.
/// Once built into an [`API`](crate::api::API) it is shared, read-only, by
/// every connection of that API.
#[derive(Default, Clone)]
pub struct MediaEngine {
    pub(crate) video_codecs: Vec<RTCRtpCodecParameters>,
    pub(crate) audio_codecs: Vec<RTCRtpCodecParameters>,
}

fn codec(
    mime_type: &str,
    clock_rate: u32,
    channels: u16,
    sdp_fmtp_line: &str,
    rtcp_feedback: &[RTCPFeedback],
    payload_type: u8,
) -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: mime_type.to_owned(),
            clock_rate,
            channels,
            sdp_fmtp_line: sdp_fmtp_line.to_owned(),
            rtcp_feedback: rtcp_feedback.to_vec(),
        },
        payload_type,
        ..Default::default()
    }
}

impl MediaEngine {
    /// register_default_codecs registers the default codecs supported by
    /// browsers. It is not safe for concurrent use.
    pub fn register_default_codecs(&mut self) -> Result<()> {
        for c in [
            codec(MIME_TYPE_OPUS, 48000, 2, "minptime=10;useinbandfec=1", &[], 111),
            codec(MIME_TYPE_G722, 8000, 0, "", &[], 9),
            codec(MIME_TYPE_PCMU, 8000, 0, "", &[], 0),
            codec(MIME_TYPE_PCMA, 8000, 0, "", &[], 8),
        ] {
            self.register_codec(c, RTPCodecType::Audio)?;
        }

        let feedback = |typ: &str, parameter: &str| RTCPFeedback {
            typ: typ.to_owned(),
            parameter: parameter.to_owned(),
        };
        let video_rtcp_feedback = vec![
            feedback("goog-remb", ""),
            feedback("ccm", "fir"),
            feedback("nack", ""),
            feedback("nack", "pli"),
        ];
        for c in [
            codec(MIME_TYPE_VP8, 90000, 0, "", &video_rtcp_feedback, 96),
            codec(MIME_TYPE_VP9, 90000, 0, "profile-id=0", &video_rtcp_feedback, 98),
            codec(
                MIME_TYPE_H264,
                90000,
                0,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
                &video_rtcp_feedback,
                102,
            ),
            codec(
                MIME_TYPE_H264,
                90000,
                0,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
                &video_rtcp_feedback,
                125,
            ),
            codec(MIME_TYPE_AV1, 90000, 0, "", &video_rtcp_feedback, 41),
        ] {
            self.register_codec(c, RTPCodecType::Video)?;
        }

        Ok(())
    }

    fn add_codec(codecs: &mut Vec<RTCRtpCodecParameters>, codec: RTCRtpCodecParameters) {
        if codecs.iter().any(|c| {
            c.capability.mime_type == codec.capability.mime_type
                && c.payload_type == codec.payload_type
        }) {
            return;
        }
        codecs.push(codec);
    }

    /// register_codec makes `codec` available for `typ`. A codec already
    /// registered with the same mime type and payload type is kept as is.
    pub fn register_codec(&mut self, mut codec: RTCRtpCodecParameters, typ: RTPCodecType) -> Result<()> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        codec.stats_id = format!("RTPCodec-{nanos}");

        match typ {
            RTPCodecType::Audio => MediaEngine::add_codec(&mut self.audio_codecs, codec),
            RTPCodecType::Video => MediaEngine::add_codec(&mut self.video_codecs, codec),
            RTPCodecType::Unspecified => return Err(Error::ErrUnknownType),
        }
        Ok(())
    }

    /// get_codecs_by_kind returns the registered codecs of one kind, in
    /// registration order.
    pub fn get_codecs_by_kind(&self, typ: RTPCodecType) -> Vec<RTCRtpCodecParameters> {
        match typ {
            RTPCodecType::Audio => self.audio_codecs.clone(),
            RTPCodecType::Video => self.video_codecs.clone(),
            RTPCodecType::Unspecified => vec![],
        }
    }

    /// match_remote_codecs keeps the codecs the remote side offered that are
    /// also registered here, under the remote payload types. Exact matches
    /// win; mime-type-only matches are used when nothing matches exactly.
    pub(crate) fn match_remote_codecs(
        &self,
        typ: RTPCodecType,
        remote_codecs: &[RTCRtpCodecParameters],
    ) -> Vec<RTCRtpCodecParameters> {
        let local_codecs = self.get_codecs_by_kind(typ);

        let mut exact = vec![];
        let mut partial = vec![];
        for remote in remote_codecs {
            let (local, m) = codec_parameters_fuzzy_search(remote, &local_codecs);
            let negotiated = RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    rtcp_feedback: local.capability.rtcp_feedback.clone(),
                    ..remote.capability.clone()
                },
                payload_type: remote.payload_type,
                stats_id: local.stats_id,
            };
            match m {
                CodecMatch::Exact => exact.push(negotiated),
                CodecMatch::Partial => partial.push(negotiated),
                CodecMatch::None => {}
            }
        }

        if exact.is_empty() {
            partial
        } else {
            exact
        }
    }
}
