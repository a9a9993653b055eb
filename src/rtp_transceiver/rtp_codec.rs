use super::PayloadType;

w3c_enum! {
    /// RTPCodecType is the media kind of a codec, track or transceiver.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub enum RTPCodecType {
        Audio = 1 => "audio",
        Video = 2 => "video",
    }
}

/// RTCPFeedback is one `a=rtcp-fb` line of a codec, such as `nack pli`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCPFeedback {
    pub typ: String,
    /// empty when the line has no parameter
    pub parameter: String,
}

/// RTCRtpCodecCapability is a codec as `a=rtpmap`, `a=fmtp` and
/// `a=rtcp-fb` describe it, minus the payload type.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCRtpCodecCapability {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
    pub rtcp_feedback: Vec<RTCPFeedback>,
}

impl RTCRtpCodecCapability {
    /// encoding_name is the subtype of the mime type, as written in an
    /// `a=rtpmap` line.
    pub(crate) fn encoding_name(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.mime_type)
    }
}

/// RTCRtpCodecParameters is a codec together with the payload type it was
/// registered or negotiated under.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCRtpCodecParameters {
    pub capability: RTCRtpCodecCapability,
    pub payload_type: PayloadType,
    pub stats_id: String,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CodecMatch {
    #[default]
    None = 0,
    Partial = 1,
    Exact = 2,
}

/// codec_parameters_fuzzy_search looks `needle` up in `haystack`: an exact
/// match agrees on mime type and fmtp line, a partial one on mime type only.
pub(crate) fn codec_parameters_fuzzy_search(
    needle: &RTCRtpCodecParameters,
    haystack: &[RTCRtpCodecParameters],
) -> (RTCRtpCodecParameters, CodecMatch) {
    let same_mime = |c: &RTCRtpCodecParameters| {
        c.capability
            .mime_type
            .eq_ignore_ascii_case(&needle.capability.mime_type)
    };

    if let Some(c) = haystack
        .iter()
        .find(|c| same_mime(c) && c.capability.sdp_fmtp_line == needle.capability.sdp_fmtp_line)
    {
        return (c.clone(), CodecMatch::Exact);
    }

    if let Some(c) = haystack.iter().find(|c| same_mime(c)) {
        return (c.clone(), CodecMatch::Partial);
    }

    (RTCRtpCodecParameters::default(), CodecMatch::None)
}
