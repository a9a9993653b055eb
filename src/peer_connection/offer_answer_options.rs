/// RTCOfferAnswerOptions is the part shared by offer and answer options.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct RTCOfferAnswerOptions {
    /// Accepted for API compatibility. No media is processed here, so it has
    /// no effect on the generated description.
    pub voice_activity_detection: bool,
}

#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct RTCAnswerOptions {
    pub offer_answer_options: RTCOfferAnswerOptions,
}

/// RTCOfferOptions tunes `create_offer`.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub struct RTCOfferOptions {
    pub offer_answer_options: RTCOfferAnswerOptions,

    /// regenerate ufrag and pwd on every transport before building the offer
    pub ice_restart: bool,
}
