use rand::Rng;
use serde::{Deserialize, Serialize};

pub(crate) const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RUNES_CANDIDATE_ID_FOUNDATION: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/+";

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;

/// RTCIceParameters are the local or remote `a=ice-ufrag`, `a=ice-pwd` and
/// `a=ice-lite` of one ICE transport.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCIceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}

impl RTCIceParameters {
    /// generate returns fresh credentials, as used at start and on ICE restart.
    pub fn generate() -> Self {
        RTCIceParameters {
            username_fragment: generate_ufrag(),
            password: generate_pwd(),
            ice_lite: false,
        }
    }
}

/// generate_random_string draws `n` characters uniformly from `runes`.
pub(crate) fn generate_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = rand::rng();
    std::iter::repeat_with(|| char::from(runes[rng.random_range(0..runes.len())]))
        .take(n)
        .collect()
}

/// generate_cand_id makes the id candidates are reported under in stats.
pub(crate) fn generate_cand_id() -> String {
    format!(
        "candidate:{}",
        generate_random_string(32, RUNES_CANDIDATE_ID_FOUNDATION)
    )
}

pub(crate) fn generate_pwd() -> String {
    generate_random_string(LEN_PWD, RUNES_ALPHA)
}

pub(crate) fn generate_ufrag() -> String {
    generate_random_string(LEN_UFRAG, RUNES_ALPHA)
}
