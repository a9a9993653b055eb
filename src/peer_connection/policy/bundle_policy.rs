use serde::{Deserialize, Serialize};

w3c_enum! {
    /// RTCBundlePolicy decides how many transports the media sections of a
    /// session ride on. See <https://w3c.github.io/webrtc-pc/#rtcbundlepolicy-enum>.
    ///
    /// `balanced` and `max-bundle` put every section on one transport and
    /// announce a BUNDLE group; `max-compat` gives every section its own.
    #[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
    pub enum RTCBundlePolicy {
        #[serde(rename = "balanced")]
        Balanced = 1 => "balanced",
        #[serde(rename = "max-compat")]
        MaxCompat = 2 => "max-compat",
        #[serde(rename = "max-bundle")]
        MaxBundle = 3 => "max-bundle",
    }
}

impl RTCBundlePolicy {
    /// is_bundled reports whether every media section shares one transport.
    pub fn is_bundled(&self) -> bool {
        *self != RTCBundlePolicy::MaxCompat
    }
}
