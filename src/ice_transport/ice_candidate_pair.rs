use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ice_transport::ice_candidate::*;
use crate::ice_transport::ice_role::RTCIceRole;

/// RTCIceCandidatePairState is the progress of the connectivity check of
/// one pair.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCIceCandidatePairState {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified = 0,

    /// Means a check has not been performed for this pair.
    #[serde(rename = "waiting")]
    Waiting = 1,

    /// Means a check has been sent for this pair, but the transaction is in progress.
    #[serde(rename = "in-progress")]
    InProgress = 2,

    /// Means a check for this pair was already done and failed, either never producing any response
    /// or producing an unrecoverable failure response.
    #[serde(rename = "failed")]
    Failed = 3,

    /// Means a check for this pair was already done and produced a successful result.
    #[serde(rename = "succeeded")]
    Succeeded = 4,
}

impl fmt::Display for RTCIceCandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCIceCandidatePairState::Waiting => "waiting",
            RTCIceCandidatePairState::InProgress => "in-progress",
            RTCIceCandidatePairState::Failed => "failed",
            RTCIceCandidatePairState::Succeeded => "succeeded",
            RTCIceCandidatePairState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// pair_priority computes RFC 8445 section 6.1.2.3: with G the priority
/// of the controlling agent's candidate and D the controlled agent's,
/// pair priority = 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
pub fn pair_priority(controlling: u32, controlled: u32) -> u64 {
    let (g, d) = (controlling, controlled);

    // 1<<32 overflows uint32; and if both g && d are
    // maxUint32, this result would overflow uint64
    ((1 << 32_u64) - 1) * u64::from(std::cmp::min(g, d))
        + 2 * u64::from(std::cmp::max(g, d))
        + u64::from(g > d)
}

/// ICECandidatePair represents an ICE Candidate pair
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCIceCandidatePair {
    stats_id: String,
    pub local: RTCIceCandidate,
    pub remote: RTCIceCandidate,
    pub state: RTCIceCandidatePairState,
    /// Order in which the pair was formed; breaks priority ties.
    pub discovery_order: u64,
}

impl fmt::Display for RTCIceCandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(local) {} <-> (remote) {} [{}]",
            self.local, self.remote, self.state
        )
    }
}

impl RTCIceCandidatePair {
    fn stats_id(local_id: &str, remote_id: &str) -> String {
        format!("{local_id}-{remote_id}")
    }

    /// returns an initialized ICECandidatePair
    /// for the given pair of ICECandidate instances
    pub fn new(local: RTCIceCandidate, remote: RTCIceCandidate, discovery_order: u64) -> Self {
        let stats_id = Self::stats_id(&local.stats_id, &remote.stats_id);
        RTCIceCandidatePair {
            stats_id,
            local,
            remote,
            state: RTCIceCandidatePairState::Waiting,
            discovery_order,
        }
    }

    pub fn id(&self) -> &str {
        &self.stats_id
    }

    pub fn component(&self) -> u16 {
        self.local.component
    }

    /// priority of the pair as seen by an agent in `role`.
    pub fn priority(&self, role: RTCIceRole) -> u64 {
        if role == RTCIceRole::Controlled {
            pair_priority(self.remote.priority, self.local.priority)
        } else {
            pair_priority(self.local.priority, self.remote.priority)
        }
    }

    /// cmp_preference orders pairs best first: higher priority wins, then
    /// the earlier discovered pair.
    pub(crate) fn cmp_preference(&self, other: &Self, role: RTCIceRole) -> Ordering {
        other
            .priority(role)
            .cmp(&self.priority(role))
            .then(self.discovery_order.cmp(&other.discovery_order))
    }

    /// can_pair reports whether a local and a remote candidate may form a
    /// pair: same component, same transport and same address family.
    pub(crate) fn can_pair(local: &RTCIceCandidate, remote: &RTCIceCandidate) -> bool {
        local.component == remote.component
            && local.protocol == remote.protocol
            && local.address.contains(':') == remote.address.contains(':')
    }
}
