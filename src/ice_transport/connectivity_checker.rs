use async_trait::async_trait;

use crate::ice_transport::ice_candidate_pair::RTCIceCandidatePair;
use crate::ice_transport::ice_parameters::RTCIceParameters;

/// ConnectivityChecker performs the STUN binding exchange of one candidate
/// pair. It is also used for consent freshness on selected pairs.
#[async_trait]
pub trait ConnectivityChecker: Send + Sync {
    /// check returns true when the pair is usable.
    async fn check(
        &self,
        pair: &RTCIceCandidatePair,
        local: &RTCIceParameters,
        remote: &RTCIceParameters,
    ) -> bool;
}
