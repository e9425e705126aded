//! How challenges and verdict outcomes reach the out-of-band authenticator.

use async_trait::async_trait;
use serde::Serialize;
use vyom_types::Challenge;

use crate::authenticator::VerifyOutcome;

/// Per-recipient delivery counts for one push.
///
/// A failed recipient never aborts delivery to the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Delivery side of the challenge channel.
///
/// The request/response variant hands challenges back in the HTTP response
/// and has nothing to push; the push variant fans out to every live channel
/// registered for the session.
#[async_trait]
pub trait ChallengeTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver_challenge(&self, challenge: &Challenge) -> DeliveryReport;

    async fn deliver_outcome(&self, session_id: &str, outcome: &VerifyOutcome) -> DeliveryReport;
}

/// Transport for clients that poll `/challenge` and post `/verify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollingTransport;

#[async_trait]
impl ChallengeTransport for PollingTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn deliver_challenge(&self, _challenge: &Challenge) -> DeliveryReport {
        DeliveryReport::default()
    }

    async fn deliver_outcome(&self, _session_id: &str, _outcome: &VerifyOutcome) -> DeliveryReport {
        DeliveryReport::default()
    }
}
