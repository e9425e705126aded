//! Session-scoped authentication for the Vyom assistant.
//!
//! Three pieces live here:
//!
//! - [`AuthLedger`]: the authoritative per-session record of authenticated
//!   status, failed attempts, pending intents and the outstanding challenge.
//! - [`events`]: the ledger's notification channel. Every ledger transition
//!   is published on an [`AuthEventBus`]; per-session success/failure
//!   callbacks are invoked by a dispatcher task that subscribes to the bus,
//!   so callback delivery never blocks the ledger update that caused it.
//! - [`EdgeAuthenticator`]: the challenge/verdict protocol shared by the
//!   request/response and push transports, parameterised over a
//!   [`ChallengeTransport`].

pub mod authenticator;
pub mod error;
pub mod events;
pub mod ledger;
pub mod locks;
pub mod transport;

pub use authenticator::{ChallengeOutcome, EdgeAuthenticator, VerifyOutcome};
pub use error::AuthError;
pub use events::{
    auth_callback, spawn_callback_dispatcher, AuthCallback, AuthEvent, AuthEventBus, CallbackRegistry,
    ChallengeResolution,
};
pub use ledger::{AuthLedger, LedgerSettings};
pub use locks::{SessionGuard, SessionLocks};
pub use transport::{ChallengeTransport, DeliveryReport, PollingTransport};
