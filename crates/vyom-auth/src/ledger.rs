//! The authoritative per-session authentication record.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use vyom_session::{
    ChallengeStore, Clock, MemoryChallengeStore, MemorySessionStore, SessionStore,
    SessionStoreExt, SystemClock,
};
use vyom_types::{
    Challenge, ParkedRequest, SessionState, CHALLENGE_TTL_SECS, MAX_FAILED_ATTEMPTS,
    SESSION_AUTH_TTL_SECS,
};

use crate::error::AuthError;
use crate::events::{AuthCallback, AuthEvent, AuthEventBus, CallbackRegistry, ChallengeResolution};

/// Ledger tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// How long a successful verdict keeps the session authenticated.
    pub session_ttl: Duration,
    /// Validity window of an issued challenge.
    pub challenge_ttl: Duration,
    /// Failed attempts at which the caller is told to stop retrying.
    pub max_failed_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(SESSION_AUTH_TTL_SECS),
            challenge_ttl: Duration::seconds(CHALLENGE_TTL_SECS),
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
        }
    }
}

/// Tracks authenticated/expired status, failed attempts, pending intents,
/// outstanding challenges and callbacks per session.
///
/// Every method is a single atomic store update followed by event
/// publication; publication never waits on subscribers.
pub struct AuthLedger {
    sessions: Arc<dyn SessionStore>,
    challenges: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
    events: AuthEventBus,
    callbacks: Arc<CallbackRegistry>,
    settings: LedgerSettings,
}

impl AuthLedger {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        challenges: Arc<dyn ChallengeStore>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            sessions,
            challenges,
            clock,
            events: AuthEventBus::new(),
            callbacks: Arc::new(CallbackRegistry::new()),
            settings,
        }
    }

    /// A ledger over fresh in-memory stores and the system clock.
    pub fn in_memory(settings: LedgerSettings) -> Self {
        Self::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryChallengeStore::new()),
            Arc::new(SystemClock),
            settings,
        )
    }

    pub fn events(&self) -> &AuthEventBus {
        &self.events
    }

    pub fn callbacks(&self) -> Arc<CallbackRegistry> {
        self.callbacks.clone()
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns the session's state after applying lazy expiry.
    pub fn state(&self, session_id: &str) -> SessionState {
        let now = self.now();
        let (state, expired) = self.sessions.modify(session_id, |s| {
            let expired = expire_if_due(s, now);
            (s.clone(), expired)
        });
        if expired {
            self.publish_expired(session_id);
        }
        state
    }

    /// True while the session holds an unexpired authentication.
    ///
    /// Reading after `auth_expiry` clears the authentication fields.
    pub fn is_authenticated(&self, session_id: &str) -> bool {
        self.state(session_id).authenticated
    }

    /// Marks the session authenticated for `ttl` (the configured session TTL
    /// when `None`), resets failed attempts and resumes voice chat.
    ///
    /// Returns the new expiry.
    pub fn mark_authenticated(
        &self,
        session_id: &str,
        method: &str,
        ttl: Option<Duration>,
    ) -> DateTime<Utc> {
        let now = self.now();
        let expires_at = now + ttl.unwrap_or(self.settings.session_ttl);
        self.sessions.modify(session_id, |s| {
            s.authenticated = true;
            s.auth_timestamp = Some(now);
            s.auth_method = Some(method.to_string());
            s.auth_expiry = Some(expires_at);
            s.failed_attempts = 0;
            s.voice_chat_paused_at = None;
        });
        tracing::info!(session_id = %session_id, method, "session authenticated");
        self.events.publish(AuthEvent::Authenticated {
            session_id: session_id.to_string(),
            method: method.to_string(),
            expires_at,
        });
        expires_at
    }

    /// Counts a failed verdict and returns the new total.
    ///
    /// The transition to the lockout threshold publishes `LockedOut` once;
    /// attempts past the threshold do not publish it again.
    pub fn record_failed_attempt(&self, session_id: &str) -> u32 {
        let attempts = self.sessions.modify(session_id, |s| {
            s.failed_attempts = s.failed_attempts.saturating_add(1);
            s.failed_attempts
        });
        self.events.publish(AuthEvent::FailedAttempt {
            session_id: session_id.to_string(),
            attempts,
        });
        if attempts == self.settings.max_failed_attempts {
            tracing::warn!(session_id = %session_id, attempts, "session reached failed-attempt limit");
            self.events.publish(AuthEvent::LockedOut {
                session_id: session_id.to_string(),
                attempts,
            });
        } else {
            tracing::info!(session_id = %session_id, attempts, "failed authentication attempt");
        }
        attempts
    }

    pub fn set_pending_intent(&self, session_id: &str, intent_type: &str) {
        self.sessions
            .modify(session_id, |s| s.pending_intent = Some(intent_type.to_string()));
    }

    /// Returns and clears the pending intent.
    pub fn take_pending_intent(&self, session_id: &str) -> Option<String> {
        self.sessions.modify(session_id, |s| s.pending_intent.take())
    }

    pub fn park_request(&self, session_id: &str, request: ParkedRequest) {
        self.sessions
            .modify(session_id, |s| s.parked_request = Some(request));
    }

    /// Takes the parked request if, and only if, the session is currently
    /// authenticated. Both checks happen in one store update.
    ///
    /// A parked request with neither an authentication nor an outstanding
    /// challenge behind it can never be replayed and is dropped.
    pub fn take_replayable_request(&self, session_id: &str) -> Option<ParkedRequest> {
        let now = self.now();
        let (request, expired) = self.sessions.modify(session_id, |s| {
            let expired = expire_if_due(s, now);
            let request = if s.authenticated {
                s.parked_request.take()
            } else {
                if s.active_challenge.is_none() {
                    s.parked_request = None;
                }
                None
            };
            (request, expired)
        });
        if expired {
            self.publish_expired(session_id);
        }
        request
    }

    /// Drops both the pending intent and the parked request.
    pub fn clear_pending(&self, session_id: &str) {
        self.sessions.modify(session_id, |s| {
            s.pending_intent = None;
            s.parked_request = None;
        });
    }

    pub fn pause_voice_chat(&self, session_id: &str) {
        let now = self.now();
        self.sessions
            .modify(session_id, |s| s.voice_chat_paused_at = Some(now));
    }

    pub fn voice_chat_pause_time(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(session_id).voice_chat_paused_at
    }

    pub fn store_challenge(&self, challenge: Challenge) {
        self.challenges.store(challenge);
    }

    pub fn get_challenge(&self, challenge_id: &str) -> Option<Challenge> {
        self.challenges.get(challenge_id)
    }

    pub fn challenge_count(&self) -> usize {
        self.challenges.len()
    }

    /// Issues a challenge for `session_id`, records `intent_type` as the
    /// pending intent and pauses voice chat.
    ///
    /// A previously outstanding challenge for the session is superseded.
    pub fn issue_challenge(&self, session_id: &str, intent_type: &str) -> Challenge {
        let now = self.now();
        let challenge =
            Challenge::issue(session_id, intent_type, now).with_ttl(self.settings.challenge_ttl);
        self.challenges.store(challenge.clone());

        let previous = self.sessions.modify(session_id, |s| {
            s.pending_intent = Some(intent_type.to_string());
            s.voice_chat_paused_at = Some(now);
            s.expired_challenge = None;
            s.active_challenge.replace(challenge.challenge_id.clone())
        });

        if let Some(previous) = previous {
            if self.challenges.remove(previous.as_str()).is_some() {
                self.events.publish(AuthEvent::ChallengeResolved {
                    session_id: session_id.to_string(),
                    challenge_id: previous,
                    resolution: ChallengeResolution::Superseded,
                });
            }
        }

        tracing::info!(
            session_id = %session_id,
            challenge_id = %challenge.challenge_id,
            intent_type,
            "authentication challenge issued"
        );
        self.events.publish(AuthEvent::ChallengeIssued {
            session_id: session_id.to_string(),
            challenge_id: challenge.challenge_id.clone(),
            intent_type: intent_type.to_string(),
        });
        challenge
    }

    /// Resolves which outstanding challenge a verdict refers to.
    ///
    /// `requested` names the challenge explicitly; when `None`, the session's
    /// outstanding challenge is used. An expired challenge is retired (and
    /// the request it guarded dropped) before the error is returned. A
    /// challenge the sweep already retired is reported as expired once.
    pub fn outstanding_challenge(
        &self,
        session_id: &str,
        requested: Option<&str>,
    ) -> Result<Challenge, AuthError> {
        let active = self.sessions.get(session_id).active_challenge;
        if active.is_none() {
            let swept = self.sessions.modify(session_id, |s| {
                let matches = match (s.expired_challenge.as_ref(), requested) {
                    (Some(expired), Some(id)) => expired.as_str() == id,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if matches {
                    s.expired_challenge.take()
                } else {
                    None
                }
            });
            if let Some(swept) = swept {
                return Err(AuthError::ChallengeExpired(swept.to_string()));
            }
        }
        let target = match (requested, active.as_ref()) {
            (Some(id), _) => id.to_string(),
            (None, Some(active)) => active.to_string(),
            (None, None) => return Err(AuthError::NoPendingChallenge(session_id.to_string())),
        };

        let challenge = self
            .challenges
            .get(&target)
            .ok_or_else(|| AuthError::UnknownChallenge(target.clone()))?;
        if challenge.session_id != session_id {
            return Err(AuthError::SessionMismatch {
                challenge_id: target,
            });
        }
        if active.as_ref().map(|a| a.as_str()) != Some(target.as_str()) {
            return Err(AuthError::UnknownChallenge(target));
        }
        if challenge.is_expired(self.now()) {
            self.resolve_challenge(session_id, &target, ChallengeResolution::Expired);
            self.clear_pending(session_id);
            return Err(AuthError::ChallengeExpired(target));
        }
        Ok(challenge)
    }

    /// Retires a challenge. Returns false if it was already gone.
    pub fn resolve_challenge(
        &self,
        session_id: &str,
        challenge_id: &str,
        resolution: ChallengeResolution,
    ) -> bool {
        let removed = self.challenges.remove(challenge_id);
        self.sessions.modify(session_id, |s| {
            if s.active_challenge.as_ref().map(|a| a.as_str()) == Some(challenge_id) {
                s.active_challenge = None;
            }
        });
        match removed {
            Some(challenge) => {
                tracing::debug!(
                    session_id = %session_id,
                    challenge_id,
                    ?resolution,
                    "challenge resolved"
                );
                self.events.publish(AuthEvent::ChallengeResolved {
                    session_id: session_id.to_string(),
                    challenge_id: challenge.challenge_id,
                    resolution,
                });
                true
            }
            None => false,
        }
    }

    /// Resets the session to defaults and retires its outstanding challenge.
    pub fn reset(&self, session_id: &str) {
        let active = self.sessions.get(session_id).active_challenge;
        if let Some(active) = active {
            self.resolve_challenge(session_id, active.as_str(), ChallengeResolution::Superseded);
        }
        self.sessions.reset(session_id);
        tracing::info!(session_id = %session_id, "session state reset");
    }

    /// Records activity for idle eviction.
    pub fn touch(&self, session_id: &str) {
        let now = self.now();
        self.sessions.modify(session_id, |s| s.last_seen = Some(now));
    }

    pub fn register_success_callback(&self, session_id: &str, callback: AuthCallback) {
        self.callbacks.register_success(session_id, callback);
    }

    pub fn register_failure_callback(&self, session_id: &str, callback: AuthCallback) {
        self.callbacks.register_failure(session_id, callback);
    }

    /// Retires every challenge past its validity window and drops the
    /// requests they guarded. Returns how many were retired.
    pub fn sweep_expired_challenges(&self) -> usize {
        let expired = self.challenges.remove_expired(self.now());
        for challenge in &expired {
            let session_id = challenge.session_id.as_str();
            let id = challenge.challenge_id.clone();
            self.sessions.modify(session_id, |s| {
                if s.active_challenge.as_ref() == Some(&id) {
                    s.active_challenge = None;
                    s.expired_challenge = Some(id.clone());
                    s.pending_intent = None;
                    s.parked_request = None;
                    s.voice_chat_paused_at = None;
                }
            });
            self.events.publish(AuthEvent::ChallengeResolved {
                session_id: session_id.to_string(),
                challenge_id: id,
                resolution: ChallengeResolution::Expired,
            });
        }
        expired.len()
    }

    /// Evicts sessions idle for longer than `idle_ttl` that hold no live
    /// authentication, challenge or parked request. Returns evicted ids.
    pub fn evict_idle(&self, idle_ttl: Duration) -> Vec<String> {
        let now = self.now();
        let evicted = self.sessions.retain(&mut |_: &str, s: &SessionState| {
            let recent = s.last_seen.is_some_and(|seen| now - seen <= idle_ttl);
            recent || s.is_busy(now)
        });
        for session_id in &evicted {
            self.callbacks.forget(session_id);
        }
        evicted
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn publish_expired(&self, session_id: &str) {
        tracing::info!(session_id = %session_id, "session authentication expired");
        self.events.publish(AuthEvent::AuthExpired {
            session_id: session_id.to_string(),
        });
    }
}

impl std::fmt::Debug for AuthLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLedger")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Clears authentication once its expiry has passed. Returns true if it did.
///
/// Work that was waiting on the lapsed authentication goes with it unless a
/// challenge is still outstanding for it.
fn expire_if_due(state: &mut SessionState, now: DateTime<Utc>) -> bool {
    if !state.authenticated {
        return false;
    }
    let lapsed = state.auth_expiry.map_or(true, |expiry| now > expiry);
    if lapsed {
        state.clear_auth();
        if state.active_challenge.is_none() {
            state.pending_intent = None;
            state.parked_request = None;
        }
    }
    lapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use vyom_session::ManualClock;
    use vyom_types::{IntentLabel, QueryDetails};

    fn ledger_with_clock() -> (AuthLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let ledger = AuthLedger::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryChallengeStore::new()),
            clock.clone(),
            LedgerSettings::default(),
        );
        (ledger, clock)
    }

    fn parked(intent: IntentLabel) -> ParkedRequest {
        ParkedRequest {
            intent,
            details: QueryDetails::from_query("what is my balance"),
            utterance: "what is my balance".into(),
            parked_at: Utc::now(),
        }
    }

    #[test]
    fn never_authenticated_sessions_are_not_authenticated() {
        let (ledger, _) = ledger_with_clock();
        for id in ["a", "b", ""] {
            assert!(!ledger.is_authenticated(id));
        }
    }

    #[test]
    fn authentication_lapses_after_ttl_and_clears_fields() {
        let (ledger, clock) = ledger_with_clock();
        ledger.mark_authenticated("s", "face", Some(Duration::seconds(300)));
        assert!(ledger.is_authenticated("s"));

        clock.advance(Duration::seconds(300));
        assert!(ledger.is_authenticated("s"), "expiry is exclusive of the boundary");

        clock.advance(Duration::seconds(1));
        assert!(!ledger.is_authenticated("s"));
        let state = ledger.state("s");
        assert_eq!(state.auth_method, None);
        assert_eq!(state.auth_expiry, None);
        assert_eq!(state.auth_timestamp, None);
    }

    #[test]
    fn lazy_expiry_publishes_once() {
        let (ledger, clock) = ledger_with_clock();
        let mut rx = ledger.events().subscribe();
        ledger.mark_authenticated("s", "face", None);
        clock.advance(Duration::seconds(301));
        assert!(!ledger.is_authenticated("s"));
        assert!(!ledger.is_authenticated("s"));

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names, vec!["authenticated", "auth_expired"]);
    }

    #[test]
    fn mark_authenticated_resets_attempts_and_pause() {
        let (ledger, _) = ledger_with_clock();
        ledger.record_failed_attempt("s");
        ledger.pause_voice_chat("s");
        assert!(ledger.voice_chat_pause_time("s").is_some());

        ledger.mark_authenticated("s", "face", None);
        let state = ledger.state("s");
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(state.voice_chat_paused_at, None);
        assert_eq!(state.auth_method.as_deref(), Some("face"));
    }

    #[test]
    fn failed_attempts_are_monotonic_and_isolated() {
        let (ledger, _) = ledger_with_clock();
        assert_eq!(ledger.record_failed_attempt("a"), 1);
        assert_eq!(ledger.record_failed_attempt("a"), 2);
        assert_eq!(ledger.record_failed_attempt("b"), 1);
        assert_eq!(ledger.record_failed_attempt("a"), 3);
        assert_eq!(ledger.state("b").failed_attempts, 1);

        ledger.mark_authenticated("b", "face", None);
        assert_eq!(ledger.state("a").failed_attempts, 3);
    }

    #[test]
    fn lockout_is_published_exactly_once() {
        let (ledger, _) = ledger_with_clock();
        let mut rx = ledger.events().subscribe();
        for _ in 0..5 {
            ledger.record_failed_attempt("s");
        }
        let lockouts = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, AuthEvent::LockedOut { .. }))
            .count();
        assert_eq!(lockouts, 1);
    }

    #[test]
    fn pending_intent_is_returned_exactly_once() {
        let (ledger, _) = ledger_with_clock();
        ledger.set_pending_intent("s", "dbquery");
        assert_eq!(ledger.take_pending_intent("s").as_deref(), Some("dbquery"));
        assert_eq!(ledger.take_pending_intent("s"), None);
    }

    #[test]
    fn parked_request_waits_for_authentication() {
        let (ledger, _) = ledger_with_clock();
        let challenge = ledger.issue_challenge("s", "dbquery");
        ledger.park_request("s", parked(IntentLabel::DbQuery));
        assert_eq!(ledger.take_replayable_request("s"), None);
        assert!(ledger.state("s").parked_request.is_some(), "kept while challenged");

        ledger.mark_authenticated("s", "face", None);
        ledger.resolve_challenge("s", challenge.challenge_id.as_str(), ChallengeResolution::Verified);
        let request = ledger.take_replayable_request("s").expect("replayable");
        assert_eq!(request.intent, IntentLabel::DbQuery);
        assert_eq!(ledger.take_replayable_request("s"), None);
    }

    #[test]
    fn unchallenged_parked_request_is_dropped() {
        let (ledger, _) = ledger_with_clock();
        ledger.park_request("s", parked(IntentLabel::DbQuery));
        assert_eq!(ledger.take_replayable_request("s"), None);

        ledger.mark_authenticated("s", "face", None);
        assert_eq!(ledger.take_replayable_request("s"), None);
    }

    #[test]
    fn lapsed_authentication_drops_parked_request() {
        let (ledger, clock) = ledger_with_clock();
        ledger.touch("s");
        let challenge = ledger.issue_challenge("s", "dbquery");
        ledger.park_request("s", parked(IntentLabel::DbQuery));
        ledger.mark_authenticated("s", "face", None);
        ledger.resolve_challenge("s", challenge.challenge_id.as_str(), ChallengeResolution::Verified);

        clock.advance(Duration::seconds(301));
        assert_eq!(ledger.take_replayable_request("s"), None);
        let state = ledger.state("s");
        assert_eq!(state.parked_request, None);
        assert_eq!(state.pending_intent, None);

        ledger.mark_authenticated("s", "face", None);
        assert_eq!(ledger.take_replayable_request("s"), None, "never replayed after re-authentication");

        clock.advance(Duration::days(7));
        assert_eq!(ledger.evict_idle(Duration::minutes(30)), vec!["s".to_string()]);
    }

    #[test]
    fn issuing_supersedes_the_previous_challenge() {
        let (ledger, _) = ledger_with_clock();
        let first = ledger.issue_challenge("s", "dbquery");
        let second = ledger.issue_challenge("s", "service");

        assert_eq!(ledger.challenge_count(), 1);
        assert_eq!(ledger.get_challenge(first.challenge_id.as_str()), None);
        assert_eq!(
            ledger.state("s").active_challenge,
            Some(second.challenge_id.clone())
        );
        assert_eq!(ledger.state("s").pending_intent.as_deref(), Some("service"));
        assert!(ledger.voice_chat_pause_time("s").is_some());

        assert_eq!(
            ledger.outstanding_challenge("s", Some(first.challenge_id.as_str())),
            Err(AuthError::UnknownChallenge(first.challenge_id.to_string()))
        );
    }

    #[test]
    fn outstanding_challenge_checks_owner_and_presence() {
        let (ledger, _) = ledger_with_clock();
        assert_eq!(
            ledger.outstanding_challenge("s", None),
            Err(AuthError::NoPendingChallenge("s".into()))
        );

        let other = ledger.issue_challenge("other", "dbquery");
        ledger.issue_challenge("s", "dbquery");
        assert_eq!(
            ledger.outstanding_challenge("s", Some(other.challenge_id.as_str())),
            Err(AuthError::SessionMismatch {
                challenge_id: other.challenge_id.to_string()
            })
        );
        assert!(ledger.outstanding_challenge("s", None).is_ok());
    }

    #[test]
    fn expired_challenge_is_retired_with_its_request() {
        let (ledger, clock) = ledger_with_clock();
        let challenge = ledger.issue_challenge("s", "dbquery");
        ledger.park_request("s", parked(IntentLabel::DbQuery));

        clock.advance(Duration::seconds(121));
        assert_eq!(
            ledger.outstanding_challenge("s", None),
            Err(AuthError::ChallengeExpired(challenge.challenge_id.to_string()))
        );
        let state = ledger.state("s");
        assert_eq!(state.active_challenge, None);
        assert_eq!(state.parked_request, None);
        assert_eq!(state.pending_intent, None);
        assert_eq!(ledger.challenge_count(), 0);
    }

    #[test]
    fn sweep_retires_only_expired_challenges() {
        let (ledger, clock) = ledger_with_clock();
        ledger.issue_challenge("old", "dbquery");
        clock.advance(Duration::seconds(100));
        let fresh = ledger.issue_challenge("fresh", "dbquery");
        clock.advance(Duration::seconds(30));

        assert_eq!(ledger.sweep_expired_challenges(), 1);
        assert_eq!(ledger.state("old").active_challenge, None);
        assert_eq!(ledger.state("old").pending_intent, None);
        assert_eq!(ledger.state("fresh").active_challenge, Some(fresh.challenge_id));
    }

    #[test]
    fn swept_challenge_is_reported_expired_once() {
        let (ledger, clock) = ledger_with_clock();
        let first = ledger.issue_challenge("s", "dbquery");
        clock.advance(Duration::seconds(121));
        assert_eq!(ledger.sweep_expired_challenges(), 1);

        assert_eq!(
            ledger.outstanding_challenge("s", Some(first.challenge_id.as_str())),
            Err(AuthError::ChallengeExpired(first.challenge_id.to_string()))
        );
        assert_eq!(
            ledger.outstanding_challenge("s", Some(first.challenge_id.as_str())),
            Err(AuthError::UnknownChallenge(first.challenge_id.to_string()))
        );

        let second = ledger.issue_challenge("s", "service");
        clock.advance(Duration::seconds(121));
        ledger.sweep_expired_challenges();
        assert_eq!(
            ledger.outstanding_challenge("s", Some("ch_bogus")),
            Err(AuthError::UnknownChallenge("ch_bogus".into()))
        );
        assert_eq!(
            ledger.outstanding_challenge("s", None),
            Err(AuthError::ChallengeExpired(second.challenge_id.to_string()))
        );
        assert_eq!(
            ledger.outstanding_challenge("s", None),
            Err(AuthError::NoPendingChallenge("s".into()))
        );
    }

    #[test]
    fn new_challenge_clears_swept_marker() {
        let (ledger, clock) = ledger_with_clock();
        let first = ledger.issue_challenge("s", "dbquery");
        clock.advance(Duration::seconds(121));
        ledger.sweep_expired_challenges();
        ledger.issue_challenge("s", "dbquery");
        assert_eq!(
            ledger.outstanding_challenge("s", Some(first.challenge_id.as_str())),
            Err(AuthError::UnknownChallenge(first.challenge_id.to_string()))
        );
    }

    #[test]
    fn evict_idle_spares_busy_and_recent_sessions() {
        let (ledger, clock) = ledger_with_clock();
        ledger.touch("idle");
        ledger.touch("authed");
        ledger.mark_authenticated("authed", "face", Some(Duration::hours(2)));
        ledger.touch("challenged");
        ledger.issue_challenge("challenged", "dbquery");

        clock.advance(Duration::minutes(45));
        ledger.touch("recent");

        let evicted = ledger.evict_idle(Duration::minutes(30));
        assert_eq!(evicted, vec!["idle".to_string()]);
        assert_eq!(ledger.session_count(), 3);
    }

    #[test]
    fn reset_clears_state_and_challenge() {
        let (ledger, _) = ledger_with_clock();
        ledger.mark_authenticated("s", "face", None);
        ledger.issue_challenge("s", "dbquery");
        ledger.reset("s");
        assert_eq!(ledger.state("s"), SessionState::default());
        assert_eq!(ledger.challenge_count(), 0);
    }
}
