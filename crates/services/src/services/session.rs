//! Auth-gated tracking session: verifies the bearer token, owns the single
//! poll loop, and tears it down on logout.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use db::{DBService, models::stored_session::StoredSession};
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utils::geo::Position;

use super::{
    enact_api::{EnactApiError, TipsBackend},
    location_poller::{LocationPoller, TickOutcome},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend error: {0}")]
    Api(#[from] EnactApiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    /// No poll loop; either signed out or torn down.
    Idle,
    /// Poll loop running.
    Polling,
    /// Token rejected mid-session; waiting for re-verification.
    Suspended,
}

/// Snapshot of the session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub authenticated: bool,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<TickOutcome>,
    pub is_moving: bool,
    pub last_position: Option<Position>,
    pub next_check_in_secs: Option<u64>,
    /// Backend id of the current app-usage session.
    pub usage_session_id: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            authenticated: false,
            last_tick_at: None,
            last_outcome: None,
            is_moving: false,
            last_position: None,
            next_check_in_secs: None,
            usage_session_id: None,
        }
    }
}

/// `"<os> <version>"`, sent when a usage session starts.
pub fn device_info() -> String {
    let info = os_info::get();
    format!("{} {}", info.os_type(), info.version())
}

struct ActiveLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveLoop {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Poll loop task failed");
        }
    }
}

/// An open app-usage session and the token it was opened with.
#[derive(Debug, Clone)]
struct UsageSession {
    id: String,
    token: String,
}

/// State shared between the manager and its poll loop task.
#[derive(Clone)]
struct Shared {
    backend: Arc<dyn TipsBackend>,
    poller: Arc<Mutex<LocationPoller>>,
    store: Option<DBService>,
    token: Arc<RwLock<Option<String>>>,
    status: Arc<RwLock<SessionStatus>>,
    usage: Arc<Mutex<Option<UsageSession>>>,
    reverify_interval: Duration,
}

impl Shared {
    /// `authenticated` follows the state: a suspended session holds a token the
    /// backend has rejected.
    async fn set_state(&self, state: SessionState) {
        let mut status = self.status.write().await;
        status.state = state;
        match state {
            SessionState::Polling => status.authenticated = true,
            SessionState::Suspended => status.authenticated = false,
            SessionState::Idle => {}
        }
        if state != SessionState::Polling {
            status.next_check_in_secs = None;
        }
    }

    /// Drop the in-memory token; the stored session is untouched.
    async fn forget_token(&self) {
        self.token.write().await.take();
        self.usage.lock().await.take();
        let mut status = self.status.write().await;
        status.state = SessionState::Idle;
        status.authenticated = false;
        status.next_check_in_secs = None;
        status.usage_session_id = None;
    }

    /// Forget the token everywhere.
    async fn deauthenticate(&self) {
        self.forget_token().await;
        if let Some(db) = &self.store {
            if let Err(e) = StoredSession::clear(&db.pool).await {
                warn!(error = %e, "Failed to clear stored session");
            }
        }
    }

    /// Open a usage session; failures are logged and otherwise ignored.
    async fn begin_usage(&self, token: &str) {
        let device = device_info();
        match self.backend.start_usage_session(token, &device).await {
            Ok(Some(id)) => {
                info!(session_id = %id, device = %device, "Usage session started");
                self.status.write().await.usage_session_id = Some(id.clone());
                *self.usage.lock().await = Some(UsageSession {
                    id,
                    token: token.to_string(),
                });
            }
            Ok(None) => debug!("Usage session start returned no id"),
            Err(e) => warn!(error = %e, "Failed to start usage session"),
        }
    }

    /// Close the open usage session, if any; failures are logged.
    async fn end_usage(&self) {
        let Some(usage) = self.usage.lock().await.take() else {
            return;
        };
        self.status.write().await.usage_session_id = None;
        match self.backend.end_usage_session(&usage.token, &usage.id).await {
            Ok(()) => info!(session_id = %usage.id, "Usage session ended"),
            Err(e) => warn!(session_id = %usage.id, error = %e, "Failed to end usage session"),
        }
    }
}

pub struct SessionManager {
    shared: Shared,
    active: Mutex<Option<ActiveLoop>>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn TipsBackend>,
        poller: LocationPoller,
        store: Option<DBService>,
    ) -> Self {
        let reverify_interval = poller.config().stationary_interval;
        Self {
            shared: Shared {
                backend,
                poller: Arc::new(Mutex::new(poller)),
                store,
                token: Arc::new(RwLock::new(None)),
                status: Arc::new(RwLock::new(SessionStatus::default())),
                usage: Arc::new(Mutex::new(None)),
                reverify_interval,
            },
            active: Mutex::new(None),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.shared.status.read().await.clone()
    }

    /// The held token, including one awaiting re-verification.
    pub async fn token(&self) -> Option<String> {
        self.shared.token.read().await.clone()
    }

    /// The token, only while the backend accepts it.
    pub async fn authenticated_token(&self) -> Option<String> {
        if !self.shared.status.read().await.authenticated {
            return None;
        }
        self.token().await
    }

    /// Verify `token` and, on success, (re)start the poll loop.
    ///
    /// Any running loop is stopped first so at most one exists. If verification
    /// fails the manager is left signed out in memory; only a rejected token
    /// also clears the stored session.
    pub async fn start_with_token(
        &self,
        token: String,
        profile: Option<serde_json::Value>,
    ) -> Result<(), SessionError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("Stopping previous poll loop before re-authenticating");
            previous.stop().await;
        }
        self.shared.end_usage().await;

        match self.shared.backend.verify_token(&token).await {
            Ok(()) => {}
            Err(EnactApiError::Unauthorized) => {
                info!("Token rejected at verification, signing out");
                self.shared.deauthenticate().await;
                return Err(EnactApiError::Unauthorized.into());
            }
            Err(e) => {
                warn!(error = %e, "Token verification failed");
                self.shared.forget_token().await;
                return Err(e.into());
            }
        }

        if let Some(db) = &self.shared.store {
            StoredSession::save(&db.pool, &token, profile.as_ref()).await?;
        }
        *self.shared.token.write().await = Some(token.clone());
        self.shared.set_state(SessionState::Polling).await;
        self.shared.begin_usage(&token).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(self.shared.clone(), cancel.clone()));
        *active = Some(ActiveLoop { cancel, handle });
        info!("Session verified, location polling started");
        Ok(())
    }

    /// Restart from the stored session, if there is one.
    ///
    /// A token the backend rejects is discarded; on other failures it is kept
    /// for the next attempt.
    pub async fn resume_from_store(&self) -> Result<bool, SessionError> {
        let Some(db) = &self.shared.store else {
            return Ok(false);
        };
        let Some(stored) = StoredSession::find(&db.pool).await? else {
            debug!("No stored session");
            return Ok(false);
        };
        let profile = stored.profile.map(|p| p.0);
        self.start_with_token(stored.access_token, profile).await?;
        Ok(true)
    }

    /// Stop polling, end the usage session, forget the token, and tell the backend.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let mut active = self.active.lock().await;
        if let Some(running) = active.take() {
            running.stop().await;
        }
        self.shared.end_usage().await;

        let token = self.shared.token.read().await.clone();
        self.shared.deauthenticate().await;
        let token = token.ok_or(SessionError::NotSignedIn)?;

        if let Err(e) = self.shared.backend.logout(&token).await {
            warn!(error = %e, "Backend logout failed");
        }
        info!("Signed out, location polling stopped");
        Ok(())
    }

    /// Stop polling and end the usage session without discarding credentials.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        if let Some(running) = active.take() {
            running.stop().await;
        }
        self.shared.end_usage().await;
        self.shared.set_state(SessionState::Idle).await;
    }
}

async fn poll_loop(shared: Shared, cancel: CancellationToken) {
    let mut state = SessionState::Polling;

    loop {
        let Some(token) = shared.token.read().await.clone() else {
            break;
        };

        let delay = match state {
            SessionState::Polling => {
                let (outcome, next, is_moving, last_position) = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = async {
                        let mut poller = shared.poller.lock().await;
                        let outcome = poller.tick(&token).await;
                        (outcome, poller.next_interval(), poller.is_moving(), poller.last_reported())
                    } => result,
                };

                {
                    let mut status = shared.status.write().await;
                    status.last_tick_at = Some(Utc::now());
                    status.last_outcome = Some(outcome);
                    status.is_moving = is_moving;
                    status.last_position = last_position;
                    status.next_check_in_secs = Some(next.as_secs());
                }

                if outcome == TickOutcome::Unauthorized {
                    warn!("Backend rejected token during polling, suspending until re-verified");
                    state = SessionState::Suspended;
                    shared.set_state(state).await;
                    continue;
                }
                next
            }
            SessionState::Suspended => {
                let verified = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = shared.backend.verify_token(&token) => result,
                };
                match verified {
                    Ok(()) => {
                        info!("Token re-verified, resuming location polling");
                        state = SessionState::Polling;
                        shared.set_state(state).await;
                        continue;
                    }
                    Err(EnactApiError::Unauthorized) => {
                        info!("Token no longer valid, signing out");
                        shared.deauthenticate().await;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Re-verification failed, will retry");
                        shared.reverify_interval
                    }
                }
            }
            SessionState::Idle => break,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        location::LocationError,
        location_poller::PollerConfig,
        notification::{NotificationChannel, NotificationDispatcher, tests::RecordingNotifier},
        testing::{MockBackend, ScriptedProvider},
    };

    // Consecutive points ~1.1 km apart.
    fn walk(n: usize) -> Vec<Result<Position, LocationError>> {
        (0..n)
            .map(|i| Ok(Position::new(29.0 + 0.01 * i as f64, -82.0)))
            .collect()
    }

    struct Harness {
        provider: Arc<ScriptedProvider>,
        backend: Arc<MockBackend>,
        session: SessionManager,
    }

    fn harness(positions: Vec<Result<Position, LocationError>>, store: Option<DBService>) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(positions));
        let backend = Arc::new(MockBackend::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(RecordingNotifier::default()),
            NotificationChannel::new("enact-tips", "ENACT tips"),
        ));
        let poller = LocationPoller::new(
            provider.clone(),
            backend.clone(),
            dispatcher,
            PollerConfig::default(),
        );
        let session = SessionManager::new(backend.clone(), poller, store);
        Harness {
            provider,
            backend,
            session,
        }
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_starts_only_after_verification() {
        let h = harness(walk(1), None);
        h.backend.push_verify(Err(EnactApiError::Unauthorized));

        let err = h
            .session
            .start_with_token("bad".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Api(EnactApiError::Unauthorized)));

        advance(300).await;
        assert_eq!(h.provider.calls(), 0);
        assert_eq!(h.session.status().await.state, SessionState::Idle);
        assert!(h.session.token().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_adapts_to_movement() {
        let h = harness(walk(10), None);
        h.session.start_with_token("tok".into(), None).await.unwrap();

        // t=0 first report (stationary, 60s), then moving every 30s: 60, 90, 120, 150.
        advance(151).await;
        assert_eq!(h.provider.calls(), 5);
        assert_eq!(h.backend.submitted().len(), 5);

        let status = h.session.status().await;
        assert_eq!(status.state, SessionState::Polling);
        assert!(status.is_moving);
        assert_eq!(status.next_check_in_secs, Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stationary_device_reports_once() {
        let h = harness(vec![Ok(Position::new(29.0, -82.0))], None);
        h.session.start_with_token("tok".into(), None).await.unwrap();

        advance(301).await;
        // Ticks at 0, 60, 120, 180, 240, 300; only the first reaches the backend.
        assert_eq!(h.provider.calls(), 6);
        assert_eq!(h.backend.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_halts_ticks_until_reverified() {
        let h = harness(walk(10), None);
        h.session.start_with_token("tok".into(), None).await.unwrap();
        advance(1).await;
        assert_eq!(h.backend.submitted().len(), 1);

        // Second report is rejected; the first re-verification hits a network error.
        h.backend.push_submit(Err(EnactApiError::Unauthorized));
        h.backend
            .push_verify(Err(EnactApiError::Transport("offline".into())));
        advance(60).await;
        assert_eq!(h.backend.submitted().len(), 2);
        assert_eq!(h.backend.verify_calls(), 2);
        let status = h.session.status().await;
        assert_eq!(status.state, SessionState::Suspended);
        assert!(!status.authenticated);
        // The rejected token is held for re-verification but not handed out.
        assert!(h.session.token().await.is_some());
        assert!(h.session.authenticated_token().await.is_none());

        // No ticks while suspended.
        advance(50).await;
        assert_eq!(h.backend.submitted().len(), 2);
        assert_eq!(h.provider.calls(), 2);

        // Retry at t=120 succeeds and polling resumes immediately.
        advance(10).await;
        assert_eq!(h.backend.verify_calls(), 3);
        assert_eq!(h.backend.submitted().len(), 3);
        let status = h.session.status().await;
        assert_eq!(status.state, SessionState::Polling);
        assert!(status.authenticated);
        assert_eq!(h.session.authenticated_token().await.as_deref(), Some("tok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reauthentication_signs_out_in_memory() {
        let h = harness(walk(20), None);
        h.session.start_with_token("one".into(), None).await.unwrap();
        advance(1).await;
        let ticks_before = h.provider.calls();

        h.backend
            .push_verify(Err(EnactApiError::Transport("offline".into())));
        let err = h
            .session
            .start_with_token("two".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Api(EnactApiError::Transport(_))));

        advance(600).await;
        let status = h.session.status().await;
        assert_eq!(status.state, SessionState::Idle);
        assert!(!status.authenticated);
        assert!(h.session.token().await.is_none());
        assert!(h.session.authenticated_token().await.is_none());
        assert_eq!(h.provider.calls(), ticks_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_session_spans_sign_in_to_logout() {
        let h = harness(walk(10), None);
        h.session.start_with_token("tok".into(), None).await.unwrap();

        assert_eq!(h.backend.usage_started(), vec![device_info()]);
        assert_eq!(
            h.session.status().await.usage_session_id.as_deref(),
            Some("s1")
        );

        h.session.logout().await.unwrap();
        assert_eq!(h.backend.usage_ended(), vec!["s1".to_string()]);
        assert!(h.session.status().await.usage_session_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reauthentication_ends_previous_usage_session() {
        let h = harness(walk(10), None);
        h.session.start_with_token("one".into(), None).await.unwrap();
        h.session.start_with_token("two".into(), None).await.unwrap();
        assert_eq!(h.backend.usage_ended(), vec!["s1".to_string()]);

        h.session.shutdown().await;
        assert_eq!(
            h.backend.usage_ended(),
            vec!["s1".to_string(), "s2".to_string()]
        );
        // Teardown keeps the token for the next start.
        assert_eq!(h.session.token().await.as_deref(), Some("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_reverification_signs_out() {
        let h = harness(walk(10), None);
        h.session.start_with_token("tok".into(), None).await.unwrap();
        advance(1).await;

        h.backend.push_submit(Err(EnactApiError::Unauthorized));
        h.backend.push_verify(Err(EnactApiError::Unauthorized));
        advance(60).await;

        let status = h.session.status().await;
        assert_eq!(status.state, SessionState::Idle);
        assert!(!status.authenticated);
        assert!(h.session.token().await.is_none());

        advance(600).await;
        assert_eq!(h.backend.submitted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_tears_down_timer() {
        let h = harness(walk(10), None);
        h.session.start_with_token("tok".into(), None).await.unwrap();
        advance(1).await;

        h.session.logout().await.unwrap();
        assert_eq!(h.backend.logout_calls(), 1);

        advance(600).await;
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(h.session.status().await.state, SessionState::Idle);
        assert!(matches!(
            h.session.logout().await,
            Err(SessionError::NotSignedIn)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reauthentication_never_stacks_loops() {
        let h = harness(walk(20), None);
        h.session.start_with_token("one".into(), None).await.unwrap();
        h.session.start_with_token("two".into(), None).await.unwrap();
        advance(1).await;
        h.session.start_with_token("three".into(), None).await.unwrap();

        // The second loop ticked once at t=0. The third ticks at t=1 and, since
        // the device keeps moving, every 30s after: 31, 61, 91, 121, 151.
        advance(151).await;
        assert_eq!(h.provider.calls(), 1 + 6);
        assert_eq!(h.session.token().await.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_resume_from_store() {
        let db = DBService::new_in_memory().await.unwrap();
        StoredSession::save(&db.pool, "saved", None).await.unwrap();
        let h = harness(walk(1), Some(db.clone()));

        assert!(h.session.resume_from_store().await.unwrap());
        assert_eq!(h.session.token().await.as_deref(), Some("saved"));

        h.session.shutdown().await;
        assert_eq!(h.session.status().await.state, SessionState::Idle);
        // Teardown keeps credentials for the next start.
        assert!(StoredSession::find(&db.pool).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_stored_token_is_discarded() {
        let db = DBService::new_in_memory().await.unwrap();
        StoredSession::save(&db.pool, "expired", None).await.unwrap();
        let h = harness(walk(1), Some(db.clone()));
        h.backend.push_verify(Err(EnactApiError::Unauthorized));

        assert!(h.session.resume_from_store().await.is_err());
        assert!(StoredSession::find(&db.pool).await.unwrap().is_none());
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_offline_stored_token_is_kept() {
        let db = DBService::new_in_memory().await.unwrap();
        StoredSession::save(&db.pool, "saved", None).await.unwrap();
        let h = harness(walk(1), Some(db.clone()));
        h.backend
            .push_verify(Err(EnactApiError::Transport("offline".into())));

        assert!(h.session.resume_from_store().await.is_err());
        assert!(StoredSession::find(&db.pool).await.unwrap().is_some());
        assert_eq!(h.session.status().await.state, SessionState::Idle);
    }
}
