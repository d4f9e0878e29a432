//! Session management: sign-in, sign-up, restore, and sign-out.
//!
//! `SessionManager` is the single owner of "who is signed in and with
//! what profile". Credential calls run through a FIFO retry queue so
//! concurrent UI actions never produce parallel sign-in or sign-up
//! requests; tokens live in a pluggable vault; an inactivity countdown
//! signs the user out after a period with no recorded activity.

use crate::backend::SessionBackend;
use crate::error::{queued_auth_error, queued_creation_error, SessionError, SessionResult};
use crate::events::AuthEvent;
use crate::fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionState};
use crate::inactivity::{ActivitySignal, InactivityTimer};
use crate::profile::{normalize_account_type, Profile, ProfileUpdate};
use futures_util::FutureExt;
use retry_queue::{RetryQueue, RetryQueueConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use supabase_gateway::{AuthSession, AuthUser, GatewayError};
use token_vault::{SessionVault, StoredSessionMeta};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long with no recorded activity before an automatic sign-out.
    pub inactivity_timeout: Duration,
    /// Retry and pacing policy for queued credential calls.
    pub queue: RetryQueueConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(10 * 60),
            queue: RetryQueueConfig::default(),
        }
    }
}

/// Result of a completed sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub user_id: Uuid,
    pub email: Option<String>,
    /// Whether the resolved profile has name, city and account type set.
    pub profile_complete: bool,
}

/// Everything a queued credential operation resolves to.
struct SessionBundle {
    /// Granted session; `None` when sign-up still awaits confirmation.
    session: Option<AuthSession>,
    user: AuthUser,
    profile: Profile,
}

/// Session manager with FSM-based state tracking.
///
/// Cheap to clone; every clone shares the same session state. Construct
/// once at process start, call [`start()`](Self::start), then hand
/// clones to whatever consumes it.
#[derive(Clone)]
pub struct SessionManager {
    gateway: Arc<dyn SessionBackend>,
    vault: Arc<SessionVault>,
    /// Internal FSM for lifecycle transitions.
    fsm: Arc<Mutex<SessionMachine>>,
    /// Cached profile for the signed-in user.
    profile: Arc<Mutex<Option<Profile>>>,
    /// Serializes sign-in and sign-up calls.
    queue: Arc<RetryQueue<SessionBundle, GatewayError>>,
    event_tx: broadcast::Sender<AuthEvent>,
    inactivity: Arc<InactivityTimer>,
}

impl SessionManager {
    /// Create a new session manager. The retry queue worker is not
    /// running until [`start()`](Self::start) is called.
    pub fn new(
        gateway: Arc<dyn SessionBackend>,
        vault: SessionVault,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            gateway,
            vault: Arc::new(vault),
            fsm: Arc::new(Mutex::new(SessionMachine::new())),
            profile: Arc::new(Mutex::new(None)),
            queue: Arc::new(RetryQueue::new(config.queue)),
            event_tx,
            inactivity: Arc::new(InactivityTimer::new(config.inactivity_timeout)),
        }
    }

    /// Spawn the retry queue worker.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn start(&self) {
        self.queue.start();
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        let fsm = self.fsm.lock().unwrap();
        SessionState::from(fsm.state())
    }

    /// Whether a user is currently signed in.
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Cached profile for the signed-in user, if one has been resolved.
    pub fn cached_profile(&self) -> Option<Profile> {
        self.profile.lock().unwrap().clone()
    }

    /// Signed-in user id, if any.
    pub fn current_user_id(&self) -> SessionResult<Option<Uuid>> {
        Ok(self.vault.get_session_meta()?.map(|meta| meta.user_id))
    }

    /// Stored session metadata (user id, email, expiry), if any.
    pub fn session_meta(&self) -> SessionResult<Option<StoredSessionMeta>> {
        Ok(self.vault.get_session_meta()?)
    }

    /// Record user activity, postponing the inactivity sign-out.
    pub fn record_activity(&self, signal: ActivitySignal) {
        trace!(?signal, "User activity");
        self.inactivity.touch();
    }

    /// Reject every queued credential operation with a cancellation.
    /// Used for recovery and teardown.
    pub async fn clear_pending_operations(&self) {
        self.queue.clear_all().await;
    }

    /// Restore a persisted session on startup.
    ///
    /// An unexpired stored session is verified with the backend; an
    /// expired one gets a single refresh attempt. Either way the state
    /// leaves `Initializing`, and the resulting state is returned.
    pub async fn restore(&self) -> SessionResult<SessionState> {
        if !self.vault.has_session()? {
            info!("No stored session found");
            return self.transition(&SessionMachineInput::RestoreFailed);
        }

        let Some(meta) = self.vault.get_session_meta()? else {
            info!("Stored tokens have no session metadata, clearing");
            self.vault.clear_session()?;
            return self.transition(&SessionMachineInput::RestoreFailed);
        };

        if self.vault.is_session_expired()? {
            info!(user_id = %meta.user_id, "Stored session expired, attempting refresh");

            let Some(refresh_token) = self.vault.get_refresh_token()? else {
                warn!("Expired session has no refresh token, clearing");
                self.vault.clear_session()?;
                return self.transition(&SessionMachineInput::RestoreFailed);
            };

            return match self.gateway.refresh_session(&refresh_token).await {
                Ok(session) => {
                    self.vault.set_session(
                        &session.access_token,
                        &session.refresh_token,
                        session.user.id,
                        session.user.email.as_deref(),
                        session.expires_at,
                    )?;
                    self.finish_restore(session.user, Some(session.access_token))
                        .await
                }
                Err(err) => {
                    warn!(error = %err, "Session refresh failed on restore, clearing");
                    self.vault.clear_session()?;
                    self.transition(&SessionMachineInput::RestoreFailed)
                }
            };
        }

        let Some(access_token) = self.vault.get_access_token()? else {
            self.vault.clear_session()?;
            return self.transition(&SessionMachineInput::RestoreFailed);
        };

        // Not expired locally; confirm the backend still accepts the token
        match self.gateway.get_user(&access_token).await {
            Ok(user) => self.finish_restore(user, Some(access_token)).await,
            Err(err) if err.is_transient() => {
                // Keep the stored tokens; the next startup retries
                warn!(error = %err, "Could not verify stored session");
                self.transition(&SessionMachineInput::RestoreFailed)
            }
            Err(err) => {
                warn!(error = %err, "Backend rejected stored session, clearing");
                let user_deleted = err.is_user_missing();
                self.vault.clear_session()?;
                let state = self.transition(&SessionMachineInput::RestoreFailed)?;
                if user_deleted {
                    let _ = self.event_tx.send(AuthEvent::UserDeleted);
                }
                Ok(state)
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// The email is trimmed and lowercased before it reaches the
    /// backend. The credential grant and the follow-up profile
    /// resolution run as one queued operation, so concurrent sign-in
    /// attempts execute strictly one at a time.
    pub async fn sign_in(&self, email: &str, password: &str) -> SessionResult<SignInOutcome> {
        let email = normalize_email(email);
        let password = password.to_string();
        let gateway = Arc::clone(&self.gateway);

        let bundle = self
            .queue
            .enqueue("sign_in", move || {
                let gateway = Arc::clone(&gateway);
                let email = email.clone();
                let password = password.clone();
                async move {
                    let session = gateway.sign_in_with_password(&email, &password).await?;
                    let profile = fetch_or_repair_profile(
                        gateway.as_ref(),
                        &session.user,
                        Some(&session.access_token),
                    )
                    .await?;
                    Ok(SessionBundle {
                        user: session.user.clone(),
                        session: Some(session),
                        profile,
                    })
                }
                .boxed()
            })
            .await
            .map_err(|err| {
                self.settle_initializing();
                queued_auth_error(err)
            })?;

        self.install_session(bundle)
    }

    /// Create an account with a minimal default profile.
    ///
    /// Runs through the same queue as sign-in. The profile starts with
    /// the platform's lowest tier and default city; the user is expected
    /// to edit both in the registration flow.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        phone: Option<&str>,
    ) -> SessionResult<SignInOutcome> {
        let email = normalize_email(email);
        let password = password.to_string();
        let phone = phone.map(String::from);
        let gateway = Arc::clone(&self.gateway);

        let bundle = self
            .queue
            .enqueue("sign_up", move || {
                let gateway = Arc::clone(&gateway);
                let email = email.clone();
                let password = password.clone();
                let phone = phone.clone();
                async move {
                    if gateway.email_exists(&email).await? {
                        return Err(GatewayError::EmailTaken);
                    }

                    let outcome = gateway.sign_up(&email, &password).await?;
                    let profile = Profile::minimal(outcome.user.id, Some(&email), phone.as_deref());

                    match &outcome.session {
                        Some(session) => {
                            upsert_profile(
                                gateway.as_ref(),
                                &profile,
                                Some(&session.access_token),
                            )
                            .await?;
                        }
                        // Confirmation pending grants no token yet; the
                        // repair pass on first sign-in writes the row
                        None => {
                            debug!(user_id = %outcome.user.id, "Deferring profile row until confirmation");
                        }
                    }

                    Ok(SessionBundle {
                        user: outcome.user,
                        session: outcome.session,
                        profile,
                    })
                }
                .boxed()
            })
            .await
            .map_err(|err| {
                self.settle_initializing();
                queued_creation_error(err)
            })?;

        self.install_session(bundle)
    }

    /// Sign out and clear all local session state.
    ///
    /// Safe to call when already signed out.
    pub async fn sign_out(&self) -> SessionResult<()> {
        self.inactivity.stop();

        if let Some(access_token) = self.vault.get_access_token()? {
            // Best-effort; local state is cleared regardless
            if let Err(err) = self.gateway.sign_out(&access_token).await {
                warn!(error = %err, "Backend sign-out failed");
            }
        }

        self.vault.clear_session()?;
        *self.profile.lock().unwrap() = None;

        if self.transition(&SessionMachineInput::SignedOut).is_ok() {
            info!("Signed out");
            let _ = self.event_tx.send(AuthEvent::SignedOut);
        }

        Ok(())
    }

    /// Current session with a valid access token.
    ///
    /// An expired stored session gets one refresh attempt; if that fails
    /// or nothing usable remains, the user is signed out and `None` is
    /// returned. Never hands back an expired session.
    pub async fn get_valid_session(&self) -> SessionResult<Option<AuthSession>> {
        if !self.vault.has_session()? {
            return Ok(None);
        }

        if !self.vault.is_session_expired()? {
            return self.stored_session();
        }

        let Some(refresh_token) = self.vault.get_refresh_token()? else {
            self.sign_out().await?;
            return Ok(None);
        };

        match self.gateway.refresh_session(&refresh_token).await {
            Ok(session) => {
                self.vault.set_session(
                    &session.access_token,
                    &session.refresh_token,
                    session.user.id,
                    session.user.email.as_deref(),
                    session.expires_at,
                )?;
                info!(user_id = %session.user.id, "Session refreshed");
                Ok(Some(session))
            }
            Err(err) => {
                warn!(error = %err, "Session refresh failed, signing out");
                self.sign_out().await?;
                Ok(None)
            }
        }
    }

    /// Merge fields into the cached profile without a remote write.
    ///
    /// Optimistic display-only update; a no-op when no profile has been
    /// resolved yet.
    pub fn update_local_profile(&self, update: ProfileUpdate) {
        let mut cached = self.profile.lock().unwrap();
        match cached.as_mut() {
            Some(profile) => profile.apply(&update),
            None => warn!("No cached profile to update"),
        }
    }

    /// Validate and write profile fields for `user_id` as an upsert
    /// keyed by id.
    ///
    /// The account type, when present, must be one of the two platform
    /// tiers (case-insensitive; stored lowercase).
    pub async fn persist_profile(
        &self,
        user_id: Uuid,
        mut update: ProfileUpdate,
    ) -> SessionResult<()> {
        if let Some(raw) = &update.account_type {
            let normalized = normalize_account_type(raw)
                .ok_or_else(|| SessionError::InvalidAccountType(raw.clone()))?;
            update.account_type = Some(normalized);
        }

        let mut body = serde_json::to_value(&update)
            .map_err(|err| SessionError::Creation(err.to_string()))?;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert(
                "id".to_string(),
                serde_json::Value::String(user_id.to_string()),
            );
        }

        let access_token = self.vault.get_access_token()?;
        self.gateway
            .upsert_profile(&body, access_token.as_deref())
            .await
            .map_err(SessionError::creation)?;

        info!(user_id = %user_id, "Profile saved");

        // Keep the cache in line with what was written
        let mut cached = self.profile.lock().unwrap();
        if let Some(profile) = cached.as_mut() {
            if profile.id == user_id {
                profile.apply(&update);
            }
        }

        Ok(())
    }

    /// A rejected credential attempt must settle a store that is still
    /// initializing: there is no session, so the state becomes
    /// unauthenticated instead of staying in limbo when `restore()` was
    /// never called first.
    fn settle_initializing(&self) {
        let mut fsm = self.fsm.lock().unwrap();
        if *fsm.state() == SessionMachineState::Initializing {
            let _ = fsm.consume(&SessionMachineInput::RestoreFailed);
        }
    }

    /// Transition the FSM, logging state changes.
    fn transition(&self, input: &SessionMachineInput) -> SessionResult<SessionState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Session state transition"
            );
        }

        Ok(new_state)
    }

    /// Complete a successful restore: resolve the profile, arm the
    /// inactivity countdown, announce the session.
    async fn finish_restore(
        &self,
        user: AuthUser,
        access_token: Option<String>,
    ) -> SessionResult<SessionState> {
        // Best-effort: a profile fetch failure must not undo a valid session
        let profile =
            match fetch_or_repair_profile(self.gateway.as_ref(), &user, access_token.as_deref())
                .await
            {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!(user_id = %user.id, error = %err, "Profile fetch failed during restore");
                    None
                }
            };

        let profile_complete = profile.as_ref().map_or(false, |p| p.is_complete());
        *self.profile.lock().unwrap() = profile;

        let state = self.transition(&SessionMachineInput::SessionRestored)?;
        self.arm_inactivity_timer();

        info!(user_id = %user.id, "Session restored");
        let _ = self.event_tx.send(AuthEvent::SignedIn {
            user_id: user.id,
            email: user.email,
            profile_complete,
        });

        Ok(state)
    }

    /// Persist a freshly granted session and flip to authenticated.
    fn install_session(&self, bundle: SessionBundle) -> SessionResult<SignInOutcome> {
        let SessionBundle {
            session,
            user,
            profile,
        } = bundle;

        let granted = match &session {
            Some(session) => {
                self.vault.set_session(
                    &session.access_token,
                    &session.refresh_token,
                    session.user.id,
                    session.user.email.as_deref(),
                    session.expires_at,
                )?;
                true
            }
            None => false,
        };

        let profile_complete = profile.is_complete();
        *self.profile.lock().unwrap() = Some(profile);

        if granted {
            self.transition(&SessionMachineInput::SignedIn)?;
            self.arm_inactivity_timer();

            info!(user_id = %user.id, "Signed in");
            let _ = self.event_tx.send(AuthEvent::SignedIn {
                user_id: user.id,
                email: user.email.clone(),
                profile_complete,
            });
        } else {
            info!(user_id = %user.id, "Account created, confirmation pending");
        }

        Ok(SignInOutcome {
            user_id: user.id,
            email: user.email,
            profile_complete,
        })
    }

    /// Start the inactivity countdown for the current session.
    fn arm_inactivity_timer(&self) {
        let manager = self.clone();
        self.inactivity.start(async move {
            info!("Inactivity timeout reached, signing out");
            if let Err(err) = manager.sign_out().await {
                warn!(error = %err, "Inactivity sign-out failed");
            }
        });
    }

    /// Rebuild the unexpired session held in the vault.
    fn stored_session(&self) -> SessionResult<Option<AuthSession>> {
        let (Some(access_token), Some(refresh_token), Some(meta)) = (
            self.vault.get_access_token()?,
            self.vault.get_refresh_token()?,
            self.vault.get_session_meta()?,
        ) else {
            return Ok(None);
        };

        Ok(Some(AuthSession {
            access_token,
            refresh_token,
            expires_at: meta.expires_at,
            user: AuthUser {
                id: meta.user_id,
                email: meta.email,
            },
        }))
    }
}

/// Fetch the user's profile row, repairing an incomplete or missing one.
///
/// A profile missing any of name, city or account type gets exactly one
/// upsert that fills platform defaults, so the caller always receives a
/// complete profile.
async fn fetch_or_repair_profile(
    gateway: &dyn SessionBackend,
    user: &AuthUser,
    access_token: Option<&str>,
) -> Result<Profile, GatewayError> {
    let mut profile = gateway
        .fetch_profile(user.id, access_token)
        .await?
        .unwrap_or_else(|| Profile::empty(user.id));

    if profile.is_complete() {
        return Ok(profile);
    }

    debug!(user_id = %user.id, "Profile incomplete, filling defaults");
    profile.fill_missing(user.email.as_deref());
    upsert_profile(gateway, &profile, access_token).await?;

    Ok(profile)
}

/// Upsert one profile row keyed by id.
async fn upsert_profile(
    gateway: &dyn SessionBackend,
    profile: &Profile,
    access_token: Option<&str>,
) -> Result<(), GatewayError> {
    let body = serde_json::to_value(profile)?;
    gateway.upsert_profile(&body, access_token).await
}

/// The backend matches emails case-insensitively; normalize before any
/// credential call so retries and lookups agree.
fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{DEFAULT_ACCOUNT_TYPE, DEFAULT_CITY};
    use async_trait::async_trait;
    use chrono::Utc;
    use supabase_gateway::{GatewayResult, SignUpOutcome, SupabaseGateway};
    use token_vault::MemoryTokenStore;

    fn fast_queue_config() -> RetryQueueConfig {
        RetryQueueConfig {
            max_retries: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2,
            pacing_gap: Duration::from_millis(1),
        }
    }

    /// Manager wired to an unreachable backend: network calls fail fast
    /// with a connect error.
    fn test_manager() -> SessionManager {
        test_manager_with(SessionConfig {
            inactivity_timeout: Duration::from_millis(50),
            queue: fast_queue_config(),
        })
    }

    fn test_manager_with(config: SessionConfig) -> SessionManager {
        let gateway = SupabaseGateway::new("http://127.0.0.1:1", "test-anon-key");
        let vault = SessionVault::new(Box::new(MemoryTokenStore::new()));
        let manager = SessionManager::new(Arc::new(gateway), vault, config);
        manager.start();
        manager
    }

    /// In-memory backend with scripted answers; records every profile
    /// upsert it receives.
    struct ScriptedBackend {
        user_id: Uuid,
        email: String,
        /// Sign-in rejects with `InvalidCredentials` when set.
        reject_password: bool,
        /// What the sign-up duplicate check answers.
        email_taken: bool,
        /// Row returned by `fetch_profile`; `None` for a missing row.
        profile_row: Mutex<Option<Profile>>,
        upserts: Mutex<Vec<serde_json::Value>>,
    }

    impl ScriptedBackend {
        fn new(user_id: Uuid) -> Self {
            Self {
                user_id,
                email: "maria@example.com".to_string(),
                reject_password: false,
                email_taken: false,
                profile_row: Mutex::new(None),
                upserts: Mutex::new(Vec::new()),
            }
        }

        fn with_rejected_password(mut self) -> Self {
            self.reject_password = true;
            self
        }

        fn with_taken_email(mut self) -> Self {
            self.email_taken = true;
            self
        }

        fn with_profile_row(self, row: Profile) -> Self {
            *self.profile_row.lock().unwrap() = Some(row);
            self
        }

        fn granted_session(&self) -> AuthSession {
            AuthSession {
                access_token: "scripted-access".to_string(),
                refresh_token: "scripted-refresh".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
                user: AuthUser {
                    id: self.user_id,
                    email: Some(self.email.clone()),
                },
            }
        }

        fn recorded_upserts(&self) -> Vec<serde_json::Value> {
            self.upserts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionBackend for ScriptedBackend {
        async fn sign_in_with_password(
            &self,
            _email: &str,
            _password: &str,
        ) -> GatewayResult<AuthSession> {
            if self.reject_password {
                return Err(GatewayError::InvalidCredentials);
            }
            Ok(self.granted_session())
        }

        async fn sign_up(&self, _email: &str, _password: &str) -> GatewayResult<SignUpOutcome> {
            let session = self.granted_session();
            Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            })
        }

        async fn email_exists(&self, _email: &str) -> GatewayResult<bool> {
            Ok(self.email_taken)
        }

        async fn refresh_session(&self, _refresh_token: &str) -> GatewayResult<AuthSession> {
            Ok(self.granted_session())
        }

        async fn sign_out(&self, _access_token: &str) -> GatewayResult<()> {
            Ok(())
        }

        async fn get_user(&self, _access_token: &str) -> GatewayResult<AuthUser> {
            Ok(AuthUser {
                id: self.user_id,
                email: Some(self.email.clone()),
            })
        }

        async fn fetch_profile(
            &self,
            _user_id: Uuid,
            _access_token: Option<&str>,
        ) -> GatewayResult<Option<Profile>> {
            Ok(self.profile_row.lock().unwrap().clone())
        }

        async fn upsert_profile(
            &self,
            row: &serde_json::Value,
            _access_token: Option<&str>,
        ) -> GatewayResult<()> {
            self.upserts.lock().unwrap().push(row.clone());
            Ok(())
        }
    }

    fn scripted_manager(backend: Arc<ScriptedBackend>) -> SessionManager {
        let vault = SessionVault::new(Box::new(MemoryTokenStore::new()));
        let manager = SessionManager::new(
            backend,
            vault,
            SessionConfig {
                inactivity_timeout: Duration::from_secs(600),
                queue: fast_queue_config(),
            },
        );
        manager.start();
        manager
    }

    fn seed_session(manager: &SessionManager, user_id: Uuid, hours_from_now: i64) {
        manager
            .vault
            .set_session(
                "test-access-token",
                "test-refresh-token",
                user_id,
                Some("test@example.com"),
                Utc::now() + chrono::Duration::hours(hours_from_now),
            )
            .unwrap();
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Ana@X.COM "), "ana@x.com");
    }

    #[tokio::test]
    async fn initial_state_is_initializing() {
        let manager = test_manager();
        assert_eq!(manager.state(), SessionState::Initializing);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn restore_without_stored_session_is_unauthenticated() {
        let manager = test_manager();

        let state = manager.restore().await.unwrap();

        assert_eq!(state, SessionState::Unauthenticated);
        assert!(manager.cached_profile().is_none());
    }

    #[tokio::test]
    async fn restore_keeps_tokens_when_backend_unreachable() {
        let manager = test_manager();
        seed_session(&manager, Uuid::new_v4(), 1);

        let state = manager.restore().await.unwrap();

        // Verification could not run, so the user is not authenticated,
        // but the stored tokens survive for the next startup
        assert_eq!(state, SessionState::Unauthenticated);
        assert!(manager.vault.has_session().unwrap());
    }

    #[tokio::test]
    async fn restore_clears_expired_session_when_refresh_fails() {
        let manager = test_manager();
        seed_session(&manager, Uuid::new_v4(), -1);

        let state = manager.restore().await.unwrap();

        assert_eq!(state, SessionState::Unauthenticated);
        assert!(!manager.vault.has_session().unwrap());
    }

    #[tokio::test]
    async fn sign_in_failure_is_classified_and_leaves_signed_out() {
        let manager = test_manager();
        manager.restore().await.unwrap();

        let err = manager
            .sign_in("someone@example.com", "password")
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Transient(_)));
        assert!(!manager.is_authenticated());
        assert!(!manager.vault.has_session().unwrap());
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials_and_unauthenticated() {
        let backend = Arc::new(ScriptedBackend::new(Uuid::new_v4()).with_rejected_password());
        let manager = scripted_manager(Arc::clone(&backend));

        // No restore() first: a rejected credential attempt must still
        // settle the state instead of leaving it initializing
        let err = manager
            .sign_in("maria@example.com", "wrong")
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidCredentials));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(!manager.vault.has_session().unwrap());
        assert!(backend.recorded_upserts().is_empty());
    }

    #[tokio::test]
    async fn sign_in_repairs_incomplete_profile_with_one_upsert() {
        let user_id = Uuid::new_v4();
        let mut row = Profile::empty(user_id);
        row.name = Some("Maria".to_string()); // city and account type missing
        let backend = Arc::new(ScriptedBackend::new(user_id).with_profile_row(row));
        let manager = scripted_manager(Arc::clone(&backend));

        let outcome = manager
            .sign_in("maria@example.com", "secret1")
            .await
            .unwrap();

        assert!(outcome.profile_complete);
        assert_eq!(manager.state(), SessionState::Authenticated);

        // Exactly one repair write, filling only the missing fields
        let upserts = backend.recorded_upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0]["id"], user_id.to_string());
        assert_eq!(upserts[0]["name"], "Maria");
        assert_eq!(upserts[0]["city"], DEFAULT_CITY);
        assert_eq!(upserts[0]["account_type"], DEFAULT_ACCOUNT_TYPE);

        assert!(manager.cached_profile().unwrap().is_complete());
    }

    #[tokio::test]
    async fn sign_in_with_complete_profile_writes_nothing() {
        let user_id = Uuid::new_v4();
        let mut row = Profile::empty(user_id);
        row.name = Some("Maria".to_string());
        row.city = Some("Itu".to_string());
        row.account_type = Some("donzela".to_string());
        let backend = Arc::new(ScriptedBackend::new(user_id).with_profile_row(row));
        let manager = scripted_manager(Arc::clone(&backend));

        let outcome = manager
            .sign_in("maria@example.com", "secret1")
            .await
            .unwrap();

        assert!(outcome.profile_complete);
        assert!(backend.recorded_upserts().is_empty());

        let cached = manager.cached_profile().unwrap();
        assert_eq!(cached.city.as_deref(), Some("Itu"));
        assert_eq!(cached.account_type.as_deref(), Some("donzela"));
    }

    #[tokio::test]
    async fn sign_up_writes_minimal_profile_with_defaults() {
        let user_id = Uuid::new_v4();
        let backend = Arc::new(ScriptedBackend::new(user_id));
        let manager = scripted_manager(Arc::clone(&backend));

        let outcome = manager
            .sign_up("Nova@Example.com", "secret1", Some("11999990000"))
            .await
            .unwrap();

        assert_eq!(outcome.user_id, user_id);
        assert!(outcome.profile_complete);
        assert_eq!(manager.state(), SessionState::Authenticated);

        let upserts = backend.recorded_upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0]["name"], "nova");
        assert_eq!(upserts[0]["city"], DEFAULT_CITY);
        assert_eq!(upserts[0]["account_type"], DEFAULT_ACCOUNT_TYPE);
        assert_eq!(upserts[0]["phone"], "11999990000");
    }

    #[tokio::test]
    async fn sign_up_with_registered_email_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new(Uuid::new_v4()).with_taken_email());
        let manager = scripted_manager(Arc::clone(&backend));

        let err = manager
            .sign_up("maria@example.com", "secret1", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::EmailAlreadyRegistered));
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(backend.recorded_upserts().is_empty());
    }

    #[tokio::test]
    async fn sign_out_is_idempotent() {
        let manager = test_manager();
        let user_id = Uuid::new_v4();
        manager.transition(&SessionMachineInput::SignedIn).unwrap();
        seed_session(&manager, user_id, 1);

        let mut events = manager.subscribe();

        manager.sign_out().await.unwrap();
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(!manager.vault.has_session().unwrap());

        // Second sign-out must not error and must change nothing
        manager.sign_out().await.unwrap();
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(!manager.vault.has_session().unwrap());

        // Exactly one SignedOut event for the pair of calls
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedOut));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn inactivity_timeout_signs_out_exactly_once() {
        let manager = test_manager();
        manager.transition(&SessionMachineInput::SignedIn).unwrap();
        let mut events = manager.subscribe();

        manager.arm_inactivity_timer();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedOut));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn activity_postpones_inactivity_sign_out() {
        let manager = test_manager();
        manager.transition(&SessionMachineInput::SignedIn).unwrap();

        manager.arm_inactivity_timer();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            manager.record_activity(ActivitySignal::Pointer);
        }

        assert_eq!(manager.state(), SessionState::Authenticated);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn get_valid_session_without_session_is_none() {
        let manager = test_manager();
        assert!(manager.get_valid_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_valid_session_returns_unexpired_session() {
        let manager = test_manager();
        let user_id = Uuid::new_v4();
        seed_session(&manager, user_id, 1);

        let session = manager.get_valid_session().await.unwrap().unwrap();

        assert_eq!(session.access_token, "test-access-token");
        assert_eq!(session.user.id, user_id);
    }

    #[tokio::test]
    async fn get_valid_session_signs_out_when_refresh_fails() {
        let manager = test_manager();
        manager.transition(&SessionMachineInput::SignedIn).unwrap();
        seed_session(&manager, Uuid::new_v4(), -1);

        let session = manager.get_valid_session().await.unwrap();

        assert!(session.is_none());
        assert!(!manager.vault.has_session().unwrap());
        assert_eq!(manager.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn persist_profile_rejects_unknown_account_type() {
        let manager = test_manager();

        let err = manager
            .persist_profile(
                Uuid::new_v4(),
                ProfileUpdate {
                    account_type: Some("nobre".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidAccountType(_)));
    }

    #[tokio::test]
    async fn update_local_profile_without_cache_is_noop() {
        let manager = test_manager();

        manager.update_local_profile(ProfileUpdate {
            name: Some("Ana".to_string()),
            ..Default::default()
        });

        assert!(manager.cached_profile().is_none());
    }

    #[tokio::test]
    async fn update_local_profile_merges_into_cache() {
        let manager = test_manager();
        let user_id = Uuid::new_v4();
        *manager.profile.lock().unwrap() =
            Some(Profile::minimal(user_id, Some("ana@x.com"), None));

        manager.update_local_profile(ProfileUpdate {
            city: Some("Itu".to_string()),
            ..Default::default()
        });

        let cached = manager.cached_profile().unwrap();
        assert_eq!(cached.city.as_deref(), Some("Itu"));
        assert_eq!(cached.name.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn current_user_id_reads_vault_meta() {
        let manager = test_manager();
        assert!(manager.current_user_id().unwrap().is_none());

        let user_id = Uuid::new_v4();
        seed_session(&manager, user_id, 1);
        assert_eq!(manager.current_user_id().unwrap(), Some(user_id));
    }
}
