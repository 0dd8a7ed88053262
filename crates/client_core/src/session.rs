//! Authentication state machine.
//!
//! `Initializing -> Anonymous | Authenticating -> Authenticated | Anonymous`.
//! The controller is the only writer of the persisted token. Observers read
//! the current [`Session`] through a `watch` channel.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::Identity;
use storage::KeyValueStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    gateway::ApiGateway,
    types::{LoginCredentials, Registration},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Initializing,
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Snapshot of the client's authentication state.
///
/// `identity` is present exactly when the status is `Authenticated`. A token is
/// present only while `Authenticating` or `Authenticated`; during the credential
/// exchange of a login the token is not known yet.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    token: Option<String>,
    identity: Option<Identity>,
}

impl Session {
    fn initializing() -> Self {
        Self {
            status: SessionStatus::Initializing,
            token: None,
            identity: None,
        }
    }

    fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            token: None,
            identity: None,
        }
    }

    fn authenticating(token: Option<String>) -> Self {
        Self {
            status: SessionStatus::Authenticating,
            token,
            identity: None,
        }
    }

    fn authenticated(token: String, identity: Identity) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            token: Some(token),
            identity: Some(identity),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("identity", &self.identity)
            .finish()
    }
}

pub struct SessionController {
    gateway: Arc<ApiGateway>,
    store: Arc<dyn KeyValueStore>,
    token_key: String,
    state: watch::Sender<Session>,
    gate: Mutex<Gate>,
}

/// Epoch bookkeeping shared by every state or token write.
///
/// `epoch` is bumped by each logout. `active` holds the epoch of the attempt that
/// owns the single-flight slot; an attempt from an older epoch no longer blocks.
#[derive(Debug, Default)]
struct Gate {
    epoch: u64,
    active: Option<u64>,
}

/// Single-flight guard for one login/initialize attempt.
///
/// Dropping it unsettled (the attempt's future was cancelled) puts the session
/// back to `Anonymous` and removes any token the attempt persisted, unless a
/// logout already did.
struct Flight<'a> {
    controller: &'a SessionController,
    epoch: u64,
    persisted: bool,
    settled: bool,
}

impl Flight<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut gate = self.controller.lock_gate();
        if !self.settled && gate.epoch == self.epoch {
            if self.persisted {
                self.controller.delete_token();
            }
            self.controller.replace(Session::anonymous());
            warn!("session: attempt abandoned before completion");
        }
        if gate.active == Some(self.epoch) {
            gate.active = None;
        }
    }
}

impl SessionController {
    pub fn new(
        gateway: Arc<ApiGateway>,
        store: Arc<dyn KeyValueStore>,
        token_key: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(Session::initializing());
        Self {
            gateway,
            store,
            token_key: token_key.into(),
            state,
            gate: Mutex::new(Gate::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    /// Current bearer token, if the session holds one.
    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    /// Restores the session from the persisted token.
    ///
    /// A token the identity endpoint does not accept (or that cannot be checked
    /// because the server is unreachable) is deleted and the session ends up
    /// `Anonymous`; the failure is still returned to the caller. A cancelled
    /// restore leaves the token in place for the next attempt.
    pub async fn initialize(&self) -> Result<Session, ClientError> {
        let flight = self.begin()?;

        let stored = match self.store.get(&self.token_key) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "session: failed to read persisted token");
                self.publish(flight.epoch, Session::anonymous());
                flight.settle();
                return Err(err.into());
            }
        };

        let Some(token) = stored else {
            debug!("session: no persisted token");
            self.publish(flight.epoch, Session::anonymous());
            flight.settle();
            return Ok(self.snapshot());
        };

        if !self.publish(flight.epoch, Session::authenticating(Some(token.clone()))) {
            flight.settle();
            return Err(ClientError::Superseded);
        }

        match self.gateway.fetch_identity(&token).await {
            Ok(identity) => {
                let user_id = identity.id;
                let applied = self.publish(flight.epoch, Session::authenticated(token, identity));
                flight.settle();
                if !applied {
                    return Err(ClientError::Superseded);
                }
                info!(%user_id, "session: restored from persisted token");
                Ok(self.snapshot())
            }
            Err(err) => {
                warn!(error = %err, "session: persisted token rejected, continuing anonymous");
                self.roll_back(flight.epoch);
                flight.settle();
                Err(err)
            }
        }
    }

    /// Exchanges credentials for a token, persists it, then resolves the identity.
    ///
    /// Fails with [`ClientError::SessionBusy`] while another attempt of the
    /// current session is in flight. Any failure, including cancellation, leaves
    /// the session `Anonymous` with no persisted token.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Identity, ClientError> {
        let mut flight = self.begin()?;
        if !self.publish(flight.epoch, Session::authenticating(None)) {
            flight.settle();
            return Err(ClientError::Superseded);
        }
        info!("session: authenticating");

        match self.establish(&mut flight, credentials).await {
            Ok(identity) => {
                flight.settle();
                info!(user_id = %identity.id, "session: authenticated");
                Ok(identity)
            }
            Err(err) => {
                warn!(error = %err, "session: login failed");
                self.roll_back(flight.epoch);
                flight.settle();
                Err(err)
            }
        }
    }

    async fn establish(
        &self,
        flight: &mut Flight<'_>,
        credentials: &LoginCredentials,
    ) -> Result<Identity, ClientError> {
        let token = self.gateway.authenticate(credentials).await?;

        // Persist before resolving the identity so a restart can retry it.
        {
            let gate = self.lock_gate();
            if gate.epoch != flight.epoch {
                return Err(ClientError::Superseded);
            }
            self.store.set(&self.token_key, &token)?;
            flight.persisted = true;
            self.replace(Session::authenticating(Some(token.clone())));
        }

        let identity = self.gateway.fetch_identity(&token).await?;
        if !self.publish(flight.epoch, Session::authenticated(token, identity.clone())) {
            return Err(ClientError::Superseded);
        }
        Ok(identity)
    }

    /// Creates an account. Does not touch the session; callers log in separately.
    pub async fn register(&self, registration: &Registration) -> Result<Identity, ClientError> {
        info!("session: registering account");
        self.gateway.register(registration).await
    }

    /// Clears the session and the persisted token. No network call.
    ///
    /// An attempt still in flight is superseded and stops blocking new logins.
    pub fn logout(&self) {
        let mut gate = self.lock_gate();
        gate.epoch += 1;
        self.replace(Session::anonymous());
        self.delete_token();
        info!("session: logged out");
    }

    fn begin(&self) -> Result<Flight<'_>, ClientError> {
        let mut gate = self.lock_gate();
        if gate.active == Some(gate.epoch) {
            debug!("session: rejecting concurrent attempt");
            return Err(ClientError::SessionBusy);
        }
        gate.active = Some(gate.epoch);
        Ok(Flight {
            controller: self,
            epoch: gate.epoch,
            persisted: false,
            settled: false,
        })
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the session unless a logout happened since `epoch` was taken.
    fn publish(&self, epoch: u64, next: Session) -> bool {
        let gate = self.lock_gate();
        if gate.epoch != epoch {
            return false;
        }
        self.replace(next);
        true
    }

    // Callers hold the gate.
    fn replace(&self, next: Session) {
        self.state.send_if_modified(|session| {
            if *session == next {
                return false;
            }
            *session = next;
            true
        });
    }

    fn delete_token(&self) {
        if let Err(err) = self.store.delete(&self.token_key) {
            warn!(error = %err, "session: failed to remove persisted token");
        }
    }

    /// Drops the persisted token and the session, unless a logout already has
    /// and a newer attempt may own both.
    fn roll_back(&self, epoch: u64) {
        let gate = self.lock_gate();
        if gate.epoch != epoch {
            return;
        }
        self.delete_token();
        self.replace(Session::anonymous());
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
