//! Lifecycle and dispatch hooks.
//!
//! Hooks are optional callbacks registered at startup and immutable
//! thereafter. `before_dispatch` may veto an envelope; every other hook
//! failure is logged and swallowed.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use relay_core::{Envelope, RelayError, Result};

use crate::session::Session;

/// Callback invoked around envelope dispatch.
#[async_trait]
pub trait DispatchHook: Send + Sync {
    /// Observes (and for the before hook, may mutate or veto) an envelope.
    async fn on_envelope(&self, session: &Arc<Session>, envelope: &mut Envelope) -> Result<()>;
}

/// Callback invoked on session connect and disconnect.
#[async_trait]
pub trait SessionHook: Send + Sync {
    /// Observes a session lifecycle transition.
    async fn on_session(&self, session: &Arc<Session>) -> Result<()>;
}

/// The hook table. Built once at startup; the dispatch hot path reads it
/// without any lock.
#[derive(Clone, Default)]
pub struct Hooks {
    before_dispatch: Option<Arc<dyn DispatchHook>>,
    after_dispatch: Option<Arc<dyn DispatchHook>>,
    on_connect: Option<Arc<dyn SessionHook>>,
    on_disconnect: Option<Arc<dyn SessionHook>>,
}

impl Hooks {
    /// Creates an empty hook table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the before-dispatch hook. An error from it drops the envelope.
    #[must_use]
    pub fn with_before_dispatch(mut self, hook: Arc<dyn DispatchHook>) -> Self {
        self.before_dispatch = Some(hook);
        self
    }

    /// Sets the after-dispatch hook.
    #[must_use]
    pub fn with_after_dispatch(mut self, hook: Arc<dyn DispatchHook>) -> Self {
        self.after_dispatch = Some(hook);
        self
    }

    /// Sets the connect hook.
    #[must_use]
    pub fn with_on_connect(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.on_connect = Some(hook);
        self
    }

    /// Sets the disconnect hook.
    #[must_use]
    pub fn with_on_disconnect(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.on_disconnect = Some(hook);
        self
    }

    /// Runs the before-dispatch hook. An error means the envelope must be
    /// dropped.
    pub(crate) async fn run_before(
        &self,
        session: &Arc<Session>,
        envelope: &mut Envelope,
    ) -> Result<()> {
        match &self.before_dispatch {
            Some(hook) => hook.on_envelope(session, envelope).await,
            None => Ok(()),
        }
    }

    /// Runs the after-dispatch hook; errors are logged and swallowed.
    pub(crate) async fn run_after(&self, session: &Arc<Session>, envelope: &Envelope) {
        if let Some(hook) = &self.after_dispatch {
            let mut envelope = envelope.clone();
            if let Err(error) = hook.on_envelope(session, &mut envelope).await {
                warn!(session_id = %session.id(), %error, "after-dispatch hook failed");
            }
        }
    }

    /// Runs the connect hook; errors are logged and swallowed.
    pub(crate) async fn run_connect(&self, session: &Arc<Session>) {
        if let Some(hook) = &self.on_connect {
            if let Err(error) = hook.on_session(session).await {
                warn!(session_id = %session.id(), %error, "connect hook failed");
            }
        }
    }

    /// Runs the disconnect hook; errors are logged and swallowed.
    pub(crate) async fn run_disconnect(&self, session: &Arc<Session>) {
        if let Some(hook) = &self.on_disconnect {
            if let Err(error) = hook.on_session(session).await {
                warn!(session_id = %session.id(), %error, "disconnect hook failed");
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_dispatch", &self.before_dispatch.is_some())
            .field("after_dispatch", &self.after_dispatch.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// Before-dispatch hook that rejects envelopes without a type tag.
#[derive(Debug, Default)]
pub struct EnvelopeValidator;

#[async_trait]
impl DispatchHook for EnvelopeValidator {
    async fn on_envelope(&self, _session: &Arc<Session>, envelope: &mut Envelope) -> Result<()> {
        if envelope.kind.is_empty() {
            return Err(RelayError::TypeRequired);
        }
        Ok(())
    }
}

/// After-dispatch hook that records processed envelopes.
#[derive(Debug, Default)]
pub struct DispatchLogger;

#[async_trait]
impl DispatchHook for DispatchLogger {
    async fn on_envelope(&self, session: &Arc<Session>, envelope: &mut Envelope) -> Result<()> {
        debug!(
            message_id = %envelope.id,
            kind = %envelope.kind,
            sender = %envelope.sender,
            session_id = %session.id(),
            "envelope processed"
        );
        Ok(())
    }
}

/// Session hook that logs connects or disconnects.
#[derive(Debug)]
pub struct SessionLogger {
    event: &'static str,
}

impl SessionLogger {
    /// Logger for session connects.
    #[must_use]
    pub const fn connected() -> Self {
        Self { event: "connected" }
    }

    /// Logger for session disconnects.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            event: "disconnected",
        }
    }
}

#[async_trait]
impl SessionHook for SessionLogger {
    async fn on_session(&self, session: &Arc<Session>) -> Result<()> {
        info!(
            session_id = %session.id(),
            user_id = %session.user_id(),
            "client {}", self.event
        );
        Ok(())
    }
}
