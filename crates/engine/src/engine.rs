//! The turn pipeline — one inbound message in, one reply out.
//!
//! `handle_message` owns the whole sequence: per-user lock, profile and
//! session loading, expiry, token resolution, flow advancement or dispatch,
//! and the versioned save. A save that loses to a concurrent writer is
//! retried once from a fresh load; a second loss yields the generic failure
//! reply instead of an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use sibyl_catalog::{ActionCatalog, ActionDefinition};
use sibyl_domain::config::{Config, FlowConfig, MessagesConfig};
use sibyl_domain::error::{Error, ErrorKind, Result};
use sibyl_domain::message::{InboundMessage, Reply};
use sibyl_domain::trace::TraceEvent;
use sibyl_domain::user::UserProfile;
use sibyl_sessions::{
    CollectedField, LifecyclePolicy, Session, SessionRepository, SessionState, UserRepository,
};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::flow::{self, FlowStep};
use crate::handler::{ActionInput, HandlerRegistry};
use crate::invocations::InvocationRepository;
use crate::resolver::{self, Resolution};
use crate::user_lock::UserLockMap;

pub struct Engine {
    catalog: Arc<ActionCatalog>,
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    dispatcher: Dispatcher,
    locks: Arc<UserLockMap>,
    lifecycle: LifecyclePolicy,
    flow_config: FlowConfig,
    messages: MessagesConfig,
}

impl Engine {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        invocations: Arc<dyn InvocationRepository>,
        registry: Arc<HandlerRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(invocations, registry, &config.dispatch),
            catalog,
            sessions,
            users,
            locks: Arc::new(UserLockMap::new()),
            lifecycle: LifecyclePolicy::new(config.session.expiry_minutes),
            flow_config: config.flow.clone(),
            messages: config.messages.clone(),
        }
    }

    /// Shared per-user turn locks, for the periodic maintenance task.
    pub fn user_locks(&self) -> Arc<UserLockMap> {
        self.locks.clone()
    }

    /// Process one inbound message and produce the reply for it.
    ///
    /// Turns for the same user are strictly serialized; plumbing failures
    /// mid-turn degrade to the configured failure message rather than
    /// surfacing as errors to the transport.
    pub async fn handle_message(&self, message: InboundMessage) -> Result<Reply> {
        // ── 1. Acquire the per-user turn lock ─────────────────────────
        let _permit = self.locks.acquire(&message.user_id).await?;

        match self.run_locked(&message).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::error!(
                    user_id = %message.user_id,
                    error = %e,
                    kind = %ErrorKind::PersistenceFailure,
                    "turn failed"
                );
                Ok(Reply::text(&message.user_id, self.messages.failure.clone()))
            }
        }
    }

    async fn run_locked(&self, message: &InboundMessage) -> Result<Reply> {
        // ── 2. Ensure the user profile ────────────────────────────────
        let profile = self.users.ensure(&message.user_id)?;
        let now = Utc::now();

        // ── 3. Load session, expire stale state ───────────────────────
        let session = self.load_session(&message.user_id, now)?;

        // ── 4. Run the turn, retrying once on a concurrent save ───────
        match self.run_turn(session, message, &profile, now).await {
            Err(Error::VersionConflict { .. }) => {
                TraceEvent::SessionConflictRetry {
                    user_id: message.user_id.clone(),
                }
                .emit();
                let session = self.load_session(&message.user_id, now)?;
                match self.run_turn(session, message, &profile, now).await {
                    Err(Error::VersionConflict { .. }) => {
                        tracing::warn!(
                            user_id = %message.user_id,
                            kind = %ErrorKind::SessionConflict,
                            "session version conflicted twice, giving up"
                        );
                        Ok(Reply::text(&message.user_id, self.messages.failure.clone()))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Load (or lazily create) the session and normalize its state before
    /// the message is interpreted.
    fn load_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<Session> {
        let mut session = match self.sessions.load(user_id)? {
            Some(existing) => existing,
            None => {
                TraceEvent::SessionResolved {
                    user_id: user_id.to_owned(),
                    is_new: true,
                }
                .emit();
                Session::new(user_id, now)
            }
        };

        if let Some(idle_minutes) = self.lifecycle.should_expire(&session, now) {
            TraceEvent::SessionExpired {
                user_id: session.user_id.clone(),
                idle_minutes,
                had_flow: session.flow.is_some(),
            }
            .emit();
            session.reset_to_idle();
        }

        // A stored error state recovers silently on the next contact.
        if session.state == SessionState::Error {
            session.reset_to_idle();
        }

        Ok(session)
    }

    async fn run_turn(
        &self,
        mut session: Session,
        message: &InboundMessage,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<Reply> {
        let expected = session.version;
        session.touch(now);

        let resolution = resolver::resolve(
            &self.catalog,
            &session,
            &message.text,
            &self.flow_config.cancel_token,
        );

        match resolution {
            Resolution::Unrecognized => {
                tracing::debug!(
                    user_id = %session.user_id,
                    kind = %ErrorKind::UnrecognizedAction,
                    "no catalog match for message"
                );
                self.sessions.save(&session, expected)?;
                let text = format!("{}\n\n{}", self.messages.unrecognized, self.render_menu());
                Ok(Reply::text(&session.user_id, text).with_suggestions(self.menu_suggestions()))
            }

            Resolution::CancelFlow => {
                let action_id = session
                    .flow
                    .as_ref()
                    .map(|flow| flow.action_id.clone())
                    .unwrap_or_default();
                TraceEvent::FlowAborted {
                    user_id: session.user_id.clone(),
                    action_id,
                    reason: "cancelled".into(),
                }
                .emit();
                session.reset_to_idle();
                self.sessions.save(&session, expected)?;
                let text = format!("{}\n\n{}", self.messages.cancelled, self.render_menu());
                Ok(Reply::text(&session.user_id, text).with_suggestions(self.menu_suggestions()))
            }

            Resolution::BrokenFlow { action_id } => {
                tracing::warn!(
                    user_id = %session.user_id,
                    action_id,
                    "open flow references an action missing from the catalog"
                );
                session.state = SessionState::Error;
                self.sessions.save(&session, expected)?;
                Ok(Reply::text(&session.user_id, self.messages.failure.clone())
                    .with_suggestions(self.menu_suggestions()))
            }

            Resolution::StartFlow(action) => {
                TraceEvent::FlowOpened {
                    user_id: session.user_id.clone(),
                    action_id: action.id.clone(),
                    fields: action.inputs.len(),
                }
                .emit();
                session.open_flow(&action.id, now);
                self.sessions.save(&session, expected)?;
                let prompt = action
                    .inputs
                    .first()
                    .map(|spec| spec.prompt.clone())
                    .unwrap_or_default();
                Ok(Reply::text(&session.user_id, prompt))
            }

            Resolution::Immediate(action) => {
                self.execute(session, expected, action, profile, Vec::new())
                    .await
            }

            Resolution::ContinueFlow(action) => {
                let max_retries = self.flow_config.max_field_retries;
                let (step, field, prior_attempts) = {
                    let flow = session
                        .flow
                        .as_mut()
                        .ok_or_else(|| Error::Other("flow state out of sync".into()))?;
                    let field = action
                        .inputs
                        .get(flow.next_field)
                        .map(|spec| spec.name.clone())
                        .unwrap_or_default();
                    let prior_attempts = flow.attempts;
                    let step = flow::advance(action, flow, &message.text, max_retries);
                    (step, field, prior_attempts)
                };

                match step {
                    FlowStep::Retry { reason } => {
                        TraceEvent::FieldRejected {
                            user_id: session.user_id.clone(),
                            action_id: action.id.clone(),
                            field,
                            attempt: prior_attempts + 1,
                            reason: reason.clone(),
                        }
                        .emit();
                        self.sessions.save(&session, expected)?;
                        Ok(Reply::text(&session.user_id, reason))
                    }

                    FlowStep::Exhausted => {
                        TraceEvent::FlowAborted {
                            user_id: session.user_id.clone(),
                            action_id: action.id.clone(),
                            reason: ErrorKind::ValidationExhausted.as_str().into(),
                        }
                        .emit();
                        session.reset_to_idle();
                        self.sessions.save(&session, expected)?;
                        Ok(Reply::text(&session.user_id, self.messages.gave_up.clone())
                            .with_suggestions(self.menu_suggestions()))
                    }

                    FlowStep::Prompt { text } => {
                        TraceEvent::FieldAccepted {
                            user_id: session.user_id.clone(),
                            action_id: action.id.clone(),
                            field,
                            attempt: prior_attempts,
                        }
                        .emit();
                        self.sessions.save(&session, expected)?;
                        Ok(Reply::text(&session.user_id, text))
                    }

                    FlowStep::Complete => {
                        TraceEvent::FieldAccepted {
                            user_id: session.user_id.clone(),
                            action_id: action.id.clone(),
                            field,
                            attempt: prior_attempts,
                        }
                        .emit();
                        let fields = session
                            .flow
                            .take()
                            .map(|flow| flow.collected)
                            .unwrap_or_default();
                        self.execute(session, expected, action, profile, fields).await
                    }
                }
            }
        }
    }

    /// Dispatch one action: persist the `Executing` hop, run the handler,
    /// then settle the session back to Idle.
    async fn execute(
        &self,
        mut session: Session,
        expected: u64,
        action: &ActionDefinition,
        profile: &UserProfile,
        fields: Vec<CollectedField>,
    ) -> Result<Reply> {
        session.state = SessionState::Executing;
        session.flow = None;
        let mut session = self.sessions.save(&session, expected)?;

        let input = ActionInput::new(&action.id, &session.user_id, fields);
        let outcome = self.dispatcher.dispatch(action, profile, input).await?;

        session.reset_to_idle();
        session.touch(Utc::now());
        let expected = session.version;
        self.sessions.save(&session, expected)?;

        Ok(self.reply_for_outcome(&session.user_id, outcome))
    }

    fn reply_for_outcome(&self, user_id: &str, outcome: DispatchOutcome) -> Reply {
        match outcome {
            DispatchOutcome::Completed {
                text,
                suggested_replies,
            }
            | DispatchOutcome::Cached {
                text,
                suggested_replies,
                ..
            } => Reply::text(user_id, text).with_suggestions(suggested_replies),
            DispatchOutcome::Unavailable => {
                Reply::text(user_id, self.messages.unavailable.clone())
                    .with_suggestions(self.menu_suggestions())
            }
            DispatchOutcome::Failed { .. } => {
                Reply::text(user_id, self.messages.failure.clone())
            }
        }
    }

    /// The numbered top-level menu, one line per flagged catalog entry.
    fn render_menu(&self) -> String {
        self.catalog
            .menu_entries()
            .iter()
            .enumerate()
            .map(|(i, action)| format!("{}. {}", i + 1, action.title))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn menu_suggestions(&self) -> Vec<String> {
        self.catalog
            .menu_entries()
            .iter()
            .map(|action| action.primary_token().to_owned())
            .collect()
    }
}
