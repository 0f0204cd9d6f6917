//! Dispatch — the single funnel every calculation request goes through.
//!
//! Order of checks for one request: serve from a recent identical success
//! (dedup), gate on the catalog's implementation status, then record a
//! `Pending` invocation and run the handler on the blocking pool under the
//! global concurrency cap and the per-invocation deadline. Whatever happens
//! to the handler, the invocation ends in exactly one terminal status.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use sibyl_catalog::ActionDefinition;
use sibyl_domain::config::DispatchConfig;
use sibyl_domain::error::{Error, ErrorKind, Result};
use sibyl_domain::trace::TraceEvent;
use sibyl_domain::user::UserProfile;

use crate::cancel::CancelToken;
use crate::handler::{ActionInput, HandlerContext, HandlerRegistry};
use crate::invocations::{InvocationRepository, InvocationStatus, ServiceInvocation};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How one dispatch ended. Every variant still yields a user-visible reply;
/// the engine maps them to the configured message templates.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler ran to completion.
    Completed {
        text: String,
        suggested_replies: Vec<String>,
    },
    /// Served from a recent identical success without running the handler.
    Cached {
        text: String,
        suggested_replies: Vec<String>,
        age_secs: i64,
    },
    /// The catalog entry is stubbed, missing, or wired to no handler.
    /// Nothing ran and nothing was recorded.
    Unavailable,
    /// The handler errored, panicked, or exceeded its deadline.
    Failed { kind: ErrorKind },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input hashing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Digest of the validated inputs, part of the dedup key alongside user and
/// action. Built over the canonical rendering of each field so equivalent
/// spellings ("7:30 pm" vs "19:30") collapse to the same hash. A NUL byte
/// separates parts, which no canonical rendering can contain.
pub fn hash_input(input: &ActionInput) -> String {
    let mut hasher = Sha256::new();
    for field in &input.fields {
        hasher.update(field.name.as_bytes());
        hasher.update([0]);
        hasher.update(field.value.canonical().as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Dispatcher {
    invocations: Arc<dyn InvocationRepository>,
    registry: Arc<HandlerRegistry>,
    /// Caps concurrently running handlers across all users.
    limiter: Arc<Semaphore>,
    dedup_window: Duration,
    handler_timeout: std::time::Duration,
}

impl Dispatcher {
    pub fn new(
        invocations: Arc<dyn InvocationRepository>,
        registry: Arc<HandlerRegistry>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            invocations,
            registry,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            dedup_window: Duration::seconds(config.dedup_window_secs as i64),
            handler_timeout: std::time::Duration::from_secs(config.handler_timeout_secs),
        }
    }

    /// Run one calculation request end to end.
    ///
    /// The caller has already validated the inputs and serialized turns for
    /// this user, so two dispatches for the same user never race.
    pub async fn dispatch(
        &self,
        action: &ActionDefinition,
        profile: &UserProfile,
        input: ActionInput,
    ) -> Result<DispatchOutcome> {
        let user_id = input.user_id.clone();
        let input_hash = hash_input(&input);

        // ── Dedup: identical request inside the window ───────────────
        if self.dedup_window > Duration::zero() {
            if let Some(hit) = self.invocations.find_recent_success(
                &user_id,
                &action.id,
                &input_hash,
                self.dedup_window,
            )? {
                let age_secs = hit
                    .completed_at
                    .map(|done| (Utc::now() - done).num_seconds())
                    .unwrap_or(0);
                TraceEvent::DispatchCacheHit {
                    action_id: action.id.clone(),
                    user_id: user_id.clone(),
                    input_hash: input_hash.clone(),
                    age_secs,
                }
                .emit();
                return Ok(DispatchOutcome::Cached {
                    text: hit.result.unwrap_or_default(),
                    suggested_replies: hit.suggested_replies,
                    age_secs,
                });
            }
        }

        // ── Implementation gate ──────────────────────────────────────
        if !action.status.is_implemented() {
            TraceEvent::HandlerUnavailable {
                action_id: action.id.clone(),
                status: action.status.to_string(),
            }
            .emit();
            return Ok(DispatchOutcome::Unavailable);
        }
        let Some(handler) = self.registry.get(&action.handler) else {
            // Implemented in the catalog but no handler behind the key —
            // a wiring defect the boot check should have caught.
            tracing::warn!(
                action_id = %action.id,
                key = %action.handler,
                "implemented action has no registered handler"
            );
            TraceEvent::HandlerUnavailable {
                action_id: action.id.clone(),
                status: "unregistered".into(),
            }
            .emit();
            return Ok(DispatchOutcome::Unavailable);
        };

        // ── Record the attempt ───────────────────────────────────────
        let invocation = ServiceInvocation::new(&action.id, &user_id, &input_hash);
        let invocation_id = invocation.invocation_id;
        let started_at = invocation.started_at;
        self.invocations.append(invocation)?;
        TraceEvent::DispatchStarted {
            invocation_id: invocation_id.to_string(),
            action_id: action.id.clone(),
            user_id: user_id.clone(),
        }
        .emit();

        // ── Execute under the cap and the deadline ───────────────────
        // Queueing for a concurrency slot does not consume the deadline;
        // the clock starts once the handler is launched.
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("dispatch limiter closed".into()))?;

        let cancel = CancelToken::new();
        let ctx = HandlerContext {
            profile: profile.clone(),
            cancel: cancel.clone(),
        };
        let job = tokio::task::spawn_blocking(move || {
            // The slot stays taken until the handler actually returns,
            // even past its deadline.
            let _permit = permit;
            handler.execute(&ctx, &input)
        });

        let (status, result, suggested, error_kind, outcome) =
            match tokio::time::timeout(self.handler_timeout, job).await {
                Ok(Ok(Ok(output))) => (
                    InvocationStatus::Success,
                    Some(output.text.clone()),
                    output.suggested_replies.clone(),
                    None,
                    DispatchOutcome::Completed {
                        text: output.text,
                        suggested_replies: output.suggested_replies,
                    },
                ),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(action_id = %action.id, error = %e, "handler failed");
                    (
                        InvocationStatus::Failed,
                        None,
                        Vec::new(),
                        Some(ErrorKind::CalculationFailure),
                        DispatchOutcome::Failed {
                            kind: ErrorKind::CalculationFailure,
                        },
                    )
                }
                Ok(Err(join_err)) => {
                    tracing::warn!(action_id = %action.id, error = %join_err, "handler panicked");
                    (
                        InvocationStatus::Failed,
                        None,
                        Vec::new(),
                        Some(ErrorKind::CalculationFailure),
                        DispatchOutcome::Failed {
                            kind: ErrorKind::CalculationFailure,
                        },
                    )
                }
                Err(_elapsed) => {
                    // Signal the handler and drop the join handle; whatever
                    // it eventually returns goes nowhere.
                    cancel.cancel();
                    (
                        InvocationStatus::Timeout,
                        None,
                        Vec::new(),
                        Some(ErrorKind::Timeout),
                        DispatchOutcome::Failed {
                            kind: ErrorKind::Timeout,
                        },
                    )
                }
            };

        self.invocations
            .complete(&invocation_id, status, result, suggested, error_kind)?;

        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        TraceEvent::DispatchCompleted {
            invocation_id: invocation_id.to_string(),
            action_id: action.id.clone(),
            status: status.as_str().to_owned(),
            duration_ms,
        }
        .emit();

        Ok(outcome)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sibyl_catalog::{FieldValue, ImplementationStatus};
    use sibyl_domain::error::Error;
    use sibyl_sessions::CollectedField;

    use crate::handler::{ActionHandler, HandlerContext, HandlerOutput};
    use crate::invocations::InvocationLog;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    impl ActionHandler for CountingHandler {
        fn execute(&self, _ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerOutput::text("the cards are kind today")
                .with_suggestions(vec!["draw again".into()]))
        }
    }

    struct FailingHandler;

    impl ActionHandler for FailingHandler {
        fn execute(&self, _ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
            Err(Error::Other("ephemeris offline".into()))
        }
    }

    fn action(id: &str, handler: &str, status: ImplementationStatus) -> ActionDefinition {
        ActionDefinition {
            id: id.into(),
            title: "Test action".into(),
            tokens: vec![id.replace('_', " ")],
            inputs: Vec::new(),
            handler: handler.into(),
            status,
            menu: false,
            category: "misc".into(),
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            dedup_window_secs: 300,
            handler_timeout_secs: 5,
            max_concurrent: 2,
        }
    }

    fn dispatcher(
        registry: HandlerRegistry,
        log: Arc<InvocationLog>,
    ) -> Dispatcher {
        Dispatcher::new(log, Arc::new(registry), &config())
    }

    fn input_with(action_id: &str, value: &str) -> ActionInput {
        ActionInput::new(
            action_id,
            "u1",
            vec![CollectedField {
                name: "question".into(),
                value: FieldValue::Text(value.into()),
            }],
        )
    }

    #[tokio::test]
    async fn identical_request_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(
            "tarot.daily",
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        let log = Arc::new(InvocationLog::in_memory());
        let dispatcher = dispatcher(registry, log.clone());
        let action = action("get_tarot_reading", "tarot.daily", ImplementationStatus::Implemented);
        let profile = UserProfile::new("u1");

        let first = dispatcher
            .dispatch(&action, &profile, input_with("get_tarot_reading", "will it rain"))
            .await
            .unwrap();
        assert!(matches!(first, DispatchOutcome::Completed { .. }));

        let second = dispatcher
            .dispatch(&action, &profile, input_with("get_tarot_reading", "will it rain"))
            .await
            .unwrap();
        match second {
            DispatchOutcome::Cached {
                text,
                suggested_replies,
                ..
            } => {
                assert_eq!(text, "the cards are kind today");
                assert_eq!(suggested_replies, vec!["draw again".to_string()]);
            }
            other => panic!("expected cache hit, got {other:?}"),
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn different_inputs_run_the_handler_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(
            "tarot.daily",
            Arc::new(CountingHandler { calls: calls.clone() }),
        );
        let log = Arc::new(InvocationLog::in_memory());
        let dispatcher = dispatcher(registry, log);
        let action = action("get_tarot_reading", "tarot.daily", ImplementationStatus::Implemented);
        let profile = UserProfile::new("u1");

        dispatcher
            .dispatch(&action, &profile, input_with("get_tarot_reading", "will it rain"))
            .await
            .unwrap();
        dispatcher
            .dispatch(&action, &profile, input_with("get_tarot_reading", "should I move"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stub_actions_are_unavailable_and_leave_no_record() {
        let log = Arc::new(InvocationLog::in_memory());
        let dispatcher = dispatcher(HandlerRegistry::new(), log.clone());
        let action = action("get_angel_number", "num.angel", ImplementationStatus::Stub);

        let outcome = dispatcher
            .dispatch(
                &action,
                &UserProfile::new("u1"),
                ActionInput::new("get_angel_number", "u1", vec![]),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Unavailable));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn unregistered_handler_is_unavailable() {
        let log = Arc::new(InvocationLog::in_memory());
        let dispatcher = dispatcher(HandlerRegistry::new(), log.clone());
        let action = action(
            "get_daily_horoscope",
            "horoscope.daily",
            ImplementationStatus::Implemented,
        );

        let outcome = dispatcher
            .dispatch(
                &action,
                &UserProfile::new("u1"),
                ActionInput::new("get_daily_horoscope", "u1", vec![]),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Unavailable));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_recorded_as_failed() {
        let mut registry = HandlerRegistry::new();
        registry.register("horoscope.daily", Arc::new(FailingHandler));
        let log = Arc::new(InvocationLog::in_memory());
        let dispatcher = dispatcher(registry, log.clone());
        let action = action(
            "get_daily_horoscope",
            "horoscope.daily",
            ImplementationStatus::Implemented,
        );

        let outcome = dispatcher
            .dispatch(
                &action,
                &UserProfile::new("u1"),
                ActionInput::new("get_daily_horoscope", "u1", vec![]),
            )
            .await
            .unwrap();

        match outcome {
            DispatchOutcome::Failed { kind } => assert_eq!(kind, ErrorKind::CalculationFailure),
            other => panic!("expected failure, got {other:?}"),
        }
        let history = log.list_history("u1", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, InvocationStatus::Failed);
        assert_eq!(history[0].error_kind, Some(ErrorKind::CalculationFailure));
    }

    #[tokio::test]
    async fn failed_attempts_are_not_served_from_cache() {
        let mut registry = HandlerRegistry::new();
        registry.register("horoscope.daily", Arc::new(FailingHandler));
        let log = Arc::new(InvocationLog::in_memory());
        let dispatcher = dispatcher(registry, log.clone());
        let action = action(
            "get_daily_horoscope",
            "horoscope.daily",
            ImplementationStatus::Implemented,
        );
        let profile = UserProfile::new("u1");

        for _ in 0..2 {
            let outcome = dispatcher
                .dispatch(
                    &action,
                    &profile,
                    ActionInput::new("get_daily_horoscope", "u1", vec![]),
                )
                .await
                .unwrap();
            assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        }
        // Both attempts really ran.
        assert_eq!(log.list_history("u1", 10).unwrap().len(), 2);
    }

    #[test]
    fn hash_is_stable_and_value_sensitive() {
        let a = hash_input(&input_with("get_tarot_reading", "will it rain"));
        let b = hash_input(&input_with("get_tarot_reading", "will it rain"));
        let c = hash_input(&input_with("get_tarot_reading", "should I move"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_of_no_fields_is_the_empty_digest() {
        let empty = hash_input(&ActionInput::new("get_daily_horoscope", "u1", vec![]));
        assert_eq!(
            empty,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
