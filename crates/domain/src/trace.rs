use serde::Serialize;

/// Structured trace events emitted across all Sibyl crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        user_id: String,
        is_new: bool,
    },
    SessionExpired {
        user_id: String,
        idle_minutes: i64,
        had_flow: bool,
    },
    FlowOpened {
        user_id: String,
        action_id: String,
        fields: usize,
    },
    FieldAccepted {
        user_id: String,
        action_id: String,
        field: String,
        attempt: u32,
    },
    FieldRejected {
        user_id: String,
        action_id: String,
        field: String,
        attempt: u32,
        reason: String,
    },
    FlowAborted {
        user_id: String,
        action_id: String,
        reason: String,
    },
    DispatchStarted {
        invocation_id: String,
        action_id: String,
        user_id: String,
    },
    DispatchCacheHit {
        action_id: String,
        user_id: String,
        input_hash: String,
        age_secs: i64,
    },
    DispatchCompleted {
        invocation_id: String,
        action_id: String,
        status: String,
        duration_ms: u64,
    },
    HandlerUnavailable {
        action_id: String,
        status: String,
    },
    SessionConflictRetry {
        user_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sibyl_event");
    }
}
