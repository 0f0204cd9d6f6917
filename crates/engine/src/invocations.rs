//! Invocation tracking — persistent execution records for every dispatch.
//!
//! Each dispatched calculation produces a `ServiceInvocation` with a unique
//! UUID. Records are kept in a bounded in-memory ring for fast queries and
//! appended to a JSONL file once they reach a terminal status; `Pending`
//! records live only in memory, so a crash mid-handler surfaces as a missing
//! record rather than a stuck one. The ring also backs deduplication: an
//! identical request inside the configured window is served from the stored
//! result instead of re-running the handler.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sibyl_domain::error::{Error, ErrorKind, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invocation status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

impl InvocationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invocation record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInvocation {
    pub invocation_id: Uuid,
    pub action_id: String,
    pub user_id: String,
    /// Digest of the validated inputs; part of the deduplication key.
    pub input_hash: String,
    pub status: InvocationStatus,
    /// Full reply text on success — served verbatim on a dedup hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Quick-reply options that came with the result, replayed with it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_replies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ServiceInvocation {
    pub fn new(action_id: &str, user_id: &str, input_hash: &str) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            action_id: action_id.to_owned(),
            user_id: user_id.to_owned(),
            input_hash: input_hash.to_owned(),
            status: InvocationStatus::Pending,
            result: None,
            suggested_replies: Vec::new(),
            error_kind: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    fn finish(
        &mut self,
        status: InvocationStatus,
        result: Option<String>,
        suggested_replies: Vec<String>,
        error_kind: Option<ErrorKind>,
    ) {
        let now = Utc::now();
        self.status = status;
        self.result = result;
        self.suggested_replies = suggested_replies;
        self.error_kind = error_kind;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repository trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Storage contract for the invocation ledger.
pub trait InvocationRepository: Send + Sync {
    /// Record a freshly-created `Pending` invocation.
    fn append(&self, invocation: ServiceInvocation) -> Result<()>;

    /// Move an invocation to a terminal status. An invocation completes
    /// exactly once — a second attempt is ignored and logged, never an
    /// overwrite.
    fn complete(
        &self,
        invocation_id: &Uuid,
        status: InvocationStatus,
        result: Option<String>,
        suggested_replies: Vec<String>,
        error_kind: Option<ErrorKind>,
    ) -> Result<()>;

    /// The most recent `Success` for this (user, action, input) triple whose
    /// completion lies inside `window`, if any.
    fn find_recent_success(
        &self,
        user_id: &str,
        action_id: &str,
        input_hash: &str,
        window: Duration,
    ) -> Result<Option<ServiceInvocation>>;

    /// The user's invocations, newest first, at most `limit`.
    fn list_history(&self, user_id: &str, limit: usize) -> Result<Vec<ServiceInvocation>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invocation log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_INVOCATIONS_IN_MEMORY: usize = 2000;

/// Bounded ring of recent invocations (newest last) with JSONL persistence.
pub struct InvocationLog {
    inner: RwLock<LogInner>,
    /// JSONL persistence path; `None` keeps the ledger purely in memory.
    log_path: Option<PathBuf>,
}

/// Interior state behind the RwLock — VecDeque plus a HashMap index that
/// maps invocation_id → logical sequence number. The logical offset tracks
/// how many entries have been popped from the front so the HashMap values
/// never need bulk adjustment.
struct LogInner {
    invocations: VecDeque<ServiceInvocation>,
    index: HashMap<Uuid, usize>,
    /// Logical sequence number of the front element.
    base_seq: usize,
}

impl LogInner {
    fn new(invocations: VecDeque<ServiceInvocation>) -> Self {
        let mut index = HashMap::with_capacity(invocations.len());
        for (i, invocation) in invocations.iter().enumerate() {
            index.insert(invocation.invocation_id, i);
        }
        Self {
            invocations,
            index,
            base_seq: 0,
        }
    }

    /// Convert a logical sequence number to a VecDeque index.
    fn deque_idx(&self, seq: usize) -> usize {
        seq - self.base_seq
    }

    fn get(&self, invocation_id: &Uuid) -> Option<&ServiceInvocation> {
        let seq = *self.index.get(invocation_id)?;
        let idx = self.deque_idx(seq);
        self.invocations.get(idx)
    }

    fn get_mut(&mut self, invocation_id: &Uuid) -> Option<&mut ServiceInvocation> {
        let seq = *self.index.get(invocation_id)?;
        let idx = self.deque_idx(seq);
        self.invocations.get_mut(idx)
    }

    fn push_back(&mut self, invocation: ServiceInvocation) {
        let seq = self.base_seq + self.invocations.len();
        self.index.insert(invocation.invocation_id, seq);
        self.invocations.push_back(invocation);
    }

    fn pop_front(&mut self) -> Option<ServiceInvocation> {
        let invocation = self.invocations.pop_front()?;
        self.index.remove(&invocation.invocation_id);
        self.base_seq += 1;
        Some(invocation)
    }
}

impl InvocationLog {
    /// Load or create the ledger at `state_path/invocations/invocations.jsonl`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("invocations");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let log_path = dir.join("invocations.jsonl");
        let (invocations, total_on_disk) = Self::load_recent(&log_path);

        // Prune the JSONL file if it contained more entries than we kept.
        if total_on_disk > invocations.len() {
            tracing::info!(
                kept = invocations.len(),
                pruned = total_on_disk - invocations.len(),
                "pruning invocations JSONL on disk"
            );
            Self::rewrite_jsonl(&log_path, &invocations);
        }

        tracing::info!(
            invocations = invocations.len(),
            path = %log_path.display(),
            "invocation log loaded"
        );

        Ok(Self {
            inner: RwLock::new(LogInner::new(invocations)),
            log_path: Some(log_path),
        })
    }

    /// A ledger that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(LogInner::new(VecDeque::new())),
            log_path: None,
        }
    }

    /// Load the most recent MAX_INVOCATIONS_IN_MEMORY records from the JSONL
    /// file. Returns (records, total_line_count) to detect if pruning is
    /// needed.
    fn load_recent(path: &Path) -> (VecDeque<ServiceInvocation>, usize) {
        let mut invocations = VecDeque::new();
        let mut total = 0;
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<&str> = content.lines().collect();
            total = lines.len();
            for line in lines.iter().rev().take(MAX_INVOCATIONS_IN_MEMORY) {
                if let Ok(invocation) = serde_json::from_str::<ServiceInvocation>(line) {
                    invocations.push_front(invocation);
                }
            }
        }
        (invocations, total)
    }

    /// Rewrite the JSONL file with only the given records (disk pruning).
    fn rewrite_jsonl(path: &Path, invocations: &VecDeque<ServiceInvocation>) {
        let tmp = path.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            ok = true;
            for invocation in invocations {
                if let Ok(json) = serde_json::to_string(invocation) {
                    if writeln!(f, "{}", json).is_err() {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, path);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    /// Append a terminal record to the JSONL file. Best-effort: a failed
    /// write is logged and the in-memory ring stays authoritative.
    fn persist(&self, invocation: &ServiceInvocation) {
        let Some(path) = &self.log_path else {
            return;
        };
        if let Ok(json) = serde_json::to_string(invocation) {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{json}");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not append to invocation log");
                }
            }
        }
    }

    /// Fetch one record by id (O(1) via index).
    pub fn get(&self, invocation_id: &Uuid) -> Option<ServiceInvocation> {
        self.inner.read().get(invocation_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().invocations.is_empty()
    }

    /// Count records by status (for the REPL stats view).
    pub fn status_counts(&self) -> HashMap<&'static str, usize> {
        let inner = self.inner.read();
        let mut counts = HashMap::new();
        for invocation in inner.invocations.iter() {
            *counts.entry(invocation.status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl InvocationRepository for InvocationLog {
    fn append(&self, invocation: ServiceInvocation) -> Result<()> {
        let mut inner = self.inner.write();
        inner.push_back(invocation);
        if inner.invocations.len() > MAX_INVOCATIONS_IN_MEMORY {
            inner.pop_front();
        }
        Ok(())
    }

    fn complete(
        &self,
        invocation_id: &Uuid,
        status: InvocationStatus,
        result: Option<String>,
        suggested_replies: Vec<String>,
        error_kind: Option<ErrorKind>,
    ) -> Result<()> {
        let completed = {
            let mut inner = self.inner.write();
            let Some(invocation) = inner.get_mut(invocation_id) else {
                tracing::warn!(%invocation_id, "completing an invocation the ring no longer holds");
                return Ok(());
            };
            if invocation.status.is_terminal() {
                tracing::warn!(
                    %invocation_id,
                    current = invocation.status.as_str(),
                    attempted = status.as_str(),
                    "invocation already terminal, ignoring late completion"
                );
                return Ok(());
            }
            invocation.finish(status, result, suggested_replies, error_kind);
            invocation.clone()
        };
        self.persist(&completed);
        Ok(())
    }

    fn find_recent_success(
        &self,
        user_id: &str,
        action_id: &str,
        input_hash: &str,
        window: Duration,
    ) -> Result<Option<ServiceInvocation>> {
        let now = Utc::now();
        let inner = self.inner.read();
        let hit = inner
            .invocations
            .iter()
            .rev()
            .find(|inv| {
                inv.status == InvocationStatus::Success
                    && inv.user_id == user_id
                    && inv.action_id == action_id
                    && inv.input_hash == input_hash
                    && inv
                        .completed_at
                        .is_some_and(|done| now - done <= window)
            })
            .cloned();
        Ok(hit)
    }

    fn list_history(&self, user_id: &str, limit: usize) -> Result<Vec<ServiceInvocation>> {
        let inner = self.inner.read();
        Ok(inner
            .invocations
            .iter()
            .rev()
            .filter(|inv| inv.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn success(user_id: &str, action_id: &str, input_hash: &str) -> ServiceInvocation {
        let mut inv = ServiceInvocation::new(action_id, user_id, input_hash);
        inv.finish(
            InvocationStatus::Success,
            Some("Your stars look good.".into()),
            Vec::new(),
            None,
        );
        inv
    }

    #[test]
    fn invocation_lifecycle() {
        let mut inv = ServiceInvocation::new("get_daily_horoscope", "u1", "abc123");
        assert_eq!(inv.status, InvocationStatus::Pending);
        assert!(inv.completed_at.is_none());

        inv.finish(
            InvocationStatus::Success,
            Some("text".into()),
            vec!["another reading".into()],
            None,
        );
        assert_eq!(inv.status, InvocationStatus::Success);
        assert_eq!(inv.suggested_replies, vec!["another reading".to_string()]);
        assert!(inv.completed_at.is_some());
        assert!(inv.duration_ms.is_some());
    }

    #[test]
    fn append_and_get() {
        let log = InvocationLog::in_memory();
        let inv = ServiceInvocation::new("get_daily_horoscope", "u1", "abc");
        let id = inv.invocation_id;
        log.append(inv).unwrap();

        let fetched = log.get(&id).unwrap();
        assert_eq!(fetched.action_id, "get_daily_horoscope");
        assert_eq!(fetched.status, InvocationStatus::Pending);
    }

    #[test]
    fn complete_is_terminal_exactly_once() {
        let log = InvocationLog::in_memory();
        let inv = ServiceInvocation::new("get_numerology_report", "u1", "abc");
        let id = inv.invocation_id;
        log.append(inv).unwrap();

        log.complete(
            &id,
            InvocationStatus::Timeout,
            None,
            Vec::new(),
            Some(ErrorKind::Timeout),
        )
        .unwrap();
        // A late success must not overwrite the recorded timeout.
        log.complete(
            &id,
            InvocationStatus::Success,
            Some("late".into()),
            vec!["too late".into()],
            None,
        )
        .unwrap();

        let fetched = log.get(&id).unwrap();
        assert_eq!(fetched.status, InvocationStatus::Timeout);
        assert!(fetched.result.is_none());
        assert!(fetched.suggested_replies.is_empty());
    }

    #[test]
    fn completing_unknown_id_is_ignored() {
        let log = InvocationLog::in_memory();
        log.complete(&Uuid::new_v4(), InvocationStatus::Success, None, Vec::new(), None)
            .unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn dedup_finds_recent_success_only() {
        let log = InvocationLog::in_memory();
        log.append(success("u1", "get_daily_horoscope", "h1")).unwrap();

        let mut failed = ServiceInvocation::new("get_daily_horoscope", "u1", "h2");
        failed.finish(
            InvocationStatus::Failed,
            None,
            Vec::new(),
            Some(ErrorKind::CalculationFailure),
        );
        log.append(failed).unwrap();

        let hit = log
            .find_recent_success("u1", "get_daily_horoscope", "h1", Duration::seconds(300))
            .unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().result.as_deref(), Some("Your stars look good."));

        // Failed record with a different hash never serves dedup.
        let miss = log
            .find_recent_success("u1", "get_daily_horoscope", "h2", Duration::seconds(300))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn dedup_window_excludes_old_results() {
        let log = InvocationLog::in_memory();
        let mut old = success("u1", "get_daily_horoscope", "h1");
        old.completed_at = Some(Utc::now() - Duration::seconds(600));
        log.append(old).unwrap();

        let hit = log
            .find_recent_success("u1", "get_daily_horoscope", "h1", Duration::seconds(300))
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn dedup_is_scoped_to_the_user() {
        let log = InvocationLog::in_memory();
        log.append(success("u1", "get_daily_horoscope", "h1")).unwrap();

        let other_user = log
            .find_recent_success("u2", "get_daily_horoscope", "h1", Duration::seconds(300))
            .unwrap();
        assert!(other_user.is_none());
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let log = InvocationLog::in_memory();
        for i in 0..5 {
            log.append(success("u1", &format!("action_{i}"), "h")).unwrap();
        }
        log.append(success("u2", "other_action", "h")).unwrap();

        let history = log.list_history("u1", 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].action_id, "action_4");
        assert_eq!(history[2].action_id, "action_2");
    }

    #[test]
    fn ring_is_bounded() {
        let log = InvocationLog::in_memory();
        for i in 0..(MAX_INVOCATIONS_IN_MEMORY + 10) {
            log.append(success("u1", &format!("action_{i}"), "h")).unwrap();
        }
        assert_eq!(log.len(), MAX_INVOCATIONS_IN_MEMORY);

        // Oldest entries fell off; newest survive and stay addressable.
        let history = log.list_history("u1", 1).unwrap();
        assert_eq!(
            history[0].action_id,
            format!("action_{}", MAX_INVOCATIONS_IN_MEMORY + 9)
        );
    }

    #[test]
    fn only_terminal_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let completed_id;
        {
            let log = InvocationLog::open(dir.path()).unwrap();
            let inv = ServiceInvocation::new("get_daily_horoscope", "u1", "h1");
            completed_id = inv.invocation_id;
            log.append(inv).unwrap();
            log.complete(
                &completed_id,
                InvocationStatus::Success,
                Some("done".into()),
                vec!["weekly horoscope".into()],
                None,
            )
            .unwrap();

            // Still pending at shutdown — never persisted.
            log.append(ServiceInvocation::new("get_tarot_reading", "u1", "h2"))
                .unwrap();
        }

        let reopened = InvocationLog::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        let survivor = reopened.get(&completed_id).unwrap();
        assert_eq!(survivor.status, InvocationStatus::Success);
        assert_eq!(survivor.suggested_replies, vec!["weekly horoscope".to_string()]);
    }

    #[test]
    fn status_counts_tally_the_ring() {
        let log = InvocationLog::in_memory();
        log.append(success("u1", "a", "h")).unwrap();
        log.append(success("u1", "b", "h")).unwrap();
        log.append(ServiceInvocation::new("c", "u1", "h")).unwrap();

        let counts = log.status_counts();
        assert_eq!(counts.get("success"), Some(&2));
        assert_eq!(counts.get("pending"), Some(&1));
    }
}
