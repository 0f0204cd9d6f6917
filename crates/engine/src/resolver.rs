//! Token resolution — deciding what one inbound message means.
//!
//! Pure routing over the catalog and the session: no IO, no side effects.
//! While a flow is open every message is a field answer (or the cancel
//! token), never the start of another action; outside a flow the message is
//! matched against catalog tokens.

use sibyl_catalog::{normalize_token, ActionCatalog, ActionDefinition};
use sibyl_sessions::{Session, SessionState};

/// What the engine should do with the message.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// No flow open and the text matches no catalog token.
    Unrecognized,
    /// The cancel token arrived while a flow was open.
    CancelFlow,
    /// The message answers the open flow's current field.
    ContinueFlow(&'a ActionDefinition),
    /// The open flow references an action the catalog no longer has.
    BrokenFlow { action_id: String },
    /// The text names an action that needs inputs — open a flow.
    StartFlow(&'a ActionDefinition),
    /// The text names a zero-input action — dispatch right away.
    Immediate(&'a ActionDefinition),
}

pub fn resolve<'a>(
    catalog: &'a ActionCatalog,
    session: &Session,
    text: &str,
    cancel_token: &str,
) -> Resolution<'a> {
    if session.state == SessionState::AwaitingInput {
        if let Some(flow) = &session.flow {
            if normalize_token(text) == normalize_token(cancel_token) {
                return Resolution::CancelFlow;
            }
            return match catalog.get(&flow.action_id) {
                Some(action) => Resolution::ContinueFlow(action),
                None => Resolution::BrokenFlow {
                    action_id: flow.action_id.clone(),
                },
            };
        }
    }

    match catalog.resolve_token(text) {
        None => Resolution::Unrecognized,
        Some(action) if action.inputs.is_empty() => Resolution::Immediate(action),
        Some(action) => Resolution::StartFlow(action),
    }
}
