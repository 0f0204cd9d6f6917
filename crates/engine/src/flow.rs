//! Flow advancement — feeding one answer into an open flow.
//!
//! Pure state transitions over an `ActiveFlow`: validate the answer against
//! the current field, track the retry budget, and report whether the flow
//! wants another prompt or is ready to dispatch. Side effects (saving the
//! session, dispatching, tracing) belong to the engine.

use sibyl_catalog::ActionDefinition;
use sibyl_sessions::ActiveFlow;

/// Where the flow stands after one answer.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    /// The value was accepted; ask for the next field.
    Prompt { text: String },
    /// The value was rejected; re-prompt the same field.
    Retry { reason: String },
    /// The retry budget for the current field is spent.
    Exhausted,
    /// Every field is collected; the flow is ready to dispatch.
    Complete,
}

/// The prompt for the field the flow is currently waiting on.
pub fn current_prompt<'a>(action: &'a ActionDefinition, flow: &ActiveFlow) -> Option<&'a str> {
    action
        .inputs
        .get(flow.next_field)
        .map(|spec| spec.prompt.as_str())
}

/// Feed one answer into the flow.
///
/// `max_retries` caps consecutive invalid submissions per field; the
/// submission that reaches the cap yields `Exhausted` and the caller
/// aborts the flow.
pub fn advance(
    action: &ActionDefinition,
    flow: &mut ActiveFlow,
    text: &str,
    max_retries: u32,
) -> FlowStep {
    let Some(spec) = action.inputs.get(flow.next_field) else {
        // Nothing left to collect. Normally unreachable: a complete flow is
        // dispatched and dropped within the same turn.
        return FlowStep::Complete;
    };

    match spec.validator.validate(text) {
        Err(reason) => {
            flow.attempts += 1;
            if flow.attempts >= max_retries {
                FlowStep::Exhausted
            } else {
                FlowStep::Retry { reason }
            }
        }
        Ok(value) => {
            flow.accept(&spec.name, value);
            match current_prompt(action, flow) {
                Some(prompt) => FlowStep::Prompt {
                    text: prompt.to_owned(),
                },
                None => FlowStep::Complete,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use sibyl_catalog::{FieldSpec, FieldValidator, ImplementationStatus};

    fn birth_details_action() -> ActionDefinition {
        ActionDefinition {
            id: "update_birth_details".into(),
            title: "Update birth details".into(),
            tokens: vec!["update birth details".into()],
            inputs: vec![
                FieldSpec {
                    name: "birth_date".into(),
                    prompt: "What is your date of birth? (DD/MM/YYYY)".into(),
                    validator: FieldValidator::Date { past_only: true },
                },
                FieldSpec {
                    name: "birth_time".into(),
                    prompt: "And the time of birth? (HH:MM)".into(),
                    validator: FieldValidator::Time,
                },
            ],
            handler: "profile.update_birth".into(),
            status: ImplementationStatus::Implemented,
            menu: false,
            category: "profile".into(),
        }
    }

    #[test]
    fn fresh_flow_waits_on_the_first_field() {
        let action = birth_details_action();
        let flow = ActiveFlow::new(&action.id, Utc::now());
        assert_eq!(
            current_prompt(&action, &flow),
            Some("What is your date of birth? (DD/MM/YYYY)")
        );
    }

    #[test]
    fn accepted_value_moves_to_the_next_prompt() {
        let action = birth_details_action();
        let mut flow = ActiveFlow::new(&action.id, Utc::now());

        let step = advance(&action, &mut flow, "14/03/1990", 3);
        assert_eq!(
            step,
            FlowStep::Prompt {
                text: "And the time of birth? (HH:MM)".into()
            }
        );
        assert_eq!(flow.collected.len(), 1);
        assert_eq!(flow.collected[0].name, "birth_date");
    }

    #[test]
    fn final_value_completes_the_flow() {
        let action = birth_details_action();
        let mut flow = ActiveFlow::new(&action.id, Utc::now());

        advance(&action, &mut flow, "14/03/1990", 3);
        let step = advance(&action, &mut flow, "7:30 pm", 3);
        assert_eq!(step, FlowStep::Complete);
        assert_eq!(flow.collected.len(), 2);
        assert_eq!(flow.collected[1].value.canonical(), "19:30");
    }

    #[test]
    fn invalid_value_retries_with_a_reason() {
        let action = birth_details_action();
        let mut flow = ActiveFlow::new(&action.id, Utc::now());

        let step = advance(&action, &mut flow, "yesterday-ish", 3);
        assert!(matches!(step, FlowStep::Retry { .. }));
        assert_eq!(flow.attempts, 1);
        assert!(flow.collected.is_empty());
    }

    #[test]
    fn acceptance_resets_the_retry_count() {
        let action = birth_details_action();
        let mut flow = ActiveFlow::new(&action.id, Utc::now());

        advance(&action, &mut flow, "not a date", 3);
        advance(&action, &mut flow, "still not", 3);
        advance(&action, &mut flow, "14/03/1990", 3);
        assert_eq!(flow.attempts, 0);

        // The next field gets its own full budget.
        let step = advance(&action, &mut flow, "not a time", 3);
        assert!(matches!(step, FlowStep::Retry { .. }));
        assert_eq!(flow.attempts, 1);
    }

    #[test]
    fn third_invalid_answer_exhausts_the_budget() {
        let action = birth_details_action();
        let mut flow = ActiveFlow::new(&action.id, Utc::now());

        assert!(matches!(
            advance(&action, &mut flow, "nope", 3),
            FlowStep::Retry { .. }
        ));
        assert!(matches!(
            advance(&action, &mut flow, "still nope", 3),
            FlowStep::Retry { .. }
        ));
        assert_eq!(advance(&action, &mut flow, "nope again", 3), FlowStep::Exhausted);
    }
}
