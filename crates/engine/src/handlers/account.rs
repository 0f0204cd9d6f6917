//! Account actions — menu, history, subscription info.

use std::sync::Arc;

use sibyl_catalog::ActionCatalog;
use sibyl_domain::error::Result;
use sibyl_domain::user::SubscriptionTier;

use crate::handler::{ActionHandler, ActionInput, HandlerContext, HandlerOutput};
use crate::invocations::InvocationRepository;

/// How many past readings the history view shows.
const HISTORY_LIMIT: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Menu
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MenuHandler {
    catalog: Arc<ActionCatalog>,
}

impl MenuHandler {
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self { catalog }
    }
}

impl ActionHandler for MenuHandler {
    fn execute(&self, ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
        let greeting = match ctx.profile.preferences.get("name") {
            Some(name) => format!("Welcome back, {name}!"),
            None => "Welcome to Sibyl!".to_owned(),
        };

        let lines: Vec<String> = self
            .catalog
            .menu_entries()
            .iter()
            .enumerate()
            .map(|(i, action)| format!("{}. {}", i + 1, action.title))
            .collect();

        let text = format!(
            "{greeting} Here is what I can prepare for you:\n\n{}\n\n\
             Reply with a number or the name of a reading. \
             Reply \"cancel\" during any flow to stop it.",
            lines.join("\n")
        );

        let suggestions = self
            .catalog
            .menu_entries()
            .iter()
            .map(|action| action.primary_token().to_owned())
            .collect();

        Ok(HandlerOutput::text(text).with_suggestions(suggestions))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reading history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HistoryHandler {
    invocations: Arc<dyn InvocationRepository>,
    catalog: Arc<ActionCatalog>,
}

impl HistoryHandler {
    pub fn new(invocations: Arc<dyn InvocationRepository>, catalog: Arc<ActionCatalog>) -> Self {
        Self {
            invocations,
            catalog,
        }
    }
}

impl ActionHandler for HistoryHandler {
    fn execute(&self, ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
        let history = self
            .invocations
            .list_history(&ctx.profile.user_id, HISTORY_LIMIT)?;

        if history.is_empty() {
            return Ok(HandlerOutput::text(
                "You have no readings yet. Ask for one and it will show up here.",
            ));
        }

        let lines: Vec<String> = history
            .iter()
            .map(|invocation| {
                let title = self
                    .catalog
                    .get(&invocation.action_id)
                    .map(|action| action.title.as_str())
                    .unwrap_or(invocation.action_id.as_str());
                format!(
                    "{}  {} — {}",
                    invocation.started_at.format("%d/%m %H:%M"),
                    title,
                    invocation.status.as_str()
                )
            })
            .collect();

        Ok(HandlerOutput::text(format!(
            "Your recent readings:\n{}",
            lines.join("\n")
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscription + static info
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SubscriptionHandler;

impl ActionHandler for SubscriptionHandler {
    fn execute(&self, ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
        let text = match ctx.profile.tier {
            SubscriptionTier::Free => {
                "You're on the free plan: daily readings and basic charts. \
                 Ask for \"upgrade\" to see what Plus and Premium add."
            }
            SubscriptionTier::Plus => {
                "You're on Sibyl Plus: detailed charts, Vedic reports and \
                 compatibility readings are all included."
            }
            SubscriptionTier::Premium => {
                "You're on Sibyl Premium — every reading we offer, with \
                 priority delivery."
            }
        };
        Ok(HandlerOutput::text(text))
    }
}

/// A handler whose reply never varies. Used for informational actions.
pub struct StaticTextHandler {
    text: String,
}

impl StaticTextHandler {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ActionHandler for StaticTextHandler {
    fn execute(&self, _ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
        Ok(HandlerOutput::text(self.text.clone()))
    }
}
