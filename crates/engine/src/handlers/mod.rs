//! Built-in handlers.
//!
//! Profile and account actions are served in-process against the stores;
//! everything else ships with a demo reading generator so the binary works
//! end to end out of the box. A real deployment swaps `register_demo` for
//! registrations that call the actual calculation backends.

use std::sync::Arc;

use sibyl_catalog::ActionCatalog;
use sibyl_sessions::UserRepository;

use crate::handler::HandlerRegistry;
use crate::invocations::InvocationRepository;

pub mod account;
pub mod demo;
pub mod profile;

/// Register the handlers that work against the core's own stores.
pub fn register_builtin(
    registry: &mut HandlerRegistry,
    catalog: Arc<ActionCatalog>,
    users: Arc<dyn UserRepository>,
    invocations: Arc<dyn InvocationRepository>,
) {
    registry.register(
        "profile.update_birth",
        Arc::new(profile::UpdateBirthHandler::new(users.clone())),
    );
    registry.register(
        "profile.update_name",
        Arc::new(profile::UpdateNameHandler::new(users.clone())),
    );
    registry.register(
        "profile.language",
        Arc::new(profile::SetLanguageHandler::new(users.clone())),
    );
    registry.register(
        "profile.notifications",
        Arc::new(profile::SetNotificationsHandler::new(users.clone())),
    );
    registry.register("profile.view", Arc::new(profile::ViewProfileHandler));
    registry.register(
        "profile.deactivate",
        Arc::new(profile::DeactivateHandler::new(users)),
    );

    registry.register("account.menu", Arc::new(account::MenuHandler::new(catalog.clone())));
    registry.register(
        "account.history",
        Arc::new(account::HistoryHandler::new(invocations, catalog)),
    );
    registry.register("account.subscription", Arc::new(account::SubscriptionHandler));
    registry.register(
        "account.upgrade",
        Arc::new(account::StaticTextHandler::new(
            "Sibyl Plus unlocks detailed charts, Vedic reports and partner \
             compatibility, and Premium adds personal readings with priority \
             delivery. Visit your account page to upgrade.",
        )),
    );
    registry.register(
        "account.support",
        Arc::new(account::StaticTextHandler::new(
            "You can reach the Sibyl team at support@sibyl.example — we answer \
             within one working day.",
        )),
    );
}
