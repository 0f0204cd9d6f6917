//! AppState construction shared by every CLI command.
//!
//! `chat` and the catalog/config commands all boot through here, so a
//! future transport (HTTP, a messaging bridge) gets the same wiring for
//! free.

use std::sync::Arc;

use anyhow::Context;

use sibyl_catalog::ActionCatalog;
use sibyl_domain::config::{Config, ConfigSeverity};
use sibyl_sessions::{SessionStore, UserStore};

use crate::engine::Engine;
use crate::handler::HandlerRegistry;
use crate::handlers;
use crate::invocations::InvocationLog;
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`]. Must run inside the Tokio runtime — boot spawns the
/// periodic maintenance task.
///
/// `with_demo_handlers` backs all implemented catalog entries that lack a
/// dedicated registration with the demo reading generator. Frontends pass
/// `true`; a deployment embedding the engine registers its own handlers
/// and passes `false`.
pub fn build_app_state(config: Arc<Config>, with_demo_handlers: bool) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Action catalog ───────────────────────────────────────────────
    let catalog = Arc::new(match &config.catalog.path {
        Some(path) => ActionCatalog::from_path(path)
            .with_context(|| format!("loading catalog from {}", path.display()))?,
        None => ActionCatalog::builtin().context("loading built-in catalog")?,
    });
    tracing::info!(actions = catalog.len(), "catalog ready");

    // ── Stores ───────────────────────────────────────────────────────
    let state_path = &config.storage.state_path;
    let (sessions, users, invocations) = if config.storage.persist {
        (
            Arc::new(SessionStore::open(state_path).context("opening session store")?),
            Arc::new(UserStore::open(state_path).context("opening user store")?),
            Arc::new(InvocationLog::open(state_path).context("opening invocation log")?),
        )
    } else {
        (
            Arc::new(SessionStore::in_memory()),
            Arc::new(UserStore::in_memory()),
            Arc::new(InvocationLog::in_memory()),
        )
    };
    tracing::info!(
        path = %state_path.display(),
        persist = config.storage.persist,
        "stores ready"
    );

    // ── Handler registry ─────────────────────────────────────────────
    let mut registry = HandlerRegistry::new();
    handlers::register_builtin(
        &mut registry,
        catalog.clone(),
        users.clone(),
        invocations.clone(),
    );
    if with_demo_handlers {
        handlers::demo::register_demo(&mut registry, &catalog);
    }
    let registry = Arc::new(registry);
    tracing::info!(handlers = registry.len(), "handler registry ready");

    for issue in catalog.verify_handlers(&registry.keys()) {
        tracing::warn!("catalog: {issue}");
    }

    // ── Engine ───────────────────────────────────────────────────────
    let engine = Arc::new(Engine::new(
        catalog.clone(),
        sessions,
        users,
        invocations.clone(),
        registry,
        &config,
    ));
    tracing::info!("engine ready");

    // ── Periodic turn-lock pruning ───────────────────────────────────
    {
        let locks = engine.user_locks();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                locks.prune_idle();
            }
        });
    }

    Ok(AppState {
        config,
        catalog,
        engine,
        invocations,
    })
}
