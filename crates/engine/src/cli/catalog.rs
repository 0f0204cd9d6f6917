//! `sibyl catalog` — inspect the action catalog from the command line.

use std::sync::Arc;

use sibyl_catalog::ActionCatalog;
use sibyl_domain::config::Config;
use sibyl_sessions::UserStore;

use crate::handler::HandlerRegistry;
use crate::handlers;
use crate::invocations::InvocationLog;

fn load_catalog(config: &Config) -> anyhow::Result<ActionCatalog> {
    Ok(match &config.catalog.path {
        Some(path) => ActionCatalog::from_path(path)?,
        None => ActionCatalog::builtin()?,
    })
}

/// Print every catalog entry: id, status, menu flag and title.
pub fn list(config: &Config) -> anyhow::Result<()> {
    let catalog = load_catalog(config)?;

    for action in catalog.iter() {
        let menu = if action.menu { "menu" } else { "" };
        println!(
            "{:<32} {:<12} {:<5} {}",
            action.id, action.status, menu, action.title
        );
    }
    let on_menu = catalog.menu_entries().len();
    println!("\n{} actions, {on_menu} on the menu", catalog.len());
    Ok(())
}

/// Cross-check the catalog against the handler set the binary registers.
///
/// Returns `true` when every implemented entry has a handler and no
/// registered handler is orphaned.
pub fn check(config: &Config) -> anyhow::Result<bool> {
    let catalog = Arc::new(load_catalog(config)?);

    // Mirror the bootstrap wiring against throwaway stores.
    let mut registry = HandlerRegistry::new();
    handlers::register_builtin(
        &mut registry,
        catalog.clone(),
        Arc::new(UserStore::in_memory()),
        Arc::new(InvocationLog::in_memory()),
    );
    handlers::demo::register_demo(&mut registry, &catalog);

    let issues = catalog.verify_handlers(&registry.keys());
    if issues.is_empty() {
        println!(
            "Catalog OK ({} actions, {} handlers)",
            catalog.len(),
            registry.len()
        );
        return Ok(true);
    }

    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{} issue(s)", issues.len());
    Ok(false)
}
