use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use sibyl_domain::error::{Error, Result};

use crate::types::{ActionDefinition, FieldValidator, ImplementationStatus};

/// Catalog schema revision this build understands.
const SCHEMA_VERSION: u32 = 1;

/// The embedded default catalog.
const BUILTIN_CATALOG: &str = include_str!("../catalog.toml");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    schema_version: u32,
    #[serde(rename = "action", default)]
    actions: Vec<ActionDefinition>,
}

/// Normalize user-facing text for token matching: trim, lowercase, collapse
/// inner whitespace. Applied to catalog tokens at load and to inbound text
/// at resolution, so both sides agree.
pub fn normalize_token(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Read-only action lookup, built once at startup.
#[derive(Debug)]
pub struct ActionCatalog {
    actions: Vec<ActionDefinition>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
}

impl ActionCatalog {
    /// Parse and integrity-check a catalog document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(raw).map_err(|e| Error::Catalog(format!("parse error: {e}")))?;
        if file.schema_version != SCHEMA_VERSION {
            return Err(Error::Catalog(format!(
                "unsupported schema_version {} (this build understands {})",
                file.schema_version, SCHEMA_VERSION
            )));
        }

        let mut by_id = HashMap::new();
        let mut by_token = HashMap::new();
        for (index, action) in file.actions.iter().enumerate() {
            check_action(action)?;
            if by_id.insert(action.id.clone(), index).is_some() {
                return Err(Error::Catalog(format!("duplicate action id `{}`", action.id)));
            }
            for token in &action.tokens {
                let normalized = normalize_token(token);
                if normalized.is_empty() {
                    return Err(Error::Catalog(format!(
                        "action `{}` has a blank token",
                        action.id
                    )));
                }
                if let Some(other) = by_token.insert(normalized.clone(), index) {
                    return Err(Error::Catalog(format!(
                        "token `{normalized}` claimed by both `{}` and `{}`",
                        file.actions[other].id, action.id
                    )));
                }
            }
        }

        let catalog = Self {
            actions: file.actions,
            by_id,
            by_token,
        };
        tracing::info!(
            actions = catalog.actions.len(),
            tokens = catalog.by_token.len(),
            "action catalog loaded"
        );
        Ok(catalog)
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// An operator-supplied catalog file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            Error::Catalog(msg) => Error::Catalog(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Case-insensitive, whitespace-normalized token lookup.
    pub fn resolve_token(&self, text: &str) -> Option<&ActionDefinition> {
        self.by_token
            .get(&normalize_token(text))
            .map(|&index| &self.actions[index])
    }

    pub fn get(&self, id: &str) -> Option<&ActionDefinition> {
        self.by_id.get(id).map(|&index| &self.actions[index])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.iter()
    }

    /// Entries flagged for the top-level menu, in catalog order.
    pub fn menu_entries(&self) -> Vec<&ActionDefinition> {
        self.actions.iter().filter(|a| a.menu).collect()
    }

    /// Cross-check the catalog against the registered handler keys.
    ///
    /// An `Implemented` entry without a handler is a wiring defect; a handler
    /// registered under a key no implemented entry uses is dead wiring. Both
    /// are reported, neither aborts boot.
    pub fn verify_handlers(&self, registered: &HashSet<String>) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        let mut used = HashSet::new();
        for action in &self.actions {
            if action.status.is_implemented() {
                used.insert(action.handler.as_str());
                if !registered.contains(&action.handler) {
                    issues.push(CatalogIssue {
                        action_id: action.id.clone(),
                        message: format!(
                            "implemented but handler `{}` is not registered",
                            action.handler
                        ),
                    });
                }
            }
        }
        for key in registered {
            if !used.contains(key.as_str()) {
                issues.push(CatalogIssue {
                    action_id: String::new(),
                    message: format!("handler `{key}` is registered but no implemented entry uses it"),
                });
            }
        }
        issues
    }
}

fn check_action(action: &ActionDefinition) -> Result<()> {
    let fail = |msg: String| Err(Error::Catalog(format!("action `{}`: {msg}", action.id)));
    if action.id.trim().is_empty() {
        return Err(Error::Catalog("action with empty id".into()));
    }
    if action.title.trim().is_empty() {
        return fail("empty title".into());
    }
    if action.tokens.is_empty() {
        return fail("no tokens (entry would be unreachable)".into());
    }
    if action.handler.trim().is_empty() {
        return fail("empty handler key".into());
    }
    let mut names = HashSet::new();
    for input in &action.inputs {
        if !names.insert(input.name.as_str()) {
            return fail(format!("duplicate input field `{}`", input.name));
        }
        match &input.validator {
            FieldValidator::Number { min, max } if min > max => {
                return fail(format!("input `{}` has min > max", input.name));
            }
            FieldValidator::Choice { options } if options.is_empty() => {
                return fail(format!("input `{}` has no options", input.name));
            }
            _ => {}
        }
    }
    if action.status == ImplementationStatus::Missing && !action.inputs.is_empty() {
        // Allowed, but worth tracing: users will be walked through a flow
        // whose handler does not exist yet.
        tracing::debug!(action_id = %action.id, "missing-status entry declares inputs");
    }
    Ok(())
}

/// A non-fatal catalog/handler wiring mismatch.
#[derive(Debug, Clone)]
pub struct CatalogIssue {
    pub action_id: String,
    pub message: String,
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action_id.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.action_id, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
schema_version = 1

[[action]]
id = "get_daily_horoscope"
title = "Daily horoscope"
tokens = ["daily horoscope", "1"]
handler = "horoscope.daily"
status = "implemented"
menu = true
category = "horoscope"

[[action]]
id = "get_tarot_reading"
title = "Tarot reading"
tokens = ["tarot"]
handler = "divination.tarot"
status = "stub"
category = "divination"
inputs = [
  { name = "question", prompt = "What would you like to ask the cards?", validator = { kind = "text", max_len = 140 } },
]
"#;

    #[test]
    fn parses_and_indexes() {
        let catalog = ActionCatalog::from_toml_str(SMALL).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.resolve_token("  Daily   HOROSCOPE ").unwrap().id,
            "get_daily_horoscope"
        );
        assert_eq!(catalog.resolve_token("1").unwrap().id, "get_daily_horoscope");
        assert!(catalog.resolve_token("unknown thing").is_none());
        assert_eq!(catalog.get("get_tarot_reading").unwrap().inputs.len(), 1);
    }

    #[test]
    fn menu_entries_follow_catalog_order() {
        let catalog = ActionCatalog::from_toml_str(SMALL).unwrap();
        let menu = catalog.menu_entries();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].id, "get_daily_horoscope");
    }

    #[test]
    fn rejects_wrong_schema_version() {
        let raw = SMALL.replace("schema_version = 1", "schema_version = 99");
        let err = ActionCatalog::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("schema_version"));
    }

    #[test]
    fn rejects_duplicate_tokens() {
        let raw = SMALL.replace("tokens = [\"tarot\"]", "tokens = [\"tarot\", \"Daily Horoscope\"]");
        let err = ActionCatalog::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("daily horoscope"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let raw = SMALL.replace("id = \"get_tarot_reading\"", "id = \"get_daily_horoscope\"");
        assert!(ActionCatalog::from_toml_str(&raw).is_err());
    }

    #[test]
    fn verify_reports_unwired_implemented_entries() {
        let catalog = ActionCatalog::from_toml_str(SMALL).unwrap();
        let issues = catalog.verify_handlers(&HashSet::new());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].action_id, "get_daily_horoscope");

        let mut registered = HashSet::new();
        registered.insert("horoscope.daily".to_string());
        assert!(catalog.verify_handlers(&registered).is_empty());

        registered.insert("never.used".to_string());
        let issues = catalog.verify_handlers(&registered);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("never.used"));
    }

    #[test]
    fn builtin_catalog_loads_clean() {
        let catalog = ActionCatalog::builtin().unwrap();
        assert!(catalog.len() >= 80, "expected a full catalog, got {}", catalog.len());
        assert!(catalog.get("get_daily_horoscope").is_some());
        assert!(catalog.get("start_couple_compatibility_flow").is_some());
        assert!(!catalog.menu_entries().is_empty());
    }
}
