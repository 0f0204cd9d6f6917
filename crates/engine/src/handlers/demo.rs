//! Demo reading generator.
//!
//! Stands in for the real calculation backends so the binary produces
//! complete conversations out of the box. Output is deterministic per
//! user, action and calendar day, which keeps the dedup path honest:
//! a cached reply and a regenerated one look identical.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use sibyl_catalog::{ActionCatalog, ActionDefinition, FieldValue};
use sibyl_domain::error::{Error, Result};

use crate::handler::{ActionHandler, ActionInput, HandlerContext, HandlerOutput, HandlerRegistry};

/// Western zodiac sign for a calendar date.
pub fn sun_sign(date: NaiveDate) -> &'static str {
    match (date.month(), date.day()) {
        (3, 21..=31) | (4, 1..=19) => "Aries",
        (4, 20..=30) | (5, 1..=20) => "Taurus",
        (5, 21..=31) | (6, 1..=20) => "Gemini",
        (6, 21..=30) | (7, 1..=22) => "Cancer",
        (7, 23..=31) | (8, 1..=22) => "Leo",
        (8, 23..=31) | (9, 1..=22) => "Virgo",
        (9, 23..=30) | (10, 1..=22) => "Libra",
        (10, 23..=31) | (11, 1..=21) => "Scorpio",
        (11, 22..=30) | (12, 1..=21) => "Sagittarius",
        (12, 22..=31) | (1, 1..=19) => "Capricorn",
        (1, 20..=31) | (2, 1..=18) => "Aquarius",
        _ => "Pisces",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sign lookup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SignLookupHandler;

impl ActionHandler for SignLookupHandler {
    fn execute(&self, _ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput> {
        let date = input
            .get("birth_date")
            .and_then(FieldValue::as_date)
            .ok_or_else(|| Error::Other("dispatched without required input `birth_date`".into()))?;
        Ok(HandlerOutput::text(format!(
            "Born on {}, your zodiac sign is {}.",
            date.format("%d/%m/%Y"),
            sun_sign(date)
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generated readings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TONES: [&str; 8] = [
    "clarity",
    "momentum",
    "patience",
    "renewal",
    "candour",
    "restraint",
    "curiosity",
    "resolve",
];

const AREAS: [&str; 6] = [
    "work and ambition",
    "close relationships",
    "health and routine",
    "money and possessions",
    "learning and travel",
    "home and family",
];

const ADVICE: [&str; 6] = [
    "Say the thing you have been postponing.",
    "Finish one small task before starting anything new.",
    "Let someone else set the pace today.",
    "Write the decision down before you make it.",
    "An old connection is worth a message.",
    "Keep the evening unplanned.",
];

fn seed(user_id: &str, action_id: &str, date: NaiveDate) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(action_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(date.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(word)
}

fn opener(category: &str) -> &'static str {
    match category {
        "horoscope" | "sky" => "The sky arranges itself around",
        "divination" => "The cards point toward",
        "numerology" => "The numbers resolve toward",
        "vedic" | "remedy" => "The old charts counsel",
        "compatibility" => "Between the two charts sits",
        _ => "Today's pattern centres on",
    }
}

/// A reading composed from the deterministic seed.
///
/// One instance per catalog entry; the title and category flavour
/// otherwise shared text.
pub struct DemoReadingHandler {
    title: String,
    category: String,
}

impl DemoReadingHandler {
    pub fn new(action: &ActionDefinition) -> Self {
        Self {
            title: action.title.clone(),
            category: action.category.clone(),
        }
    }
}

impl ActionHandler for DemoReadingHandler {
    fn execute(&self, ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput> {
        let today = Utc::now().date_naive();
        let roll = seed(&input.user_id, &input.action_id, today);

        let tone = TONES[(roll % TONES.len() as u64) as usize];
        let area = AREAS[((roll >> 8) % AREAS.len() as u64) as usize];
        let advice = ADVICE[((roll >> 16) % ADVICE.len() as u64) as usize];

        let mut text = format!(
            "{} — {}\n\n{} {}. Attention gathers around {}.",
            self.title,
            today.format("%d/%m/%Y"),
            opener(&self.category),
            tone,
            area,
        );

        if let Some(birth) = ctx.profile.birth.date {
            text.push_str(&format!(
                " As a {}, you feel this more than most.",
                sun_sign(birth)
            ));
        }

        if !input.fields.is_empty() {
            let details: Vec<String> = input
                .fields
                .iter()
                .map(|field| field.value.canonical())
                .collect();
            text.push_str(&format!("\n\nRead for: {}.", details.join(", ")));
        }

        text.push_str(&format!("\n\n{advice}"));
        Ok(HandlerOutput::text(text))
    }
}

/// Back every implemented catalog entry that has no dedicated handler
/// with a generated reading. Registered after the builtins so profile
/// and account actions keep their real implementations.
pub fn register_demo(registry: &mut HandlerRegistry, catalog: &ActionCatalog) {
    registry.register("misc.sign_lookup", Arc::new(SignLookupHandler));

    for action in catalog.iter() {
        if action.status.is_implemented() && registry.get(&action.handler).is_none() {
            registry.register(&action.handler, Arc::new(DemoReadingHandler::new(action)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sibyl_domain::user::UserProfile;

    use crate::cancel::CancelToken;

    fn ctx() -> HandlerContext {
        HandlerContext {
            profile: UserProfile::new("u1"),
            cancel: CancelToken::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sun_sign_boundaries() {
        assert_eq!(sun_sign(date(1990, 3, 20)), "Pisces");
        assert_eq!(sun_sign(date(1990, 3, 21)), "Aries");
        assert_eq!(sun_sign(date(1990, 4, 19)), "Aries");
        assert_eq!(sun_sign(date(1990, 4, 20)), "Taurus");
        assert_eq!(sun_sign(date(1990, 8, 23)), "Virgo");
        assert_eq!(sun_sign(date(1990, 12, 21)), "Sagittarius");
        assert_eq!(sun_sign(date(1990, 12, 22)), "Capricorn");
        assert_eq!(sun_sign(date(1990, 1, 19)), "Capricorn");
        assert_eq!(sun_sign(date(1990, 1, 20)), "Aquarius");
        assert_eq!(sun_sign(date(1992, 2, 29)), "Pisces");
    }

    #[test]
    fn readings_are_deterministic_within_a_day() {
        let catalog = ActionCatalog::builtin().unwrap();
        let action = catalog.get("get_daily_horoscope").unwrap();
        let handler = DemoReadingHandler::new(action);
        let input = ActionInput::new("get_daily_horoscope", "u1", vec![]);

        let first = handler.execute(&ctx(), &input).unwrap();
        let second = handler.execute(&ctx(), &input).unwrap();
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn seed_varies_by_user_and_day() {
        let today = date(2026, 8, 23);
        assert_ne!(
            seed("alice", "get_daily_horoscope", today),
            seed("bob", "get_daily_horoscope", today)
        );
        assert_ne!(
            seed("alice", "get_daily_horoscope", today),
            seed("alice", "get_daily_horoscope", date(2026, 8, 24))
        );
    }

    #[test]
    fn sign_lookup_reads_the_collected_date() {
        use sibyl_sessions::CollectedField;

        let input = ActionInput::new(
            "lookup_zodiac_sign",
            "u1",
            vec![CollectedField {
                name: "birth_date".into(),
                value: FieldValue::Date(date(1991, 8, 25)),
            }],
        );
        let output = SignLookupHandler.execute(&ctx(), &input).unwrap();
        assert!(output.text.contains("Virgo"));
        assert!(output.text.contains("25/08/1991"));
    }

    #[test]
    fn sign_lookup_without_a_date_is_an_error() {
        let input = ActionInput::new("lookup_zodiac_sign", "u1", vec![]);
        assert!(SignLookupHandler.execute(&ctx(), &input).is_err());
    }

    #[test]
    fn demo_registration_covers_every_implemented_entry() {
        let catalog = ActionCatalog::builtin().unwrap();
        let mut registry = HandlerRegistry::new();
        register_demo(&mut registry, &catalog);

        for action in catalog.iter() {
            if action.status.is_implemented() {
                assert!(
                    registry.get(&action.handler).is_some(),
                    "no handler for {}",
                    action.id
                );
            }
        }
    }
}
