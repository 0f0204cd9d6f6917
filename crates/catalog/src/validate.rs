//! Field validation and normalization.
//!
//! Raw user text goes in, a typed [`FieldValue`] comes out, or a
//! human-readable reason that is sent back verbatim as the re-prompt.

use std::fmt;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::FieldValidator;

/// Maximum accepted length for place names.
const PLACE_MAX_LEN: usize = 120;

/// A validated, normalized field value.
///
/// Stored in the session while a flow collects fields, rendered canonically
/// for input hashing, and handed to handlers once the flow completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Date(NaiveDate),
    Time(NaiveTime),
    Number(i64),
    Choice(String),
    Text(String),
}

impl FieldValue {
    /// Canonical string rendering. Equal values always render identically,
    /// so this is what the dispatch input hash is computed over.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Time(t) => t.format("%H:%M").to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Choice(s) | FieldValue::Text(s) => s.clone(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Choice(s) | FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Date(d) => write!(f, "{}", d.format("%d/%m/%Y")),
            FieldValue::Time(t) => write!(f, "{}", t.format("%H:%M")),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Choice(s) | FieldValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl FieldValidator {
    /// Validate raw user text. `Err` carries the reason shown to the user.
    pub fn validate(&self, raw: &str) -> Result<FieldValue, String> {
        match self {
            FieldValidator::Date { past_only } => validate_date(raw, *past_only),
            FieldValidator::Time => validate_time(raw),
            FieldValidator::Place => validate_place(raw),
            FieldValidator::Number { min, max } => validate_number(raw, *min, *max),
            FieldValidator::Choice { options } => validate_choice(raw, options),
            FieldValidator::Text { max_len } => validate_text(raw, *max_len),
        }
    }
}

const DATE_LAYOUTS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"];

fn validate_date(raw: &str, past_only: bool) -> Result<FieldValue, String> {
    let trimmed = raw.trim();
    let date = DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(trimmed, layout).ok())
        .ok_or_else(|| {
            "Please send the date as DD/MM/YYYY, for example 14/03/1992.".to_string()
        })?;
    if past_only && date > Utc::now().date_naive() {
        return Err("That date is in the future. Please send the actual date.".to_string());
    }
    Ok(FieldValue::Date(date))
}

fn validate_time(raw: &str) -> Result<FieldValue, String> {
    let reason = || "Please send the time as HH:MM (24h) or like 7:30 pm.".to_string();
    let mut text = raw.trim().to_ascii_lowercase();
    let meridiem = if let Some(prefix) = text.strip_suffix("am") {
        text = prefix.trim().to_string();
        Some("AM")
    } else if let Some(prefix) = text.strip_suffix("pm") {
        text = prefix.trim().to_string();
        Some("PM")
    } else {
        None
    };
    if !text.contains(':') {
        // Bare-hour answers like "7 pm" are common.
        text.push_str(":00");
    }
    let parsed = match meridiem {
        Some(suffix) => NaiveTime::parse_from_str(&format!("{text} {suffix}"), "%I:%M %p"),
        None => NaiveTime::parse_from_str(&text, "%H:%M"),
    };
    parsed.map(FieldValue::Time).map_err(|_| reason())
}

fn validate_place(raw: &str) -> Result<FieldValue, String> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() || !normalized.chars().any(|c| c.is_alphabetic()) {
        return Err(
            "Please send a place name, for example \"Lisbon, Portugal\".".to_string(),
        );
    }
    if normalized.chars().count() > PLACE_MAX_LEN {
        return Err(format!(
            "That place name is too long. Please keep it under {PLACE_MAX_LEN} characters."
        ));
    }
    Ok(FieldValue::Text(normalized))
}

fn validate_number(raw: &str, min: i64, max: i64) -> Result<FieldValue, String> {
    let reason = || format!("Please send a number between {min} and {max}.");
    let value: i64 = raw.trim().parse().map_err(|_| reason())?;
    if value < min || value > max {
        return Err(reason());
    }
    Ok(FieldValue::Number(value))
}

fn validate_choice(raw: &str, options: &[String]) -> Result<FieldValue, String> {
    let needle = raw.trim();
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(needle))
        .map(|option| FieldValue::Choice(option.clone()))
        .ok_or_else(|| format!("Please pick one of: {}.", options.join(", ")))
}

fn validate_text(raw: &str, max_len: usize) -> Result<FieldValue, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Please send a short text answer.".to_string());
    }
    if trimmed.chars().count() > max_len {
        return Err(format!("Please keep it under {max_len} characters."));
    }
    Ok(FieldValue::Text(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_accepts_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(1992, 3, 14).unwrap();
        for raw in ["14/03/1992", "14-03-1992", "14.03.1992", "1992-03-14"] {
            let validator = FieldValidator::Date { past_only: true };
            assert_eq!(validator.validate(raw), Ok(FieldValue::Date(expected)), "{raw}");
        }
    }

    #[test]
    fn date_rejects_nonsense_and_impossible_dates() {
        let validator = FieldValidator::Date { past_only: true };
        assert!(validator.validate("yesterday").is_err());
        assert!(validator.validate("31/02/1992").is_err());
        assert!(validator.validate("").is_err());
    }

    #[test]
    fn past_only_rejects_tomorrow() {
        let tomorrow = Utc::now().date_naive() + chrono::Days::new(1);
        let raw = tomorrow.format("%d/%m/%Y").to_string();
        let validator = FieldValidator::Date { past_only: true };
        let err = validator.validate(&raw).unwrap_err();
        assert!(err.contains("future"));

        let validator = FieldValidator::Date { past_only: false };
        assert!(validator.validate(&raw).is_ok());
    }

    #[test]
    fn time_accepts_24h_and_meridiem() {
        let half_past_seven = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        for raw in ["19:30", "7:30 pm", "7:30PM", " 07:30 pm "] {
            assert_eq!(
                FieldValidator::Time.validate(raw),
                Ok(FieldValue::Time(half_past_seven)),
                "{raw}"
            );
        }
        assert_eq!(
            FieldValidator::Time.validate("7 am"),
            Ok(FieldValue::Time(NaiveTime::from_hms_opt(7, 0, 0).unwrap()))
        );
    }

    #[test]
    fn time_rejects_out_of_range() {
        assert!(FieldValidator::Time.validate("25:00").is_err());
        assert!(FieldValidator::Time.validate("noonish").is_err());
    }

    #[test]
    fn place_collapses_whitespace() {
        let value = FieldValidator::Place.validate("  Lisbon,   Portugal ").unwrap();
        assert_eq!(value, FieldValue::Text("Lisbon, Portugal".into()));
    }

    #[test]
    fn place_requires_letters() {
        assert!(FieldValidator::Place.validate("12345").is_err());
        assert!(FieldValidator::Place.validate("   ").is_err());
    }

    #[test]
    fn number_enforces_range() {
        let validator = FieldValidator::Number { min: 1, max: 9 };
        assert_eq!(validator.validate(" 7 "), Ok(FieldValue::Number(7)));
        assert!(validator.validate("0").is_err());
        assert!(validator.validate("10").is_err());
        assert!(validator.validate("seven").is_err());
    }

    #[test]
    fn choice_is_case_insensitive_and_canonicalizes() {
        let validator = FieldValidator::Choice {
            options: vec!["Aries".into(), "Taurus".into()],
        };
        assert_eq!(
            validator.validate("taurus"),
            Ok(FieldValue::Choice("Taurus".into()))
        );
        let err = validator.validate("gemini").unwrap_err();
        assert!(err.contains("Aries, Taurus"));
    }

    #[test]
    fn canonical_rendering_is_stable() {
        let date = FieldValue::Date(NaiveDate::from_ymd_opt(1992, 3, 14).unwrap());
        assert_eq!(date.canonical(), "1992-03-14");
        let time = FieldValue::Time(NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert_eq!(time.canonical(), "07:05");
        assert_eq!(FieldValue::Number(-3).canonical(), "-3");
    }
}
