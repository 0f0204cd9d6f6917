//! Profile actions — the handlers that write to the user store.
//!
//! These are the only handlers with side effects beyond the invocation
//! ledger. Each one mutates the requesting user's own profile; turns for a
//! user are serialized, so read-modify-write on the snapshot is safe.

use std::sync::Arc;

use chrono::Utc;

use sibyl_domain::error::{Error, Result};
use sibyl_sessions::UserRepository;

use crate::handler::{ActionHandler, ActionInput, HandlerContext, HandlerOutput};

fn missing(field: &str) -> Error {
    Error::Other(format!("dispatched without required input `{field}`"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Birth details
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UpdateBirthHandler {
    users: Arc<dyn UserRepository>,
}

impl UpdateBirthHandler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

impl ActionHandler for UpdateBirthHandler {
    fn execute(&self, ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput> {
        let date = input
            .get("birth_date")
            .and_then(|value| value.as_date())
            .ok_or_else(|| missing("birth_date"))?;
        let time = input
            .get("birth_time")
            .and_then(|value| value.as_time())
            .ok_or_else(|| missing("birth_time"))?;
        let place = input
            .get("birth_place")
            .and_then(|value| value.as_str())
            .ok_or_else(|| missing("birth_place"))?
            .to_owned();

        let mut profile = ctx.profile.clone();
        profile.birth.date = Some(date);
        profile.birth.time = Some(time);
        profile.birth.place = Some(place.clone());
        profile.updated_at = Utc::now();
        self.users.update(&profile)?;

        Ok(HandlerOutput::text(format!(
            "Birth details saved: {} at {} in {}. Your readings will use them from now on.",
            date.format("%d/%m/%Y"),
            time.format("%H:%M"),
            place
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Preferences
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UpdateNameHandler {
    users: Arc<dyn UserRepository>,
}

impl UpdateNameHandler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

impl ActionHandler for UpdateNameHandler {
    fn execute(&self, ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput> {
        let name = input
            .get("full_name")
            .and_then(|value| value.as_str())
            .ok_or_else(|| missing("full_name"))?
            .to_owned();

        let mut profile = ctx.profile.clone();
        profile.preferences.insert("name".into(), name.clone());
        profile.updated_at = Utc::now();
        self.users.update(&profile)?;

        Ok(HandlerOutput::text(format!(
            "Nice to meet you, {name}! I'll use that name from now on."
        )))
    }
}

pub struct SetLanguageHandler {
    users: Arc<dyn UserRepository>,
}

impl SetLanguageHandler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

impl ActionHandler for SetLanguageHandler {
    fn execute(&self, ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput> {
        let language = input
            .get("language")
            .and_then(|value| value.as_str())
            .ok_or_else(|| missing("language"))?
            .to_owned();

        let mut profile = ctx.profile.clone();
        profile.preferences.insert("language".into(), language.clone());
        profile.updated_at = Utc::now();
        self.users.update(&profile)?;

        Ok(HandlerOutput::text(format!(
            "Language preference saved: {language}."
        )))
    }
}

pub struct SetNotificationsHandler {
    users: Arc<dyn UserRepository>,
}

impl SetNotificationsHandler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

impl ActionHandler for SetNotificationsHandler {
    fn execute(&self, ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput> {
        let frequency = input
            .get("frequency")
            .and_then(|value| value.as_str())
            .ok_or_else(|| missing("frequency"))?
            .to_owned();

        let mut profile = ctx.profile.clone();
        profile
            .preferences
            .insert("notifications".into(), frequency.clone());
        profile.updated_at = Utc::now();
        self.users.update(&profile)?;

        let text = if frequency == "off" {
            "Notifications are off. You can turn them back on any time.".to_owned()
        } else {
            format!("You'll receive your readings {frequency}.")
        };
        Ok(HandlerOutput::text(text))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// View + deactivate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ViewProfileHandler;

impl ActionHandler for ViewProfileHandler {
    fn execute(&self, ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
        let profile = &ctx.profile;
        let name = profile
            .preferences
            .get("name")
            .map(String::as_str)
            .unwrap_or("(not set)");
        let birth = match (&profile.birth.date, &profile.birth.time, &profile.birth.place) {
            (Some(date), Some(time), Some(place)) => {
                format!("{} at {} in {}", date.format("%d/%m/%Y"), time.format("%H:%M"), place)
            }
            _ => "(incomplete — try \"update birth details\")".to_owned(),
        };
        let language = profile
            .preferences
            .get("language")
            .map(String::as_str)
            .unwrap_or("english");
        let notifications = profile
            .preferences
            .get("notifications")
            .map(String::as_str)
            .unwrap_or("daily");

        Ok(HandlerOutput::text(format!(
            "Your profile:\n\
             Name: {name}\n\
             Birth: {birth}\n\
             Language: {language}\n\
             Notifications: {notifications}\n\
             Plan: {:?}\n\
             With Sibyl since: {}",
            profile.tier,
            profile.created_at.format("%d/%m/%Y")
        )))
    }
}

pub struct DeactivateHandler {
    users: Arc<dyn UserRepository>,
}

impl DeactivateHandler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

impl ActionHandler for DeactivateHandler {
    fn execute(&self, ctx: &HandlerContext, _input: &ActionInput) -> Result<HandlerOutput> {
        self.users.deactivate(&ctx.profile.user_id)?;
        Ok(HandlerOutput::text(
            "Your profile is deactivated and no further readings will be \
             prepared for you. Message me again any time to come back.",
        ))
    }
}
