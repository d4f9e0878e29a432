//! User profile record and completeness rules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest platform tier, assigned to new accounts until the user picks one.
pub const DEFAULT_ACCOUNT_TYPE: &str = "plebeu";

/// City assigned to new accounts until the user sets their own.
pub const DEFAULT_CITY: &str = "Sorocaba";

/// The two platform tiers.
pub const ACCOUNT_TYPES: [&str; 2] = ["donzela", "plebeu"];

/// A row in the `profiles` table, keyed by the auth user id.
///
/// Optional fields are skipped when serializing so upserts merge into an
/// existing row instead of nulling columns the caller did not touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_me: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hobbies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

/// A partial profile edit. Fields left as `None` are untouched on merge
/// and omitted from the upsert body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_me: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hobbies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

impl Profile {
    /// A profile shell with only the id set.
    pub fn empty(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            city: None,
            account_type: None,
            about_me: None,
            hobbies: None,
            interests: None,
            preferences: None,
            phone: None,
            birth_date: None,
        }
    }

    /// The minimal profile written for a fresh account. The name is
    /// derived from the email, the tier and city are platform defaults
    /// the user is expected to change.
    pub fn minimal(id: Uuid, email: Option<&str>, phone: Option<&str>) -> Self {
        let mut profile = Self::empty(id);
        profile.name = Some(default_display_name(id, email));
        profile.account_type = Some(DEFAULT_ACCOUNT_TYPE.to_string());
        profile.city = Some(DEFAULT_CITY.to_string());
        profile.phone = phone.map(String::from);
        profile
    }

    /// A profile is complete once name, city and account type are all
    /// filled in.
    pub fn is_complete(&self) -> bool {
        is_filled(&self.name) && is_filled(&self.city) && is_filled(&self.account_type)
    }

    /// Fill any missing required field with its platform default.
    pub fn fill_missing(&mut self, email: Option<&str>) {
        if !is_filled(&self.name) {
            self.name = Some(default_display_name(self.id, email));
        }
        if !is_filled(&self.city) {
            self.city = Some(DEFAULT_CITY.to_string());
        }
        if !is_filled(&self.account_type) {
            self.account_type = Some(DEFAULT_ACCOUNT_TYPE.to_string());
        }
    }

    /// Overwrite the fields present in `update`, leaving the rest alone.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name = Some(name.clone());
        }
        if let Some(city) = &update.city {
            self.city = Some(city.clone());
        }
        if let Some(account_type) = &update.account_type {
            self.account_type = Some(account_type.clone());
        }
        if let Some(about_me) = &update.about_me {
            self.about_me = Some(about_me.clone());
        }
        if let Some(hobbies) = &update.hobbies {
            self.hobbies = Some(hobbies.clone());
        }
        if let Some(interests) = &update.interests {
            self.interests = Some(interests.clone());
        }
        if let Some(preferences) = &update.preferences {
            self.preferences = Some(preferences.clone());
        }
        if let Some(phone) = &update.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(birth_date) = update.birth_date {
            self.birth_date = Some(birth_date);
        }
    }
}

/// Normalize a user-supplied account type to its canonical lowercase
/// form. Returns `None` when the value is not one of the platform tiers.
pub fn normalize_account_type(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if ACCOUNT_TYPES.contains(&normalized.as_str()) {
        Some(normalized)
    } else {
        None
    }
}

fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

/// Placeholder display name: the email's local part, falling back to the
/// leading segment of the user id.
fn default_display_name(id: Uuid, email: Option<&str>) -> String {
    if let Some(local) = email.and_then(|e| e.split('@').next()) {
        if !local.is_empty() {
            return local.to_string();
        }
    }
    let id = id.to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}
