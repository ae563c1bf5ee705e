// Dietary-preference profiles

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::UserId;
use crate::error::DecodeError;
use crate::models::document::{required_str, string_list, Document};

pub mod fields {
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const DIETARY_PREFERENCE: &str = "dietaryPreference";
    pub const ALLERGIES: &str = "allergies";
}

/// Allergy choice that stands for "free text in `other_allergy`"
pub const OTHER_ALLERGY: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: UserId,
    pub first_name: String,
    pub last_name: String,
    pub dietary_preference: String,
    pub allergies: Vec<String>,
}

impl UserProfile {
    pub fn from_document(uid: UserId, document: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            uid,
            first_name: required_str(document, fields::FIRST_NAME)?,
            last_name: required_str(document, fields::LAST_NAME)?,
            dietary_preference: match document.get(fields::DIETARY_PREFERENCE) {
                None | Some(Value::Null) => String::new(),
                Some(_) => required_str(document, fields::DIETARY_PREFERENCE)?,
            },
            allergies: string_list(document, fields::ALLERGIES)?,
        })
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Setup is complete once the stored profile carries a full name
    pub fn is_setup_complete(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.last_name.trim().is_empty()
    }
}

/// Profile form state as the user fills it in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub first_name: String,
    pub last_name: String,
    pub dietary_preferences: BTreeSet<String>,
    pub allergies: BTreeSet<String>,
    pub other_allergy: String,
}

impl ProfileDraft {
    /// Allergies to store: the "Other" marker is replaced by the free-text entry
    pub fn resolved_allergies(&self) -> Vec<String> {
        let mut allergies: Vec<String> = self
            .allergies
            .iter()
            .filter(|a| a.as_str() != OTHER_ALLERGY)
            .cloned()
            .collect();
        let other = self.other_allergy.trim();
        if self.allergies.contains(OTHER_ALLERGY) && !other.is_empty() {
            allergies.push(other.to_string());
        }
        allergies
    }

    /// Only one preference is stored; the first in sorted order wins
    pub fn dietary_preference(&self) -> String {
        self.dietary_preferences.iter().next().cloned().unwrap_or_default()
    }

    pub fn into_document(self) -> Document {
        let allergies = self.resolved_allergies();
        let dietary = self.dietary_preference();
        let mut doc = Document::new();
        doc.insert(fields::FIRST_NAME.into(), Value::from(self.first_name));
        doc.insert(fields::LAST_NAME.into(), Value::from(self.last_name));
        doc.insert(fields::DIETARY_PREFERENCE.into(), Value::from(dietary));
        doc.insert(
            fields::ALLERGIES.into(),
            Value::Array(allergies.into_iter().map(Value::from).collect()),
        );
        doc
    }
}
