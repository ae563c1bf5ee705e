// Event records and their document encoding

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{DocumentId, UserId};
use crate::error::{AppError, AppResult, DecodeError};
use crate::models::document::{
    optional_f64, parse_timestamp, required_str, string_list, timestamp_value, Document,
};

/// Document field names shared by the decoder, the services and live-query filters
pub mod fields {
    pub const NAME: &str = "name";
    pub const ADDRESS: &str = "address";
    pub const THEME: &str = "theme";
    pub const DATE_TIME: &str = "dateTime";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const HOST_UID: &str = "hostUid";
    pub const ATTENDEES: &str = "attendees";
    pub const INVITED_USERS: &str = "invitedUsers";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

/// Placeholder location for events created without an address
pub const UNKNOWN_LOCATION: &str = "TBD";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One planned gathering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub document_id: DocumentId,
    pub name: String,
    pub location: String,
    pub theme: String,
    pub date_time: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub host_uid: UserId,
    pub attendees: Vec<UserId>,
    pub invited_users: Vec<UserId>,
}

impl Event {
    /// Decode a remote document. Either every required field is present and
    /// well-typed, or nothing is produced.
    pub fn from_document(id: &DocumentId, document: &Document) -> Result<Self, DecodeError> {
        let date_time = match document.get(fields::DATE_TIME) {
            None | Some(Value::Null) => return Err(DecodeError::MissingField(fields::DATE_TIME)),
            Some(value) => parse_timestamp(fields::DATE_TIME, value)?,
        };

        Ok(Self {
            document_id: id.clone(),
            name: required_str(document, fields::NAME)?,
            location: required_str(document, fields::ADDRESS)?,
            theme: required_str(document, fields::THEME)?,
            date_time,
            latitude: optional_f64(document, fields::LATITUDE)?,
            longitude: optional_f64(document, fields::LONGITUDE)?,
            host_uid: UserId::new(required_str(document, fields::HOST_UID)?),
            attendees: users(string_list(document, fields::ATTENDEES)?),
            invited_users: users(string_list(document, fields::INVITED_USERS)?),
        })
    }

    /// Encode using the same field names `from_document` reads
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::NAME.into(), Value::from(self.name.clone()));
        doc.insert(fields::ADDRESS.into(), Value::from(self.location.clone()));
        doc.insert(fields::THEME.into(), Value::from(self.theme.clone()));
        doc.insert(fields::DATE_TIME.into(), timestamp_value(self.date_time));
        doc.insert(fields::LATITUDE.into(), self.latitude.map_or(Value::Null, Value::from));
        doc.insert(fields::LONGITUDE.into(), self.longitude.map_or(Value::Null, Value::from));
        doc.insert(fields::HOST_UID.into(), Value::from(self.host_uid.as_str()));
        doc.insert(fields::ATTENDEES.into(), uid_array(&self.attendees));
        doc.insert(fields::INVITED_USERS.into(), uid_array(&self.invited_users));
        doc
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        }
    }

    pub fn is_host(&self, uid: &UserId) -> bool {
        &self.host_uid == uid
    }

    pub fn is_attendee(&self, uid: &UserId) -> bool {
        self.attendees.contains(uid)
    }

    pub fn is_invited(&self, uid: &UserId) -> bool {
        self.invited_users.contains(uid)
    }
}

fn users(raw: Vec<String>) -> Vec<UserId> {
    raw.into_iter().map(UserId::new).collect()
}

pub(crate) fn uid_array(uids: &[UserId]) -> Value {
    Value::Array(uids.iter().map(|u| Value::from(u.as_str())).collect())
}

/// Combine a calendar date and a wall-clock time picked separately
pub fn combine_date_and_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

/// An event as entered by its host, before the store assigns it an identity
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub name: String,
    pub theme: String,
    pub address: String,
    pub date_time: DateTime<Utc>,
}

impl NewEvent {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Please enter an event name.".to_string()));
        }
        Ok(())
    }

    /// Build the document to write. The host is the first attendee.
    pub fn into_document(
        self,
        host: &UserId,
        coordinates: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> AppResult<Document> {
        self.validate()?;
        let address = if self.address.trim().is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            self.address
        };

        let event = Event {
            document_id: DocumentId::default(),
            name: self.name,
            location: address,
            theme: self.theme,
            date_time: self.date_time,
            latitude: coordinates.map(|c| c.latitude),
            longitude: coordinates.map(|c| c.longitude),
            host_uid: host.clone(),
            attendees: vec![host.clone()],
            invited_users: Vec::new(),
        };

        let mut doc = event.to_document();
        doc.insert(fields::CREATED_AT.into(), timestamp_value(now));
        doc.insert(fields::UPDATED_AT.into(), timestamp_value(now));
        Ok(doc)
    }
}

/// Host edits. Only the fields that are set get written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub theme: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
}

impl EventUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.location.is_none() && self.theme.is_none() && self.date_time.is_none()
    }

    pub fn into_fields(self, now: DateTime<Utc>) -> AppResult<Document> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Event name cannot be empty.".to_string()));
            }
        }

        let mut doc = Document::new();
        if let Some(name) = self.name {
            doc.insert(fields::NAME.into(), Value::from(name));
        }
        if let Some(location) = self.location {
            doc.insert(fields::ADDRESS.into(), Value::from(location));
        }
        if let Some(theme) = self.theme {
            doc.insert(fields::THEME.into(), Value::from(theme));
        }
        if let Some(at) = self.date_time {
            doc.insert(fields::DATE_TIME.into(), timestamp_value(at));
        }
        doc.insert(fields::UPDATED_AT.into(), timestamp_value(now));
        Ok(doc)
    }
}
