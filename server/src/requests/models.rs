//! Entities carried in request and response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reference to an existing entity by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityRef {
    pub fn new(id: Uuid) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Company {
    /// `None` creates a new company
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub belongs_to_company: Option<EntityRef>,
    pub email: Option<String>,
    pub is_client: bool,
    pub is_marketing: bool,
    pub is_vendor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    /// `None` creates a new contact
    pub id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub belongs_to_company: Option<EntityRef>,
    /// The contact's employer; created alongside when it has no ID
    pub company: Option<Company>,
    pub is_client: bool,
    pub is_marketing: bool,
    pub is_staff: bool,
    pub is_vendor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lead {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub belongs_to_company: Option<EntityRef>,
    pub contact: Option<Contact>,
    pub company: Option<Company>,
    pub program: Option<EntityRef>,
    pub campaign: Option<EntityRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailMessageImportance {
    Low,
    #[default]
    Normal,
    High,
}

impl std::str::FromStr for EmailMessageImportance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(format!("unknown importance '{other}'")),
        }
    }
}

/// Delivery state of a sent email, as reported by the remote side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSentStatus {
    pub tracking_id: Option<Uuid>,
    pub status: Option<String>,
    pub sent_on: Option<DateTime<Utc>>,
}

/// Changes to one existing contact. Only the fields present are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialContactUpdateItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PartialContactUpdateItem {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Sets one field by its wire name, e.g. `firstName`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// Changes to one existing marketing result. Only the fields present are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUpdateMarketingResultItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Per-item outcome of a batch partial update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialUpdateResult {
    pub id: Option<Uuid>,
    pub succeeded: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventAttendanceStatus {
    pub id: Option<Uuid>,
    pub name: Option<String>,
}

/// A hard bounce not yet acknowledged by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailHardBounce {
    pub email_address: Option<String>,
    pub contact_id: Option<Uuid>,
    pub email_message_id: Option<Uuid>,
    pub bounced_on: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_wire_names_are_camel_case() {
        let contact = Contact {
            first_name: Some("Ada".to_string()),
            is_marketing: true,
            ..Contact::default()
        };
        let json = serde_json::to_value(&contact).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["isMarketing"], true);
    }

    #[test]
    fn test_missing_fields_default() {
        let company: Company = serde_json::from_str(r#"{"name":"Contoso"}"#).unwrap();
        assert_eq!(company.name.as_deref(), Some("Contoso"));
        assert!(company.id.is_none());
        assert!(!company.is_client);
    }

    #[test]
    fn test_partial_update_only_carries_set_fields() {
        let item = PartialContactUpdateItem::new(Uuid::from_u128(9)).set("lastName", "Lovelace");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["lastName"], "Lovelace");
        assert!(json.get("firstName").is_none());
        assert_eq!(json.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_importance_parses_case_insensitively() {
        assert_eq!(
            "HIGH".parse::<EmailMessageImportance>(),
            Ok(EmailMessageImportance::High)
        );
        assert!("urgent".parse::<EmailMessageImportance>().is_err());
    }
}
