//! Request and response types, paired through [`ApiRequest`].

use super::models::{
    Company, Contact, EmailHardBounce, EmailMessageImportance, EmailSentStatus,
    EventAttendanceStatus, Lead, PartialContactUpdateItem, PartialUpdateMarketingResultItem,
    PartialUpdateResult,
};
use super::validation::{Validate, require_id, require_text};
use super::{ApiRequest, ApiResponse};
use crate::common::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a contact either by ID or by email address.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactKey {
    Id(Uuid),
    Email(String),
}

impl ContactKey {
    /// Prefers a non-nil ID, falling back to a non-blank email.
    pub fn from_parts(id: Option<Uuid>, email: Option<String>) -> RelayResult<Self> {
        match (id.filter(|id| !id.is_nil()), email) {
            (Some(id), _) => Ok(ContactKey::Id(id)),
            (None, Some(email)) if !email.trim().is_empty() => Ok(ContactKey::Email(email)),
            _ => Err(RelayError::missing("ContactId or Email")),
        }
    }
}

// Contacts

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateContactRequest {
    pub contact: Contact,
    /// Overwrite even if the contact changed since it was read
    pub disable_concurrent_request_validation: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrUpdateContactResponse {
    pub contact: Option<Contact>,
}

impl ApiRequest for CreateOrUpdateContactRequest {
    const REQUEST_TYPE: &'static str = "CreateOrUpdateContactRequest";
    type Response = CreateOrUpdateContactResponse;

    fn validate(&mut self) -> RelayResult<()> {
        self.contact.validate()
    }
}

impl ApiResponse for CreateOrUpdateContactResponse {
    const RESPONSE_TYPE: &'static str = "CreateOrUpdateContactResponse";
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialContactUpdateRequest {
    pub partial_contact_update_item: PartialContactUpdateItem,
    /// Let the update create or change the contact's company
    pub enable_creation_or_update_of_company: bool,
}

/// Carries no payload; the outcome is the reply's `succeeded` flag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialContactUpdateResponse {}

impl ApiRequest for PartialContactUpdateRequest {
    const REQUEST_TYPE: &'static str = "PartialContactUpdateRequest";
    type Response = PartialContactUpdateResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id(
            "PartialContactUpdateItem.Id",
            &self.partial_contact_update_item.id,
        )
    }
}

impl ApiResponse for PartialContactUpdateResponse {
    const RESPONSE_TYPE: &'static str = "PartialContactUpdateResponse";
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialContactsUpdateRequest {
    pub partial_contact_update_items: Vec<PartialContactUpdateItem>,
    pub enable_creation_or_update_of_company: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialContactsUpdateResponse {
    pub responses: Vec<PartialUpdateResult>,
}

impl ApiRequest for PartialContactsUpdateRequest {
    const REQUEST_TYPE: &'static str = "PartialContactsUpdateRequest";
    type Response = PartialContactsUpdateResponse;

    fn validate(&mut self) -> RelayResult<()> {
        if self.partial_contact_update_items.is_empty() {
            return Err(RelayError::missing("PartialContactUpdateItems"));
        }
        for item in &self.partial_contact_update_items {
            require_id("PartialContactUpdateItem.Id", &item.id)?;
        }
        Ok(())
    }
}

impl ApiResponse for PartialContactsUpdateResponse {
    const RESPONSE_TYPE: &'static str = "PartialContactsUpdateResponse";
}

// Companies

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateCompanyRequest {
    pub company: Company,
    pub disable_concurrency_validation: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrUpdateCompanyResponse {
    pub company: Option<Company>,
}

impl ApiRequest for CreateOrUpdateCompanyRequest {
    const REQUEST_TYPE: &'static str = "CreateOrUpdateCompanyRequest";
    type Response = CreateOrUpdateCompanyResponse;

    fn validate(&mut self) -> RelayResult<()> {
        self.company.validate()
    }
}

impl ApiResponse for CreateOrUpdateCompanyResponse {
    const RESPONSE_TYPE: &'static str = "CreateOrUpdateCompanyResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveCompaniesRequest {
    pub belongs_to_company_id: Option<Uuid>,
    /// Only companies updated at or after this instant
    pub from_update_date: Option<DateTime<Utc>>,
    pub max_number_of_records_to_get: i32,
    pub origin_of_change: Option<String>,
}

impl Default for RetrieveCompaniesRequest {
    fn default() -> Self {
        Self {
            belongs_to_company_id: None,
            from_update_date: None,
            max_number_of_records_to_get: i32::MAX,
            origin_of_change: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrieveCompaniesResponse {
    pub companies: Vec<Company>,
}

impl ApiRequest for RetrieveCompaniesRequest {
    const REQUEST_TYPE: &'static str = "RetrieveCompaniesRequest";
    type Response = RetrieveCompaniesResponse;

    fn validate(&mut self) -> RelayResult<()> {
        if self.max_number_of_records_to_get <= 0 {
            return Err(RelayError::validation(
                "MaxNumberOfRecordsToGet",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl ApiResponse for RetrieveCompaniesResponse {
    const RESPONSE_TYPE: &'static str = "RetrieveCompaniesResponse";
}

// Leads

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateLeadRequest {
    pub lead: Lead,
    pub disable_concurrency_validation: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrUpdateLeadResponse {
    pub lead: Option<Lead>,
}

impl ApiRequest for CreateOrUpdateLeadRequest {
    const REQUEST_TYPE: &'static str = "CreateOrUpdateLeadRequest";
    type Response = CreateOrUpdateLeadResponse;

    fn validate(&mut self) -> RelayResult<()> {
        self.lead.validate()
    }
}

impl ApiResponse for CreateOrUpdateLeadResponse {
    const RESPONSE_TYPE: &'static str = "CreateOrUpdateLeadResponse";
}

// Marketing lists

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMarketingListRequest {
    pub marketing_list_id: Uuid,
    pub marketing_list_name: String,
    pub marketing_list_description: Option<String>,
}

impl CreateMarketingListRequest {
    /// A list with a freshly generated ID.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            marketing_list_id: Uuid::new_v4(),
            marketing_list_name: name.into(),
            marketing_list_description: description,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateMarketingListResponse {
    pub marketing_list_id: Option<Uuid>,
}

impl ApiRequest for CreateMarketingListRequest {
    const REQUEST_TYPE: &'static str = "CreateMarketingListRequest";
    type Response = CreateMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("MarketingListId", &self.marketing_list_id)?;
        require_text("Name", Some(&self.marketing_list_name))
    }
}

impl ApiResponse for CreateMarketingListResponse {
    const RESPONSE_TYPE: &'static str = "CreateMarketingListResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMarketingListRequest {
    pub marketing_list_id: Uuid,
}

/// Carries no payload; the outcome is in the reply message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteMarketingListResponse {}

impl ApiRequest for DeleteMarketingListRequest {
    const REQUEST_TYPE: &'static str = "DeleteMarketingListRequest";
    type Response = DeleteMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("ListId", &self.marketing_list_id)
    }
}

impl ApiResponse for DeleteMarketingListResponse {
    const RESPONSE_TYPE: &'static str = "DeleteMarketingListResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyContactsFromMarketingListRequest {
    pub source_marketing_list_id: Uuid,
    pub target_marketing_list_id: Uuid,
}

/// Carries no payload; the outcome is in the reply message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyContactsFromMarketingListResponse {}

impl ApiRequest for CopyContactsFromMarketingListRequest {
    const REQUEST_TYPE: &'static str = "CopyContactsFromMarketingListRequest";
    type Response = CopyContactsFromMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("SourceListId", &self.source_marketing_list_id)?;
        require_id("TargetListId", &self.target_marketing_list_id)
    }
}

impl ApiResponse for CopyContactsFromMarketingListResponse {
    const RESPONSE_TYPE: &'static str = "CopyContactsFromMarketingListResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactToMarketingListByIdRequest {
    pub marketing_list_id: Uuid,
    pub contact_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactToMarketingListByEmailRequest {
    pub marketing_list_id: Uuid,
    pub contact_email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddContactToMarketingListResponse {
    pub successfully_added: bool,
}

impl ApiRequest for AddContactToMarketingListByIdRequest {
    const REQUEST_TYPE: &'static str = "AddContactToMarketingListByIdRequest";
    type Response = AddContactToMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("ListId", &self.marketing_list_id)?;
        require_id("ContactId", &self.contact_id)
    }
}

impl ApiRequest for AddContactToMarketingListByEmailRequest {
    const REQUEST_TYPE: &'static str = "AddContactToMarketingListByEmailRequest";
    type Response = AddContactToMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("ListId", &self.marketing_list_id)?;
        require_text("Email", Some(&self.contact_email))
    }
}

impl ApiResponse for AddContactToMarketingListResponse {
    const RESPONSE_TYPE: &'static str = "AddContactToMarketingListResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveContactFromMarketingListByIdRequest {
    pub marketing_list_id: Uuid,
    pub contact_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveContactFromMarketingListByEmailRequest {
    pub marketing_list_id: Uuid,
    pub contact_email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveContactFromMarketingListResponse {
    pub successfully_removed: bool,
}

impl ApiRequest for RemoveContactFromMarketingListByIdRequest {
    const REQUEST_TYPE: &'static str = "RemoveContactFromMarketingListByIdRequest";
    type Response = RemoveContactFromMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("ListId", &self.marketing_list_id)?;
        require_id("ContactId", &self.contact_id)
    }
}

impl ApiRequest for RemoveContactFromMarketingListByEmailRequest {
    const REQUEST_TYPE: &'static str = "RemoveContactFromMarketingListByEmailRequest";
    type Response = RemoveContactFromMarketingListResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("ListId", &self.marketing_list_id)?;
        require_text("Email", Some(&self.contact_email))
    }
}

impl ApiResponse for RemoveContactFromMarketingListResponse {
    const RESPONSE_TYPE: &'static str = "RemoveContactFromMarketingListResponse";
}

// Marketing results

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUpdateMarketingResultsRequest {
    pub partial_update_marketing_result_items: Vec<PartialUpdateMarketingResultItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialUpdateMarketingResultsResponse {
    pub partial_update_marketing_result_responses: Vec<PartialUpdateResult>,
}

impl ApiRequest for PartialUpdateMarketingResultsRequest {
    const REQUEST_TYPE: &'static str = "PartialUpdateMarketingResultsRequest";
    type Response = PartialUpdateMarketingResultsResponse;

    fn validate(&mut self) -> RelayResult<()> {
        if self.partial_update_marketing_result_items.is_empty() {
            return Err(RelayError::missing("PartialMarketingResultUpdateItems"));
        }
        for item in &self.partial_update_marketing_result_items {
            require_id("PartialUpdateMarketingResultItem.Id", &item.id)?;
        }
        Ok(())
    }
}

impl ApiResponse for PartialUpdateMarketingResultsResponse {
    const RESPONSE_TYPE: &'static str = "PartialUpdateMarketingResultsResponse";
}

// Events

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrieveEventAttendanceStatusesRequest {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrieveEventAttendanceStatusesResponse {
    pub event_attendance_statuses: Vec<EventAttendanceStatus>,
}

impl ApiRequest for RetrieveEventAttendanceStatusesRequest {
    const REQUEST_TYPE: &'static str = "RetrieveEventAttendanceStatusesRequest";
    type Response = RetrieveEventAttendanceStatusesResponse;
}

impl ApiResponse for RetrieveEventAttendanceStatusesResponse {
    const RESPONSE_TYPE: &'static str = "RetrieveEventAttendanceStatusesResponse";
}

// Email

/// Fields shared by both ways of addressing an email.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDispatch {
    pub email_message_id: Uuid,
    pub sender_id: Uuid,
    pub message_data: Option<String>,
    pub importance: EmailMessageImportance,
}

impl EmailDispatch {
    fn validate(&self) -> RelayResult<()> {
        require_id("EmailMessageId", &self.email_message_id)?;
        require_id("SenderId", &self.sender_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailMessageByIdRequest {
    #[serde(flatten)]
    pub dispatch: EmailDispatch,
    pub recipient_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailMessageByEmailRequest {
    #[serde(flatten)]
    pub dispatch: EmailDispatch,
    pub recipient_email_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendEmailMessageResponse {
    pub tracking_id: Option<Uuid>,
}

impl ApiRequest for SendEmailMessageByIdRequest {
    const REQUEST_TYPE: &'static str = "SendEmailMessageByIdRequest";
    type Response = SendEmailMessageResponse;

    fn validate(&mut self) -> RelayResult<()> {
        self.dispatch.validate()?;
        require_id("RecipientId", &self.recipient_id)
    }
}

impl ApiRequest for SendEmailMessageByEmailRequest {
    const REQUEST_TYPE: &'static str = "SendEmailMessageByEmailRequest";
    type Response = SendEmailMessageResponse;

    fn validate(&mut self) -> RelayResult<()> {
        self.dispatch.validate()?;
        require_text("RecipientEmailAddress", Some(&self.recipient_email_address))
    }
}

impl ApiResponse for SendEmailMessageResponse {
    const RESPONSE_TYPE: &'static str = "SendEmailMessageResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveEmailMessageSentStatusRequest {
    pub tracking_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrieveEmailMessageSentStatusResponse {
    pub sent_status: Option<EmailSentStatus>,
}

impl ApiRequest for RetrieveEmailMessageSentStatusRequest {
    const REQUEST_TYPE: &'static str = "RetrieveEmailMessageSentStatusRequest";
    type Response = RetrieveEmailMessageSentStatusResponse;

    fn validate(&mut self) -> RelayResult<()> {
        require_id("TrackingId", &self.tracking_id)
    }
}

impl ApiResponse for RetrieveEmailMessageSentStatusResponse {
    const RESPONSE_TYPE: &'static str = "RetrieveEmailMessageSentStatusResponse";
}

/// A commercial email goes to the recipients configured on the message itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCommercialEmailMessageByIdRequest {
    #[serde(flatten)]
    pub dispatch: EmailDispatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendCommercialEmailMessageByIdResponse {
    pub tracking_id: Option<Uuid>,
}

impl ApiRequest for SendCommercialEmailMessageByIdRequest {
    const REQUEST_TYPE: &'static str = "SendCommercialEmailMessageByIdRequest";
    type Response = SendCommercialEmailMessageByIdResponse;

    fn validate(&mut self) -> RelayResult<()> {
        self.dispatch.validate()
    }
}

impl ApiResponse for SendCommercialEmailMessageByIdResponse {
    const RESPONSE_TYPE: &'static str = "SendCommercialEmailMessageByIdResponse";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveUnprocessedEmailHardBouncesRequest {
    pub max_number_of_records: i32,
}

impl Default for RetrieveUnprocessedEmailHardBouncesRequest {
    fn default() -> Self {
        Self {
            max_number_of_records: i32::MAX,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrieveUnprocessedEmailHardBouncesResponse {
    pub email_results: Vec<EmailHardBounce>,
}

impl ApiRequest for RetrieveUnprocessedEmailHardBouncesRequest {
    const REQUEST_TYPE: &'static str = "RetrieveUnprocessedEmailHardBouncesRequest";
    type Response = RetrieveUnprocessedEmailHardBouncesResponse;

    fn validate(&mut self) -> RelayResult<()> {
        if self.max_number_of_records <= 0 {
            return Err(RelayError::validation(
                "MaxNumberOfRecords",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl ApiResponse for RetrieveUnprocessedEmailHardBouncesResponse {
    const RESPONSE_TYPE: &'static str = "RetrieveUnprocessedEmailHardBouncesResponse";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_contact_key_prefers_id() {
        let id = Uuid::from_u128(4);
        assert_eq!(
            ContactKey::from_parts(Some(id), Some("a@b.c".to_string())).unwrap(),
            ContactKey::Id(id)
        );
        assert_eq!(
            ContactKey::from_parts(Some(Uuid::nil()), Some("a@b.c".to_string())).unwrap(),
            ContactKey::Email("a@b.c".to_string())
        );
        assert!(ContactKey::from_parts(None, Some(" ".to_string())).is_err());
    }

    #[test]
    fn test_nil_list_id_is_rejected() {
        let mut request = DeleteMarketingListRequest {
            marketing_list_id: Uuid::nil(),
        };
        assert!(matches!(
            request.validate(),
            Err(RelayError::Validation { ref field, .. }) if field == "ListId"
        ));
    }

    #[test]
    fn test_copy_checks_both_lists() {
        let mut request = CopyContactsFromMarketingListRequest {
            source_marketing_list_id: Uuid::from_u128(1),
            target_marketing_list_id: Uuid::nil(),
        };
        assert!(matches!(
            request.validate(),
            Err(RelayError::Validation { ref field, .. }) if field == "TargetListId"
        ));
    }

    #[test]
    fn test_email_dispatch_is_flattened() {
        let request = SendEmailMessageByEmailRequest {
            dispatch: EmailDispatch {
                email_message_id: Uuid::from_u128(1),
                sender_id: Uuid::from_u128(2),
                message_data: None,
                importance: EmailMessageImportance::High,
            },
            recipient_email_address: "ada@example.com".to_string(),
        };
        let json: Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["importance"], "High");
        assert_eq!(json["recipientEmailAddress"], "ada@example.com");
        assert!(json.get("dispatch").is_none());
    }

    #[test]
    fn test_new_marketing_list_gets_an_id() {
        let mut request = CreateMarketingListRequest::new("Spring", None);
        assert!(!request.marketing_list_id.is_nil());
        assert!(request.validate().is_ok());

        let mut unnamed = CreateMarketingListRequest::new("", None);
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_partial_updates_need_ids() {
        let mut single = PartialContactUpdateRequest::default();
        assert!(matches!(
            single.validate(),
            Err(RelayError::Validation { ref field, .. }) if field == "PartialContactUpdateItem.Id"
        ));

        let mut empty = PartialContactsUpdateRequest::default();
        assert!(empty.validate().is_err());

        let mut batch = PartialUpdateMarketingResultsRequest {
            partial_update_marketing_result_items: vec![PartialUpdateMarketingResultItem {
                id: Uuid::from_u128(5),
                ..PartialUpdateMarketingResultItem::default()
            }],
        };
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn test_commercial_email_needs_sender() {
        let mut request = SendCommercialEmailMessageByIdRequest {
            dispatch: EmailDispatch {
                email_message_id: Uuid::from_u128(1),
                sender_id: Uuid::nil(),
                message_data: None,
                importance: EmailMessageImportance::Normal,
            },
        };
        assert!(matches!(
            request.validate(),
            Err(RelayError::Validation { ref field, .. }) if field == "SenderId"
        ));
    }

    #[test]
    fn test_retrieve_companies_defaults_to_everything() {
        let request = RetrieveCompaniesRequest::default();
        assert_eq!(request.max_number_of_records_to_get, i32::MAX);
    }
}
