//! Upfront checks that catch incomplete entities before they reach the queue.
//!
//! Validation may fill in values the remote side would otherwise reject, such as
//! the owning company of an inline new company.

use super::models::{Company, Contact, EntityRef, Lead};
use crate::common::{RelayError, RelayResult};
use uuid::Uuid;

pub trait Validate {
    fn validate(&mut self) -> RelayResult<()>;
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn owner_id(owner: Option<&EntityRef>) -> Option<Uuid> {
    owner.and_then(|o| o.id)
}

/// Rejects the nil UUID, which the remote side treats as "not set".
pub fn require_id(field: &str, id: &Uuid) -> RelayResult<()> {
    if id.is_nil() {
        Err(RelayError::missing(field))
    } else {
        Ok(())
    }
}

pub fn require_text(field: &str, value: Option<&str>) -> RelayResult<()> {
    if is_blank(value) {
        Err(RelayError::missing(field))
    } else {
        Ok(())
    }
}

impl Validate for Contact {
    fn validate(&mut self) -> RelayResult<()> {
        if self.id.is_none() && owner_id(self.belongs_to_company.as_ref()).is_none() {
            return Err(RelayError::missing("Contact.BelongsToCompany"));
        }

        if !self.is_client && !self.is_marketing && !self.is_staff && !self.is_vendor {
            return Err(RelayError::validation(
                "Contact",
                "one of IsClient, IsMarketing, IsStaff or IsVendor must be set",
            ));
        }

        if let Some(company) = self.company.as_mut().filter(|c| c.id.is_none()) {
            require_text("Contact.Company.Name", company.name.as_deref())?;
            if !company.is_client && !company.is_marketing && !company.is_vendor {
                return Err(RelayError::validation(
                    "Contact.Company",
                    "one of IsClient, IsMarketing or IsVendor must be set",
                ));
            }
            company.belongs_to_company = self.belongs_to_company.clone();
        }

        if is_blank(self.first_name.as_deref())
            && is_blank(self.last_name.as_deref())
            && self.company.is_none()
        {
            return Err(RelayError::validation(
                "Contact",
                "at least one of FirstName, LastName or Company is required",
            ));
        }

        Ok(())
    }
}

impl Validate for Company {
    fn validate(&mut self) -> RelayResult<()> {
        if self.id.is_none() && owner_id(self.belongs_to_company.as_ref()).is_none() {
            return Err(RelayError::missing("Company.BelongsToCompany"));
        }

        if !self.is_client && !self.is_marketing && !self.is_vendor {
            return Err(RelayError::validation(
                "Company",
                "one of IsClient, IsMarketing or IsVendor must be set",
            ));
        }

        require_text("Company.Name", self.name.as_deref())
    }
}

impl Validate for Lead {
    fn validate(&mut self) -> RelayResult<()> {
        require_text("Lead.Name", self.name.as_deref())?;

        if self.date.is_none() {
            return Err(RelayError::missing("Lead.Date"));
        }

        let owner = owner_id(self.belongs_to_company.as_ref());
        if self.id.is_none() && owner.is_none() {
            return Err(RelayError::missing("Lead.BelongsToCompany"));
        }

        if self.company.is_none() && self.contact.is_none() {
            return Err(RelayError::validation(
                "Lead",
                "at least one of Contact or Company is required",
            ));
        }

        if let Some(company) = self.contact.as_ref().and_then(|c| c.company.clone()) {
            self.company = Some(company);
        }

        let contact_owner = self
            .contact
            .as_ref()
            .and_then(|c| owner_id(c.belongs_to_company.as_ref()));
        if contact_owner.is_some() && contact_owner != owner {
            return Err(RelayError::validation(
                "Lead.Contact",
                "does not belong to the same company as the lead",
            ));
        }

        let company_owner = self
            .company
            .as_ref()
            .and_then(|c| owner_id(c.belongs_to_company.as_ref()));
        if company_owner.is_some() && company_owner != owner {
            return Err(RelayError::validation(
                "Lead.Company",
                "does not belong to the same company as the lead",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn owner() -> EntityRef {
        EntityRef::new(Uuid::from_u128(1))
    }

    fn field_of(result: RelayResult<()>) -> String {
        match result {
            Err(RelayError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_new_contact_needs_owner() {
        let mut contact = Contact {
            first_name: Some("Ada".to_string()),
            is_marketing: true,
            ..Contact::default()
        };
        assert_eq!(field_of(contact.validate()), "Contact.BelongsToCompany");

        contact.belongs_to_company = Some(owner());
        assert!(contact.validate().is_ok());
    }

    #[test]
    fn test_contact_needs_a_name_or_company() {
        let mut contact = Contact {
            belongs_to_company: Some(owner()),
            is_client: true,
            ..Contact::default()
        };
        assert_eq!(field_of(contact.validate()), "Contact");
    }

    #[test]
    fn test_inline_company_inherits_owner() {
        let mut contact = Contact {
            belongs_to_company: Some(owner()),
            is_staff: true,
            company: Some(Company {
                name: Some("Contoso".to_string()),
                is_vendor: true,
                ..Company::default()
            }),
            ..Contact::default()
        };
        contact.validate().unwrap();
        assert_eq!(
            contact.company.unwrap().belongs_to_company,
            Some(owner())
        );
    }

    #[test]
    fn test_inline_company_needs_name() {
        let mut contact = Contact {
            belongs_to_company: Some(owner()),
            is_staff: true,
            company: Some(Company {
                is_vendor: true,
                ..Company::default()
            }),
            ..Contact::default()
        };
        assert_eq!(field_of(contact.validate()), "Contact.Company.Name");
    }

    #[test]
    fn test_company_name_is_mandatory() {
        let mut company = Company {
            id: Some(Uuid::from_u128(9)),
            is_client: true,
            name: Some("   ".to_string()),
            ..Company::default()
        };
        assert_eq!(field_of(company.validate()), "Company.Name");
    }

    #[test]
    fn test_lead_takes_company_from_contact() {
        let employer = Company {
            id: Some(Uuid::from_u128(5)),
            name: Some("Fabrikam".to_string()),
            ..Company::default()
        };
        let mut lead = Lead {
            name: Some("Expo".to_string()),
            date: Some(Utc::now()),
            belongs_to_company: Some(owner()),
            contact: Some(Contact {
                company: Some(employer.clone()),
                ..Contact::default()
            }),
            ..Lead::default()
        };
        lead.validate().unwrap();
        assert_eq!(lead.company, Some(employer));
    }

    #[test]
    fn test_lead_contact_must_share_owner() {
        let mut lead = Lead {
            name: Some("Expo".to_string()),
            date: Some(Utc::now()),
            belongs_to_company: Some(owner()),
            contact: Some(Contact {
                belongs_to_company: Some(EntityRef::new(Uuid::from_u128(2))),
                ..Contact::default()
            }),
            ..Lead::default()
        };
        assert_eq!(field_of(lead.validate()), "Lead.Contact");
    }

    #[test]
    fn test_lead_needs_date() {
        let mut lead = Lead {
            name: Some("Expo".to_string()),
            ..Lead::default()
        };
        assert_eq!(field_of(lead.validate()), "Lead.Date");
    }

    #[test]
    fn test_nil_id_is_rejected() {
        assert!(require_id("ListId", &Uuid::nil()).is_err());
        assert!(require_id("ListId", &Uuid::from_u128(3)).is_ok());
    }
}
