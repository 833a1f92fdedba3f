use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Operators: manage customers, ads, recharges and spend
    Admin,
    /// Advertisers: own a balance and read their own statistics
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An account holder. Customers carry the spendable balance; admins keep a
/// balance column too but nothing ever moves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub balance_cents: Cents,
    pub company_name: Option<String>,
    pub company_website: Option<String>,
    pub contact_person: Option<String>,
    pub mobile_phone: Option<String>,
    pub contact_qq: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            role,
            balance_cents: 0,
            company_name: None,
            company_website: None,
            contact_person: None,
            mobile_phone: None,
            contact_qq: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = Some(company_name.into());
        self
    }

    pub fn with_contact_person(mut self, contact_person: impl Into<String>) -> Self {
        self.contact_person = Some(contact_person.into());
        self
    }

    /// Apply profile edits. Unset fields are kept; blank ones are cleared.
    pub fn apply_profile(&mut self, profile: CustomerProfile) {
        fn edit(field: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                let value = value.trim();
                *field = (!value.is_empty()).then(|| value.to_string());
            }
        }

        edit(&mut self.company_name, profile.company_name);
        edit(&mut self.company_website, profile.company_website);
        edit(&mut self.contact_person, profile.contact_person);
        edit(&mut self.mobile_phone, profile.mobile_phone);
        edit(&mut self.contact_qq, profile.contact_qq);
    }

    pub fn is_customer(&self) -> bool {
        self.role == Role::Customer
    }

    pub fn as_caller(&self) -> Caller {
        Caller {
            user_id: self.id,
            role: self.role,
        }
    }
}

/// Edits to a customer's contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerProfile {
    pub company_name: Option<String>,
    pub company_website: Option<String>,
    pub contact_person: Option<String>,
    pub mobile_phone: Option<String>,
    pub contact_qq: Option<String>,
}

/// Mainland mobile number: eleven digits, `1` then `3`-`9`.
pub fn is_valid_mobile_phone(phone: &str) -> bool {
    let bytes = phone.as_bytes();
    bytes.len() == 11
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
}

/// The identity an operation runs on behalf of.
///
/// Resolved once at the boundary (CLI, HTTP handler) and passed explicitly
/// into every service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on any customer; customers only on themselves.
    pub fn can_view(&self, customer_id: UserId) -> bool {
        self.is_admin() || self.user_id == customer_id
    }
}
