use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Patient,
    Pharmacist,
    Dispatcher,
    Driver,
    Admin,
    /// Inbound payment provider webhooks.
    PaymentProvider,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Pharmacist => "pharmacist",
            Role::Dispatcher => "dispatcher",
            Role::Driver => "driver",
            Role::Admin => "admin",
            Role::PaymentProvider => "payment_provider",
        };
        f.write_str(name)
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub pharmacy_id: Option<String>,
    pub origin: String,
}

impl Actor {
    pub fn payment_provider(origin: impl Into<String>) -> Self {
        Self {
            user_id: "payment-provider".to_string(),
            role: Role::PaymentProvider,
            pharmacy_id: None,
            origin: origin.into(),
        }
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}
