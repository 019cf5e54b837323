use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::adapters::{simulate_latency, IdentityVerifier};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Citizenship {
    Citizen,
    PermanentResident,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityDetails {
    /// `YYMMDD` as encoded in the number.
    pub birth_date: String,
    pub gender: Gender,
    pub citizenship: Citizenship,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityReport {
    pub valid: bool,
    pub error: Option<String>,
    pub details: Option<IdentityDetails>,
}

impl IdentityReport {
    fn invalid(reason: &str) -> Self {
        Self {
            valid: false,
            error: Some(reason.to_string()),
            details: None,
        }
    }
}

/// Structural check of a 13-digit South African ID number.
pub struct SaIdVerifier {
    latency: Duration,
}

impl SaIdVerifier {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn inspect(id_number: &str) -> IdentityReport {
        let id_number = id_number.trim();
        if id_number.len() != 13 {
            return IdentityReport::invalid("invalid ID length");
        }
        if !id_number.bytes().all(|b| b.is_ascii_digit()) {
            return IdentityReport::invalid("ID must contain only digits");
        }

        let number = |range: std::ops::Range<usize>| -> u32 {
            id_number[range].parse().unwrap_or_default()
        };

        let month = number(2..4);
        let day = number(4..6);
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return IdentityReport::invalid("invalid birth date encoded in ID");
        }

        let gender = if number(6..10) < 5000 {
            Gender::Female
        } else {
            Gender::Male
        };
        let citizenship = if &id_number[10..11] == "0" {
            Citizenship::Citizen
        } else {
            Citizenship::PermanentResident
        };

        IdentityReport {
            valid: true,
            error: None,
            details: Some(IdentityDetails {
                birth_date: id_number[0..6].to_string(),
                gender,
                citizenship,
            }),
        }
    }
}

#[async_trait]
impl IdentityVerifier for SaIdVerifier {
    async fn verify(&self, id_number: &str) -> Result<IdentityReport, AppError> {
        simulate_latency(self.latency).await;
        Ok(Self::inspect(id_number))
    }
}
