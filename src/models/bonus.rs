//! Bonus grant data model and lifecycle rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bonus_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BonusType {
    WheelOfFortune,
    SignUp,
    Referral,
}

impl BonusType {
    pub fn as_str(self) -> &'static str {
        match self {
            BonusType::WheelOfFortune => "wheel_of_fortune",
            BonusType::SignUp => "sign_up",
            BonusType::Referral => "referral",
        }
    }

    /// Types an account may claim at most once in its lifetime.
    pub fn is_once_per_account(self) -> bool {
        matches!(self, BonusType::WheelOfFortune | BonusType::SignUp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bonus_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BonusStatus {
    Pending,
    Claimed,
    Expired,
}

impl BonusStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BonusStatus::Pending => "pending",
            BonusStatus::Claimed => "claimed",
            BonusStatus::Expired => "expired",
        }
    }
}

/// A time-boxed, single-claim reward offer.
///
/// # Database Table
///
/// Maps to the `bonuses` table. Created `pending`; moves to `claimed` once,
/// or to `expired` when a claim attempt finds `expires_at` in the past.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Bonus {
    pub id: Uuid,

    /// Beneficiary
    pub account_id: Uuid,

    #[serde(rename = "type")]
    pub bonus_type: BonusType,

    pub amount_cents: i64,

    pub status: BonusStatus,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Outcome of checking a locked grant against a claim request.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimCheck {
    /// The grant may be paid out.
    Claimable,
    /// The grant is stale and must be finalised as expired.
    Expired,
}

impl Bonus {
    /// Validate a claim by `requester` at `now`, in the order the claim
    /// protocol requires: ownership, then status, then expiry.
    pub fn check_claim(&self, requester: Uuid, now: DateTime<Utc>) -> Result<ClaimCheck, AppError> {
        if self.account_id != requester {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }

        if self.status != BonusStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Bonus already {}",
                self.status.as_str()
            )));
        }

        if now > self.expires_at {
            return Ok(ClaimCheck::Expired);
        }

        Ok(ClaimCheck::Claimable)
    }
}
