//! Payment requests and their state machine.
//!
//! A [`PaymentRequest`] is the unit of work of the engine. It is created
//! `pending` and moves at most once into a terminal status:
//!
//! ```text
//! pending ──match found──▶ completed
//!    │
//!    └──────timeout──────▶ expired
//! ```
//!
//! `failed` is terminal as well. Nothing in the engine produces it today, but
//! stores must be able to persist it. [`PaymentRequest::transition`] is the
//! only place these rules are enforced; stores call it while holding their
//! write lock so the persisted status is always re-checked first.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{TransitionError, ValidationError};
use crate::timestamp::UnixTimestamp;

/// Opaque unique identifier of a payment request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PaymentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PaymentId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Lifecycle status of a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Waiting for a qualifying ledger transaction.
    Pending,
    /// Paid; the matching transaction id is recorded.
    Completed,
    /// Reserved terminal status.
    Failed,
    /// Timed out before any qualifying transaction was seen.
    Expired,
}

impl PaymentStatus {
    /// Returns `true` for statuses no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that is not one of the four payment statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Outcome of a status change that the state machine accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed.
    Applied,
    /// The same terminal status was already recorded; nothing changed.
    Unchanged,
}

/// Merchant input for opening a payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    /// Address expected to receive the funds.
    #[serde(rename = "merchant_address")]
    pub payee_address: String,
    /// Minimum acceptable quantity in the asset's smallest unit.
    pub amount: u64,
    /// `0` for the native asset, otherwise the token id.
    #[serde(default)]
    pub asset_id: u64,
    /// Where to POST the notification once the payment settles.
    ///
    /// An empty string on the wire means no callback.
    #[serde(
        rename = "callback_url",
        default,
        deserialize_with = "empty_url_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub callback_target: Option<Url>,
}

impl NewPayment {
    /// Checks the ledger-independent rules on merchant input.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for a zero amount, an empty payee address
    /// or a callback URL that is not `http`/`https`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        if self.payee_address.trim().is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        if let Some(target) = &self.callback_target
            && !matches!(target.scheme(), "http" | "https")
        {
            return Err(ValidationError::UnsupportedCallbackScheme {
                scheme: target.scheme().to_owned(),
            });
        }
        Ok(())
    }
}

fn empty_url_as_none<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => Url::parse(&raw).map(Some).map_err(serde::de::Error::custom),
    }
}

/// A request for an on-chain payment, as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Immutable identifier assigned at creation.
    pub id: PaymentId,
    /// Address expected to receive the funds.
    #[serde(rename = "merchant_address")]
    pub payee_address: String,
    /// `0` for the native asset, otherwise the token id.
    pub asset_id: u64,
    /// Minimum acceptable quantity in the asset's smallest unit.
    pub amount: u64,
    /// Merchant callback URL, if any.
    #[serde(rename = "callback_url", default, skip_serializing_if = "Option::is_none")]
    pub callback_target: Option<Url>,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Set if and only if `status` is `completed`.
    #[serde(rename = "txn_id", default, skip_serializing_if = "Option::is_none")]
    pub matched_txn_id: Option<String>,
    /// Creation time.
    pub created_at: UnixTimestamp,
    /// Time of the last status change.
    pub updated_at: UnixTimestamp,
    /// `created_at + timeout`, fixed at creation.
    pub expires_at: UnixTimestamp,
}

impl PaymentRequest {
    /// Opens a new pending request that expires `timeout` after `now`.
    #[must_use]
    pub fn open(new: NewPayment, timeout: Duration, now: UnixTimestamp) -> Self {
        Self {
            id: PaymentId::generate(),
            payee_address: new.payee_address,
            asset_id: new.asset_id,
            amount: new.amount,
            callback_target: new.callback_target,
            status: PaymentStatus::Pending,
            matched_txn_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + timeout,
        }
    }

    /// Pending and not yet past its expiry.
    #[must_use]
    pub fn is_active(&self, now: UnixTimestamp) -> bool {
        self.status == PaymentStatus::Pending && self.expires_at > now
    }

    /// Pending and at or past its expiry.
    #[must_use]
    pub fn is_overdue(&self, now: UnixTimestamp) -> bool {
        self.status == PaymentStatus::Pending && self.expires_at <= now
    }

    /// Applies a status change under the payment state machine.
    ///
    /// Only `pending → completed|expired|failed` changes anything.
    /// Re-applying the recorded terminal status (with the same transaction id
    /// for `completed`) is accepted as [`Transition::Unchanged`].
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when leaving a terminal status, completing
    /// without a transaction id, attaching a transaction id to a non-completed
    /// status, or re-completing with a different transaction id.
    pub fn transition(
        &mut self,
        status: PaymentStatus,
        matched_txn_id: Option<String>,
        now: UnixTimestamp,
    ) -> Result<Transition, TransitionError> {
        match (status, &matched_txn_id) {
            (PaymentStatus::Completed, None) => return Err(TransitionError::MissingTxnId),
            (status, Some(_)) if status != PaymentStatus::Completed => {
                return Err(TransitionError::UnexpectedTxnId { status });
            }
            _ => {}
        }

        if self.status == status {
            if let (Some(existing), Some(requested)) = (&self.matched_txn_id, &matched_txn_id)
                && existing != requested
            {
                return Err(TransitionError::ConflictingTxnId {
                    existing: existing.clone(),
                    requested: requested.clone(),
                });
            }
            return Ok(Transition::Unchanged);
        }

        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                current: self.status,
                requested: status,
            });
        }

        self.status = status;
        self.matched_txn_id = matched_txn_id;
        self.updated_at = now;
        Ok(Transition::Applied)
    }
}
