//! Response bodies of the payment REST API.
//!
//! `POST /api/v1/init-payment` takes an [`algopay::NewPayment`] directly;
//! `GET /api/v1/check-payment/{id}` answers with
//! [`algopay::service::PaymentStatusView`] and `GET /api/v1/payment/{id}`
//! with the full [`algopay::PaymentRequest`].

use algopay::{PaymentId, PaymentRequest, PaymentStatus, UnixTimestamp};
use serde::{Deserialize, Serialize};

/// Answer to a successful `POST /api/v1/init-payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreated {
    /// Id to poll and to expect in the callback.
    pub payment_id: PaymentId,
    /// Address the payer must send to.
    #[serde(rename = "merchant_address")]
    pub payee_address: String,
    /// Minimum amount to send.
    pub amount: u64,
    /// `0` for the native asset.
    pub asset_id: u64,
    /// Always `pending` on creation.
    pub status: PaymentStatus,
    /// When the request stops being matched.
    pub expires_at: UnixTimestamp,
}

impl From<PaymentRequest> for PaymentCreated {
    fn from(payment: PaymentRequest) -> Self {
        Self {
            payment_id: payment.id,
            payee_address: payment.payee_address,
            amount: payment.amount,
            asset_id: payment.asset_id,
            status: payment.status,
            expires_at: payment.expires_at,
        }
    }
}
