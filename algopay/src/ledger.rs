//! Read-only access to the ledger.
//!
//! The engine needs two things from a blockchain node or indexer: the latest
//! confirmed height, and the transfers addressed to an account since some
//! height. Chain crates implement [`LedgerQuery`] on top of their own APIs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, ValidationError};
use crate::timestamp::UnixTimestamp;

/// Which kind of transfer to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetFilter {
    /// Native-asset payments.
    Native,
    /// Transfers of the token with this id.
    Asset(u64),
}

impl AssetFilter {
    /// Maps a payment's `asset_id` to a filter; `0` means the native asset.
    #[must_use]
    pub const fn for_asset(asset_id: u64) -> Self {
        match asset_id {
            0 => Self::Native,
            id => Self::Asset(id),
        }
    }

    /// The asset id this filter selects, `0` for the native asset.
    #[must_use]
    pub const fn asset_id(self) -> u64 {
        match self {
            Self::Native => 0,
            Self::Asset(id) => id,
        }
    }
}

/// A confirmed transfer as reported by the ledger.
///
/// Produced by the matcher and consumed by the reconciliation loop within the
/// same tick; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTransaction {
    /// Canonical transaction identifier.
    pub txn_id: String,
    /// Sending account.
    pub sender_address: String,
    /// Receiving account.
    pub receiver_address: String,
    /// Transferred quantity in the asset's smallest unit.
    pub amount: u64,
    /// `0` for the native asset, otherwise the token id.
    pub asset_id: u64,
    /// Height of the block that confirmed the transaction.
    pub confirmed_height: u64,
    /// Timestamp of that block.
    pub confirmed_at: UnixTimestamp,
}

/// Read-only ledger access used by the reconciliation engine.
///
/// Implementations should bound every network call with a timeout so a
/// single slow request cannot stall a whole tick.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Returns the latest confirmed height.
    async fn latest_height(&self) -> Result<u64, QueryError>;

    /// Returns transfers to `address` confirmed at `min_height` or above,
    /// restricted by `filter`, in the order the ledger reports them.
    async fn transactions_to(
        &self,
        address: &str,
        min_height: u64,
        filter: AssetFilter,
    ) -> Result<Vec<MatchedTransaction>, QueryError>;

    /// Checks that `address` is well-formed for this ledger.
    ///
    /// The default accepts everything.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAddress`] when the ledger would
    /// reject the address.
    fn validate_address(&self, address: &str) -> Result<(), ValidationError> {
        let _ = address;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_filter_zero_is_native() {
        assert_eq!(AssetFilter::for_asset(0), AssetFilter::Native);
        assert_eq!(AssetFilter::for_asset(31_566_704), AssetFilter::Asset(31_566_704));
        assert_eq!(AssetFilter::Asset(7).asset_id(), 7);
        assert_eq!(AssetFilter::Native.asset_id(), 0);
    }
}
