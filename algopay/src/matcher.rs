//! Matching payment requests against ledger transactions.
//!
//! Selection is first-match, not best-match: the first transaction in ledger
//! order that pays the right address at least the requested amount of the
//! right asset wins. Overpayment is accepted as-is and the excess is not
//! tracked.

use std::sync::Arc;

use crate::error::QueryError;
use crate::ledger::{AssetFilter, LedgerQuery, MatchedTransaction};
use crate::payment::PaymentRequest;

/// Returns `true` if `txn` settles `request`.
#[must_use]
pub fn satisfies(request: &PaymentRequest, txn: &MatchedTransaction) -> bool {
    txn.receiver_address == request.payee_address
        && txn.amount >= request.amount
        && txn.asset_id == request.asset_id
}

/// Picks the first transaction in `candidates` that settles `request`.
#[must_use]
pub fn select_first(
    request: &PaymentRequest,
    candidates: Vec<MatchedTransaction>,
) -> Option<MatchedTransaction> {
    candidates.into_iter().find(|txn| satisfies(request, txn))
}

/// Looks up the ledger for a transaction settling a payment request.
#[derive(Clone)]
pub struct TransactionMatcher {
    ledger: Arc<dyn LedgerQuery>,
}

impl std::fmt::Debug for TransactionMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionMatcher").finish_non_exhaustive()
    }
}

impl TransactionMatcher {
    /// Creates a matcher over the given ledger.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerQuery>) -> Self {
        Self { ledger }
    }

    /// Finds the first transaction confirmed above `since_height` that
    /// settles `request`.
    ///
    /// Depends only on its arguments and the ledger state; `request` is not
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the ledger is unreachable or its answer is
    /// malformed.
    pub async fn find_match(
        &self,
        request: &PaymentRequest,
        since_height: u64,
    ) -> Result<Option<MatchedTransaction>, QueryError> {
        let candidates = self
            .ledger
            .transactions_to(
                &request.payee_address,
                since_height.saturating_add(1),
                AssetFilter::for_asset(request.asset_id),
            )
            .await?;
        Ok(select_first(request, candidates))
    }
}
