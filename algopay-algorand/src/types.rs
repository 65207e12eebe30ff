//! Wire types of the algod and indexer REST APIs.
//!
//! Only the fields the engine reads are modelled; everything else in the
//! responses is ignored.

use algopay::UnixTimestamp;
use algopay::ledger::{AssetFilter, MatchedTransaction};
use serde::{Deserialize, Serialize};

/// `GET /v2/status` response from algod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatus {
    /// Last committed round.
    pub last_round: u64,
}

/// One page of `GET /v2/accounts/{address}/transactions` from the indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransactionsPage {
    /// Round the indexer had reached when answering.
    #[serde(default)]
    pub current_round: u64,
    /// Cursor for the next page, absent on the last one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    /// Transactions in indexer order.
    #[serde(default)]
    pub transactions: Vec<IndexerTransaction>,
}

/// A transaction as returned by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexerTransaction {
    /// Transaction id.
    pub id: String,
    /// Sending account.
    pub sender: String,
    /// `pay`, `axfer`, ...
    pub tx_type: String,
    /// Round the transaction was confirmed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_round: Option<u64>,
    /// Block timestamp in Unix seconds.
    #[serde(default)]
    pub round_time: u64,
    /// Present on `pay` transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_transaction: Option<PaymentFields>,
    /// Present on `axfer` transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_transfer_transaction: Option<AssetTransferFields>,
}

/// Body of a `pay` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PaymentFields {
    /// Receiving account.
    pub receiver: String,
    /// Amount in microalgos.
    pub amount: u64,
}

/// Body of an `axfer` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetTransferFields {
    /// Receiving account.
    pub receiver: String,
    /// Amount in the asset's base units.
    pub amount: u64,
    /// The transferred asset.
    pub asset_id: u64,
}

impl IndexerTransaction {
    /// Converts the indexer record into a ledger-neutral transfer.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the transaction is unconfirmed
    /// or lacks the transfer body `filter` asks for.
    pub fn into_matched(self, filter: AssetFilter) -> Result<MatchedTransaction, String> {
        let Some(confirmed_height) = self.confirmed_round else {
            return Err(format!("transaction {} has no confirmed round", self.id));
        };
        let (receiver_address, amount, asset_id) = match filter {
            AssetFilter::Native => {
                let body = self.payment_transaction.ok_or_else(|| {
                    format!("transaction {} has no payment-transaction body", self.id)
                })?;
                (body.receiver, body.amount, 0)
            }
            AssetFilter::Asset(_) => {
                let body = self.asset_transfer_transaction.ok_or_else(|| {
                    format!("transaction {} has no asset-transfer-transaction body", self.id)
                })?;
                (body.receiver, body.amount, body.asset_id)
            }
        };
        Ok(MatchedTransaction {
            txn_id: self.id,
            sender_address: self.sender,
            receiver_address,
            amount,
            asset_id,
            confirmed_height,
            confirmed_at: UnixTimestamp::from_secs(self.round_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_indexer_page() {
        let page: TransactionsPage = serde_json::from_value(json!({
            "current-round": 120,
            "next-token": "abc",
            "transactions": [{
                "id": "TX1",
                "sender": "SENDER",
                "tx-type": "pay",
                "confirmed-round": 101,
                "round-time": 1_700_000_000,
                "fee": 1000,
                "payment-transaction": { "receiver": "PAYEE", "amount": 5, "close-amount": 0 }
            }]
        }))
        .unwrap();

        assert_eq!(page.next_token.as_deref(), Some("abc"));
        let txn = page.transactions[0].clone().into_matched(AssetFilter::Native).unwrap();
        assert_eq!(txn.receiver_address, "PAYEE");
        assert_eq!(txn.confirmed_height, 101);
        assert_eq!(txn.confirmed_at.as_secs(), 1_700_000_000);
        assert_eq!(txn.asset_id, 0);
    }

    #[test]
    fn test_asset_transfer_needs_its_body() {
        let txn: IndexerTransaction = serde_json::from_value(json!({
            "id": "TX2",
            "sender": "SENDER",
            "tx-type": "pay",
            "confirmed-round": 7,
            "payment-transaction": { "receiver": "PAYEE", "amount": 5 }
        }))
        .unwrap();
        assert!(txn.into_matched(AssetFilter::Asset(31_566_704)).is_err());
    }

    #[test]
    fn test_unconfirmed_is_rejected() {
        let txn: IndexerTransaction = serde_json::from_value(json!({
            "id": "TX3",
            "sender": "SENDER",
            "tx-type": "axfer",
            "asset-transfer-transaction": { "receiver": "PAYEE", "amount": 5, "asset-id": 9 }
        }))
        .unwrap();
        assert!(txn.into_matched(AssetFilter::Asset(9)).is_err());
    }
}
