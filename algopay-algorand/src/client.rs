//! HTTP client for algod and the Algorand indexer.
//!
//! Two endpoints are used:
//!
//! - `GET {node}/v2/status` for the last committed round
//! - `GET {indexer}/v2/accounts/{address}/transactions` for transfers to an
//!   account, filtered by `min-round`, `tx-type` and `asset-id` and paged
//!   with `next`
//!
//! Every request carries a timeout so one slow call cannot stall a whole
//! reconciliation tick.

use std::time::Duration;

use algopay::error::{QueryError, ValidationError};
use algopay::ledger::{AssetFilter, LedgerQuery, MatchedTransaction};
use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use url::Url;

use crate::address;
use crate::error::AlgorandClientError;
use crate::types::{NodeStatus, TransactionsPage};

/// Header carrying the API token for algod and the indexer.
pub const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// A client for an algod node and an indexer.
#[derive(Clone)]
pub struct AlgorandClient {
    /// Base URL of algod
    node_url: Url,
    /// Base URL of the indexer
    indexer_url: Url,
    /// Full URL of `GET /v2/status`
    status_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// API token sent with every request
    token: Option<String>,
    /// Per-request timeout
    timeout: Duration,
    /// Upper bound on indexer pages fetched per lookup
    max_pages: usize,
}

impl std::fmt::Debug for AlgorandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorandClient")
            .field("node_url", &self.node_url.as_str())
            .field("indexer_url", &self.indexer_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

fn normalize(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

impl AlgorandClient {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default bound on indexer pages fetched per lookup.
    pub const DEFAULT_MAX_PAGES: usize = 10;

    /// Creates a client for the given algod and indexer base URLs.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorandClientError::UrlParse`] if endpoint URLs cannot be
    /// built from the bases.
    pub fn try_new(node_url: Url, indexer_url: Url) -> Result<Self, AlgorandClientError> {
        let node_url = normalize(node_url);
        let indexer_url = normalize(indexer_url);
        let status_url =
            node_url
                .join("v2/status")
                .map_err(|e| AlgorandClientError::UrlParse {
                    context: "Failed to construct v2/status URL",
                    source: e,
                })?;
        Ok(Self {
            node_url,
            indexer_url,
            status_url,
            client: Client::new(),
            token: None,
            timeout: Self::DEFAULT_TIMEOUT,
            max_pages: Self::DEFAULT_MAX_PAGES,
        })
    }

    /// Sends `token` in the [`TOKEN_HEADER`] header. Empty tokens are ignored.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many indexer pages a single lookup may follow.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Returns the algod base URL.
    pub const fn node_url(&self) -> &Url {
        &self.node_url
    }

    /// Returns the indexer base URL.
    pub const fn indexer_url(&self) -> &Url {
        &self.indexer_url
    }

    /// Returns the per-request timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches the last committed round from algod.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorandClientError`] if the request fails or the answer
    /// cannot be decoded.
    pub async fn last_round(&self) -> Result<u64, AlgorandClientError> {
        let status: NodeStatus = self
            .get_json(self.status_url.clone(), "GET /v2/status")
            .await?;
        Ok(status.last_round)
    }

    /// Lists transfers to `address` confirmed at or above `min_round`, in
    /// indexer order.
    ///
    /// Follows `next-token` pagination up to the configured page bound.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorandClientError`] if any page fails,
    /// [`AlgorandClientError::Malformed`] for a transaction that cannot be
    /// interpreted, or [`AlgorandClientError::Truncated`] if pages remain
    /// once the page bound is reached.
    pub async fn account_transactions(
        &self,
        address: &str,
        min_round: u64,
        filter: AssetFilter,
    ) -> Result<Vec<MatchedTransaction>, AlgorandClientError> {
        const CONTEXT: &str = "GET /v2/accounts/{address}/transactions";

        let base = self
            .indexer_url
            .join(&format!("v2/accounts/{address}/transactions"))
            .map_err(|e| AlgorandClientError::UrlParse {
                context: "Failed to construct account transactions URL",
                source: e,
            })?;

        let mut matched = Vec::new();
        let mut next: Option<String> = None;
        for _ in 0..self.max_pages {
            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("min-round", &min_round.to_string());
                match filter {
                    AssetFilter::Native => {
                        query.append_pair("tx-type", "pay");
                    }
                    AssetFilter::Asset(id) => {
                        query.append_pair("tx-type", "axfer");
                        query.append_pair("asset-id", &id.to_string());
                    }
                }
                if let Some(token) = &next {
                    query.append_pair("next", token);
                }
            }

            let page: TransactionsPage = self.get_json(url, CONTEXT).await?;
            let empty = page.transactions.is_empty();
            for txn in page.transactions {
                let txn = txn
                    .into_matched(filter)
                    .map_err(|message| AlgorandClientError::Malformed {
                        context: CONTEXT,
                        message,
                    })?;
                matched.push(txn);
            }

            next = page.next_token.filter(|t| !t.is_empty());
            if next.is_none() || empty {
                return Ok(matched);
            }
        }

        // A partial listing could hide the paying transaction.
        tracing::warn!(
            address,
            min_round,
            pages = self.max_pages,
            "indexer results truncated at page limit"
        );
        Err(AlgorandClientError::Truncated {
            context: CONTEXT,
            pages: self.max_pages,
        })
    }

    /// Generic GET helper that handles timeout application, the API token
    /// header and error mapping.
    ///
    /// `context` is a human-readable identifier used in error messages (e.g. `"GET /v2/status"`).
    async fn get_json<R>(&self, url: Url, context: &'static str) -> Result<R, AlgorandClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.get(url).timeout(self.timeout);
        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| AlgorandClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| AlgorandClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| AlgorandClientError::ResponseBodyRead { context, source: e })?;
            Err(AlgorandClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

/// Parses both base URLs and calls [`AlgorandClient::try_new`].
impl TryFrom<(&str, &str)> for AlgorandClient {
    type Error = AlgorandClientError;

    fn try_from((node, indexer): (&str, &str)) -> Result<Self, Self::Error> {
        let parse = |value: &str, context: &'static str| {
            Url::parse(value).map_err(|e| AlgorandClientError::UrlParse { context, source: e })
        };
        Self::try_new(
            parse(node, "Failed to parse node url")?,
            parse(indexer, "Failed to parse indexer url")?,
        )
    }
}

#[async_trait]
impl LedgerQuery for AlgorandClient {
    async fn latest_height(&self) -> Result<u64, QueryError> {
        Ok(self.last_round().await?)
    }

    async fn transactions_to(
        &self,
        address: &str,
        min_height: u64,
        filter: AssetFilter,
    ) -> Result<Vec<MatchedTransaction>, QueryError> {
        Ok(self.account_transactions(address, min_height, filter).await?)
    }

    fn validate_address(&self, address: &str) -> Result<(), ValidationError> {
        address::validate_address(address)
    }
}
