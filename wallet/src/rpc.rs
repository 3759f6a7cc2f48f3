//! Node RPC client.
//!
//! The node is only ever asked three things: who it is, the outputs under a
//! payment id, and to accept a finished transaction. The trait keeps the
//! wallet testable against a fake node; [`HttpNodeClient`] is the real one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    session::CancelFlag,
    types::{Transaction, Vout},
    WalletError,
};

/// Timeout for RPC requests.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity and status of the remote node.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub advertise: String,
    pub block_height: u64,
    pub listening: String,
    pub name: String,
    pub version: String,
    pub client_id: String,
    pub public_key: String,
    pub http_end_point: String,
}

/// The three node operations the wallet depends on.
#[allow(async_fn_in_trait)]
pub trait NodeClient {
    /// `GET /member/peer`
    async fn peer_info(&self) -> Result<PeerInfo, WalletError>;

    /// `GET /transaction/{payment_id}`: candidate outputs for scanning.
    async fn outputs_by_payment_id(&self, payment_id: &str) -> Result<Vec<Vout>, WalletError>;

    /// `POST /transaction`: submit a finished transaction.
    async fn submit(&self, tx: &Transaction) -> Result<bool, WalletError>;
}

/// HTTP client against a single node endpoint.
#[derive(Debug)]
pub struct HttpNodeClient {
    client: reqwest::Client,
    base_url: String,
    cancel: CancelFlag,
}

impl HttpNodeClient {
    /// Connect to `endpoint` (`host:port` or a full URL).
    pub fn new(endpoint: &str, cancel: CancelFlag) -> Result<Self, WalletError> {
        if endpoint.is_empty() {
            return Err(WalletError::Config("node endpoint is not set".into()));
        }
        let base_url = if endpoint.starts_with("http") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{endpoint}")
        };
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(WalletError::from)?;
        Ok(Self {
            client,
            base_url,
            cancel,
        })
    }

    fn check_cancel(&self) -> Result<(), WalletError> {
        if self.cancel.is_cancelled() {
            return Err(WalletError::Cancelled);
        }
        Ok(())
    }
}

impl NodeClient for HttpNodeClient {
    async fn peer_info(&self) -> Result<PeerInfo, WalletError> {
        self.check_cancel()?;
        let url = format!("{}/member/peer", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(WalletError::Rpc(format!("http error: {}", response.status())));
        }
        Ok(response.json().await?)
    }

    async fn outputs_by_payment_id(&self, payment_id: &str) -> Result<Vec<Vout>, WalletError> {
        self.check_cancel()?;
        let url = format!("{}/transaction/{}", self.base_url, payment_id);
        tracing::debug!(%url, "fetching outputs");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(WalletError::Rpc(format!("http error: {}", response.status())));
        }
        Ok(response.json().await?)
    }

    async fn submit(&self, tx: &Transaction) -> Result<bool, WalletError> {
        self.check_cancel()?;
        let url = format!("{}/transaction", self.base_url);
        tracing::debug!(txn_id = %hex::encode(tx.txn_id), "submitting transaction");
        let response = self.client.post(&url).json(tx).send().await?;
        if !response.status().is_success() {
            return Err(WalletError::Rpc(format!("http error: {}", response.status())));
        }
        Ok(response.json().await?)
    }
}
