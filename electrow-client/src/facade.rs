//! Electrum protocol methods
//!
//! Thin wrappers over [`ElectrumSession::request`] and
//! [`ElectrumSession::request_batch`]. Each one fixes the method name and
//! the positional parameter list, filling optional parameters with their
//! protocol defaults. Results are returned as raw JSON.

use crate::session::ElectrumSession;
use electrow_core::Result;
use serde_json::Value;

/// Protocol version that takes a height range in `get_history`
pub const HISTORY_RANGE_VERSION: &str = "1.5";

fn collect<I>(entries: I) -> Vec<Value>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    entries.into_iter().map(Into::into).collect()
}

impl ElectrumSession {
    // server.*

    pub async fn server_version(&self, client_name: &str, protocol_version: &str) -> Result<Value> {
        self.request(
            "server.version",
            vec![client_name.into(), protocol_version.into()],
        )
        .await
    }

    pub async fn server_banner(&self) -> Result<Value> {
        self.request("server.banner", vec![]).await
    }

    pub async fn server_ping(&self) -> Result<Value> {
        self.request("server.ping", vec![]).await
    }

    pub async fn server_add_peer(&self, features: impl Into<Value>) -> Result<Value> {
        self.request("server.add_peer", vec![features.into()]).await
    }

    pub async fn server_donation_address(&self) -> Result<Value> {
        self.request("server.donation_address", vec![]).await
    }

    pub async fn server_features(&self) -> Result<Value> {
        self.request("server.features", vec![]).await
    }

    pub async fn server_peers_subscribe(&self) -> Result<Value> {
        self.request("server.peers.subscribe", vec![]).await
    }

    // blockchain.address.* / blockchain.dotnav.*

    pub async fn blockchain_address_get_proof(&self, address: &str) -> Result<Value> {
        self.request("blockchain.address.get_proof", vec![address.into()]).await
    }

    pub async fn blockchain_dotnav_resolve_name(
        &self,
        name: &str,
        subdomains: impl Into<Value>,
    ) -> Result<Value> {
        self.request(
            "blockchain.dotnav.resolve_name",
            vec![name.into(), subdomains.into()],
        )
        .await
    }

    // blockchain.scripthash.*

    pub async fn blockchain_scripthash_get_balance(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.get_balance", vec![scripthash.into()]).await
    }

    /// History of `scripthash`
    ///
    /// Servers speaking protocol 1.5 take a height range, `height` defaulting
    /// to 0 and `to_height` to -1 (mempool included). Any other negotiated
    /// version gets the script hash alone and the range is not sent.
    pub async fn blockchain_scripthash_get_history(
        &self,
        scripthash: &str,
        height: Option<i64>,
        to_height: Option<i64>,
    ) -> Result<Value> {
        let params = if self.protocol_version().await.as_deref() == Some(HISTORY_RANGE_VERSION) {
            vec![
                scripthash.into(),
                height.unwrap_or(0).into(),
                to_height.unwrap_or(-1).into(),
            ]
        } else {
            vec![scripthash.into()]
        };
        self.request("blockchain.scripthash.get_history", params).await
    }

    pub async fn blockchain_scripthash_get_mempool(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.get_mempool", vec![scripthash.into()]).await
    }

    pub async fn blockchain_scripthash_listunspent(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.listunspent", vec![scripthash.into()]).await
    }

    /// Subscribe to status changes; pushes arrive as
    /// [`SCRIPTHASH_EVENT`](crate::SCRIPTHASH_EVENT) notifications
    pub async fn blockchain_scripthash_subscribe(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.subscribe", vec![scripthash.into()]).await
    }

    pub async fn blockchain_scripthash_unsubscribe(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.scripthash.unsubscribe", vec![scripthash.into()]).await
    }

    // blockchain.outpoint.*

    pub async fn blockchain_outpoint_subscribe(&self, tx_hash: &str, out: u32) -> Result<Value> {
        self.request(
            "blockchain.outpoint.subscribe",
            vec![tx_hash.into(), out.into()],
        )
        .await
    }

    pub async fn blockchain_outpoint_unsubscribe(&self, tx_hash: &str, out: u32) -> Result<Value> {
        self.request(
            "blockchain.outpoint.unsubscribe",
            vec![tx_hash.into(), out.into()],
        )
        .await
    }

    // chain-specific subscriptions

    pub async fn blockchain_stakervote_subscribe(&self, scripthash: &str) -> Result<Value> {
        self.request("blockchain.stakervote.subscribe", vec![scripthash.into()]).await
    }

    pub async fn blockchain_consensus_subscribe(&self) -> Result<Value> {
        self.request("blockchain.consensus.subscribe", vec![]).await
    }

    pub async fn blockchain_dao_subscribe(&self) -> Result<Value> {
        self.request("blockchain.dao.subscribe", vec![]).await
    }

    // blockchain.block.* / headers / fees

    pub async fn blockchain_block_header(
        &self,
        height: u64,
        cp_height: Option<u64>,
    ) -> Result<Value> {
        self.request(
            "blockchain.block.header",
            vec![height.into(), cp_height.unwrap_or(0).into()],
        )
        .await
    }

    pub async fn blockchain_block_headers(
        &self,
        start_height: u64,
        count: u64,
        cp_height: Option<u64>,
    ) -> Result<Value> {
        self.request(
            "blockchain.block.headers",
            vec![
                start_height.into(),
                count.into(),
                cp_height.unwrap_or(0).into(),
            ],
        )
        .await
    }

    pub async fn blockchain_estimatefee(&self, number: u32) -> Result<Value> {
        self.request("blockchain.estimatefee", vec![number.into()]).await
    }

    /// Current tip; new tips arrive as [`HEADERS_EVENT`](crate::HEADERS_EVENT) notifications
    pub async fn blockchain_headers_subscribe(&self) -> Result<Value> {
        self.request("blockchain.headers.subscribe", vec![]).await
    }

    pub async fn blockchain_relayfee(&self) -> Result<Value> {
        self.request("blockchain.relayfee", vec![]).await
    }

    // blockchain.transaction.*

    pub async fn blockchain_transaction_broadcast(&self, raw_tx: &str) -> Result<Value> {
        self.request("blockchain.transaction.broadcast", vec![raw_tx.into()]).await
    }

    pub async fn blockchain_transaction_get(
        &self,
        tx_hash: &str,
        verbose: Option<bool>,
    ) -> Result<Value> {
        self.request(
            "blockchain.transaction.get",
            vec![tx_hash.into(), verbose.unwrap_or(false).into()],
        )
        .await
    }

    pub async fn blockchain_transaction_get_keys(&self, tx_hash: &str) -> Result<Value> {
        self.request("blockchain.transaction.get_keys", vec![tx_hash.into()]).await
    }

    pub async fn blockchain_transaction_get_merkle(
        &self,
        tx_hash: &str,
        height: u64,
    ) -> Result<Value> {
        self.request(
            "blockchain.transaction.get_merkle",
            vec![tx_hash.into(), height.into()],
        )
        .await
    }

    // blockchain.staking.* / blockchain.token.*

    pub async fn blockchain_staking_get_keys(&self, spending_pkh: &str) -> Result<Value> {
        self.request("blockchain.staking.get_keys", vec![spending_pkh.into()]).await
    }

    pub async fn blockchain_token_get_token(&self, id: impl Into<Value>) -> Result<Value> {
        self.request("blockchain.token.get_token", vec![id.into()]).await
    }

    pub async fn blockchain_token_get_nft(
        &self,
        id: impl Into<Value>,
        subid: impl Into<Value>,
        get_utxo: Option<bool>,
    ) -> Result<Value> {
        self.request(
            "blockchain.token.get_nft",
            vec![id.into(), subid.into(), get_utxo.unwrap_or(false).into()],
        )
        .await
    }

    // mempool.*

    pub async fn mempool_get_fee_histogram(&self) -> Result<Value> {
        self.request("mempool.get_fee_histogram", vec![]).await
    }

    // Batches: one request per entry, results in input order

    pub async fn blockchain_scripthash_get_balance_batch<I>(
        &self,
        scripthashes: I,
    ) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.request_batch("blockchain.scripthash.get_balance", collect(scripthashes), None).await
    }

    pub async fn blockchain_scripthash_listunspent_batch<I>(
        &self,
        scripthashes: I,
    ) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.request_batch("blockchain.scripthash.listunspent", collect(scripthashes), None).await
    }

    pub async fn blockchain_scripthash_get_history_batch<I>(
        &self,
        scripthashes: I,
    ) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.request_batch("blockchain.scripthash.get_history", collect(scripthashes), None).await
    }

    /// Transactions by hash; `verbose` is appended to every entry only when given
    pub async fn blockchain_transaction_get_batch<I>(
        &self,
        tx_hashes: I,
        verbose: Option<bool>,
    ) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.request_batch(
            "blockchain.transaction.get",
            collect(tx_hashes),
            verbose.map(Value::Bool),
        )
        .await
    }
}
