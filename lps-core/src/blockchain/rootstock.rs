//! Rootstock node adapter.
//!
//! The provider account is managed by the node (`eth_sendTransaction`), so
//! no key material passes through this process.

use super::jsonrpc::{JsonRpcClient, parse_hex_u64, parse_hex_u128};
use super::{
    BestBlock, BestBlockSource, BlockTag, RpcError, RskBlock, RskRpc, RskWallet, SigningPermit,
    TransactionReceipt,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_POLL_ATTEMPTS: u32 = 150;

#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    hash: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: String,
    block_hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    gas_used: String,
    status: String,
}

impl TryFrom<RawReceipt> for TransactionReceipt {
    type Error = RpcError;

    fn try_from(raw: RawReceipt) -> Result<Self, RpcError> {
        Ok(Self {
            block_number: parse_hex_u64(&raw.block_number)?,
            gas_used: parse_hex_u64(&raw.gas_used)?,
            succeeded: parse_hex_u64(&raw.status)? == 1,
            tx_hash: raw.transaction_hash,
            block_hash: raw.block_hash,
            from: raw.from,
            to: raw.to,
        })
    }
}

fn parse_wei(value: &str) -> Result<Decimal, RpcError> {
    let wei = parse_hex_u128(value)?;
    Decimal::from_u128(wei).ok_or_else(|| RpcError::Decode(format!("wei amount {value}")))
}

pub struct RskJsonRpcClient {
    rpc: JsonRpcClient,
    lp_address: String,
    receipt_poll_interval: Duration,
}

impl RskJsonRpcClient {
    pub fn new(rpc_url: Url, lp_address: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(rpc_url),
            lp_address: lp_address.into(),
            receipt_poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }

    /// Read-only client, used as an external source for eclipse checks.
    pub fn observer(rpc_url: Url) -> Self {
        Self::new(rpc_url, String::new())
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt, RpcError> {
        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
        Err(RpcError::NotFound(format!("receipt of {tx_hash}")))
    }
}

#[async_trait]
impl RskRpc for RskJsonRpcClient {
    async fn get_height(&self) -> Result<u64, RpcError> {
        let height: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&height)
    }

    async fn get_block_by_number(&self, block: BlockTag) -> Result<RskBlock, RpcError> {
        let tag = match block {
            BlockTag::Latest => "latest".to_string(),
            BlockTag::Number(n) => format!("{n:#x}"),
        };
        let raw: Option<RawBlock> = self
            .rpc
            .call("eth_getBlockByNumber", json!([tag, false]))
            .await?;
        let raw = raw.ok_or_else(|| RpcError::NotFound(format!("block {tag}")))?;
        Ok(RskBlock {
            number: parse_hex_u64(&raw.number)?,
            hash: raw.hash,
            timestamp: parse_hex_u64(&raw.timestamp)?,
        })
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let raw: Option<RawReceipt> = self
            .rpc
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        raw.map(TransactionReceipt::try_from).transpose()
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, RpcError> {
        let balance: String = self
            .rpc
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_wei(&balance)
    }
}

#[async_trait]
impl RskWallet for RskJsonRpcClient {
    fn address(&self) -> String {
        self.lp_address.clone()
    }

    async fn balance(&self) -> Result<Decimal, RpcError> {
        self.get_balance(&self.lp_address).await
    }

    async fn send_value(
        &self,
        permit: &SigningPermit,
        to: &str,
        value: Decimal,
    ) -> Result<TransactionReceipt, RpcError> {
        let wei = value
            .trunc()
            .to_u128()
            .ok_or_else(|| RpcError::Decode(format!("cannot send {value} wei")))?;
        debug!(chain = %permit.chain(), to, value = %value, "Sending RBTC");
        let tx_hash: String = self
            .rpc
            .call(
                "eth_sendTransaction",
                json!([{ "from": self.lp_address, "to": to, "value": format!("{wei:#x}") }]),
            )
            .await?;
        self.wait_for_receipt(&tx_hash).await
    }
}

#[async_trait]
impl BestBlockSource for RskJsonRpcClient {
    fn name(&self) -> String {
        format!("rskj({})", self.rpc.url().host_str().unwrap_or("unknown"))
    }

    async fn best_block(&self) -> Result<BestBlock, RpcError> {
        let block = self.get_block_by_number(BlockTag::Latest).await?;
        Ok(BestBlock {
            hash: block.hash,
            height: block.number,
        })
    }
}
