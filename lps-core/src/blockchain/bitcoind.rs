//! Bitcoin Core adapter.
//!
//! Implements [`BitcoinRpc`], [`BitcoinWallet`] and [`BestBlockSource`] over
//! the node's JSON-RPC interface. Payments go through the node wallet.

use super::jsonrpc::JsonRpcClient;
use super::merkle::{self, MerkleBranch};
use super::{
    BestBlock, BestBlockSource, BitcoinRpc, BitcoinWallet, BlockchainInfo, BtcBlockInfo,
    BtcTransactionInfo, RpcError, SigningPermit,
};
use async_trait::async_trait;
use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::{Amount, Txid};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct VerboseTransaction {
    txid: String,
    hash: String,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    blockhash: Option<String>,
    vout: Vec<VerboseOutput>,
}

#[derive(Debug, Deserialize)]
struct VerboseOutput {
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    value: Amount,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    #[serde(default)]
    address: Option<String>,
}

impl From<VerboseTransaction> for BtcTransactionInfo {
    fn from(tx: VerboseTransaction) -> Self {
        let mut outputs: HashMap<String, Vec<u64>> = HashMap::new();
        for output in tx.vout {
            if let Some(address) = output.script_pub_key.address {
                outputs.entry(address).or_default().push(output.value.to_sat());
            }
        }
        Self {
            has_witness: tx.txid != tx.hash,
            hash: tx.txid,
            confirmations: tx.confirmations,
            outputs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    hash: String,
    height: u64,
    time: u64,
}

#[derive(Debug, Deserialize)]
struct BlockTxids {
    tx: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChainInfo {
    chain: String,
    blocks: u64,
    bestblockhash: String,
}

#[derive(Debug, Deserialize)]
struct ReceivedByAddress {
    txids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HexResult {
    hex: String,
}

#[derive(Debug, Deserialize)]
struct SignedTransaction {
    hex: String,
    complete: bool,
}

pub struct BitcoindClient {
    rpc: JsonRpcClient,
}

impl BitcoindClient {
    /// `wallet` selects a named wallet through the `/wallet/<name>` endpoint.
    pub fn new(
        rpc_url: Url,
        user: &str,
        password: &str,
        wallet: Option<&str>,
    ) -> Result<Self, url::ParseError> {
        let url = match wallet {
            Some(name) => rpc_url.join(&format!("wallet/{name}"))?,
            None => rpc_url,
        };
        Ok(Self {
            rpc: JsonRpcClient::new(url).with_basic_auth(user, password),
        })
    }

    async fn verbose_transaction(&self, tx_hash: &str) -> Result<VerboseTransaction, RpcError> {
        self.rpc
            .call("getrawtransaction", json!([tx_hash, true]))
            .await
    }

    /// Txids of the block that includes `tx_hash`, and the parsed txid itself.
    async fn block_txids(&self, tx_hash: &str) -> Result<(Vec<Txid>, Txid), RpcError> {
        let tx = self.verbose_transaction(tx_hash).await?;
        let block_hash = tx
            .blockhash
            .ok_or_else(|| RpcError::NotFound(format!("block of transaction {tx_hash}")))?;
        let block: BlockTxids = self.rpc.call("getblock", json!([block_hash, 1])).await?;
        let txids = block
            .tx
            .iter()
            .map(|id| parse_txid(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((txids, parse_txid(tx_hash)?))
    }
}

fn parse_txid(value: &str) -> Result<Txid, RpcError> {
    Txid::from_str(value).map_err(|e| RpcError::Decode(format!("txid {value}: {e}")))
}

#[async_trait]
impl BitcoinRpc for BitcoindClient {
    async fn get_height(&self) -> Result<u64, RpcError> {
        self.rpc.call("getblockcount", json!([])).await
    }

    async fn get_transaction_info(&self, tx_hash: &str) -> Result<BtcTransactionInfo, RpcError> {
        Ok(self.verbose_transaction(tx_hash).await?.into())
    }

    async fn get_transaction_block_info(&self, tx_hash: &str) -> Result<BtcBlockInfo, RpcError> {
        let tx = self.verbose_transaction(tx_hash).await?;
        let block_hash = tx
            .blockhash
            .ok_or_else(|| RpcError::NotFound(format!("block of transaction {tx_hash}")))?;
        let header: BlockHeader = self
            .rpc
            .call("getblockheader", json!([block_hash, true]))
            .await?;
        Ok(BtcBlockInfo {
            hash: header.hash,
            height: header.height,
            time: header.time,
        })
    }

    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        let info: ChainInfo = self.rpc.call("getblockchaininfo", json!([])).await?;
        Ok(BlockchainInfo {
            network: info.chain,
            validated_blocks: info.blocks,
            best_block_hash: info.bestblockhash,
        })
    }

    async fn get_raw_transaction(&self, tx_hash: &str) -> Result<Vec<u8>, RpcError> {
        let hex: String = self
            .rpc
            .call("getrawtransaction", json!([tx_hash, false]))
            .await?;
        Vec::<u8>::from_hex(&hex).map_err(|e| RpcError::Decode(format!("raw tx {tx_hash}: {e}")))
    }

    async fn get_partial_merkle_tree(&self, tx_hash: &str) -> Result<Vec<u8>, RpcError> {
        let (txids, txid) = self.block_txids(tx_hash).await?;
        merkle::partial_merkle_tree(&txids, &txid)
            .ok_or_else(|| RpcError::NotFound(format!("transaction {tx_hash} in its block")))
    }

    async fn get_merkle_branch(&self, tx_hash: &str) -> Result<MerkleBranch, RpcError> {
        let (txids, txid) = self.block_txids(tx_hash).await?;
        MerkleBranch::build(&txids, &txid)
            .ok_or_else(|| RpcError::NotFound(format!("transaction {tx_hash} in its block")))
    }

    async fn import_address(&self, address: &str) -> Result<(), RpcError> {
        self.rpc
            .call("importaddress", json!([address, "", false]))
            .await
    }

    async fn get_address_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<BtcTransactionInfo>, RpcError> {
        let received: Vec<ReceivedByAddress> = self
            .rpc
            .call("listreceivedbyaddress", json!([0, true, true, address]))
            .await?;

        let mut transactions = Vec::new();
        for txid in received.into_iter().flat_map(|r| r.txids).unique() {
            transactions.push(self.get_transaction_info(&txid).await?);
        }
        Ok(transactions)
    }
}

#[async_trait]
impl BitcoinWallet for BitcoindClient {
    async fn balance(&self) -> Result<u64, RpcError> {
        let btc: f64 = self.rpc.call("getbalance", json!([])).await?;
        Amount::from_btc(btc)
            .map(Amount::to_sat)
            .map_err(|e| RpcError::Decode(format!("balance {btc}: {e}")))
    }

    async fn send(
        &self,
        permit: &SigningPermit,
        address: &str,
        satoshis: u64,
    ) -> Result<String, RpcError> {
        debug!(chain = %permit.chain(), address, satoshis, "Sending bitcoin payment");
        let amount = Amount::from_sat(satoshis).to_btc();
        self.rpc
            .call("sendtoaddress", json!([address, amount]))
            .await
    }

    async fn send_with_op_return(
        &self,
        permit: &SigningPermit,
        address: &str,
        satoshis: u64,
        op_return: &[u8],
    ) -> Result<String, RpcError> {
        debug!(chain = %permit.chain(), address, satoshis, "Sending bitcoin payment with OP_RETURN");
        let amount = Amount::from_sat(satoshis).to_btc();
        let outputs = json!([
            { address: amount },
            { "data": op_return.to_lower_hex_string() },
        ]);

        let unfunded: String = self
            .rpc
            .call("createrawtransaction", json!([[], outputs]))
            .await?;
        let funded: HexResult = self
            .rpc
            .call("fundrawtransaction", json!([unfunded]))
            .await?;
        let signed: SignedTransaction = self
            .rpc
            .call("signrawtransactionwithwallet", json!([funded.hex]))
            .await?;
        if !signed.complete {
            return Err(RpcError::Decode(
                "wallet could not sign every input".to_string(),
            ));
        }
        self.rpc
            .call("sendrawtransaction", json!([signed.hex]))
            .await
    }
}

#[async_trait]
impl BestBlockSource for BitcoindClient {
    fn name(&self) -> String {
        format!("bitcoind({})", self.rpc.url().host_str().unwrap_or("unknown"))
    }

    async fn best_block(&self) -> Result<BestBlock, RpcError> {
        let info = self.get_blockchain_info().await?;
        Ok(BestBlock {
            hash: info.best_block_hash,
            height: info.validated_blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_transaction_is_grouped_by_address() {
        let raw = json!({
            "txid": "aa",
            "hash": "bb",
            "confirmations": 3,
            "blockhash": "00ff",
            "vout": [
                { "value": 0.0001, "scriptPubKey": { "address": "2N5muMepJizJE1gR7FbHJU6CD18V3BpNF9p" } },
                { "value": 0.5, "scriptPubKey": { "address": "mnYcQxCZBbmLzNfE9BhV7E8E2u7amdz5y6" } },
                { "value": 0.00005, "scriptPubKey": { "address": "2N5muMepJizJE1gR7FbHJU6CD18V3BpNF9p" } },
                { "value": 0.0, "scriptPubKey": {} }
            ]
        });
        let tx: VerboseTransaction = serde_json::from_value(raw).unwrap();
        let info = BtcTransactionInfo::from(tx);

        assert_eq!(info.hash, "aa");
        assert_eq!(info.confirmations, 3);
        assert!(info.has_witness);
        assert_eq!(info.amount_to("2N5muMepJizJE1gR7FbHJU6CD18V3BpNF9p"), 15_000);
        assert_eq!(info.amount_to("mnYcQxCZBbmLzNfE9BhV7E8E2u7amdz5y6"), 50_000_000);
        assert_eq!(info.amount_to("unknown"), 0);
    }

    #[test]
    fn test_unconfirmed_transaction_has_zero_confirmations() {
        let raw = json!({ "txid": "aa", "hash": "aa", "vout": [] });
        let info = BtcTransactionInfo::from(serde_json::from_value::<VerboseTransaction>(raw).unwrap());
        assert_eq!(info.confirmations, 0);
        assert!(!info.has_witness);
    }

    #[test]
    fn test_wallet_url_is_joined() {
        let client = BitcoindClient::new(
            Url::parse("http://127.0.0.1:18443/").unwrap(),
            "user",
            "pass",
            Some("main"),
        )
        .unwrap();
        assert_eq!(client.rpc.url().as_str(), "http://127.0.0.1:18443/wallet/main");
    }
}
