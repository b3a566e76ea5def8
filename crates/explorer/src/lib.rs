//! The only `Explorer` implementation that talks to a real chain: a plain
//! JSON-RPC client over `reqwest::blocking`, the same transport crate the
//! teacher's workspace reaches for whenever it needs a synchronous HTTP
//! call. Every other crate in the workspace only depends on the
//! `Explorer` trait, so only this crate (and the binary) pulls in an HTTP
//! stack.

use std::sync::atomic::{AtomicU64, Ordering};

use proxyscope_common::{
    hexutil, Address, BlockHeader, BlockTag, Explorer, ExplorerError, Word, H256,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// A JSON-RPC client bound to one endpoint, implementing the narrow
/// read-only `Explorer` interface spec.md §6 asks for.
pub struct JsonRpcExplorer {
    url: String,
    client: reqwest::blocking::Client,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl JsonRpcExplorer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::blocking::Client::new(), next_id: AtomicU64::new(1) }
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, ExplorerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(%method, "rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| ExplorerError::Transport(e.to_string()))?;

        let parsed: RpcResponse =
            response.json().map_err(|e| ExplorerError::Decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(ExplorerError::Rpc { code: error.code, message: error.message });
        }
        parsed.result.ok_or_else(|| ExplorerError::Decode("missing result field".to_string()))
    }

    fn as_string(value: &Value) -> Result<String, ExplorerError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ExplorerError::Decode(format!("expected a hex string, got {value}")))
    }
}

/// `"latest"` or a `0x`-prefixed block number, the two forms every
/// `eth_*` method accepts as its block-tag parameter.
fn block_param(block: BlockTag) -> Value {
    match block {
        BlockTag::Latest => json!("latest"),
        BlockTag::Number(n) => json!(format!("{n:#x}")),
    }
}

fn parse_u64_hex(value: &Value) -> Result<u64, ExplorerError> {
    let s = JsonRpcExplorer::as_string(value)?;
    let stripped = s.strip_prefix("0x").unwrap_or(&s);
    u64::from_str_radix(stripped, 16).map_err(|e| ExplorerError::Decode(e.to_string()))
}

fn parse_word_hex(value: &Value) -> Result<Word, ExplorerError> {
    let s = JsonRpcExplorer::as_string(value)?;
    hexutil::decode_hex_word(&s).map_err(|e| ExplorerError::Decode(e.to_string()))
}

impl Explorer for JsonRpcExplorer {
    fn get_code(&self, address: Address, block: BlockTag) -> Result<Vec<u8>, ExplorerError> {
        let result =
            self.call("eth_getCode", json!([hexutil::encode_address(address), block_param(block)]))?;
        let s = Self::as_string(&result)?;
        hexutil::decode_hex_bytes(&s).map_err(|e| ExplorerError::Decode(e.to_string()))
    }

    fn get_storage_at(
        &self,
        address: Address,
        slot: Word,
        block: BlockTag,
    ) -> Result<Word, ExplorerError> {
        let result = self.call(
            "eth_getStorageAt",
            json!([hexutil::encode_address(address), hexutil::encode_word(slot), block_param(block)]),
        )?;
        parse_word_hex(&result)
    }

    fn get_balance(&self, address: Address, block: BlockTag) -> Result<Word, ExplorerError> {
        let result =
            self.call("eth_getBalance", json!([hexutil::encode_address(address), block_param(block)]))?;
        parse_word_hex(&result)
    }

    fn block_number(&self) -> Result<u64, ExplorerError> {
        let result = self.call("eth_blockNumber", json!([]))?;
        parse_u64_hex(&result)
    }

    fn get_block_by_number(&self, number: u64) -> Result<BlockHeader, ExplorerError> {
        let result = self.call("eth_getBlockByNumber", json!([format!("{number:#x}"), false]))?;
        let get = |field: &str| -> Result<&Value, ExplorerError> {
            result
                .get(field)
                .ok_or_else(|| ExplorerError::Decode(format!("block response missing {field}")))
        };

        let hash_str = Self::as_string(get("hash")?)?;
        let hash = H256::from_slice(
            &hexutil::decode_hex_bytes(&hash_str).map_err(|e| ExplorerError::Decode(e.to_string()))?,
        );
        let base_fee = match result.get("baseFeePerGas") {
            Some(v) if !v.is_null() => Some(parse_word_hex(v)?),
            _ => None,
        };

        Ok(BlockHeader {
            number,
            hash,
            difficulty: parse_word_hex(get("difficulty")?)?,
            gas_limit: parse_u64_hex(get("gasLimit")?)?,
            timestamp: parse_u64_hex(get("timestamp")?)?,
            coinbase: hexutil::decode_address(&Self::as_string(get("miner")?)?)
                .map_err(|e| ExplorerError::Decode(e.to_string()))?,
            base_fee,
        })
    }

    fn gas_price(&self) -> Result<Word, ExplorerError> {
        let result = self.call("eth_gasPrice", json!([]))?;
        parse_word_hex(&result)
    }
}
