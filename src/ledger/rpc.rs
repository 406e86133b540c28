//! JSON-RPC transport.
//!
//! # Responsibilities
//! - Define the [`RpcEndpoint`] capability the rest of the crate talks to
//! - Speak JSON-RPC 2.0 over HTTP with a per-request deadline
//! - Classify failures structurally: HTTP 429 or RPC code 429 is throttling,
//!   a null account is "not found", everything else is a remote failure

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use url::Url;

use crate::config::RpcConfig;
use crate::ledger::transaction::Transaction;
use crate::ledger::types::{ConfirmationStatus, Hash, LedgerError, LedgerResult, Pubkey, Signature};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

/// JSON-RPC code some providers use for throttling.
const RPC_CODE_TOO_MANY_REQUESTS: i64 = 429;

/// Preflight simulation rejected the transaction.
const RPC_CODE_PREFLIGHT_FAILURE: i64 = -32002;

/// An account as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Processing status of a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmation_status: Option<ConfirmationStatus>,
    /// Execution error, rendered as text.
    pub err: Option<String>,
}

/// One entry of an account's signature history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    /// Unix seconds, when the node knows it.
    pub block_time: Option<i64>,
    pub confirmation_status: Option<ConfirmationStatus>,
    pub failed: bool,
}

/// The parts of a landed transaction the console inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetail {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub log_messages: Vec<String>,
    pub err: Option<String>,
}

/// Remote ledger capability.
///
/// Implementations perform exactly one remote round-trip per call; retries
/// are layered on top by [`LedgerClient`](crate::ledger::LedgerClient).
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    /// Native balance in lamports.
    async fn get_balance(&self, account: &Pubkey) -> LedgerResult<u64>;

    /// Ask a test cluster faucet for `lamports`.
    async fn request_airdrop(&self, account: &Pubkey, lamports: u64) -> LedgerResult<Signature>;

    /// `None` when the account does not exist.
    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<AccountInfo>>;

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash>;

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> LedgerResult<u64>;

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature>;

    /// `None` when the node has not seen the signature.
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<SignatureStatus>>;

    /// Newest first.
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SignatureInfo>>;

    async fn get_transaction(&self, signature: &Signature)
        -> LedgerResult<Option<TransactionDetail>>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct UiAccount {
    lamports: u64,
    owner: Pubkey,
    /// `[payload, "base64"]`
    data: (String, String),
}

#[derive(Debug, Deserialize)]
struct UiBlockhash {
    blockhash: Hash,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiSignatureStatus {
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<ConfirmationStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiSignatureInfo {
    signature: Signature,
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    confirmation_status: Option<ConfirmationStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTransactionMeta {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    log_messages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTransaction {
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<UiTransactionMeta>,
}

fn render_err(err: Option<Value>) -> Option<String> {
    err.filter(|v| !v.is_null()).map(|v| v.to_string())
}

fn decode_account(account: UiAccount) -> LedgerResult<AccountInfo> {
    let (payload, encoding) = account.data;
    if encoding != "base64" {
        return Err(LedgerError::Encoding(format!(
            "unexpected account encoding '{}'",
            encoding
        )));
    }
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| LedgerError::Encoding(format!("account data: {}", e)))?;
    Ok(AccountInfo {
        lamports: account.lamports,
        owner: account.owner,
        data,
    })
}

/// Map a JSON-RPC error object onto the ledger taxonomy.
fn classify_rpc_error(method: &str, error: RpcErrorObject) -> LedgerError {
    match error.code {
        RPC_CODE_TOO_MANY_REQUESTS => {
            LedgerError::RateLimited(format!("{}: {}", method, error.message))
        }
        // The signature is filled in by the caller, which holds the transaction.
        RPC_CODE_PREFLIGHT_FAILURE => LedgerError::TransactionFailed {
            signature: Signature::default(),
            reason: error.message,
        },
        code => LedgerError::RemoteFailure(format!(
            "{} failed ({}): {}",
            method, code, error.message
        )),
    }
}

fn parse_envelope<T: DeserializeOwned>(method: &str, envelope: RpcEnvelope) -> LedgerResult<T> {
    if let Some(error) = envelope.error {
        return Err(classify_rpc_error(method, error));
    }
    serde_json::from_value(envelope.result.unwrap_or(Value::Null))
        .map_err(|e| LedgerError::Encoding(format!("{} result: {}", method, e)))
}

/// JSON-RPC over HTTP.
pub struct HttpRpcEndpoint {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
    commitment: ConfirmationStatus,
    next_id: AtomicU64,
}

impl HttpRpcEndpoint {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            timeout,
            commitment: ConfirmationStatus::Confirmed,
            next_id: AtomicU64::new(1),
        }
    }

    /// Commitment used for reads and preflight.
    pub fn with_commitment(mut self, commitment: ConfirmationStatus) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn from_config(config: &RpcConfig) -> LedgerResult<Self> {
        let url: Url = config.url.parse().map_err(|e| {
            LedgerError::RemoteFailure(format!("Invalid RPC URL '{}': {}", config.url, e))
        })?;
        tracing::info!(rpc_url = %url, cluster = %config.cluster, "RPC endpoint configured");
        Ok(Self::new(url, Duration::from_secs(config.timeout_secs))
            .with_commitment(config.commitment))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// History queries do not accept `processed`.
    fn history_commitment(&self) -> &'static str {
        self.commitment.max(ConfirmationStatus::Confirmed).as_str()
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> LedgerResult<T> {
        let start = Instant::now();
        let result = with_timeout(self.timeout, self.round_trip(method, params)).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(LedgerError::RateLimited(_)) => "rate_limited",
            Err(LedgerError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::record_rpc_request(method, outcome, start.elapsed());
        if let Err(e) = &result {
            tracing::debug!(method = method, error = %e, "RPC call failed");
        }
        result
    }

    async fn round_trip<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::RemoteFailure(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::RateLimited(format!(
                "{} returned HTTP 429",
                method
            )));
        }
        if !status.is_success() {
            return Err(LedgerError::RemoteFailure(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| LedgerError::Encoding(format!("{} response: {}", method, e)))?;
        parse_envelope(method, envelope)
    }
}

#[async_trait]
impl RpcEndpoint for HttpRpcEndpoint {
    async fn get_balance(&self, account: &Pubkey) -> LedgerResult<u64> {
        let response: WithContext<u64> = self
            .call(
                "getBalance",
                json!([account.to_string(), { "commitment": self.commitment.as_str() }]),
            )
            .await?;
        Ok(response.value)
    }

    async fn request_airdrop(&self, account: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        self.call("requestAirdrop", json!([account.to_string(), lamports]))
            .await
    }

    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<AccountInfo>> {
        let response: WithContext<Option<UiAccount>> = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;
        response.value.map(decode_account).transpose()
    }

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash> {
        let response: WithContext<UiBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;
        Ok(response.value.blockhash)
    }

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> LedgerResult<u64> {
        self.call("getMinimumBalanceForRentExemption", json!([space]))
            .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let encoded = transaction.to_base64()?;
        let result: LedgerResult<Signature> = self
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    { "encoding": "base64", "preflightCommitment": self.commitment.as_str() }
                ]),
            )
            .await;

        match result {
            Err(LedgerError::TransactionFailed { reason, .. }) => {
                Err(LedgerError::TransactionFailed {
                    signature: transaction.signature(),
                    reason,
                })
            }
            other => other,
        }
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<SignatureStatus>> {
        let response: WithContext<Vec<Option<UiSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| SignatureStatus {
                slot: status.slot,
                confirmation_status: status.confirmation_status,
                err: render_err(status.err),
            }))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SignatureInfo>> {
        let entries: Vec<UiSignatureInfo> = self
            .call(
                "getSignaturesForAddress",
                json!([
                    address.to_string(),
                    { "limit": limit, "commitment": self.history_commitment() }
                ]),
            )
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| SignatureInfo {
                signature: entry.signature,
                slot: entry.slot,
                block_time: entry.block_time,
                confirmation_status: entry.confirmation_status,
                failed: render_err(entry.err).is_some(),
            })
            .collect())
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<TransactionDetail>> {
        let response: Option<UiTransaction> = self
            .call(
                "getTransaction",
                json!([
                    signature.to_string(),
                    {
                        "encoding": "json",
                        "commitment": self.history_commitment(),
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;
        Ok(response.map(|tx| {
            let (err, log_messages) = match tx.meta {
                Some(meta) => (render_err(meta.err), meta.log_messages.unwrap_or_default()),
                None => (None, Vec::new()),
            };
            TransactionDetail {
                slot: tx.slot,
                block_time: tx.block_time,
                log_messages,
                err,
            }
        }))
    }
}

impl std::fmt::Debug for HttpRpcEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRpcEndpoint")
            .field("url", &self.url.as_str())
            .field("timeout_secs", &self.timeout.as_secs())
            .field("commitment", &self.commitment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::Retryable;

    fn envelope(value: Value) -> RpcEnvelope {
        serde_json::from_value(value).unwrap()
    }

    fn local_endpoint() -> HttpRpcEndpoint {
        HttpRpcEndpoint::new("http://127.0.0.1:9".parse().unwrap(), Duration::from_secs(2))
    }

    #[test]
    fn test_rate_limit_code_is_retryable() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": 429, "message": "Too many requests for a specific RPC call" }
        }));
        let err = parse_envelope::<u64>("getBalance", env).unwrap_err();
        assert!(matches!(err, LedgerError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_codes_are_remote_failures() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32602, "message": "Invalid param: WrongSize" }
        }));
        let err = parse_envelope::<u64>("getBalance", env).unwrap_err();
        assert_eq!(
            err,
            LedgerError::RemoteFailure("getBalance failed (-32602): Invalid param: WrongSize".into())
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_preflight_failure_is_terminal() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32002, "message": "Transaction simulation failed" }
        }));
        let err = parse_envelope::<Signature>("sendTransaction", env).unwrap_err();
        assert!(matches!(err, LedgerError::TransactionFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_null_account_is_none() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": { "context": { "slot": 5 }, "value": null }
        }));
        let parsed: WithContext<Option<UiAccount>> =
            parse_envelope("getAccountInfo", env).unwrap();
        assert!(parsed.value.is_none());
    }

    #[test]
    fn test_account_data_decoded() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {
                "context": { "slot": 5 },
                "value": {
                    "lamports": 2039280,
                    "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                    "data": ["AQID", "base64"],
                    "executable": false,
                    "rentEpoch": 0
                }
            }
        }));
        let parsed: WithContext<Option<UiAccount>> =
            parse_envelope("getAccountInfo", env).unwrap();
        let account = decode_account(parsed.value.unwrap()).unwrap();
        assert_eq!(account.lamports, 2_039_280);
        assert_eq!(account.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_null_transaction_result() {
        let env = envelope(json!({ "jsonrpc": "2.0", "id": 1, "result": null }));
        let parsed: Option<UiTransaction> = parse_envelope("getTransaction", env).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_transaction_meta_parsed() {
        let env = envelope(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {
                "slot": 77,
                "blockTime": 1700000000,
                "meta": {
                    "err": null,
                    "logMessages": ["Program log: Instruction: Transfer"]
                },
                "transaction": {}
            }
        }));
        let parsed: Option<UiTransaction> = parse_envelope("getTransaction", env).unwrap();
        let tx = parsed.unwrap();
        assert_eq!(tx.slot, 77);
        assert_eq!(tx.block_time, Some(1_700_000_000));
        let meta = tx.meta.unwrap();
        assert_eq!(render_err(meta.err), None);
        assert_eq!(meta.log_messages.unwrap().len(), 1);
    }

    #[test]
    fn test_signature_history_entry() {
        let sig = Signature::new_from_array([3u8; 64]);
        let entries: Vec<UiSignatureInfo> = serde_json::from_value(json!([{
            "signature": sig.to_string(),
            "slot": 10,
            "err": { "InstructionError": [0, "Custom"] },
            "memo": null,
            "blockTime": null,
            "confirmationStatus": "finalized"
        }]))
        .unwrap();
        assert_eq!(entries[0].signature, sig);
        assert_eq!(
            entries[0].confirmation_status,
            Some(ConfirmationStatus::Finalized)
        );
        assert!(render_err(entries[0].err.clone()).is_some());
    }

    #[test]
    fn test_history_commitment_floor() {
        let endpoint = local_endpoint().with_commitment(ConfirmationStatus::Processed);
        assert_eq!(endpoint.history_commitment(), "confirmed");
        let endpoint = endpoint.with_commitment(ConfirmationStatus::Finalized);
        assert_eq!(endpoint.history_commitment(), "finalized");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_not_retryable() {
        let err = local_endpoint().get_latest_blockhash().await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
