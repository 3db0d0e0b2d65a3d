use async_trait::async_trait;
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcTransactionConfig,
    rpc_request::RpcError,
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction, UiMessage, UiTransactionEncoding,
};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, error};

use crate::error::SentinelError;

/// Post-transaction token balance, reduced to what mint extraction needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PostTokenBalance {
    pub mint: String,
    pub ui_amount: Option<f64>,
}

/// A confirmed transaction in the shape the classifier consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfirmedTransaction {
    pub signature: String,
    pub account_keys: Vec<String>,
    pub post_token_balances: Vec<PostTokenBalance>,
}

/// One entry of getTokenLargestAccounts (raw base units).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountBalance {
    pub address: String,
    pub amount: u64,
}

/// The read-only chain calls the crate depends on. `Ok(None)` means the
/// node answered but had nothing (yet) for the key.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>, SentinelError>;
    async fn get_token_supply(&self, mint: &str) -> Result<Option<u64>, SentinelError>;
    async fn get_token_largest_accounts(&self, mint: &str) -> Result<Option<Vec<TokenAccountBalance>>, SentinelError>;
}

#[derive(Clone)]
pub struct SolanaClient {
    rpc_client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl SolanaClient {
    pub fn new(rpc_url: &str) -> Self {
        // All reads happen at confirmed commitment.
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc_client: Arc::new(RpcClient::new_with_commitment(rpc_url.to_string(), commitment)),
            commitment,
        }
    }
}

#[async_trait]
impl ChainRpc for SolanaClient {
    async fn get_transaction(&self, signature: &str) -> Result<Option<ConfirmedTransaction>, SentinelError> {
        let sig = Signature::from_str(signature)
            .map_err(|e| SentinelError::MalformedData(format!("bad signature {}: {}", signature, e)))?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        match self.rpc_client.get_transaction_with_config(&sig, config).await {
            Ok(tx) => Ok(convert_transaction(signature, tx)),
            // The node answers `null` for signatures it has not indexed yet.
            Err(e) if is_not_found(&e) => {
                debug!("Transaction {} not available yet", signature);
                Ok(None)
            }
            Err(e) => {
                error!("getTransaction failed for {}: {:?}", signature, e);
                Err(e.into())
            }
        }
    }

    async fn get_token_supply(&self, mint: &str) -> Result<Option<u64>, SentinelError> {
        let mint = parse_pubkey(mint)?;
        let supply = self
            .rpc_client
            .get_token_supply_with_commitment(&mint, self.commitment)
            .await?
            .value;
        Ok(Some(parse_amount(&supply)?))
    }

    async fn get_token_largest_accounts(&self, mint: &str) -> Result<Option<Vec<TokenAccountBalance>>, SentinelError> {
        let mint = parse_pubkey(mint)?;
        let accounts = self
            .rpc_client
            .get_token_largest_accounts_with_commitment(&mint, self.commitment)
            .await?
            .value;

        let balances = accounts
            .into_iter()
            .map(|account| {
                Ok(TokenAccountBalance {
                    amount: parse_amount(&account.amount)?,
                    address: account.address,
                })
            })
            .collect::<Result<Vec<_>, SentinelError>>()?;
        Ok(if balances.is_empty() { None } else { Some(balances) })
    }
}

fn parse_pubkey(raw: &str) -> Result<Pubkey, SentinelError> {
    Pubkey::from_str(raw).map_err(|e| SentinelError::MalformedData(format!("bad pubkey {}: {}", raw, e)))
}

fn parse_amount(amount: &UiTokenAmount) -> Result<u64, SentinelError> {
    amount
        .amount
        .parse::<u64>()
        .map_err(|e| SentinelError::MalformedData(format!("bad token amount {}: {}", amount.amount, e)))
}

fn is_not_found(error: &ClientError) -> bool {
    match error.kind() {
        ClientErrorKind::SerdeJson(_) => true,
        ClientErrorKind::RpcError(RpcError::ForUser(msg)) => msg.contains("null"),
        _ => false,
    }
}

/// Flattens the jsonParsed encoding. Transactions without meta are
/// reported as not found.
pub fn convert_transaction(
    signature: &str,
    tx: EncodedConfirmedTransactionWithStatusMeta,
) -> Option<ConfirmedTransaction> {
    let meta = tx.transaction.meta?;

    let account_keys = match tx.transaction.transaction {
        EncodedTransaction::Json(ui_tx) => match ui_tx.message {
            UiMessage::Parsed(message) => message.account_keys.into_iter().map(|a| a.pubkey).collect(),
            UiMessage::Raw(message) => message.account_keys,
        },
        _ => Vec::new(),
    };

    let post_token_balances = match meta.post_token_balances {
        OptionSerializer::Some(balances) => balances
            .into_iter()
            .map(|b| PostTokenBalance {
                mint: b.mint,
                ui_amount: b.ui_token_amount.ui_amount,
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(ConfirmedTransaction {
        signature: signature.to_string(),
        account_keys,
        post_token_balances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_parsed_transaction() {
        let raw = serde_json::json!({
            "slot": 250000000u64,
            "blockTime": 1700000000i64,
            "version": 0,
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        {"pubkey": "Payer111", "writable": true, "signer": true, "source": "transaction"},
                        {"pubkey": "Config111", "writable": false, "signer": false, "source": "transaction"}
                    ],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": {
                "err": null,
                "status": {"Ok": null},
                "fee": 5000,
                "preBalances": [],
                "postBalances": [],
                "postTokenBalances": [
                    {"accountIndex": 3, "mint": "So11111111111111111111111111111111111111112",
                     "uiTokenAmount": {"uiAmount": 1.0, "decimals": 9, "amount": "1000000000", "uiAmountString": "1"}},
                    {"accountIndex": 4, "mint": "NewMint111",
                     "uiTokenAmount": {"uiAmount": null, "decimals": 6, "amount": "0", "uiAmountString": "0"}}
                ]
            }
        });
        let tx: EncodedConfirmedTransactionWithStatusMeta = serde_json::from_value(raw).unwrap();

        let converted = convert_transaction("sig1", tx).unwrap();
        assert_eq!(converted.account_keys, vec!["Payer111", "Config111"]);
        assert_eq!(converted.post_token_balances.len(), 2);
        assert_eq!(converted.post_token_balances[1].mint, "NewMint111");
        assert_eq!(converted.post_token_balances[1].ui_amount, None);
    }

    #[test]
    fn test_parse_amount() {
        let amount = UiTokenAmount {
            ui_amount: Some(1.5),
            decimals: 6,
            amount: "1500000".to_string(),
            ui_amount_string: "1.5".to_string(),
        };
        assert_eq!(parse_amount(&amount).unwrap(), 1_500_000);
    }
}
