use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::retry::RetryPolicy;
use crate::bonds::platform::AllocationRule;
use crate::models::{Holder, HoldersInfo};
use crate::solana::ChainRpc;

/// Integer percentage of `total`, rounded half away from zero.
pub fn allocation_percent(amount: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let (amount, total) = (amount as u128, total as u128);
    let percent = (amount * 200 + total) / (total * 2);
    percent.min(100) as u8
}

/// Associated token account of `owner` for `mint` under the classic token
/// program. `None` when either key is not a valid pubkey.
pub fn associated_token_account(owner: &str, mint: &str) -> Option<String> {
    let owner = Pubkey::from_str(owner).ok()?;
    let mint = Pubkey::from_str(mint).ok()?;
    Some(get_associated_token_address(&owner, &mint).to_string())
}

pub struct HolderAllocationCalculator {
    rpc: Arc<dyn ChainRpc>,
    retry: RetryPolicy,
}

impl HolderAllocationCalculator {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            retry: RetryPolicy::token_accounts(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Top-holder distribution for `mint`. `None` once the RPC budget is
    /// spent; callers render that as "no info".
    pub async fn compute_allocations(
        &self,
        mint: &str,
        dev_owner: Option<&str>,
        rule: &AllocationRule,
    ) -> Option<HoldersInfo> {
        let supply = self
            .retry
            .fetch_rpc("getTokenSupply", || self.rpc.get_token_supply(mint))
            .await?;
        if supply == 0 {
            warn!("Token {} reports zero supply", mint);
            return None;
        }
        let accounts = self
            .retry
            .fetch_rpc("getTokenLargestAccounts", || self.rpc.get_token_largest_accounts(mint))
            .await?;

        let mut holders: Vec<Holder> = accounts
            .into_iter()
            .map(|account| Holder {
                allocation: allocation_percent(account.amount, supply),
                address: account.address,
            })
            .collect();
        // Stable, so equal allocations keep the node's order.
        holders.sort_by(|a, b| b.allocation.cmp(&a.allocation));

        let dev_allocation = dev_owner
            .and_then(|owner| associated_token_account(owner, mint))
            .and_then(|ata| holders.iter().find(|h| h.address == ata))
            .map(|h| h.allocation)
            .unwrap_or(0);

        let excluded: HashSet<String> = rule
            .exclude_owners
            .iter()
            .flat_map(|owner| {
                let mut keys = vec![owner.clone()];
                keys.extend(associated_token_account(owner, mint));
                keys
            })
            .collect();
        let mut top_holders: Vec<Holder> = holders
            .into_iter()
            .filter(|h| !excluded.contains(&h.address))
            .collect();
        if rule.drop_largest && !top_holders.is_empty() {
            top_holders.remove(0);
        }

        let top_holders_allocation = top_holders.iter().map(|h| h.allocation as u32).sum();
        debug!(
            "Allocation for {}: dev {}%, top {} holders {}%",
            mint,
            dev_allocation,
            top_holders.len(),
            top_holders_allocation
        );

        Some(HoldersInfo {
            top_holders,
            dev_allocation,
            top_holders_allocation,
        })
    }
}
