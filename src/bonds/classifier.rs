use crate::api::jupiter::SOL_MINT;
use crate::solana::ConfirmedTransaction;

/// Substring heuristics over the raw log lines (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRule {
    /// Bonding-curve withdraw/migrate. A later "already migrated" run of
    /// the same instruction is not a new migration.
    MigrateOnce,
    /// Launch-pool migration into a CP swap pool, which also burns LP.
    MigrateToSwapWithBurn,
}

/// Deeper check on the confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyRule {
    Always,
    /// Any account key equals one of the listed config accounts.
    MentionsAny(Vec<String>),
}

impl LogRule {
    pub fn matches(&self, logs: &[String]) -> bool {
        let lowered: Vec<String> = logs.iter().map(|l| l.to_lowercase()).collect();
        let any = |needle: &str| lowered.iter().any(|l| l.contains(needle));

        match self {
            LogRule::MigrateOnce => any("migrate") && !any("already migrated"),
            LogRule::MigrateToSwapWithBurn => any("migratetocpswap") && any("burn"),
        }
    }
}

impl VerifyRule {
    pub fn matches(&self, tx: &ConfirmedTransaction) -> bool {
        match self {
            VerifyRule::Always => true,
            VerifyRule::MentionsAny(configs) => tx
                .account_keys
                .iter()
                .any(|key| configs.iter().any(|c| c == key)),
        }
    }
}

/// Per-platform migration detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionClassifier {
    pub log_rule: LogRule,
    pub verify_rule: VerifyRule,
}

impl TransactionClassifier {
    pub fn new(log_rule: LogRule, verify_rule: VerifyRule) -> Self {
        Self { log_rule, verify_rule }
    }

    pub fn is_migration_log(&self, logs: &[String]) -> bool {
        self.log_rule.matches(logs)
    }

    pub fn is_migration_transaction(&self, tx: &ConfirmedTransaction) -> bool {
        self.verify_rule.matches(tx)
    }

    /// The migrated token is the non-SOL post balance left at zero (or
    /// reported without a ui amount).
    pub fn extract_mint(&self, tx: &ConfirmedTransaction) -> Option<String> {
        tx.post_token_balances
            .iter()
            .find(|b| b.mint != SOL_MINT && b.ui_amount.map_or(true, |amount| amount == 0.0))
            .map(|b| b.mint.clone())
    }
}
