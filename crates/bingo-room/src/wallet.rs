//! The wallet seam: stake debits and pot credits.
//!
//! Balances belong to an external service. The room engine only needs a
//! balance read and idempotent debit/credit calls keyed by a [`TxnId`],
//! so a retry after a timeout can never charge or pay twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bingo_protocol::{Amount, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TxnId
// ---------------------------------------------------------------------------

/// A stable idempotency key for one wallet operation.
///
/// `game` is the room's per-game key, so ids stay unique even if room ids
/// are reused after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(String);

impl TxnId {
    /// `join:<game>:<user>:<epoch>`
    pub fn join(game: Uuid, user: UserId, epoch: u32) -> Self {
        Self(format!("join:{game}:{}:{epoch}", user.0))
    }

    /// `refund:<game>:<user>:<epoch>`, paired with the join it reverses.
    pub fn refund(game: Uuid, user: UserId, epoch: u32) -> Self {
        Self(format!("refund:{game}:{}:{epoch}", user.0))
    }

    /// `payout:<game>`. A game pays out at most once.
    pub fn payout(game: Uuid) -> Self {
        Self(format!("payout:{game}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Errors and trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("wallet has no account for user {0}")]
    UnknownUser(UserId),

    /// The wallet could not be reached or refused to answer. The outcome
    /// of the call is unknown; retrying with the same `TxnId` is safe.
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// Balance operations the room engine consumes.
///
/// Implementations must apply each `TxnId` at most once: a repeated call
/// with an already-applied id returns `Ok(())` without moving money.
#[async_trait]
pub trait Wallet: Send + Sync + 'static {
    async fn balance(&self, user: UserId) -> Result<Amount, WalletError>;

    async fn debit(&self, user: UserId, amount: Amount, txn: &TxnId) -> Result<(), WalletError>;

    async fn credit(&self, user: UserId, amount: Amount, txn: &TxnId)
    -> Result<(), WalletError>;
}

// ---------------------------------------------------------------------------
// MemoryWallet
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<UserId, Amount>,
    applied: HashMap<TxnId, (UserId, i128)>,
}

/// In-process [`Wallet`] for tests and the demo server.
///
/// Accounts are created by [`deposit`](Self::deposit). Debits and credits
/// are recorded in an idempotency ledger.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    ledger: Mutex<Ledger>,
    offline: AtomicBool,
    /// With `open_accounts`, unknown users start at this balance instead
    /// of being rejected.
    open_accounts: Option<Amount>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wallet that opens an account with `balance` on first sight of a
    /// user. Used by the demo server, where identity is external.
    pub fn with_open_accounts(balance: Amount) -> Self {
        Self {
            open_accounts: Some(balance),
            ..Self::default()
        }
    }

    /// Adds funds outside of any game.
    pub async fn deposit(&self, user: UserId, amount: Amount) {
        let mut ledger = self.ledger.lock().await;
        *ledger.balances.entry(user).or_insert(0) += amount;
    }

    /// Makes every call fail with [`WalletError::Unavailable`] until
    /// switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Whether `txn` has been applied.
    pub async fn is_applied(&self, txn: &TxnId) -> bool {
        self.ledger.lock().await.applied.contains_key(txn)
    }

    /// Number of applied transactions.
    pub async fn applied_count(&self) -> usize {
        self.ledger.lock().await.applied.len()
    }

    fn check_online(&self) -> Result<(), WalletError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(WalletError::Unavailable("wallet offline".into()))
        } else {
            Ok(())
        }
    }

    fn account<'a>(&self, ledger: &'a mut Ledger, user: UserId) -> Result<&'a mut Amount, WalletError> {
        match self.open_accounts {
            Some(opening) => Ok(ledger.balances.entry(user).or_insert(opening)),
            None => ledger
                .balances
                .get_mut(&user)
                .ok_or(WalletError::UnknownUser(user)),
        }
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    async fn balance(&self, user: UserId) -> Result<Amount, WalletError> {
        self.check_online()?;
        let mut ledger = self.ledger.lock().await;
        self.account(&mut ledger, user).map(|balance| *balance)
    }

    async fn debit(&self, user: UserId, amount: Amount, txn: &TxnId) -> Result<(), WalletError> {
        self.check_online()?;
        let mut ledger = self.ledger.lock().await;
        if ledger.applied.contains_key(txn) {
            tracing::debug!(%txn, user_id = %user, "debit already applied");
            return Ok(());
        }
        let balance = self.account(&mut ledger, user)?;
        if *balance < amount {
            return Err(WalletError::InsufficientFunds {
                needed: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        ledger.applied.insert(txn.clone(), (user, -(amount as i128)));
        Ok(())
    }

    async fn credit(&self, user: UserId, amount: Amount, txn: &TxnId) -> Result<(), WalletError> {
        self.check_online()?;
        let mut ledger = self.ledger.lock().await;
        if ledger.applied.contains_key(txn) {
            tracing::debug!(%txn, user_id = %user, "credit already applied");
            return Ok(());
        }
        let balance = self.account(&mut ledger, user)?;
        *balance += amount;
        ledger.applied.insert(txn.clone(), (user, amount as i128));
        Ok(())
    }
}
