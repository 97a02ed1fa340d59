// Solotto - Fund custody
use solana_program::{msg, pubkey::Pubkey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Recipient rejected the transfer")]
    RecipientRejected,

    #[error("Balance overflow")]
    Overflow,
}

/// Custody of the pooled entrance fees.
///
/// Both calls are atomic: they either move the full amount or leave every
/// balance untouched.
pub trait Treasury {
    /// Collect `amount` lamports from `from` into the vault
    fn deposit(&mut self, from: &Pubkey, amount: u64) -> Result<(), TransferError>;

    /// Send `amount` lamports from the vault to `to`
    fn transfer(&mut self, to: &Pubkey, amount: u64) -> Result<(), TransferError>;

    /// Lamports currently held by the vault
    fn balance(&self) -> u64;
}

#[derive(Debug, Default)]
struct Accounts {
    vault: u64,
    wallets: HashMap<Pubkey, u64>,
    rejecting: HashSet<Pubkey>,
}

/// In-process lamport ledger holding the vault and player wallets.
///
/// Clones share the same balances, so a test can keep one handle while the
/// lottery owns another.
#[derive(Clone, Debug, Default)]
pub struct LamportVault {
    accounts: Arc<Mutex<Accounts>>,
}

impl LamportVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit a wallet out of thin air
    pub fn airdrop(&self, to: &Pubkey, lamports: u64) {
        let mut accounts = self.accounts();
        let balance = accounts.wallets.entry(*to).or_default();
        *balance = balance.saturating_add(lamports);
    }

    pub fn lamports(&self, of: &Pubkey) -> u64 {
        self.accounts().wallets.get(of).copied().unwrap_or_default()
    }

    /// Make every future transfer to `recipient` fail
    pub fn reject_transfers_to(&self, recipient: &Pubkey) {
        self.accounts().rejecting.insert(*recipient);
    }

    pub fn accept_transfers_to(&self, recipient: &Pubkey) {
        self.accounts().rejecting.remove(recipient);
    }
}

impl Treasury for LamportVault {
    fn deposit(&mut self, from: &Pubkey, amount: u64) -> Result<(), TransferError> {
        let mut accounts = self.accounts();
        let vault = accounts
            .vault
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        let wallet = accounts.wallets.entry(*from).or_default();
        if *wallet < amount {
            msg!("Insufficient funds: needed {} lamports, had {} lamports", amount, wallet);
            return Err(TransferError::InsufficientFunds);
        }
        *wallet -= amount;
        accounts.vault = vault;
        Ok(())
    }

    fn transfer(&mut self, to: &Pubkey, amount: u64) -> Result<(), TransferError> {
        let mut accounts = self.accounts();
        if accounts.rejecting.contains(to) {
            return Err(TransferError::RecipientRejected);
        }
        if accounts.vault < amount {
            return Err(TransferError::InsufficientFunds);
        }
        let current = accounts.wallets.get(to).copied().unwrap_or_default();
        let credited = current.checked_add(amount).ok_or(TransferError::Overflow)?;
        accounts.vault -= amount;
        accounts.wallets.insert(*to, credited);
        Ok(())
    }

    fn balance(&self) -> u64 {
        self.accounts().vault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_requires_funds() {
        let mut vault = LamportVault::new();
        let player = Pubkey::new_unique();
        vault.airdrop(&player, 50);

        assert_eq!(vault.deposit(&player, 100), Err(TransferError::InsufficientFunds));
        assert_eq!(vault.lamports(&player), 50);
        assert_eq!(vault.balance(), 0);

        vault.deposit(&player, 50).unwrap();
        assert_eq!(vault.lamports(&player), 0);
        assert_eq!(vault.balance(), 50);
    }

    #[test]
    fn rejected_transfer_moves_nothing() {
        let mut vault = LamportVault::new();
        let player = Pubkey::new_unique();
        vault.airdrop(&player, 100);
        vault.deposit(&player, 100).unwrap();

        vault.reject_transfers_to(&player);
        assert_eq!(vault.transfer(&player, 100), Err(TransferError::RecipientRejected));
        assert_eq!(vault.balance(), 100);

        vault.accept_transfers_to(&player);
        vault.transfer(&player, 100).unwrap();
        assert_eq!(vault.balance(), 0);
        assert_eq!(vault.lamports(&player), 100);
    }
}
