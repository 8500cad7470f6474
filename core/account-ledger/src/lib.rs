//! Dual-ledger accounting for the lending protocol.
//!
//! The ledger owns two balance types per principal (spendable collateral and
//! fiat) plus a per-loan escrow vault. It never reaches into the loan
//! registry; the orchestration gateway sequences the two.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;


/// A participant in the protocol: lender, borrower, operator, or a component
/// identity.
pub type Principal = Uuid;

/// Loan identifier, allocated by the loan registry at origination.
pub type LoanId = u64;

// ─────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────

/// The two balance types the ledger manages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Collateral,
    Fiat,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Collateral => write!(f, "collateral"),
            Asset::Fiat => write!(f, "fiat"),
        }
    }
}

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum LedgerError {
    #[error("insufficient {asset} balance: have {available}, need {required}")]
    InsufficientBalance {
        asset: Asset,
        available: u64,
        required: u64,
    },

    #[error("insufficient vault balance for loan {loan_id}: have {available}, need {required}")]
    InsufficientVaultBalance {
        loan_id: LoanId,
        available: u64,
        required: u64,
    },

    #[error("caller is not the trusted orchestrator")]
    UntrustedCaller,
}

// ─────────────────────────────────────────────────
// Balances
// ─────────────────────────────────────────────────

/// Spendable balances of a single principal. Both fields are unsigned; a
/// debit below balance fails before anything is mutated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub collateral: u64,
    pub fiat: u64,
}

// ─────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────

/// Owned ledger state. One instance forms a single consistency domain with
/// the loan registry that shares its serialization point; tests construct
/// isolated instances.
pub struct AccountLedger {
    trusted_caller: Principal,
    accounts: HashMap<Principal, Balances>,
    vault: HashMap<LoanId, u64>,
}

impl AccountLedger {
    /// Build a ledger that accepts mutations only from `trusted_caller`.
    pub fn new(trusted_caller: Principal) -> Self {
        Self {
            trusted_caller,
            accounts: HashMap::new(),
            vault: HashMap::new(),
        }
    }

    fn require_trusted(&self, caller: Principal) -> Result<(), LedgerError> {
        if caller != self.trusted_caller {
            return Err(LedgerError::UntrustedCaller);
        }
        Ok(())
    }

    fn account_mut(&mut self, principal: Principal) -> &mut Balances {
        self.accounts.entry(principal).or_default()
    }

    // ─── Credits ────────────────────────────────────

    /// Unconditional collateral credit.
    pub fn store_collateral(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        self.account_mut(principal).collateral += amount;
        tracing::debug!(%principal, amount, "collateral stored");
        Ok(())
    }

    /// Unconditional fiat credit.
    pub fn store_fiat(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        self.account_mut(principal).fiat += amount;
        tracing::debug!(%principal, amount, "fiat stored");
        Ok(())
    }

    // ─── Debits ─────────────────────────────────────

    pub fn withdraw_collateral(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        let available = self.collateral_balance(principal);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Collateral,
                available,
                required: amount,
            });
        }
        self.account_mut(principal).collateral -= amount;
        tracing::debug!(%principal, amount, "collateral withdrawn");
        Ok(())
    }

    pub fn withdraw_fiat(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        let available = self.fiat_balance(principal);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Fiat,
                available,
                required: amount,
            });
        }
        self.account_mut(principal).fiat -= amount;
        tracing::debug!(%principal, amount, "fiat withdrawn");
        Ok(())
    }

    /// Atomic fiat transfer: either both the debit and the credit happen, or
    /// neither does.
    pub fn transfer_fiat(
        &mut self,
        caller: Principal,
        from: Principal,
        to: Principal,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        let available = self.fiat_balance(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Fiat,
                available,
                required: amount,
            });
        }
        self.account_mut(from).fiat -= amount;
        self.account_mut(to).fiat += amount;
        tracing::debug!(%from, %to, amount, "fiat transferred");
        Ok(())
    }

    /// Balance-sufficiency check for an off-ledger bank settlement. Does not
    /// mutate anything; the orchestrator performs the matching
    /// [`withdraw_fiat`](Self::withdraw_fiat) once the instruction is issued.
    pub fn validate_bank_transfer(
        &self,
        requester: Principal,
        bank_account: &str,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let available = self.fiat_balance(requester);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Fiat,
                available,
                required: amount,
            });
        }
        tracing::debug!(%requester, bank_account, amount, "bank transfer validated");
        Ok(())
    }

    // ─── Vault ──────────────────────────────────────

    /// Move spendable collateral into the escrow vault of `loan_id`.
    pub fn store_collateral_to_vault(
        &mut self,
        caller: Principal,
        principal: Principal,
        loan_id: LoanId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        let available = self.collateral_balance(principal);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Collateral,
                available,
                required: amount,
            });
        }
        self.account_mut(principal).collateral -= amount;
        *self.vault.entry(loan_id).or_insert(0) += amount;
        tracing::debug!(%principal, loan_id, amount, "collateral escrowed");
        Ok(())
    }

    /// Release escrowed collateral back into a principal's spendable balance.
    /// On completion that principal is the borrower; on default it is the
    /// lender.
    pub fn release_collateral_from_vault(
        &mut self,
        caller: Principal,
        principal: Principal,
        loan_id: LoanId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        let available = self.vault_balance(loan_id);
        if available < amount {
            return Err(LedgerError::InsufficientVaultBalance {
                loan_id,
                available,
                required: amount,
            });
        }
        *self.vault.entry(loan_id).or_insert(0) -= amount;
        self.account_mut(principal).collateral += amount;
        tracing::debug!(%principal, loan_id, amount, "collateral released from vault");
        Ok(())
    }

    /// Consume vaulted collateral without crediting any account. Used by the
    /// liquidation payout split, where the vault is paid out as fiat.
    pub fn deduct_from_vault(
        &mut self,
        caller: Principal,
        loan_id: LoanId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_trusted(caller)?;
        let available = self.vault_balance(loan_id);
        if available < amount {
            return Err(LedgerError::InsufficientVaultBalance {
                loan_id,
                available,
                required: amount,
            });
        }
        *self.vault.entry(loan_id).or_insert(0) -= amount;
        tracing::debug!(loan_id, amount, "collateral deducted from vault");
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────

    pub fn collateral_balance(&self, principal: Principal) -> u64 {
        self.accounts.get(&principal).map_or(0, |a| a.collateral)
    }

    pub fn fiat_balance(&self, principal: Principal) -> u64 {
        self.accounts.get(&principal).map_or(0, |a| a.fiat)
    }

    /// Both spendable balances of a principal.
    pub fn balances(&self, principal: Principal) -> Balances {
        self.accounts.get(&principal).copied().unwrap_or_default()
    }

    pub fn vault_balance(&self, loan_id: LoanId) -> u64 {
        self.vault.get(&loan_id).copied().unwrap_or(0)
    }
}
