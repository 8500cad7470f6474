//! Orchestration gateway: the single externally-reachable entry point of the
//! lending protocol.
//!
//! The gateway authenticates every caller against the principal named in the
//! call (batch jobs are restricted to the operator identity), then executes a
//! fixed sequence of sub-operations against the loan registry and the account
//! ledger. Every precondition of the whole sequence is verified before the
//! first mutation, so a failed operation leaves no partial effect and emits
//! no event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use account_ledger::{AccountLedger, Asset, Balances, LedgerError, LoanId, Principal};
pub use loan_registry::{Loan, LoanRegistry, LoanStatus, LoanTerms, RegistryError};

pub mod directory;
pub mod events;


pub use directory::{Directory, DirectoryError};
pub use events::{EventLog, EventRecord, LoanEvent};

/// Directory name under which the gateway's identity is registered; the
/// registry and ledger trust exactly the principal resolved here.
pub const GATEWAY_NAME: &str = "orchestration-gateway";

// ─────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum GatewayError {
    #[error("caller is not authorized to act as the named principal")]
    Unauthorized,

    #[error("payment of {supplied} does not match the contractual repayment amount {expected}")]
    AmountMismatch { expected: u64, supplied: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// ─────────────────────────────────────────────────
// Batch job inputs
// ─────────────────────────────────────────────────

/// One liquidation instruction. Valuation and payout split are supplied by
/// the operator; the core never prices collateral.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LiquidationRequest {
    pub loan_id: LoanId,
    /// Operator valuation of the vaulted collateral, in fiat units.
    pub collateral_value_fiat: u64,
    /// Residual owed to the borrower when the valuation covers the debt.
    pub collateral_payable: u64,
}

// Internal plan entry produced by the liquidation validation phase.
enum LiquidationOutcome {
    Covered { gross: u64, payable: u64 },
    Shortfall { vaulted: u64 },
}

struct LiquidationPlan {
    loan_id: LoanId,
    lender: Principal,
    borrower: Principal,
    outcome: LiquidationOutcome,
}

// ─────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────

/// Owns the loan registry, the account ledger, and the audit event log. All
/// compound operations take `&mut self`, which is the single serialization
/// point the whole consistency domain shares.
pub struct Gateway {
    identity: Principal,
    operator: Principal,
    registry: LoanRegistry,
    ledger: AccountLedger,
    events: EventLog,
}

impl Gateway {
    /// Build a gateway with the given identity; the registry and ledger it
    /// owns trust exactly that identity.
    pub fn new(identity: Principal, operator: Principal) -> Self {
        Self {
            identity,
            operator,
            registry: LoanRegistry::new(identity),
            ledger: AccountLedger::new(identity),
            events: EventLog::new(),
        }
    }

    /// Wire a gateway through the address directory. Fails loudly when no
    /// principal is registered under [`GATEWAY_NAME`].
    pub fn bootstrap(
        directory: &Directory,
        caller: Principal,
        operator: Principal,
    ) -> Result<Self, GatewayError> {
        let identity = directory.resolve(caller, GATEWAY_NAME)?;
        Ok(Self::new(identity, operator))
    }

    pub fn identity(&self) -> Principal {
        self.identity
    }

    pub fn operator(&self) -> Principal {
        self.operator
    }

    /// Read-only view of the ledger.
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &LoanRegistry {
        &self.registry
    }

    /// Recorded audit events, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    /// Drain the audit log. Operator only.
    pub fn drain_events(&mut self, caller: Principal) -> Result<Vec<EventRecord>, GatewayError> {
        self.require_operator(caller)?;
        Ok(self.events.drain())
    }

    // ─── Authentication ─────────────────────────────

    // Self-authentication: the caller must be the principal the call names.
    fn authenticate(&self, caller: Principal, principal: Principal) -> Result<(), GatewayError> {
        if caller != principal {
            return Err(GatewayError::Unauthorized);
        }
        Ok(())
    }

    fn require_operator(&self, caller: Principal) -> Result<(), GatewayError> {
        if caller != self.operator {
            return Err(GatewayError::Unauthorized);
        }
        Ok(())
    }

    // ─── Loan lifecycle ─────────────────────────────

    /// Lender opens a loan offer.
    pub fn initiate_loan(
        &mut self,
        caller: Principal,
        lender: Principal,
        terms: LoanTerms,
    ) -> Result<LoanId, GatewayError> {
        self.authenticate(caller, lender)?;
        let loan_id = self.registry.initiate_loan(self.identity, lender, terms)?;
        self.events.record(LoanEvent::LoanInitiated { loan_id, lender });
        Ok(loan_id)
    }

    /// Borrower takes an open offer.
    pub fn request_loan(
        &mut self,
        caller: Principal,
        borrower: Principal,
        loan_id: LoanId,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, borrower)?;
        self.registry.request_loan(self.identity, borrower, loan_id)?;
        self.events.record(LoanEvent::LoanRequested { loan_id, borrower });
        Ok(())
    }

    /// Lender withdraws an offer that has not been disbursed.
    pub fn cancel_loan(
        &mut self,
        caller: Principal,
        lender: Principal,
        loan_id: LoanId,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, lender)?;
        self.registry.cancel_loan(self.identity, lender, loan_id)?;
        self.events.record(LoanEvent::LoanCancelled { loan_id, lender });
        Ok(())
    }

    /// Move the lender's fiat to the borrower, escrow the borrower's
    /// collateral, and record the `Repaying` transition, in that order, so
    /// a failing value movement leaves the loan in its prior state.
    pub fn disburse_loan(
        &mut self,
        caller: Principal,
        lender: Principal,
        loan_id: LoanId,
        next_deadline: i64,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, lender)?;

        let loan = self.registry.loan(loan_id)?.clone();
        if loan.lender != lender {
            return Err(GatewayError::Unauthorized);
        }
        if loan.status != LoanStatus::Requested {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            }
            .into());
        }
        let borrower = match loan.borrower {
            Some(borrower) => borrower,
            None => {
                return Err(RegistryError::InvalidStatus {
                    loan_id,
                    status: loan.status,
                }
                .into())
            }
        };

        let lender_fiat = self.ledger.fiat_balance(lender);
        if lender_fiat < loan.loan_amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Fiat,
                available: lender_fiat,
                required: loan.loan_amount,
            }
            .into());
        }
        let borrower_collateral = self.ledger.collateral_balance(borrower);
        if borrower_collateral < loan.collateral_amount {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Collateral,
                available: borrower_collateral,
                required: loan.collateral_amount,
            }
            .into());
        }

        // All preconditions hold; none of the following steps can fail.
        self.ledger
            .transfer_fiat(self.identity, lender, borrower, loan.loan_amount)?;
        self.ledger.store_collateral_to_vault(
            self.identity,
            borrower,
            loan_id,
            loan.collateral_amount,
        )?;
        self.registry
            .record_disbursement(self.identity, lender, loan_id, next_deadline)?;

        self.events.record(LoanEvent::FiatTransferred {
            from: lender,
            to: borrower,
            amount: loan.loan_amount,
        });
        self.events.record(LoanEvent::CollateralEscrowed {
            loan_id,
            borrower,
            amount: loan.collateral_amount,
        });
        self.events.record(LoanEvent::LoanDisbursed {
            loan_id,
            lender,
            borrower,
            amount: loan.loan_amount,
        });
        Ok(())
    }

    /// One scheduled repayment. Returns `true` when this payment completed
    /// the loan, in which case the entire remaining vault went back to the
    /// borrower in the same operation.
    pub fn make_repayment(
        &mut self,
        caller: Principal,
        borrower: Principal,
        loan_id: LoanId,
        pay_value: u64,
        next_deadline: i64,
    ) -> Result<bool, GatewayError> {
        self.authenticate(caller, borrower)?;

        let loan = self.registry.loan(loan_id)?.clone();
        if loan.borrower != Some(borrower) {
            return Err(GatewayError::Unauthorized);
        }
        if loan.status != LoanStatus::Repaying {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            }
            .into());
        }
        if pay_value != loan.monthly_repayment_amount {
            return Err(GatewayError::AmountMismatch {
                expected: loan.monthly_repayment_amount,
                supplied: pay_value,
            });
        }
        let borrower_fiat = self.ledger.fiat_balance(borrower);
        if borrower_fiat < pay_value {
            return Err(LedgerError::InsufficientBalance {
                asset: Asset::Fiat,
                available: borrower_fiat,
                required: pay_value,
            }
            .into());
        }

        self.ledger
            .transfer_fiat(self.identity, borrower, loan.lender, pay_value)?;
        let fully_repaid = self
            .registry
            .advance_repayment(self.identity, loan_id, next_deadline)?;

        self.events.record(LoanEvent::FiatTransferred {
            from: borrower,
            to: loan.lender,
            amount: pay_value,
        });

        if fully_repaid {
            let vaulted = self.ledger.vault_balance(loan_id);
            self.ledger
                .release_collateral_from_vault(self.identity, borrower, loan_id, vaulted)?;
            self.events.record(LoanEvent::CollateralReleased {
                loan_id,
                principal: borrower,
                amount: vaulted,
            });
            self.events
                .record(LoanEvent::LoanFullyRepaid { loan_id, borrower });
        } else {
            self.events.record(LoanEvent::LoanRepaid {
                loan_id,
                borrower,
                amount: pay_value,
            });
        }
        Ok(fully_repaid)
    }

    // ─── Scheduled batch jobs ───────────────────────

    /// Default every loan with an unpaid record due at or before `deadline`:
    /// the entire vault goes to the lender and the loan is force-terminated.
    /// Operator only. Returns the defaulted loan ids.
    pub fn check_borrower_default(
        &mut self,
        caller: Principal,
        deadline: i64,
    ) -> Result<Vec<LoanId>, GatewayError> {
        self.require_operator(caller)?;

        let overdue = self.registry.overdue_loan_ids(deadline);

        // Validate the whole batch before mutating any of it.
        let mut plan = Vec::with_capacity(overdue.len());
        for loan_id in overdue {
            let loan = self.registry.loan(loan_id)?;
            if loan.status != LoanStatus::Repaying {
                return Err(RegistryError::InvalidStatus {
                    loan_id,
                    status: loan.status,
                }
                .into());
            }
            plan.push((loan_id, loan.lender, self.ledger.vault_balance(loan_id)));
        }

        let mut defaulted = Vec::with_capacity(plan.len());
        for (loan_id, lender, vaulted) in plan {
            self.ledger
                .release_collateral_from_vault(self.identity, lender, loan_id, vaulted)?;
            self.registry.record_default(self.identity, loan_id)?;
            self.events.record(LoanEvent::CollateralSentToLender {
                loan_id,
                lender,
                amount: vaulted,
            });
            self.events.record(LoanEvent::LoanDefaulted { loan_id, lender });
            defaulted.push(loan_id);
        }
        Ok(defaulted)
    }

    /// Liquidation by operator-supplied valuation. A valuation covering the
    /// gross remaining repayment completes the loan and splits the vault into
    /// a fiat payout for the lender (the gross amount) and the borrower (the
    /// supplied residual); a shortfall forfeits the entire vault to the
    /// lender and defaults the loan. Operator only.
    pub fn liquidate_loans(
        &mut self,
        caller: Principal,
        requests: &[LiquidationRequest],
    ) -> Result<(), GatewayError> {
        self.require_operator(caller)?;

        // Validate the whole batch before mutating any of it.
        let mut plan = Vec::with_capacity(requests.len());
        for request in requests {
            let loan_id = request.loan_id;
            let loan = self.registry.loan(loan_id)?.clone();
            if loan.status != LoanStatus::Repaying {
                return Err(RegistryError::InvalidStatus {
                    loan_id,
                    status: loan.status,
                }
                .into());
            }
            let borrower = match loan.borrower {
                Some(borrower) => borrower,
                None => {
                    return Err(RegistryError::InvalidStatus {
                        loan_id,
                        status: loan.status,
                    }
                    .into())
                }
            };

            let gross = u64::from(loan.remaining_repayment_count)
                .saturating_mul(loan.monthly_repayment_amount);
            let vaulted = self.ledger.vault_balance(loan_id);

            let outcome = if request.collateral_value_fiat >= gross {
                // The payout split is trusted, but bounded by what was
                // actually escrowed.
                let required = gross.saturating_add(request.collateral_payable);
                if vaulted < required {
                    return Err(LedgerError::InsufficientVaultBalance {
                        loan_id,
                        available: vaulted,
                        required,
                    }
                    .into());
                }
                LiquidationOutcome::Covered {
                    gross,
                    payable: request.collateral_payable,
                }
            } else {
                LiquidationOutcome::Shortfall { vaulted }
            };
            plan.push(LiquidationPlan {
                loan_id,
                lender: loan.lender,
                borrower,
                outcome,
            });
        }

        for entry in plan {
            match entry.outcome {
                LiquidationOutcome::Covered { gross, payable } => {
                    self.ledger
                        .deduct_from_vault(self.identity, entry.loan_id, gross)?;
                    self.ledger.store_fiat(self.identity, entry.lender, gross)?;
                    self.ledger
                        .deduct_from_vault(self.identity, entry.loan_id, payable)?;
                    self.ledger
                        .store_fiat(self.identity, entry.borrower, payable)?;
                    self.registry
                        .record_full_repayment(self.identity, entry.loan_id)?;

                    self.events.record(LoanEvent::FiatStored {
                        principal: entry.lender,
                        amount: gross,
                    });
                    self.events.record(LoanEvent::FiatStored {
                        principal: entry.borrower,
                        amount: payable,
                    });
                    self.events.record(LoanEvent::LoanFullyRepaid {
                        loan_id: entry.loan_id,
                        borrower: entry.borrower,
                    });
                }
                LiquidationOutcome::Shortfall { vaulted } => {
                    self.ledger.release_collateral_from_vault(
                        self.identity,
                        entry.lender,
                        entry.loan_id,
                        vaulted,
                    )?;
                    self.registry.record_default(self.identity, entry.loan_id)?;

                    self.events.record(LoanEvent::CollateralSentToLender {
                        loan_id: entry.loan_id,
                        lender: entry.lender,
                        amount: vaulted,
                    });
                    self.events.record(LoanEvent::LoanDefaulted {
                        loan_id: entry.loan_id,
                        lender: entry.lender,
                    });
                }
            }
        }
        Ok(())
    }

    // ─── Account pass-throughs ──────────────────────

    pub fn store_collateral(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, principal)?;
        self.ledger.store_collateral(self.identity, principal, amount)?;
        self.events
            .record(LoanEvent::CollateralStored { principal, amount });
        Ok(())
    }

    pub fn withdraw_collateral(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, principal)?;
        self.ledger
            .withdraw_collateral(self.identity, principal, amount)?;
        self.events
            .record(LoanEvent::CollateralWithdrawn { principal, amount });
        Ok(())
    }

    pub fn store_fiat(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, principal)?;
        self.ledger.store_fiat(self.identity, principal, amount)?;
        self.events.record(LoanEvent::FiatStored { principal, amount });
        Ok(())
    }

    pub fn withdraw_fiat(
        &mut self,
        caller: Principal,
        principal: Principal,
        amount: u64,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, principal)?;
        self.ledger.withdraw_fiat(self.identity, principal, amount)?;
        self.events
            .record(LoanEvent::FiatWithdrawn { principal, amount });
        Ok(())
    }

    /// Validate and debit a fiat withdrawal that settles to an off-ledger
    /// bank account.
    pub fn transfer_fiat_to_bank(
        &mut self,
        caller: Principal,
        requester: Principal,
        bank_account: &str,
        amount: u64,
    ) -> Result<(), GatewayError> {
        self.authenticate(caller, requester)?;
        self.ledger
            .validate_bank_transfer(requester, bank_account, amount)?;
        self.ledger.withdraw_fiat(self.identity, requester, amount)?;
        self.events.record(LoanEvent::FiatSentToBank {
            principal: requester,
            bank_account: bank_account.to_owned(),
            amount,
        });
        Ok(())
    }

    pub fn collateral_balance(
        &self,
        caller: Principal,
        principal: Principal,
    ) -> Result<u64, GatewayError> {
        self.authenticate(caller, principal)?;
        Ok(self.ledger.collateral_balance(principal))
    }

    pub fn fiat_balance(
        &self,
        caller: Principal,
        principal: Principal,
    ) -> Result<u64, GatewayError> {
        self.authenticate(caller, principal)?;
        Ok(self.ledger.fiat_balance(principal))
    }

    pub fn balances(
        &self,
        caller: Principal,
        principal: Principal,
    ) -> Result<Balances, GatewayError> {
        self.authenticate(caller, principal)?;
        Ok(self.ledger.balances(principal))
    }

    // ─── Loan queries ───────────────────────────────

    /// Full loan record, visible only to its lender and borrower.
    pub fn loan_details(&self, caller: Principal, loan_id: LoanId) -> Result<Loan, GatewayError> {
        let loan = self.registry.loan(loan_id)?;
        if loan.lender != caller && loan.borrower != Some(caller) {
            return Err(GatewayError::Unauthorized);
        }
        Ok(loan.clone())
    }

    pub fn lender_loans(
        &self,
        caller: Principal,
        lender: Principal,
    ) -> Result<Vec<LoanId>, GatewayError> {
        self.authenticate(caller, lender)?;
        Ok(self.registry.lender_loans(lender))
    }

    pub fn borrower_loans(
        &self,
        caller: Principal,
        borrower: Principal,
    ) -> Result<Vec<LoanId>, GatewayError> {
        self.authenticate(caller, borrower)?;
        Ok(self.registry.borrower_loans(borrower))
    }
}
