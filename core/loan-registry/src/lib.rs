//! Loan entities and their lifecycle state machine.
//!
//! The registry owns every `Loan`, the per-principal indices, and the
//! deadline-keyed payment records used to answer "which loans are overdue as
//! of deadline D" without scanning all loans. It records state; the
//! orchestration gateway moves value.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;


/// A participant in the protocol.
pub type Principal = Uuid;

/// Loan identifier: monotonically increasing, assigned at origination, never
/// reused.
pub type LoanId = u64;

// ─────────────────────────────────────────────────
// Data Types
// ─────────────────────────────────────────────────

/// Lifecycle states. `Cancelled`, `Defaulted` and `Completed` are terminal.
///
/// ```text
/// Initiated → Requested → Repaying → Defaulted
///      \           \            \──→ Completed
///       \           \──→ Cancelled
///        \──→ Cancelled
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LoanStatus {
    Initiated,
    Requested,
    Cancelled,
    Repaying,
    Defaulted,
    Completed,
}

/// Commercial terms fixed at origination.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Fiat smallest units, implied scale.
    pub loan_amount: u64,
    /// Collateral-currency smallest unit.
    pub collateral_amount: u64,
    /// Term in months.
    pub loan_term: u32,
    /// Annual rate in basis points. Advisory; the core never accrues
    /// interest.
    pub apr: u32,
    /// Repayment interval in days.
    pub repayment_schedule: u32,
    pub monthly_repayment_amount: u64,
    pub repayment_count: u32,
    pub initial_ltv: u32,
    pub margin_ltv: u32,
    pub liquidation_ltv: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub lender: Principal,
    /// Unset until the `Requested` transition.
    pub borrower: Option<Principal>,
    pub status: LoanStatus,
    pub loan_amount: u64,
    pub collateral_amount: u64,
    pub loan_term: u32,
    pub apr: u32,
    pub repayment_schedule: u32,
    pub monthly_repayment_amount: u64,
    pub remaining_repayment_count: u32,
    /// Epoch seconds; 0 = no repayment scheduled.
    pub next_repayment_deadline: i64,
    pub initial_ltv: u32,
    pub margin_ltv: u32,
    pub liquidation_ltv: u32,
    pub create_time: i64,
    pub last_update_time: i64,
}

/// One repayment cycle of one loan, bucketed under its deadline. The record
/// for the current cycle is marked paid when the cycle resolves, whether on
/// time, by early full repayment, or by default.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaymentRecord {
    pub loan_id: LoanId,
    pub is_paid: bool,
}

// ─────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum RegistryError {
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    #[error("loan {loan_id} has status {status:?}, which does not allow this transition")]
    InvalidStatus { loan_id: LoanId, status: LoanStatus },

    #[error("loan {loan_id} does not belong to the supplied lender")]
    WrongLender { loan_id: LoanId },

    #[error("caller is not the trusted orchestrator")]
    UntrustedCaller,
}

// ─────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────

/// Owned registry state. Loans are never deleted: terminal loans remain
/// queryable as an audit trail.
pub struct LoanRegistry {
    trusted_caller: Principal,
    next_loan_id: LoanId,
    loans: HashMap<LoanId, Loan>,
    lender_loans: HashMap<Principal, Vec<LoanId>>,
    borrower_loans: HashMap<Principal, Vec<LoanId>>,
    /// Payment records in deadline order, so "everything due by now" is a
    /// range scan.
    payment_records: BTreeMap<i64, Vec<PaymentRecord>>,
}

impl LoanRegistry {
    /// Build a registry that accepts mutations only from `trusted_caller`.
    pub fn new(trusted_caller: Principal) -> Self {
        Self {
            trusted_caller,
            next_loan_id: 1,
            loans: HashMap::new(),
            lender_loans: HashMap::new(),
            borrower_loans: HashMap::new(),
            payment_records: BTreeMap::new(),
        }
    }

    fn require_trusted(&self, caller: Principal) -> Result<(), RegistryError> {
        if caller != self.trusted_caller {
            return Err(RegistryError::UntrustedCaller);
        }
        Ok(())
    }

    fn loan_mut(&mut self, loan_id: LoanId) -> Result<&mut Loan, RegistryError> {
        self.loans
            .get_mut(&loan_id)
            .ok_or(RegistryError::LoanNotFound(loan_id))
    }

    /// Mark the record of `loan_id` under `deadline` as paid so the default
    /// sweep can never flag that cycle again.
    fn mark_record_paid(&mut self, deadline: i64, loan_id: LoanId) {
        if let Some(bucket) = self.payment_records.get_mut(&deadline) {
            for record in bucket.iter_mut().filter(|r| r.loan_id == loan_id) {
                record.is_paid = true;
            }
        }
    }

    fn append_record(&mut self, deadline: i64, loan_id: LoanId) {
        self.payment_records
            .entry(deadline)
            .or_default()
            .push(PaymentRecord {
                loan_id,
                is_paid: false,
            });
    }

    // ─── Lifecycle ──────────────────────────────────

    /// Create a loan offer. No borrower yet.
    pub fn initiate_loan(
        &mut self,
        caller: Principal,
        lender: Principal,
        terms: LoanTerms,
    ) -> Result<LoanId, RegistryError> {
        self.require_trusted(caller)?;

        let loan_id = self.next_loan_id;
        self.next_loan_id += 1;

        let now = Utc::now().timestamp();
        let loan = Loan {
            loan_id,
            lender,
            borrower: None,
            status: LoanStatus::Initiated,
            loan_amount: terms.loan_amount,
            collateral_amount: terms.collateral_amount,
            loan_term: terms.loan_term,
            apr: terms.apr,
            repayment_schedule: terms.repayment_schedule,
            monthly_repayment_amount: terms.monthly_repayment_amount,
            remaining_repayment_count: terms.repayment_count,
            next_repayment_deadline: 0,
            initial_ltv: terms.initial_ltv,
            margin_ltv: terms.margin_ltv,
            liquidation_ltv: terms.liquidation_ltv,
            create_time: now,
            last_update_time: now,
        };
        self.loans.insert(loan_id, loan);
        self.lender_loans.entry(lender).or_default().push(loan_id);

        tracing::info!(loan_id, %lender, "loan initiated");
        Ok(loan_id)
    }

    /// A borrower takes the offer. Requires `Initiated`.
    pub fn request_loan(
        &mut self,
        caller: Principal,
        borrower: Principal,
        loan_id: LoanId,
    ) -> Result<(), RegistryError> {
        self.require_trusted(caller)?;

        let loan = self.loan_mut(loan_id)?;
        if loan.status != LoanStatus::Initiated {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            });
        }
        loan.borrower = Some(borrower);
        loan.status = LoanStatus::Requested;
        loan.last_update_time = Utc::now().timestamp();
        self.borrower_loans
            .entry(borrower)
            .or_default()
            .push(loan_id);

        tracing::info!(loan_id, %borrower, "loan requested");
        Ok(())
    }

    /// Lender withdraws the offer. Legal only strictly before disbursement.
    pub fn cancel_loan(
        &mut self,
        caller: Principal,
        lender: Principal,
        loan_id: LoanId,
    ) -> Result<(), RegistryError> {
        self.require_trusted(caller)?;

        let loan = self.loan_mut(loan_id)?;
        if loan.lender != lender {
            return Err(RegistryError::WrongLender { loan_id });
        }
        if !matches!(loan.status, LoanStatus::Initiated | LoanStatus::Requested) {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            });
        }
        loan.status = LoanStatus::Cancelled;
        loan.last_update_time = Utc::now().timestamp();

        tracing::info!(loan_id, "loan cancelled");
        Ok(())
    }

    /// Record that the gateway has disbursed the loan: `Requested` →
    /// `Repaying`, first repayment scheduled. This call records the
    /// ledger-of-record state change; the value movement already happened.
    pub fn record_disbursement(
        &mut self,
        caller: Principal,
        lender: Principal,
        loan_id: LoanId,
        next_deadline: i64,
    ) -> Result<(), RegistryError> {
        self.require_trusted(caller)?;

        let loan = self.loan_mut(loan_id)?;
        if loan.lender != lender {
            return Err(RegistryError::WrongLender { loan_id });
        }
        if loan.status != LoanStatus::Requested {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            });
        }
        loan.status = LoanStatus::Repaying;
        loan.next_repayment_deadline = next_deadline;
        loan.last_update_time = Utc::now().timestamp();
        self.append_record(next_deadline, loan_id);

        tracing::info!(loan_id, next_deadline, "loan disbursement recorded");
        Ok(())
    }

    /// Resolve the current repayment cycle. Returns `true` when the loan is
    /// fully repaid (no further record is appended).
    pub fn advance_repayment(
        &mut self,
        caller: Principal,
        loan_id: LoanId,
        next_deadline: i64,
    ) -> Result<bool, RegistryError> {
        self.require_trusted(caller)?;

        let loan = self
            .loans
            .get(&loan_id)
            .ok_or(RegistryError::LoanNotFound(loan_id))?;
        if loan.status != LoanStatus::Repaying {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            });
        }
        let current_deadline = loan.next_repayment_deadline;
        self.mark_record_paid(current_deadline, loan_id);

        let loan = self.loan_mut(loan_id)?;
        loan.remaining_repayment_count = loan.remaining_repayment_count.saturating_sub(1);
        loan.last_update_time = Utc::now().timestamp();

        if loan.remaining_repayment_count == 0 {
            loan.status = LoanStatus::Completed;
            loan.next_repayment_deadline = 0;
            tracing::info!(loan_id, "final repayment recorded, loan completed");
            return Ok(true);
        }

        loan.next_repayment_deadline = next_deadline;
        self.append_record(next_deadline, loan_id);
        tracing::info!(loan_id, next_deadline, "repayment recorded");
        Ok(false)
    }

    /// Force-terminate a repaying loan as defaulted.
    pub fn record_default(
        &mut self,
        caller: Principal,
        loan_id: LoanId,
    ) -> Result<(), RegistryError> {
        self.terminate(caller, loan_id, LoanStatus::Defaulted)
    }

    /// Force-terminate a repaying loan as completed (early full repayment or
    /// liquidation at a covering valuation).
    pub fn record_full_repayment(
        &mut self,
        caller: Principal,
        loan_id: LoanId,
    ) -> Result<(), RegistryError> {
        self.terminate(caller, loan_id, LoanStatus::Completed)
    }

    fn terminate(
        &mut self,
        caller: Principal,
        loan_id: LoanId,
        status: LoanStatus,
    ) -> Result<(), RegistryError> {
        self.require_trusted(caller)?;

        let loan = self
            .loans
            .get(&loan_id)
            .ok_or(RegistryError::LoanNotFound(loan_id))?;
        if loan.status != LoanStatus::Repaying {
            return Err(RegistryError::InvalidStatus {
                loan_id,
                status: loan.status,
            });
        }
        let current_deadline = loan.next_repayment_deadline;
        self.mark_record_paid(current_deadline, loan_id);

        let loan = self.loan_mut(loan_id)?;
        loan.status = status;
        loan.remaining_repayment_count = 0;
        loan.next_repayment_deadline = 0;
        loan.last_update_time = Utc::now().timestamp();

        tracing::info!(loan_id, ?status, "loan terminated");
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────

    /// All loan ids with an unpaid record due at or before `deadline`.
    pub fn overdue_loan_ids(&self, deadline: i64) -> Vec<LoanId> {
        self.payment_records
            .range(..=deadline)
            .flat_map(|(_, bucket)| bucket.iter())
            .filter(|record| !record.is_paid)
            .map(|record| record.loan_id)
            .collect()
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<&Loan, RegistryError> {
        self.loans
            .get(&loan_id)
            .ok_or(RegistryError::LoanNotFound(loan_id))
    }

    pub fn lender_loans(&self, lender: Principal) -> Vec<LoanId> {
        self.lender_loans.get(&lender).cloned().unwrap_or_default()
    }

    pub fn borrower_loans(&self, borrower: Principal) -> Vec<LoanId> {
        self.borrower_loans
            .get(&borrower)
            .cloned()
            .unwrap_or_default()
    }

    pub fn loan_amount(&self, loan_id: LoanId) -> Result<u64, RegistryError> {
        Ok(self.loan(loan_id)?.loan_amount)
    }

    pub fn collateral_amount(&self, loan_id: LoanId) -> Result<u64, RegistryError> {
        Ok(self.loan(loan_id)?.collateral_amount)
    }
}
