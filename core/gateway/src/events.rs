//! Lifecycle audit events.
//!
//! One event per state transition or value movement, collected in the
//! gateway's in-memory log and mirrored as tracing records. Consumers treat
//! the drained records as the audit trail.

use chrono::Utc;
use serde::Serialize;

use crate::{LoanId, Principal};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoanEvent {
    LoanInitiated {
        loan_id: LoanId,
        lender: Principal,
    },
    LoanRequested {
        loan_id: LoanId,
        borrower: Principal,
    },
    LoanCancelled {
        loan_id: LoanId,
        lender: Principal,
    },
    LoanDisbursed {
        loan_id: LoanId,
        lender: Principal,
        borrower: Principal,
        amount: u64,
    },
    LoanRepaid {
        loan_id: LoanId,
        borrower: Principal,
        amount: u64,
    },
    LoanFullyRepaid {
        loan_id: LoanId,
        borrower: Principal,
    },
    LoanDefaulted {
        loan_id: LoanId,
        lender: Principal,
    },
    CollateralEscrowed {
        loan_id: LoanId,
        borrower: Principal,
        amount: u64,
    },
    CollateralReleased {
        loan_id: LoanId,
        principal: Principal,
        amount: u64,
    },
    CollateralSentToLender {
        loan_id: LoanId,
        lender: Principal,
        amount: u64,
    },
    FiatTransferred {
        from: Principal,
        to: Principal,
        amount: u64,
    },
    FiatStored {
        principal: Principal,
        amount: u64,
    },
    FiatWithdrawn {
        principal: Principal,
        amount: u64,
    },
    CollateralStored {
        principal: Principal,
        amount: u64,
    },
    CollateralWithdrawn {
        principal: Principal,
        amount: u64,
    },
    FiatSentToBank {
        principal: Principal,
        bank_account: String,
        amount: u64,
    },
}

/// An event plus the epoch-seconds instant it was recorded.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EventRecord {
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: LoanEvent,
}

/// Append-only in-memory audit log.
#[derive(Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: LoanEvent) {
        tracing::info!(event = ?event, "lifecycle event");
        self.records.push(EventRecord {
            timestamp: Utc::now().timestamp(),
            event,
        });
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }
}
