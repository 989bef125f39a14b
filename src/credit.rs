//! Per-account credit, derived from signed adjustment touches.

use std::sync::Arc;

use crate::api::{AccountId, CreditReceipt};
use crate::commons::StratusResult;
use crate::ledger::{TouchKind, TouchLedger, TouchPayload};

//------------ CreditLedger --------------------------------------------------

/// Adjusts and sums account credit.
///
/// The balance is the sum of all recorded deltas, computed fresh on
/// every call. Deltas commute, so the sum is independent of the order
/// they were applied in; the sequence order is retained for audit
/// display only. No floor or ceiling is enforced here; overdraft
/// policy, if any, belongs to the adapter.
#[derive(Debug)]
pub struct CreditLedger {
    ledger: Arc<TouchLedger>,
}

impl CreditLedger {
    pub fn new(ledger: Arc<TouchLedger>) -> Self {
        CreditLedger { ledger }
    }

    /// Appends an adjustment, negative or positive, and returns the new
    /// balance.
    pub fn adjust(
        &self,
        account: AccountId,
        delta: i64,
    ) -> StratusResult<CreditReceipt> {
        self.ledger
            .append(account.into(), TouchPayload::CreditAdjustment { delta })?;
        let balance = self.balance(account)?;
        Ok(CreditReceipt {
            account_id: account,
            credit_change: delta,
            credit_balance: balance,
        })
    }

    /// The current balance of an account.
    ///
    /// An account with no credit history simply has a balance of zero;
    /// that is not an error state.
    pub fn balance(&self, account: AccountId) -> StratusResult<i64> {
        let mut balance = 0;
        for touch in
            self.ledger.history(account.into(), TouchKind::Credit)?
        {
            if let Some(delta) = touch?.payload().delta() {
                balance += delta;
            }
        }
        Ok(balance)
    }
}


//------------ Tests ---------------------------------------------------------
