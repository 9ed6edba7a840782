//! Derives the overall transaction status from its steps

use chrono::{DateTime, Utc};

use super::{Step, StepStatus, Transaction, TransactionStatus};

pub struct StatusAggregator;

impl StatusAggregator {
    /// failed > completed (all) > in_progress (any) > pending
    pub fn compute(steps: &[Step]) -> TransactionStatus {
        if steps.iter().any(|s| s.status == StepStatus::Failed) {
            TransactionStatus::Failed
        } else if !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Completed) {
            TransactionStatus::Completed
        } else if steps.iter().any(|s| s.status == StepStatus::InProgress) {
            TransactionStatus::InProgress
        } else {
            TransactionStatus::Pending
        }
    }

    /// Recompute `overall_status`. Entering `completed` stamps the completion
    /// time and total gas. A cancelled transaction is left alone.
    pub fn apply(tx: &mut Transaction, now: DateTime<Utc>) {
        if tx.overall_status == TransactionStatus::Cancelled {
            return;
        }

        let status = Self::compute(&tx.steps);
        if status == TransactionStatus::Completed && tx.overall_status != TransactionStatus::Completed {
            tx.completion_time = Some(now);
            tx.total_gas_used = Some(tx.summed_gas_used());
        }
        tx.overall_status = status;
    }
}
