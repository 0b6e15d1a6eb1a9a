//! Per-status dwell-time budgets
use super::chain::Status;
use super::config::WorkflowConfig;
use super::types::TimeStamp;
use chrono::Utc;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaStatus {
    pub budget_hours: Option<u32>,
    pub elapsed_hours: f64,
    /// Negative once the budget is exceeded.
    pub remaining_hours: Option<f64>,
    pub overdue: bool,
}

#[derive(Debug, Clone)]
pub struct SlaClock {
    budgets: BTreeMap<Status, u32>,
}

impl SlaClock {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            budgets: config.sla_hours.clone(),
        }
    }

    pub fn budget(&self, status: Status) -> Option<u32> {
        self.budgets.get(&status).copied()
    }

    pub fn status(
        &self,
        status: Status,
        entered_at: &TimeStamp<Utc>,
        now: &TimeStamp<Utc>,
    ) -> SlaStatus {
        let elapsed = now.to_datetime_utc() - entered_at.to_datetime_utc();
        let elapsed_hours = (elapsed.num_seconds().max(0) as f64) / 3600.0;
        let budget_hours = self.budget(status);
        let remaining_hours = budget_hours.map(|budget| f64::from(budget) - elapsed_hours);

        SlaStatus {
            budget_hours,
            elapsed_hours,
            remaining_hours,
            overdue: remaining_hours.is_some_and(|remaining| remaining < 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approver_review_goes_overdue_after_a_day() {
        let clock = SlaClock::new(&WorkflowConfig::default());
        let entered = TimeStamp::new_with(2024, 6, 1, 8, 0, 0).unwrap();

        let fresh = clock.status(
            Status::ApproverReview,
            &entered,
            &TimeStamp::new_with(2024, 6, 1, 20, 0, 0).unwrap(),
        );
        assert!(!fresh.overdue);
        assert_eq!(fresh.remaining_hours, Some(12.0));

        let late = clock.status(
            Status::ApproverReview,
            &entered,
            &TimeStamp::new_with(2024, 6, 2, 10, 0, 0).unwrap(),
        );
        assert!(late.overdue);
        assert_eq!(late.remaining_hours, Some(-2.0));
    }

    #[test]
    fn unbudgeted_status_never_overdue() {
        let clock = SlaClock::new(&WorkflowConfig::default());
        let sla = clock.status(
            Status::Issued,
            &TimeStamp::new_with(2020, 1, 1, 0, 0, 0).unwrap(),
            &TimeStamp::new_with(2024, 1, 1, 0, 0, 0).unwrap(),
        );

        assert!(!sla.overdue);
        assert_eq!(sla.remaining_hours, None);
    }
}
