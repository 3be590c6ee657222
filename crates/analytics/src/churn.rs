//! Churn classification. Recomputed from the records on every call.

use chrono::{NaiveDate, TimeDelta};
use practice_core::period::DateInterval;
use practice_core::types::{ChurnedClient, PaymentRecord};
use std::borrow::Borrow;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChurnClassifier {
    window_days: i64,
}

impl ChurnClassifier {
    pub fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    /// Each client's most recent payment date.
    pub fn last_sessions<R: Borrow<PaymentRecord>>(records: &[R]) -> HashMap<&str, NaiveDate> {
        let mut last: HashMap<&str, NaiveDate> = HashMap::new();
        for record in records {
            let record = record.borrow();
            last.entry(record.client_id.as_str())
                .and_modify(|d| *d = (*d).max(record.date_paid))
                .or_insert(record.date_paid);
        }
        last
    }

    /// The date a client with this last session is considered lost. `None`
    /// when the window pushes past the calendar chrono can represent.
    pub fn churn_date(&self, last_session: NaiveDate) -> Option<NaiveDate> {
        TimeDelta::try_days(self.window_days).and_then(|window| last_session.checked_add_signed(window))
    }

    /// Clients whose churn date lands inside the interval, sorted.
    pub fn churned_in<R: Borrow<PaymentRecord>>(&self, records: &[R], interval: &DateInterval) -> Vec<String> {
        let mut ids: Vec<String> = Self::last_sessions(records)
            .into_iter()
            .filter(|(_, last)| self.churn_date(*last).is_some_and(|d| interval.contains(d)))
            .map(|(id, _)| id.to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Clients with no session for more than the window as of `now`, longest
    /// absence first.
    pub fn churned_as_of<R: Borrow<PaymentRecord>>(&self, records: &[R], now: NaiveDate) -> Vec<ChurnedClient> {
        let mut churned: Vec<ChurnedClient> = Self::last_sessions(records)
            .into_iter()
            .filter_map(|(id, last)| {
                let days = (now - last).num_days();
                (days > self.window_days).then(|| ChurnedClient {
                    client_id: id.to_string(),
                    last_session_date: last,
                    days_since_last_session: days,
                })
            })
            .collect();
        churned.sort_by(|a, b| {
            b.days_since_last_session
                .cmp(&a.days_since_last_session)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        churned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::record;
    use practice_core::period::month_interval;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_churn_is_projected_forward() {
        let records = vec![record("a", "c1", "1/5/24", 100.0), record("a", "c1", "2/10/24", 150.0)];
        let classifier = ChurnClassifier::new(60);
        assert_eq!(classifier.churn_date(date(2024, 2, 10)), Some(date(2024, 4, 10)));
        assert!(classifier.churned_in(&records, &month_interval(1, 2024)).is_empty());
        assert!(classifier.churned_in(&records, &month_interval(2, 2024)).is_empty());
        assert_eq!(classifier.churned_in(&records, &month_interval(3, 2024)), vec!["a"]);
    }

    #[test]
    fn test_churned_as_of() {
        let records = vec![
            record("a", "c1", "1/5/24", 100.0),
            record("b", "c1", "3/2/24", 100.0),
            record("c", "c2", "4/20/24", 100.0),
        ];
        let churned = ChurnClassifier::new(60).churned_as_of(&records, date(2024, 5, 1));
        assert_eq!(churned.len(), 1);
        assert_eq!(churned[0].client_id, "a");
        assert_eq!(churned[0].days_since_last_session, 117);

        // "b" sits exactly at the window; one day shorter tips it over.
        let shorter = ChurnClassifier::new(59).churned_as_of(&records, date(2024, 5, 1));
        assert_eq!(shorter.len(), 2);
        assert_eq!(shorter[1].client_id, "b");
    }

    #[test]
    fn test_huge_window_never_churns() {
        let records = vec![record("a", "c1", "1/5/24", 100.0)];
        let classifier = ChurnClassifier::new(1_000_000_000_000);
        assert_eq!(classifier.churn_date(date(2024, 1, 5)), None);
        assert!(classifier.churned_in(&records, &month_interval(0, 2024)).is_empty());
        assert!(classifier.churned_as_of(&records, date(2024, 6, 1)).is_empty());

        let edge = ChurnClassifier::new(i64::MAX);
        assert_eq!(edge.churn_date(NaiveDate::MAX), None);
    }

    #[test]
    fn test_larger_window_never_churns_more() {
        let records = vec![
            record("a", "c1", "1/5/24", 100.0),
            record("b", "c1", "2/14/24", 100.0),
            record("c", "c2", "3/20/24", 100.0),
            record("d", "c2", "4/28/24", 100.0),
        ];
        let now = date(2024, 6, 30);
        let mut previous = usize::MAX;
        for window in [0, 15, 30, 60, 90, 120, 180] {
            let count = ChurnClassifier::new(window).churned_as_of(&records, now).len();
            assert!(count <= previous, "window {window} churned {count} > {previous}");
            previous = count;
        }
    }
}
