//! Passes and season tickets stored on a card.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub agency: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub machine_id: Option<u32>,
    pub zones: Vec<u32>,
    pub remaining_trips: Option<u32>,
    pub total_trips: Option<u32>,
}

impl Subscription {
    /// True if `date` falls inside the validity window. Open ends are unbounded.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| from <= date) && self.valid_to.is_none_or(|to| date <= to)
    }

    /// True when a trip-limited pass has no rides left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_trips == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn test_validity_window() {
        let sub = Subscription {
            valid_from: Some(date(1, 1)),
            valid_to: Some(date(1, 31)),
            ..Default::default()
        };
        assert!(sub.is_valid_on(date(1, 1)));
        assert!(sub.is_valid_on(date(1, 31)));
        assert!(!sub.is_valid_on(date(2, 1)));
    }

    #[test]
    fn test_open_window() {
        let sub = Subscription::default();
        assert!(sub.is_valid_on(date(6, 6)));
        assert!(!sub.is_exhausted());
    }

    #[test]
    fn test_exhausted() {
        let sub = Subscription {
            remaining_trips: Some(0),
            total_trips: Some(20),
            ..Default::default()
        };
        assert!(sub.is_exhausted());
    }
}
