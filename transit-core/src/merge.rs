//! Pair tap-on/tap-off transactions into trips.
//!
//! Pure logic, one stable sort plus a single pass:
//! - Invalid records are dropped.
//! - Transparent (machine) and undated records become standalone trips.
//! - Dated records are sorted and walked; a tap-off or cancel closes the
//!   previous trip when that trip opened with a tap-on and the scheme's
//!   `is_same_trip` accepts the pair. Anything else opens a new trip.

use crate::currency::{add_fares, TransitCurrency};
use crate::trip::{compare_timestamps, FarePolicy, Transaction, Trip};

/// A trip under construction, borrowing its endpoints from the sorted list.
struct Pending<'a, T> {
    start: Option<&'a T>,
    end: Option<&'a T>,
}

impl<'a, T: Transaction> Pending<'a, T> {
    fn open(t: &'a T) -> Self {
        if t.is_tap_on() {
            Pending {
                start: Some(t),
                end: None,
            }
        } else {
            Pending {
                start: None,
                end: Some(t),
            }
        }
    }

    /// True if `t` may become this trip's end.
    fn accepts(&self, t: &T) -> bool {
        match (self.start, self.end) {
            (Some(start), None) => {
                start.is_tap_on() && (t.is_tap_off() || t.is_cancel()) && start.is_same_trip(t)
            }
            _ => false,
        }
    }

    fn finish(self) -> Trip {
        Trip::Merged {
            fare: merged_fare(self.start, self.end),
            start: self.start.map(|t| t.to_event()),
            end: self.end.map(|t| t.to_event()),
        }
    }
}

/// Fare of a merged trip under the scheme's `FarePolicy`.
pub fn merged_fare<T: Transaction>(start: Option<&T>, end: Option<&T>) -> Option<TransitCurrency> {
    match T::FARE_POLICY {
        FarePolicy::Additive => {
            if end.is_some_and(|e| e.is_cancel()) {
                return None;
            }
            add_fares(start.and_then(|s| s.fare()), end.and_then(|e| e.fare()))
        }
        FarePolicy::LastWins => end
            .and_then(|e| e.fare())
            .or_else(|| start.and_then(|s| s.fare())),
    }
}

/// Merge a flat transaction list into trips, in chronological order, with
/// standalone trips appended after the merged sequence.
pub fn merge_trips<T: Transaction>(transactions: Vec<T>) -> Vec<Trip> {
    let total = transactions.len();
    let mut mergeable = Vec::with_capacity(total);
    let mut singles = Vec::new();
    let mut invalid = 0usize;

    for t in transactions {
        if !t.is_valid() {
            invalid += 1;
            continue;
        }
        if t.is_transparent() || t.timestamp().is_none() {
            singles.push(t);
        } else {
            mergeable.push(t);
        }
    }

    if invalid > 0 {
        tracing::warn!(invalid, total, "skipping invalid transaction records");
    }

    // sort_by is stable: equal timestamps keep their decode order
    mergeable.sort_by(|a, b| compare_timestamps(a.timestamp(), b.timestamp()));

    let mut pending: Vec<Pending<'_, T>> = Vec::new();
    for t in &mergeable {
        if let Some(last) = pending.last_mut() {
            if last.accepts(t) {
                last.end = Some(t);
                continue;
            }
        }
        pending.push(Pending::open(t));
    }

    let mut trips: Vec<Trip> = pending.into_iter().map(Pending::finish).collect();
    let merged = trips.len();
    trips.extend(singles.iter().map(|t| Trip::Single { event: t.to_event() }));

    tracing::debug!(
        total,
        merged,
        standalone = singles.len(),
        "merged transactions into trips"
    );
    trips
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
