//! Per-scheme decoders.
//!
//! | Scheme       | Family      | Record shape                  |
//! |--------------|-------------|-------------------------------|
//! | Clipper      | DESFire     | fixed-width byte fields       |
//! | OV-chipkaart | Classic 4K  | presence bitmask, nested mask |
//! | Troika       | Classic     | fixed-width bit fields        |
//! | Ventra       | Ultralight  | fixed-width bit fields        |
//! | Suica        | FeliCa      | fixed-width byte fields       |
//! | T-money      | ISO7816     | byte fields, BCD time         |

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::card::AppSelection;

pub mod clipper;
pub mod ovc;
pub mod suica;
pub mod tmoney;
pub mod troika;
pub mod ventra;

/// Applications (and the files within them) a transport layer should read
/// from ISO7816 cards so the decoders here can work.
pub static ISO7816_SELECTIONS: &[AppSelection] = &[tmoney::SELECTION];

// ---------------------------------------------------------------------------
// Epoch helpers
// ---------------------------------------------------------------------------

/// Midnight of `(year, month, day)`. Only called with literal dates.
pub(crate) fn epoch(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

pub(crate) fn plus_days(base: NaiveDateTime, days: u32) -> Option<NaiveDate> {
    base.date().checked_add_signed(Duration::days(days as i64))
}

pub(crate) fn plus_minutes(base: NaiveDateTime, minutes: u32) -> Option<NaiveDateTime> {
    base.checked_add_signed(Duration::minutes(minutes as i64))
}

pub(crate) fn plus_seconds(base: NaiveDateTime, seconds: u32) -> Option<NaiveDateTime> {
    base.checked_add_signed(Duration::seconds(seconds as i64))
}

/// Date plus minutes since midnight.
pub(crate) fn at_minutes(date: NaiveDate, minutes: u32) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::minutes(minutes as i64))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
