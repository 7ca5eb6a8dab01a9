//! Scheme-agnostic trip model.
//!
//! Each scheme implements `Transaction` on its own record type. The merge
//! engine pairs transactions into `Trip`s, snapshotting each endpoint into an
//! owned `TripEvent` so trips outlive the scheme type and can be obfuscated.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::currency::TransitCurrency;
use crate::station::Station;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Kind of vehicle or terminal behind a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Bus,
    Train,
    Tram,
    Metro,
    Ferry,
    TrolleyBus,
    Monorail,
    TicketMachine,
    VendingMachine,
    Pos,
    Other,
}

impl Mode {
    /// Modes that never take part in tap-on/tap-off pairing.
    pub const TRANSPARENT: &'static [Mode] = &[Mode::TicketMachine, Mode::VendingMachine, Mode::Pos];

    pub fn is_transparent(self) -> bool {
        Mode::TRANSPARENT.contains(&self)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mode::Bus => "bus",
            Mode::Train => "train",
            Mode::Tram => "tram",
            Mode::Metro => "metro",
            Mode::Ferry => "ferry",
            Mode::TrolleyBus => "trolleybus",
            Mode::Monorail => "monorail",
            Mode::TicketMachine => "ticket machine",
            Mode::VendingMachine => "vending machine",
            Mode::Pos => "point of sale",
            Mode::Other => "other",
        };
        f.write_str(s)
    }
}

/// One row of a declarative mode table: operator `code` maps to `mode`, except
/// stations inside `station_range` which map to the range's mode.
#[derive(Debug, Clone, Copy)]
pub struct ModeRule {
    pub code: u32,
    pub mode: Mode,
    pub station_range: Option<(u32, u32, Mode)>,
}

impl ModeRule {
    pub const fn new(code: u32, mode: Mode) -> Self {
        ModeRule {
            code,
            mode,
            station_range: None,
        }
    }

    pub const fn with_range(code: u32, mode: Mode, lo: u32, hi: u32, range_mode: Mode) -> Self {
        ModeRule {
            code,
            mode,
            station_range: Some((lo, hi, range_mode)),
        }
    }
}

/// Classify `code` (and optionally a station id) against a mode table.
/// Codes missing from the table are `Mode::Other`.
pub fn classify_mode(table: &[ModeRule], code: u32, station: Option<u32>) -> Mode {
    let Some(rule) = table.iter().find(|r| r.code == code) else {
        return Mode::Other;
    };
    match (rule.station_range, station) {
        (Some((lo, hi, mode)), Some(id)) if (lo..=hi).contains(&id) => mode,
        _ => rule.mode,
    }
}

// ---------------------------------------------------------------------------
// Transaction capability
// ---------------------------------------------------------------------------

/// How a merged trip's fare is derived from its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FarePolicy {
    /// `start.fare + end.fare`, or no fare when the tap-on was cancelled.
    Additive,
    /// `end.fare`, falling back to `start.fare`.
    LastWins,
}

/// Capability set every scheme's transaction record exposes.
pub trait Transaction {
    const FARE_POLICY: FarePolicy = FarePolicy::Additive;

    fn timestamp(&self) -> Option<NaiveDateTime>;
    fn fare(&self) -> Option<TransitCurrency>;
    fn station(&self) -> Option<Station>;
    fn mode(&self) -> Mode;

    /// Scheme rule deciding whether `other` closes a trip opened by `self`.
    fn is_same_trip(&self, other: &Self) -> bool;

    fn is_tap_on(&self) -> bool {
        false
    }

    fn is_tap_off(&self) -> bool {
        false
    }

    fn is_cancel(&self) -> bool {
        false
    }

    fn is_transfer(&self) -> bool {
        false
    }

    fn is_rejected(&self) -> bool {
        false
    }

    fn is_transparent(&self) -> bool {
        self.mode().is_transparent()
    }

    /// False for records that failed their sanity checks; the merge skips them.
    fn is_valid(&self) -> bool {
        true
    }

    fn agency_name(&self) -> Option<String> {
        None
    }

    fn route_name(&self) -> Option<String> {
        None
    }

    fn machine_id(&self) -> Option<String> {
        None
    }

    fn vehicle_id(&self) -> Option<String> {
        None
    }

    fn to_event(&self) -> TripEvent {
        TripEvent {
            timestamp: self.timestamp(),
            fare: self.fare(),
            station: self.station(),
            mode: self.mode(),
            agency: self.agency_name(),
            route: self.route_name(),
            machine_id: self.machine_id(),
            vehicle_id: self.vehicle_id(),
            flags: EventFlags {
                tap_on: self.is_tap_on(),
                tap_off: self.is_tap_off(),
                cancel: self.is_cancel(),
                transparent: self.is_transparent(),
                transfer: self.is_transfer(),
                rejected: self.is_rejected(),
            },
        }
    }
}

/// Null timestamps sort after every timestamped value.
pub fn compare_timestamps(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Trip
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventFlags {
    pub tap_on: bool,
    pub tap_off: bool,
    pub cancel: bool,
    pub transparent: bool,
    pub transfer: bool,
    pub rejected: bool,
}

/// Owned snapshot of one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripEvent {
    pub timestamp: Option<NaiveDateTime>,
    pub fare: Option<TransitCurrency>,
    pub station: Option<Station>,
    pub mode: Mode,
    pub agency: Option<String>,
    pub route: Option<String>,
    pub machine_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub flags: EventFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trip {
    /// A tap-on/tap-off pair. Either side may be missing (dangling events).
    Merged {
        start: Option<TripEvent>,
        end: Option<TripEvent>,
        fare: Option<TransitCurrency>,
    },
    /// A standalone event: ticket machine, refill, or undated record.
    Single { event: TripEvent },
}

impl Trip {
    pub fn start(&self) -> Option<&TripEvent> {
        match self {
            Trip::Merged { start, .. } => start.as_ref(),
            Trip::Single { event } => Some(event),
        }
    }

    pub fn end(&self) -> Option<&TripEvent> {
        match self {
            Trip::Merged { end, .. } => end.as_ref(),
            Trip::Single { .. } => None,
        }
    }

    /// The first event present, start before end.
    fn primary(&self) -> Option<&TripEvent> {
        self.start().or_else(|| self.end())
    }

    pub fn start_timestamp(&self) -> Option<NaiveDateTime> {
        self.primary().and_then(|e| e.timestamp)
    }

    pub fn end_timestamp(&self) -> Option<NaiveDateTime> {
        self.end().and_then(|e| e.timestamp)
    }

    pub fn fare(&self) -> Option<TransitCurrency> {
        match self {
            Trip::Merged { fare, .. } => *fare,
            Trip::Single { event } => event.fare,
        }
    }

    pub fn mode(&self) -> Mode {
        self.primary().map(|e| e.mode).unwrap_or(Mode::Other)
    }

    pub fn start_station(&self) -> Option<&Station> {
        self.start().and_then(|e| e.station.as_ref())
    }

    pub fn end_station(&self) -> Option<&Station> {
        self.end().and_then(|e| e.station.as_ref())
    }

    pub fn agency(&self) -> Option<&str> {
        self.primary().and_then(|e| e.agency.as_deref())
    }

    /// Display order: newest first, undated trips last.
    pub fn cmp_recent_first(a: &Trip, b: &Trip) -> Ordering {
        match (a.start_timestamp(), b.start_timestamp()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (x, y) => compare_timestamps(x, y),
        }
    }
}

pub fn sort_trips(trips: &mut [Trip]) {
    trips.sort_by(Trip::cmp_recent_first);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
