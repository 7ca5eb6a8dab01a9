//! Trip obfuscation for sharing card dumps.
//!
//! One `ObfuscationContext` per export: it owns the seeded RNG, a
//! day-of-year permutation and the reference "now", so repeated runs with the
//! same seed give the same output. Every trip gets one time delta, applied to
//! both endpoints, so trip durations survive exactly. Fares get noise but keep
//! their sign.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::currency::TransitCurrency;
use crate::info::TransitInfo;
use crate::trip::{Trip, TripEvent};

const DAYS_IN_YEAR: u32 = 366;
const TIME_JITTER_MINUTES: i64 = 350;
const FARE_OFFSET: i64 = 50;
const FARE_SCALE: (f64, f64) = (0.8, 1.2);

/// What to scramble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObfuscationOptions {
    pub dates: bool,
    pub times: bool,
    pub fares: bool,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        ObfuscationOptions {
            dates: true,
            times: true,
            fares: true,
        }
    }
}

impl ObfuscationOptions {
    pub fn none() -> Self {
        ObfuscationOptions {
            dates: false,
            times: false,
            fares: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.dates || self.times || self.fares
    }
}

/// Noise applied to every fare of one trip.
#[derive(Debug, Clone, Copy)]
struct FareNoise {
    offset: i64,
    scale: f64,
}

pub struct ObfuscationContext {
    rng: StdRng,
    /// `day_map[d - 1]` is the replacement for day-of-year `d`.
    day_map: Vec<u32>,
    now: NaiveDateTime,
    options: ObfuscationOptions,
}

impl ObfuscationContext {
    pub fn new(options: ObfuscationOptions, seed: u64, now: NaiveDateTime) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut day_map: Vec<u32> = (1..=DAYS_IN_YEAR).collect();
        day_map.shuffle(&mut rng);
        ObfuscationContext {
            rng,
            day_map,
            now,
            options,
        }
    }

    /// Context seeded from OS entropy, relative to the current local time.
    pub fn from_entropy(options: ObfuscationOptions) -> Self {
        let seed = rand::thread_rng().gen();
        Self::new(options, seed, chrono::Local::now().naive_local())
    }

    pub fn options(&self) -> ObfuscationOptions {
        self.options
    }

    /// Remap the calendar day through the permutation. Results later than
    /// "now" move back one year.
    pub fn map_date(&self, date: NaiveDate) -> NaiveDate {
        let mapped = self.day_map[(date.ordinal() - 1) as usize];
        let Some(first) = NaiveDate::from_yo_opt(date.year(), 1) else {
            return date;
        };
        let candidate = first + Duration::days(mapped as i64 - 1);
        if candidate > self.now.date() {
            candidate
                .checked_sub_months(Months::new(12))
                .unwrap_or(candidate)
        } else {
            candidate
        }
    }

    /// Obfuscated replacement for one timestamp. Draws from the RNG when
    /// times are scrambled. The result is never later than "now".
    pub fn obfuscate_timestamp(&mut self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = if self.options.dates {
            self.map_date(ts.date())
        } else {
            ts.date()
        };
        if !self.options.times {
            return self.not_after_now(date.and_time(ts.time()));
        }
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or(ts);
        let minutes = (ts.hour() * 60 + ts.minute()) as i64;
        let rounded = ((minutes + 2) / 5) * 5;
        let jitter = self
            .rng
            .gen_range(-TIME_JITTER_MINUTES..=TIME_JITTER_MINUTES);
        self.not_after_now(midnight + Duration::minutes(rounded + jitter))
    }

    /// Results later than "now" move back one year.
    fn not_after_now(&self, ts: NaiveDateTime) -> NaiveDateTime {
        if ts > self.now {
            ts.checked_sub_months(Months::new(12)).unwrap_or(ts)
        } else {
            ts
        }
    }

    fn fare_noise(&mut self) -> FareNoise {
        FareNoise {
            offset: self.rng.gen_range(-FARE_OFFSET..=FARE_OFFSET),
            scale: self.rng.gen_range(FARE_SCALE.0..=FARE_SCALE.1),
        }
    }

    /// Apply one draw of noise to `fare`, keeping its sign.
    pub fn obfuscate_fare(&mut self, fare: TransitCurrency) -> TransitCurrency {
        let noise = self.fare_noise();
        apply_fare_noise(fare, noise)
    }

    pub fn obfuscate_trip(&mut self, trip: &Trip) -> Trip {
        let delta = match trip.start_timestamp() {
            Some(ts) if self.options.dates || self.options.times => {
                let delta = self.obfuscate_timestamp(ts) - ts;
                // The whole trip moves together, so the last event decides
                let latest = trip.end_timestamp().unwrap_or(ts) + delta;
                delta + (self.not_after_now(latest) - latest)
            }
            _ => Duration::zero(),
        };
        let noise = self.options.fares.then(|| self.fare_noise());

        let shift = |event: &TripEvent| {
            let mut event = event.clone();
            event.timestamp = event.timestamp.map(|t| t + delta);
            if let Some(noise) = noise {
                event.fare = event.fare.map(|f| apply_fare_noise(f, noise));
            }
            event
        };
        let fare = |fare: Option<TransitCurrency>| match noise {
            Some(noise) => fare.map(|f| apply_fare_noise(f, noise)),
            None => fare,
        };

        match trip {
            Trip::Merged {
                start,
                end,
                fare: trip_fare,
            } => Trip::Merged {
                start: start.as_ref().map(shift),
                end: end.as_ref().map(shift),
                fare: fare(*trip_fare),
            },
            Trip::Single { event } => Trip::Single {
                event: shift(event),
            },
        }
    }

    pub fn obfuscate_trips(&mut self, trips: &[Trip]) -> Vec<Trip> {
        let mut out: Vec<Trip> = trips.iter().map(|t| self.obfuscate_trip(t)).collect();
        crate::trip::sort_trips(&mut out);
        out
    }

    /// Copy of `info` with obfuscated trips; everything else is unchanged.
    pub fn obfuscate_info(&mut self, info: &TransitInfo) -> TransitInfo {
        let mut out = info.clone();
        if !self.options.is_active() {
            return out;
        }
        if let Some(trips) = &info.trips {
            out.trips = Some(self.obfuscate_trips(trips));
            tracing::debug!(
                card = %info.card_name,
                trips = trips.len(),
                options = ?self.options,
                "obfuscated trips"
            );
        }
        out
    }
}

fn apply_fare_noise(fare: TransitCurrency, noise: FareNoise) -> TransitCurrency {
    let original = fare.amount;
    if original == 0 {
        return fare;
    }
    let mut amount = ((original + noise.offset) as f64 * noise.scale).round() as i64;
    if amount == 0 {
        amount = original.signum();
    } else if amount.signum() != original.signum() {
        amount = -amount;
    }
    TransitCurrency { amount, ..fare }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
