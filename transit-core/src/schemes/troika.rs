//! Troika (Moscow) on MIFARE Classic, sector 8.
//!
//! Blocks 0-2 of the sector are read as one bit buffer. The header names a
//! layout (and, for layout 0xE, a sub-layout); each layout places its fields
//! at fixed bit offsets.

use chrono::{Duration, NaiveDateTime};

use crate::bits::{get_bits, sign_magnitude};
use crate::card::Card;
use crate::currency::{TransitBalance, TransitCurrency};
use crate::info::{ExtraInfo, TransitIdentity, TransitInfo};
use crate::merge::merge_trips;
use crate::registry::CardDecoder;
use crate::schemes::{epoch, plus_days, plus_minutes};
use crate::station::{Station, StationEntry, StationTable};
use crate::subscription::Subscription;
use crate::trip::{classify_mode, Mode, ModeRule, Transaction};
use crate::types::{Result, TransitError};

pub const NAME: &str = "Troika";

const SECTOR: usize = 8;
const HEADER: u32 = 0x117;

const LAYOUT_PURSE: u32 = 0xE;
const LAYOUT_TICKET: u32 = 0xA;
const SUB_E3: u32 = 3;
const SUB_E5: u32 = 5;

const TRANSPORT_NONE: u32 = 0;
const TRANSPORT_METRO: u32 = 1;

const MODES: &[ModeRule] = &[
    ModeRule::new(TRANSPORT_METRO, Mode::Metro),
    ModeRule::new(2, Mode::Bus),
    ModeRule::new(3, Mode::Train),
];

const METRO_STATIONS: StationTable = StationTable {
    company: "Moscow Metro",
    entries: &[
        StationEntry { id: 0x0101, name: "Okhotny Ryad", line: Some("1"), lat: Some(55.7571), lon: Some(37.6156) },
        StationEntry { id: 0x0102, name: "Teatralnaya", line: Some("2"), lat: Some(55.7577), lon: Some(37.6188) },
        StationEntry { id: 0x0103, name: "Ploshchad Revolyutsii", line: Some("3"), lat: Some(55.7566), lon: Some(37.6220) },
        StationEntry { id: 0x0104, name: "Kurskaya", line: Some("5"), lat: Some(55.7587), lon: Some(37.6611) },
    ],
};

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// Decoded contents of sector 8.
#[derive(Debug, Clone, PartialEq)]
pub enum TroikaRecord {
    Purse {
        sub_layout: u32,
        balance: i64,
        expiry: Option<chrono::NaiveDate>,
        validation: Option<TroikaValidation>,
    },
    Ticket(Subscription),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TroikaValidation {
    pub timestamp: Option<NaiveDateTime>,
    pub transport: u32,
    pub validator: u32,
}

impl TroikaValidation {
    fn parse(data: &[u8], base: NaiveDateTime) -> Option<Self> {
        let minutes = get_bits(data, 128, 23);
        if minutes == 0 {
            return None;
        }
        Some(TroikaValidation {
            timestamp: plus_minutes(base, minutes),
            transport: get_bits(data, 151, 2),
            validator: get_bits(data, 153, 16),
        })
    }
}

impl Transaction for TroikaValidation {
    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    fn fare(&self) -> Option<TransitCurrency> {
        None
    }

    fn station(&self) -> Option<Station> {
        match self.transport {
            TRANSPORT_METRO => Some(METRO_STATIONS.station(self.validator)),
            _ => None,
        }
    }

    fn mode(&self) -> Mode {
        classify_mode(MODES, self.transport, None)
    }

    fn is_same_trip(&self, _other: &Self) -> bool {
        false
    }

    fn is_tap_on(&self) -> bool {
        true
    }

    fn is_valid(&self) -> bool {
        self.transport != TRANSPORT_NONE
    }

    fn agency_name(&self) -> Option<String> {
        Some(match self.mode() {
            Mode::Metro => "Moscow Metro".to_string(),
            Mode::Train => "MCC".to_string(),
            _ => "Mosgortrans".to_string(),
        })
    }

    fn machine_id(&self) -> Option<String> {
        Some(format!("{:04X}", self.validator))
    }
}

/// Sector data (blocks 0-2 concatenated) for a card, or `None`.
fn sector_data(card: &Card) -> Option<Vec<u8>> {
    let sector = card.as_classic()?.sector(SECTOR)?;
    Some(sector.read_blocks(0..3))
}

pub fn layout(data: &[u8]) -> (u32, Option<u32>) {
    let layout = get_bits(data, 52, 4);
    let sub = (layout == LAYOUT_PURSE).then(|| get_bits(data, 56, 5));
    (layout, sub)
}

pub fn parse(data: &[u8]) -> Result<TroikaRecord> {
    match layout(data) {
        (LAYOUT_PURSE, Some(SUB_E3)) => {
            let positive = get_bits(data, 187, 1) == 1;
            Ok(TroikaRecord::Purse {
                sub_layout: SUB_E3,
                balance: sign_magnitude(positive, get_bits(data, 188, 22), 22),
                expiry: plus_days(epoch(1992, 1, 1), get_bits(data, 61, 16)),
                validation: TroikaValidation::parse(data, epoch(2016, 1, 1)),
            })
        }
        (LAYOUT_PURSE, Some(SUB_E5)) => Ok(TroikaRecord::Purse {
            sub_layout: SUB_E5,
            balance: get_bits(data, 167, 19) as i64,
            expiry: plus_days(epoch(2019, 1, 1), get_bits(data, 61, 13)),
            validation: TroikaValidation::parse(data, epoch(2019, 1, 1)),
        }),
        (LAYOUT_TICKET, _) => {
            let valid_from = plus_days(epoch(1992, 1, 1), get_bits(data, 67, 16));
            let days = get_bits(data, 83, 9) as i64;
            let trips = get_bits(data, 101, 10);
            Ok(TroikaRecord::Ticket(Subscription {
                name: Some("Troika ticket".to_string()),
                agency: Some("Moscow Metro".to_string()),
                valid_from,
                valid_to: valid_from
                    .filter(|_| days > 0)
                    .and_then(|d| d.checked_add_signed(Duration::days(days - 1))),
                remaining_trips: Some(trips),
                ..Default::default()
            }))
        }
        (layout, sub) => Err(TransitError::UnknownLayout {
            scheme: NAME,
            layout: (layout << 8) | sub.unwrap_or(0),
        }),
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct TroikaDecoder;

impl CardDecoder for TroikaDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn family(&self) -> &'static str {
        "MIFARE Classic"
    }

    fn matches(&self, card: &Card) -> bool {
        sector_data(card).is_some_and(|data| get_bits(&data, 0, 10) == HEADER)
    }

    fn identity(&self, card: &Card) -> Result<TransitIdentity> {
        let data = sector_data(card).ok_or(TransitError::MissingSector(SECTOR))?;
        let serial = get_bits(&data, 20, 32);
        Ok(TransitIdentity::new(NAME, Some(serial.to_string())))
    }

    fn decode_info(&self, card: &Card) -> Result<TransitInfo> {
        let data = sector_data(card).ok_or(TransitError::MissingSector(SECTOR))?;
        let mut info = TransitInfo::new(self.identity(card)?);

        match parse(&data)? {
            TroikaRecord::Purse {
                sub_layout,
                balance,
                expiry,
                validation,
            } => {
                info.balances
                    .push(TransitBalance::new(TransitCurrency::rub(balance)).valid_to(expiry));
                info.trips = Some(merge_trips(validation.into_iter().collect()));
                info.extra_info
                    .push(ExtraInfo::new("Layout", format!("E/{sub_layout}")));
            }
            TroikaRecord::Ticket(ticket) => {
                info.subscriptions = Some(vec![ticket]);
                info.extra_info.push(ExtraInfo::new("Layout", "A"));
            }
        }
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
