//! Suica (and compatible Japanese IC cards) on FeliCa.
//!
//! System 0x0003, history service 0x090f: 16-byte blocks, newest first. Each
//! block stores the balance after the event, so the fare of a block is the
//! drop from the next (older) block's balance.

use chrono::{NaiveDate, NaiveDateTime};

use crate::bits::{byte_int, byte_int_le, get_bits};
use crate::card::{Card, FelicaService};
use crate::currency::{TransitBalance, TransitCurrency};
use crate::info::{ExtraInfo, TransitIdentity, TransitInfo};
use crate::merge::merge_trips;
use crate::registry::CardDecoder;
use crate::station::{Station, StationEntry, StationTable};
use crate::trip::{sort_trips, Mode, Transaction};
use crate::types::{is_all, Result, TransitError};

pub const NAME: &str = "Suica";

pub const SYSTEM_CODE: u16 = 0x0003;
pub const HISTORY_SERVICE: u16 = 0x090f;

const BLOCK_SIZE: usize = 16;

/// Console (terminal) types and the mode they imply.
const CONSOLES: &[(u8, &str, Mode)] = &[
    (0x03, "Fare adjustment machine", Mode::TicketMachine),
    (0x05, "Bus", Mode::Bus),
    (0x07, "Ticket machine", Mode::TicketMachine),
    (0x08, "Ticket machine", Mode::TicketMachine),
    (0x12, "Ticket machine", Mode::TicketMachine),
    (0x16, "Ticket gate", Mode::Train),
    (0x17, "Simple gate", Mode::Train),
    (0x1a, "Gate terminal", Mode::Train),
    (0x1b, "Mobile phone", Mode::Other),
    (0x46, "Shop", Mode::Pos),
    (0xc7, "Vending machine", Mode::VendingMachine),
    (0xc8, "Shop", Mode::Pos),
];

const PROCESS_CHARGE: u8 = 0x02;

/// Keyed by `(line << 8) | station`.
const JR_EAST: StationTable = StationTable {
    company: "JR East",
    entries: &[
        StationEntry { id: 0x2501, name: "Tokyo", line: Some("Yamanote"), lat: Some(35.6812), lon: Some(139.7671) },
        StationEntry { id: 0x2502, name: "Kanda", line: Some("Yamanote"), lat: Some(35.6918), lon: Some(139.7709) },
        StationEntry { id: 0x2503, name: "Akihabara", line: Some("Yamanote"), lat: Some(35.6984), lon: Some(139.7731) },
        StationEntry { id: 0x250a, name: "Shinjuku", line: Some("Yamanote"), lat: Some(35.6896), lon: Some(139.7006) },
        StationEntry { id: 0x2510, name: "Shibuya", line: Some("Yamanote"), lat: Some(35.6580), lon: Some(139.7016) },
    ],
};

fn console_mode(console: u8) -> Mode {
    CONSOLES
        .iter()
        .find(|(code, _, _)| *code == console)
        .map(|(_, _, mode)| *mode)
        .unwrap_or(Mode::Other)
}

fn is_shop(console: u8) -> bool {
    matches!(console_mode(console), Mode::Pos | Mode::VendingMachine)
}

// ---------------------------------------------------------------------------
// History blocks
// ---------------------------------------------------------------------------

/// One history block, before pairing with its older neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuicaRecord {
    pub console: u8,
    pub process: u8,
    pub timestamp: Option<NaiveDateTime>,
    pub entry: Option<u32>,
    pub exit: Option<u32>,
    pub balance: u32,
    pub sequence: u32,
    pub region: u8,
}

impl SuicaRecord {
    /// Unused (all-zero) or short blocks yield `None`.
    pub fn parse(block: &[u8]) -> Option<Self> {
        if block.len() < BLOCK_SIZE || is_all(block, 0) {
            return None;
        }
        let console = block[0];
        let year = get_bits(block, 32, 7) as i32 + 2000;
        let month = get_bits(block, 39, 4);
        let day = get_bits(block, 43, 5);
        let date = NaiveDate::from_ymd_opt(year, month, day);

        let shop = is_shop(console);
        let timestamp = if shop {
            let hour = get_bits(block, 48, 5);
            let minute = get_bits(block, 53, 6);
            date.and_then(|d| d.and_hms_opt(hour, minute, 0))
        } else {
            date.and_then(|d| d.and_hms_opt(0, 0, 0))
        };

        let station = |line: usize| {
            let id = byte_int(block, line, 2) as u32;
            (!shop && id != 0).then_some(id)
        };

        Some(SuicaRecord {
            console,
            process: block[1],
            timestamp,
            entry: station(6),
            exit: station(8),
            balance: byte_int_le(block, 10, 2) as u32,
            sequence: byte_int(block, 13, 2) as u32,
            region: block[15],
        })
    }

    fn is_rail(&self) -> bool {
        console_mode(self.console) == Mode::Train
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Entry,
    Exit,
    Standalone,
}

/// One merge input: a rail record contributes an entry and an exit side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuicaTransaction {
    pub record: SuicaRecord,
    pub side: Side,
    /// Yen paid, negative for charges. `None` for the oldest record.
    pub fare: Option<i64>,
}

impl Transaction for SuicaTransaction {
    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.record.timestamp
    }

    fn fare(&self) -> Option<TransitCurrency> {
        match self.side {
            Side::Entry => None,
            _ => self.fare.map(TransitCurrency::jpy),
        }
    }

    fn station(&self) -> Option<Station> {
        let id = match self.side {
            Side::Entry | Side::Standalone => self.record.entry,
            Side::Exit => self.record.exit,
        }?;
        Some(JR_EAST.station(id))
    }

    fn mode(&self) -> Mode {
        console_mode(self.record.console)
    }

    fn is_same_trip(&self, other: &Self) -> bool {
        self.record.sequence == other.record.sequence
    }

    fn is_tap_on(&self) -> bool {
        self.side == Side::Entry
    }

    fn is_tap_off(&self) -> bool {
        self.side == Side::Exit
    }

    fn is_transparent(&self) -> bool {
        self.mode().is_transparent() || self.record.process == PROCESS_CHARGE
    }

    fn is_valid(&self) -> bool {
        self.record.timestamp.is_some()
    }

    fn agency_name(&self) -> Option<String> {
        self.station().and(Some(JR_EAST.company.to_string()))
    }

    fn machine_id(&self) -> Option<String> {
        Some(format!("{:02X}/{:02X}", self.record.console, self.record.region))
    }
}

/// Expand newest-first records into merge inputs with derived fares.
pub fn transactions(records: &[SuicaRecord]) -> Vec<SuicaTransaction> {
    let mut out = Vec::with_capacity(records.len() * 2);
    for (i, record) in records.iter().enumerate() {
        let fare = records
            .get(i + 1)
            .map(|older| older.balance as i64 - record.balance as i64);
        let sides: &[Side] = if record.is_rail() {
            &[Side::Entry, Side::Exit]
        } else {
            &[Side::Standalone]
        };
        out.extend(sides.iter().map(|&side| SuicaTransaction {
            record: record.clone(),
            side,
            fare,
        }));
    }
    out
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct SuicaDecoder;

impl SuicaDecoder {
    fn history(card: &Card) -> Result<&FelicaService> {
        card.as_felica()
            .ok_or(TransitError::WrongFamily {
                decoder: NAME,
                family: card.family(),
            })?
            .system(SYSTEM_CODE)
            .and_then(|s| s.service(HISTORY_SERVICE))
            .ok_or(TransitError::MissingRecord("Suica history service"))
    }
}

impl CardDecoder for SuicaDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn family(&self) -> &'static str {
        "FeliCa"
    }

    fn matches(&self, card: &Card) -> bool {
        Self::history(card).is_ok()
    }

    /// No serial number is readable without keys.
    fn identity(&self, card: &Card) -> Result<TransitIdentity> {
        Self::history(card)?;
        Ok(TransitIdentity::new(NAME, None))
    }

    fn decode_info(&self, card: &Card) -> Result<TransitInfo> {
        let history = Self::history(card)?;
        let mut info = TransitInfo::new(self.identity(card)?);

        let records: Vec<SuicaRecord> = history
            .blocks
            .iter()
            .filter_map(|b| SuicaRecord::parse(b))
            .collect();
        let newest = records
            .first()
            .ok_or(TransitError::MissingRecord("Suica history"))?;
        info.balances
            .push(TransitBalance::new(TransitCurrency::jpy(newest.balance as i64)));
        info.extra_info
            .push(ExtraInfo::new("Last sequence", newest.sequence));
        info.extra_info
            .push(ExtraInfo::new("History entries", records.len()));

        let mut trips = merge_trips(transactions(&records));
        sort_trips(&mut trips);
        info.trips = Some(trips);
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
