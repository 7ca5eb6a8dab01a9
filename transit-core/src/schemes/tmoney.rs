//! T-money (South Korea), an ISO7816 purse application.

use chrono::{NaiveDate, NaiveDateTime};

use crate::bits::{bcd_byte, bcd_to_int, byte_int};
use crate::card::{find_tlv, AppSelection, Card, FileSelector, Iso7816Application};
use crate::currency::{TransitBalance, TransitCurrency};
use crate::info::{ExtraInfo, TransitIdentity, TransitInfo};
use crate::merge::merge_trips;
use crate::registry::CardDecoder;
use crate::station::Station;
use crate::trip::{classify_mode, sort_trips, Mode, ModeRule, Transaction};
use crate::types::{is_all, Result, TransitError};

pub const NAME: &str = "T-Money";

pub const AID: [u8; 7] = [0xD4, 0x10, 0x00, 0x00, 0x03, 0x00, 0x01];

/// Proprietary GET BALANCE.
pub const GET_BALANCE: [u8; 5] = [0x90, 0x4C, 0x00, 0x00, 0x04];

const PURSE_INFO_TAG: u16 = 0xB0;
const HISTORY_SFI: u8 = 4;
const RECORD_SIZE: usize = 46;

pub const SELECTION: AppSelection = AppSelection {
    name: NAME,
    aid: &AID,
    reads: &[
        FileSelector::Records {
            sfi: HISTORY_SFI,
            records: 20,
        },
        FileSelector::Command(&GET_BALANCE),
    ],
};

pub const TYPE_RIDE: u8 = 1;
pub const TYPE_TOP_UP: u8 = 2;

const MODES: &[ModeRule] = &[
    ModeRule::new(TYPE_RIDE as u32, Mode::Bus),
    ModeRule::new(TYPE_TOP_UP as u32, Mode::TicketMachine),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmoneyTransaction {
    pub kind: u8,
    pub balance: u32,
    pub counter: u32,
    pub amount: u32,
    pub timestamp: Option<NaiveDateTime>,
    pub valid: bool,
}

/// `YYYYMMDDhhmmss` in 7 BCD bytes.
fn bcd_timestamp(data: &[u8]) -> Option<NaiveDateTime> {
    if data.len() < 7 {
        return None;
    }
    let year = bcd_to_int(&data[0..2])? as i32;
    let mut fields = data[2..7].iter().map(|&b| bcd_byte(b));
    let mut next = || fields.next().flatten();
    let (month, day) = (next()?, next()?);
    let (hour, minute, second) = (next()?, next()?, next()?);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

impl TmoneyTransaction {
    pub fn parse(record: &[u8]) -> Self {
        let blank = record.len() < RECORD_SIZE || is_all(record, 0) || is_all(record, 0xFF);
        let timestamp = record.get(26..33).and_then(bcd_timestamp);
        TmoneyTransaction {
            kind: record.first().copied().unwrap_or(0),
            balance: byte_int(record, 2, 4) as u32,
            counter: byte_int(record, 6, 4) as u32,
            amount: byte_int(record, 10, 4) as u32,
            timestamp,
            valid: !blank,
        }
    }
}

impl Transaction for TmoneyTransaction {
    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    fn fare(&self) -> Option<TransitCurrency> {
        let amount = TransitCurrency::krw(self.amount as i64);
        Some(if self.kind == TYPE_TOP_UP {
            amount.negate()
        } else {
            amount
        })
    }

    fn station(&self) -> Option<Station> {
        None
    }

    fn mode(&self) -> Mode {
        classify_mode(MODES, self.kind as u32, None)
    }

    fn is_same_trip(&self, _other: &Self) -> bool {
        false
    }

    fn is_tap_on(&self) -> bool {
        self.kind == TYPE_RIDE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn machine_id(&self) -> Option<String> {
        Some(format!("#{}", self.counter))
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct TmoneyDecoder;

impl TmoneyDecoder {
    fn app(card: &Card) -> Result<&Iso7816Application> {
        card.as_iso7816()
            .ok_or(TransitError::WrongFamily {
                decoder: NAME,
                family: card.family(),
            })?
            .application(&AID)
            .ok_or(TransitError::MissingRecord("T-money application"))
    }
}

impl CardDecoder for TmoneyDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn family(&self) -> &'static str {
        "ISO7816"
    }

    fn matches(&self, card: &Card) -> bool {
        Self::app(card).is_ok()
    }

    fn identity(&self, card: &Card) -> Result<TransitIdentity> {
        let app = Self::app(card)?;
        let serial = find_tlv(&app.fci, PURSE_INFO_TAG)
            .and_then(|info| info.get(4..12))
            .and_then(bcd_to_int)
            .map(|n| format!("{n:016}"));
        Ok(TransitIdentity::new(NAME, serial))
    }

    fn decode_info(&self, card: &Card) -> Result<TransitInfo> {
        let app = Self::app(card)?;
        let mut info = TransitInfo::new(self.identity(card)?);

        let balance = app
            .response(&GET_BALANCE)
            .ok_or(TransitError::MissingRecord("T-money balance"))?;
        if balance.len() < 4 {
            return Err(TransitError::Truncated {
                what: "T-money balance",
                expected: 4,
                actual: balance.len(),
            });
        }
        info.balances.push(TransitBalance::new(TransitCurrency::krw(
            byte_int(balance, 0, 4) as i64,
        )));

        let transactions: Vec<TmoneyTransaction> = app
            .sfi(HISTORY_SFI)
            .map(|f| f.records.iter().map(|r| TmoneyTransaction::parse(r)).collect())
            .unwrap_or_default();
        if let Some(last) = transactions.iter().filter(|t| t.valid).map(|t| t.counter).max() {
            info.extra_info.push(ExtraInfo::new("Transaction counter", last));
        }

        let mut trips = merge_trips(transactions);
        sort_trips(&mut trips);
        info.trips = Some(trips);
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
