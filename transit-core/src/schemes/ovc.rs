//! OV-chipkaart (Netherlands) on MIFARE Classic 4K.
//!
//! Sector 39 holds the index and two credit copies; sectors 35-37 the
//! transaction log; sectors 32-33 the subscriptions. Transaction records use a
//! 12-bit presence mask: only fields whose bit is set are stored, packed in
//! mask order, and the subscription field is itself a nested 4-bit mask.

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::bits::{byte_int, sign_magnitude, BitCursor};
use crate::card::{Card, ClassicCard};
use crate::currency::{TransitBalance, TransitCurrency};
use crate::info::{ExtraInfo, TransitIdentity, TransitInfo};
use crate::merge::merge_trips;
use crate::registry::CardDecoder;
use crate::schemes::{at_minutes, epoch, plus_days};
use crate::station::{Station, StationEntry, StationTable};
use crate::subscription::Subscription;
use crate::trip::{classify_mode, sort_trips, FarePolicy, Mode, ModeRule, Transaction};
use crate::types::{is_all, Result, TransitError};

pub const NAME: &str = "OV-chipkaart";

/// Start of sector 0 block 1 on every OV-chipkaart.
const MAGIC: [u8; 12] = [
    0x84, 0x00, 0x00, 0x00, 0x00, 0x06, 0x03, 0xA0, 0x00, 0x13, 0xAE, 0xE4,
];

const SECTOR_COUNT: usize = 40;
const INDEX_SECTOR: usize = 39;
const CREDIT_BLOCK: usize = 9;
const TRANSACTION_SECTORS: std::ops::RangeInclusive<usize> = 35..=37;
const RECORDS_PER_SECTOR: usize = 7;
const SUBSCRIPTION_SECTORS: std::ops::RangeInclusive<usize> = 32..=33;

/// Checkouts before this minute of the next day still belong to the
/// previous service day.
const SERVICE_DAY_CUTOFF: u32 = 4 * 60;

/// Presence mask bits this decoder understands.
const KNOWN_FIELDS: u32 = 0x1FF;

fn ovc_epoch() -> NaiveDateTime {
    epoch(1997, 1, 1)
}

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

pub const COMPANY_CONNEXXION: u32 = 0x01;
pub const COMPANY_GVB: u32 = 0x02;
pub const COMPANY_HTM: u32 = 0x03;
pub const COMPANY_NS: u32 = 0x04;
pub const COMPANY_RET: u32 = 0x05;
pub const COMPANY_ARRIVA: u32 = 0x08;
pub const COMPANY_QBUZZ: u32 = 0x0a;
pub const COMPANY_RESELLER: u32 = 0x19;

const COMPANY_NAMES: &[(u32, &str)] = &[
    (0x00, "TLS"),
    (COMPANY_CONNEXXION, "Connexxion"),
    (COMPANY_GVB, "GVB"),
    (COMPANY_HTM, "HTM"),
    (COMPANY_NS, "NS"),
    (COMPANY_RET, "RET"),
    (COMPANY_ARRIVA, "Arriva"),
    (COMPANY_QBUZZ, "Qbuzz"),
    (COMPANY_RESELLER, "Reseller"),
];

/// GVB and RET stops below 0x0100 are metro stations; above are tram/bus stops.
const MODES: &[ModeRule] = &[
    ModeRule::new(COMPANY_CONNEXXION, Mode::Bus),
    ModeRule::with_range(COMPANY_GVB, Mode::Tram, 0x0000, 0x00FF, Mode::Metro),
    ModeRule::new(COMPANY_HTM, Mode::Tram),
    ModeRule::new(COMPANY_NS, Mode::Train),
    ModeRule::with_range(COMPANY_RET, Mode::Bus, 0x0000, 0x00FF, Mode::Metro),
    ModeRule::new(COMPANY_ARRIVA, Mode::Bus),
    ModeRule::new(COMPANY_QBUZZ, Mode::Bus),
    ModeRule::new(COMPANY_RESELLER, Mode::Pos),
];

const NS_STATIONS: StationTable = StationTable {
    company: "NS",
    entries: &[
        StationEntry { id: 0x0001, name: "Amsterdam Centraal", line: None, lat: Some(52.3789), lon: Some(4.9003) },
        StationEntry { id: 0x0002, name: "Utrecht Centraal", line: None, lat: Some(52.0894), lon: Some(5.1101) },
        StationEntry { id: 0x0003, name: "Rotterdam Centraal", line: None, lat: Some(51.9249), lon: Some(4.4690) },
        StationEntry { id: 0x0004, name: "Den Haag Centraal", line: None, lat: Some(52.0808), lon: Some(4.3250) },
        StationEntry { id: 0x0005, name: "Schiphol Airport", line: None, lat: Some(52.3094), lon: Some(4.7622) },
    ],
};

const GVB_STATIONS: StationTable = StationTable {
    company: "GVB",
    entries: &[
        StationEntry { id: 0x0010, name: "Centraal Station", line: Some("52"), lat: Some(52.3779), lon: Some(4.9006) },
        StationEntry { id: 0x0011, name: "Rokin", line: Some("52"), lat: Some(52.3690), lon: Some(4.8925) },
        StationEntry { id: 0x0012, name: "Vijzelgracht", line: Some("52"), lat: Some(52.3597), lon: Some(4.8909) },
        StationEntry { id: 0x0013, name: "De Pijp", line: Some("52"), lat: Some(52.3540), lon: Some(4.8920) },
    ],
};

/// Subscription product names by id.
const SUBSCRIPTION_NAMES: &[(u32, &str)] = &[
    (0x0005, "OV-jaarkaart"),
    (0x0007, "OV-Bijkaart 1e klas"),
    (0x0011, "NS Businesscard"),
    (0x0019, "Voordeelurenabonnement"),
    (0x00af, "Studenten OV-chipkaart week"),
    (0x00b0, "Studenten OV-chipkaart weekend"),
];

pub fn company_name(company: u32) -> String {
    COMPANY_NAMES
        .iter()
        .find(|(id, _)| *id == company)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Company {company:#04x}"))
}

fn subscription_name(id: u32) -> String {
    SUBSCRIPTION_NAMES
        .iter()
        .find(|(code, _)| *code == id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Subscription {id:#06x}"))
}

fn station_for(company: u32, id: u32) -> Station {
    match company {
        COMPANY_NS => NS_STATIONS.station(id),
        COMPANY_GVB => GVB_STATIONS.station(id),
        _ => Station::Unknown { id },
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub const TYPE_CHECK_IN: u32 = 0x01;
pub const TYPE_CHECK_OUT: u32 = 0x02;
pub const TYPE_TRANSFER: u32 = 0x06;
pub const TYPE_PURCHASE: u32 = 0x0e;

/// Subscription used by a transaction (the nested presence block).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUse {
    pub id: Option<u32>,
    pub zone: Option<u32>,
    pub valid_until: Option<NaiveDate>,
    pub trips_left: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OvcTransaction {
    /// Days since 1997-01-01.
    pub date: u32,
    /// Minutes since midnight.
    pub time: u32,
    pub kind: Option<u32>,
    pub company: Option<u32>,
    pub id: Option<u32>,
    pub station: Option<u32>,
    pub machine: Option<u32>,
    pub vehicle: Option<u32>,
    pub product: Option<u32>,
    pub amount: Option<u32>,
    pub subscription: Option<SubscriptionUse>,
    pub valid: bool,
}

impl OvcTransaction {
    /// Decode one 32-byte log record. Unused slots (all-zero, or an empty
    /// presence mask) yield `None`.
    pub fn parse(record: &[u8]) -> Option<Self> {
        if is_all(record, 0) {
            return None;
        }

        let mut c = BitCursor::new(record);
        let date = c.read(14);
        let time = c.read(11);
        let mask = c.read(12);
        if mask == 0 {
            return None;
        }

        let mut txn = OvcTransaction {
            date,
            time,
            kind: c.read_if(mask, 0, 7),
            company: c.read_if(mask, 1, 16),
            id: c.read_if(mask, 2, 24),
            station: c.read_if(mask, 3, 16),
            machine: c.read_if(mask, 4, 24),
            vehicle: c.read_if(mask, 5, 16),
            product: c.read_if(mask, 6, 5),
            amount: c.read_if(mask, 7, 16),
            subscription: None,
            valid: true,
        };

        if mask & (1 << 8) != 0 {
            let sub_mask = c.read(4);
            txn.subscription = (sub_mask != 0).then(|| SubscriptionUse {
                id: c.read_if(sub_mask, 0, 12),
                zone: c.read_if(sub_mask, 1, 8),
                valid_until: c
                    .read_if(sub_mask, 2, 14)
                    .and_then(|days| plus_days(ovc_epoch(), days)),
                trips_left: c.read_if(sub_mask, 3, 8),
            });
        }

        // Fields we cannot size make the rest of the record unreadable
        if mask & !KNOWN_FIELDS != 0 || c.overran() || date == 0 {
            tracing::debug!(mask, date, "unreadable OV-chipkaart record");
            txn.valid = false;
        }
        Some(txn)
    }

    fn service_date(&self) -> Option<NaiveDate> {
        plus_days(ovc_epoch(), self.date)
    }
}

impl Transaction for OvcTransaction {
    const FARE_POLICY: FarePolicy = FarePolicy::LastWins;

    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.service_date().and_then(|d| at_minutes(d, self.time))
    }

    fn fare(&self) -> Option<TransitCurrency> {
        let fare = TransitCurrency::eur(self.amount? as i64);
        Some(if self.kind == Some(TYPE_PURCHASE) {
            fare.negate()
        } else {
            fare
        })
    }

    fn station(&self) -> Option<Station> {
        Some(station_for(self.company?, self.station?))
    }

    fn mode(&self) -> Mode {
        if self.kind == Some(TYPE_PURCHASE) {
            return Mode::TicketMachine;
        }
        match self.company {
            Some(company) => classify_mode(MODES, company, self.station),
            None => Mode::Other,
        }
    }

    fn is_same_trip(&self, other: &Self) -> bool {
        if self.company != other.company {
            return false;
        }
        self.date == other.date
            || (other.date == self.date + 1 && other.time < SERVICE_DAY_CUTOFF)
    }

    fn is_tap_on(&self) -> bool {
        matches!(self.kind, Some(TYPE_CHECK_IN) | Some(TYPE_TRANSFER))
    }

    fn is_tap_off(&self) -> bool {
        self.kind == Some(TYPE_CHECK_OUT)
    }

    fn is_transfer(&self) -> bool {
        self.kind == Some(TYPE_TRANSFER)
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn agency_name(&self) -> Option<String> {
        self.company.map(company_name)
    }

    fn machine_id(&self) -> Option<String> {
        self.machine.map(|m| m.to_string())
    }

    fn vehicle_id(&self) -> Option<String> {
        self.vehicle.map(|v| v.to_string())
    }
}

// ---------------------------------------------------------------------------
// Index, credit, subscriptions
// ---------------------------------------------------------------------------

/// One copy of the card index (sector 39 blocks 1 and 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvcIndex {
    pub sequence: u32,
    /// 0 or 1: which credit block copy is current.
    pub credit_slot: usize,
}

impl OvcIndex {
    fn parse(block: &[u8]) -> Self {
        let mut c = BitCursor::new(block);
        OvcIndex {
            sequence: c.read(16),
            credit_slot: c.read(1) as usize,
        }
    }

    /// The more recent of the two index copies.
    pub fn current(card: &ClassicCard) -> Result<Self> {
        let sector = card
            .sector(INDEX_SECTOR)
            .ok_or(TransitError::MissingSector(INDEX_SECTOR))?;
        let a = sector
            .block(1)
            .map(Self::parse)
            .ok_or(TransitError::MissingRecord("OV-chipkaart index"))?;
        let b = sector
            .block(2)
            .map(Self::parse)
            .ok_or(TransitError::MissingRecord("OV-chipkaart index"))?;
        Ok(if b.sequence > a.sequence { b } else { a })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvcCredit {
    pub id: u32,
    pub credit_id: u32,
    /// Euro cents, negative when the card is overdrawn.
    pub credit: i64,
}

impl OvcCredit {
    pub fn parse(block: &[u8]) -> Result<Self> {
        let truncated = || TransitError::Truncated {
            what: "OV-chipkaart credit block",
            expected: 12,
            actual: block.len(),
        };
        let mut c = BitCursor::at(block, 9);
        let id = c.try_read(12).map_err(|_| truncated())?;
        c.skip(56 - c.offset());
        let credit_id = c.try_read(12).map_err(|_| truncated())?;
        c.skip(77 - c.offset());
        let positive = c.try_read(1).map_err(|_| truncated())? == 1;
        let magnitude = c.try_read(15).map_err(|_| truncated())?;
        Ok(OvcCredit {
            id,
            credit_id,
            credit: sign_magnitude(positive, magnitude, 15),
        })
    }
}

/// Decode one subscription block. Empty slots (id 0) yield `None`.
pub fn parse_subscription(block: &[u8]) -> Option<Subscription> {
    let mut c = BitCursor::new(block);
    let id = c.read(12);
    if id == 0 {
        return None;
    }
    let from = c.read(14);
    let to = c.read(14);
    let machine = c.read(24);
    let zone = c.read(8);
    let trips = c.read(8);

    Some(Subscription {
        id: Some(id),
        name: Some(subscription_name(id)),
        agency: None,
        valid_from: plus_days(ovc_epoch(), from),
        valid_to: plus_days(ovc_epoch(), to),
        machine_id: (machine != 0).then_some(machine),
        zones: if zone == 0 { Vec::new() } else { vec![zone] },
        // 0xFF marks an unlimited product
        remaining_trips: (trips != 0xFF).then_some(trips),
        total_trips: None,
    })
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct OvcDecoder;

impl OvcDecoder {
    fn classic(card: &Card) -> Result<&ClassicCard> {
        card.as_classic().ok_or(TransitError::WrongFamily {
            decoder: NAME,
            family: card.family(),
        })
    }

    fn transactions(card: &ClassicCard) -> Vec<OvcTransaction> {
        TRANSACTION_SECTORS
            .filter_map(|s| card.sector(s))
            .flat_map(|sector| {
                (0..RECORDS_PER_SECTOR).map(move |r| sector.read_blocks(r * 2..r * 2 + 2))
            })
            .filter_map(|record| OvcTransaction::parse(&record))
            .collect()
    }

    fn subscriptions(card: &ClassicCard) -> Vec<Subscription> {
        SUBSCRIPTION_SECTORS
            .filter_map(|s| card.sector(s))
            .flat_map(|sector| {
                (0..sector.data_block_count()).filter_map(move |b| sector.block(b))
            })
            .filter_map(parse_subscription)
            .collect()
    }
}

impl CardDecoder for OvcDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn family(&self) -> &'static str {
        "MIFARE Classic 4K"
    }

    fn matches(&self, card: &Card) -> bool {
        let Some(classic) = card.as_classic() else {
            return false;
        };
        classic.sectors.len() == SECTOR_COUNT
            && classic
                .block(0, 1)
                .is_some_and(|b| b.starts_with(&MAGIC))
    }

    fn identity(&self, card: &Card) -> Result<TransitIdentity> {
        let classic = Self::classic(card)?;
        let block = classic
            .block(0, 0)
            .ok_or(TransitError::MissingSector(0))?;
        let serial = byte_int(block, 0, 4);
        Ok(TransitIdentity::new(NAME, Some(serial.to_string())))
    }

    fn decode_info(&self, card: &Card) -> Result<TransitInfo> {
        let classic = Self::classic(card)?;
        let mut info = TransitInfo::new(self.identity(card)?);

        let index = OvcIndex::current(classic)?;
        let credit_block = classic
            .block(INDEX_SECTOR, CREDIT_BLOCK + index.credit_slot)
            .ok_or(TransitError::MissingRecord("OV-chipkaart credit"))?;
        let credit = OvcCredit::parse(credit_block)?;
        info.balances
            .push(TransitBalance::new(TransitCurrency::eur(credit.credit)));

        let transactions = Self::transactions(classic);
        let subscription_rides = transactions
            .iter()
            .filter(|t| t.subscription.is_some())
            .count();
        let last_time = transactions
            .iter()
            .filter(|t| t.valid)
            .filter_map(|t| t.timestamp())
            .max();

        let mut trips = merge_trips(transactions);
        sort_trips(&mut trips);
        info.trips = Some(trips);
        info.subscriptions = Some(Self::subscriptions(classic));

        info.extra_info.push(ExtraInfo::new("Index sequence", index.sequence));
        info.extra_info.push(ExtraInfo::new("Credit record", credit.id));
        info.extra_info.push(ExtraInfo::new("Last credit id", credit.credit_id));
        info.extra_info
            .push(ExtraInfo::new("Subscription rides", subscription_rides));
        if let Some(t) = last_time {
            info.extra_info.push(ExtraInfo::new(
                "Last use",
                format!("{} {:02}:{:02}", t.date(), t.hour(), t.minute()),
            ));
        }
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
