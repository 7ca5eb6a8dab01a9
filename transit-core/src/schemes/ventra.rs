//! Ventra (Chicago) single-use and limited-use tickets on MIFARE Ultralight.
//!
//! Pages 8-11 and 12-15 hold two rotating 16-byte trip records; the newer one
//! (higher sequence number) carries the current balance.

use chrono::NaiveDateTime;

use crate::bits::{get_bits, BitCursor};
use crate::card::{Card, UltralightCard};
use crate::currency::{TransitBalance, TransitCurrency};
use crate::info::{ExtraInfo, TransitIdentity, TransitInfo};
use crate::merge::merge_trips;
use crate::registry::CardDecoder;
use crate::schemes::{at_minutes, epoch, plus_days};
use crate::station::{Station, StationEntry, StationTable};
use crate::trip::{classify_mode, sort_trips, Mode, ModeRule, Transaction};
use crate::types::{hex_encode, is_all, Result, TransitError};

pub const NAME: &str = "Ventra";

const MIN_PAGES: usize = 16;
const PRODUCT_PAGE: usize = 4;
const CARD_TYPE: u8 = 0x0A;
const CTA_REGIONAL: u32 = 0x0064;
const RECORD_PAGES: [usize; 2] = [8, 12];

pub const OPERATOR_CTA: u32 = 0x01;
pub const OPERATOR_PACE: u32 = 0x02;
pub const OPERATOR_METRA: u32 = 0x03;

/// CTA locations from 0x4000 up are rail stations.
const MODES: &[ModeRule] = &[
    ModeRule::with_range(OPERATOR_CTA, Mode::Bus, 0x4000, 0xFFFF, Mode::Metro),
    ModeRule::new(OPERATOR_PACE, Mode::Bus),
    ModeRule::new(OPERATOR_METRA, Mode::Train),
];

const CTA_STATIONS: StationTable = StationTable {
    company: "CTA",
    entries: &[
        StationEntry { id: 0x4001, name: "Clark/Lake", line: Some("Blue"), lat: Some(41.8857), lon: Some(-87.6309) },
        StationEntry { id: 0x4002, name: "Jackson", line: Some("Red"), lat: Some(41.8782), lon: Some(-87.6276) },
        StationEntry { id: 0x4003, name: "O'Hare", line: Some("Blue"), lat: Some(41.9773), lon: Some(-87.9043) },
        StationEntry { id: 0x4004, name: "Midway", line: Some("Orange"), lat: Some(41.7867), lon: Some(-87.7375) },
    ],
};

fn operator_name(op: u32) -> String {
    match op {
        OPERATOR_CTA => "CTA".to_string(),
        OPERATOR_PACE => "Pace".to_string(),
        OPERATOR_METRA => "Metra".to_string(),
        _ => format!("Operator {op:#04x}"),
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VentraRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub transfer: bool,
    pub route: u32,
    pub operator: u32,
    pub location: u32,
    /// Balance after this use, cents.
    pub balance: u32,
    pub fare: u32,
    pub sequence: u32,
    pub valid: bool,
}

impl VentraRecord {
    pub fn parse(data: &[u8]) -> Self {
        let mut c = BitCursor::new(data);
        let days = c.read(16);
        let minutes = c.read(11);
        let transfer = c.read_bool();
        c.skip(4);
        VentraRecord {
            timestamp: plus_days(epoch(2000, 1, 1), days).and_then(|d| at_minutes(d, minutes)),
            transfer,
            route: c.read(16),
            operator: c.read(8),
            location: c.read(16),
            balance: c.read(16),
            fare: c.read(16),
            sequence: c.read(16),
            valid: !is_all(data, 0) && !c.overran(),
        }
    }
}

impl Transaction for VentraRecord {
    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    fn fare(&self) -> Option<TransitCurrency> {
        Some(TransitCurrency::usd(self.fare as i64))
    }

    fn station(&self) -> Option<Station> {
        match self.mode() {
            Mode::Metro => Some(CTA_STATIONS.station(self.location)),
            _ => None,
        }
    }

    fn mode(&self) -> Mode {
        classify_mode(MODES, self.operator, Some(self.location))
    }

    fn is_same_trip(&self, _other: &Self) -> bool {
        false
    }

    fn is_tap_on(&self) -> bool {
        true
    }

    fn is_transfer(&self) -> bool {
        self.transfer
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn agency_name(&self) -> Option<String> {
        Some(operator_name(self.operator))
    }

    fn route_name(&self) -> Option<String> {
        (self.route != 0).then(|| self.route.to_string())
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct VentraDecoder;

impl VentraDecoder {
    fn ultralight(card: &Card) -> Result<&UltralightCard> {
        card.as_ultralight().ok_or(TransitError::WrongFamily {
            decoder: NAME,
            family: card.family(),
        })
    }
}

impl CardDecoder for VentraDecoder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn family(&self) -> &'static str {
        "MIFARE Ultralight"
    }

    fn matches(&self, card: &Card) -> bool {
        let Some(ul) = card.as_ultralight() else {
            return false;
        };
        ul.pages.len() >= MIN_PAGES
            && ul.page(PRODUCT_PAGE).is_some_and(|p| {
                p.first() == Some(&CARD_TYPE) && get_bits(p, 16, 16) == CTA_REGIONAL
            })
    }

    fn identity(&self, card: &Card) -> Result<TransitIdentity> {
        let ul = Self::ultralight(card)?;
        let uid: Vec<u8> = match (ul.page(0), ul.page(1)) {
            (Some(p0), Some(p1)) if p0.len() >= 3 && p1.len() >= 4 => {
                p0[..3].iter().chain(&p1[..4]).copied().collect()
            }
            _ => return Err(TransitError::MissingRecord("Ventra UID pages")),
        };
        Ok(TransitIdentity::new(NAME, Some(hex_encode(&uid))))
    }

    fn decode_info(&self, card: &Card) -> Result<TransitInfo> {
        let ul = Self::ultralight(card)?;
        let mut info = TransitInfo::new(self.identity(card)?);

        let records: Vec<VentraRecord> = RECORD_PAGES
            .iter()
            .map(|&start| VentraRecord::parse(&ul.read_pages(start, 4)))
            .collect();

        let newest = records
            .iter()
            .filter(|r| r.valid)
            .max_by_key(|r| r.sequence);
        let balance = newest.map(|r| r.balance as i64).unwrap_or(0);
        info.balances
            .push(TransitBalance::new(TransitCurrency::usd(balance)));
        if let Some(r) = newest {
            info.extra_info.push(ExtraInfo::new("Sequence", r.sequence));
        }

        let mut trips = merge_trips(records);
        sort_trips(&mut trips);
        info.trips = Some(trips);
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_matches() {
        assert!(VentraDecoder.matches(&fixtures::ventra_card()));
        assert!(!VentraDecoder.matches(&fixtures::clipper_card()));

        let mut short = fixtures::ventra_card();
        if let Card::Ultralight(ul) = &mut short {
            ul.pages.truncate(12);
        }
        assert!(!VentraDecoder.matches(&short));

        let mut other_product = fixtures::ventra_card();
        if let Card::Ultralight(ul) = &mut other_product {
            ul.pages[PRODUCT_PAGE][3] = 0x65;
        }
        assert!(!VentraDecoder.matches(&other_product));
    }

    #[test]
    fn test_identity_uid() {
        let id = VentraDecoder.identity(&fixtures::ventra_card()).unwrap();
        assert_eq!(id.name, "Ventra");
        assert_eq!(id.serial.as_deref(), Some("04A1B2C3D4E5F6"));
    }

    #[test]
    fn test_balance_from_newest_record() {
        let info = VentraDecoder.decode_info(&fixtures::ventra_card()).unwrap();
        assert_eq!(info.balances[0].balance, TransitCurrency::usd(844));
        assert_eq!(info.balances[0].balance.to_string(), "$8.44");
    }

    #[test]
    fn test_trips() {
        let info = VentraDecoder.decode_info(&fixtures::ventra_card()).unwrap();
        let trips = info.trips.unwrap();
        assert_eq!(trips.len(), 2);

        // Newest first: bus transfer, then the rail ride
        assert_eq!(trips[0].mode(), Mode::Bus);
        assert!(trips[0].start().unwrap().flags.transfer);
        assert_eq!(trips[0].start().unwrap().route.as_deref(), Some("22"));
        assert_eq!(
            trips[0].start_timestamp().map(|t| t.to_string()).as_deref(),
            Some("2024-03-14 08:05:00")
        );

        assert_eq!(trips[1].mode(), Mode::Metro);
        assert_eq!(trips[1].start_station().map(|s| s.name()).as_deref(), Some("Clark/Lake"));
        assert_eq!(trips[1].fare(), Some(TransitCurrency::usd(250)));
    }

    #[test]
    fn test_empty_record_is_invalid() {
        let record = VentraRecord::parse(&[0u8; 16]);
        assert!(!record.is_valid());
        assert!(!VentraRecord::parse(&[0u8; 8]).is_valid());
    }

    #[test]
    fn test_blank_ticket_has_zero_balance() {
        let mut card = fixtures::ventra_card();
        if let Card::Ultralight(ul) = &mut card {
            for page in &mut ul.pages[8..16] {
                page.fill(0);
            }
        }
        let info = VentraDecoder.decode_info(&card).unwrap();
        assert_eq!(info.balances[0].balance, TransitCurrency::usd(0));
        assert!(info.trips.unwrap().is_empty());
    }
}
