//! Raw card containers, as produced by a reader or loaded from a dump file.
//!
//! One variant per card family. Byte buffers (de)serialize as hex strings.
//! Accessors return `Option` and never panic on short or missing data.

use serde::{Deserialize, Serialize};

use crate::types::{hex_bytes, hex_list};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Card {
    Classic(ClassicCard),
    Ultralight(UltralightCard),
    Desfire(DesfireCard),
    Felica(FelicaCard),
    Iso7816(Iso7816Card),
}

impl Card {
    pub fn family(&self) -> &'static str {
        match self {
            Card::Classic(_) => "MIFARE Classic",
            Card::Ultralight(_) => "MIFARE Ultralight",
            Card::Desfire(_) => "DESFire",
            Card::Felica(_) => "FeliCa",
            Card::Iso7816(_) => "ISO7816",
        }
    }

    /// Anti-collision identifier (UID / IDm), possibly empty.
    pub fn tag_id(&self) -> &[u8] {
        match self {
            Card::Classic(c) => &c.tag_id,
            Card::Ultralight(c) => &c.tag_id,
            Card::Desfire(c) => &c.tag_id,
            Card::Felica(c) => &c.idm,
            Card::Iso7816(c) => &c.tag_id,
        }
    }

    pub fn as_classic(&self) -> Option<&ClassicCard> {
        match self {
            Card::Classic(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_ultralight(&self) -> Option<&UltralightCard> {
        match self {
            Card::Ultralight(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_desfire(&self) -> Option<&DesfireCard> {
        match self {
            Card::Desfire(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_felica(&self) -> Option<&FelicaCard> {
        match self {
            Card::Felica(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_iso7816(&self) -> Option<&Iso7816Card> {
        match self {
            Card::Iso7816(c) => Some(c),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// MIFARE Classic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassicCard {
    #[serde(default, with = "hex_bytes")]
    pub tag_id: Vec<u8>,
    pub sectors: Vec<ClassicSector>,
}

/// One sector: 4 or 16 blocks of 16 bytes, the last being the trailer.
/// Sectors the reader had no key for carry `unauthorized: true` and no blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassicSector {
    #[serde(default, with = "hex_list")]
    pub blocks: Vec<Vec<u8>>,
    #[serde(default)]
    pub unauthorized: bool,
}

impl ClassicCard {
    /// Sector `index`, if present and readable.
    pub fn sector(&self, index: usize) -> Option<&ClassicSector> {
        self.sectors
            .get(index)
            .filter(|s| !s.unauthorized && !s.blocks.is_empty())
    }

    pub fn block(&self, sector: usize, block: usize) -> Option<&[u8]> {
        self.sector(sector)?.block(block)
    }
}

impl ClassicSector {
    pub fn from_blocks(blocks: Vec<Vec<u8>>) -> Self {
        ClassicSector {
            blocks,
            unauthorized: false,
        }
    }

    pub fn locked() -> Self {
        ClassicSector {
            blocks: Vec::new(),
            unauthorized: true,
        }
    }

    pub fn block(&self, index: usize) -> Option<&[u8]> {
        self.blocks.get(index).map(Vec::as_slice)
    }

    /// Concatenation of the blocks in `range` (missing blocks are skipped).
    pub fn read_blocks(&self, range: std::ops::Range<usize>) -> Vec<u8> {
        range
            .filter_map(|i| self.block(i))
            .flat_map(|b| b.iter().copied())
            .collect()
    }

    /// Data blocks only, without the trailer.
    pub fn data_block_count(&self) -> usize {
        self.blocks.len().saturating_sub(1)
    }
}

// ---------------------------------------------------------------------------
// MIFARE Ultralight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UltralightCard {
    #[serde(default, with = "hex_bytes")]
    pub tag_id: Vec<u8>,
    #[serde(with = "hex_list")]
    pub pages: Vec<Vec<u8>>,
}

impl UltralightCard {
    pub fn page(&self, index: usize) -> Option<&[u8]> {
        self.pages.get(index).map(Vec::as_slice)
    }

    /// Concatenation of `count` pages from `start` (missing pages are skipped).
    pub fn read_pages(&self, start: usize, count: usize) -> Vec<u8> {
        (start..start + count)
            .filter_map(|i| self.page(i))
            .flat_map(|p| p.iter().copied())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// DESFire
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesfireCard {
    #[serde(default, with = "hex_bytes")]
    pub tag_id: Vec<u8>,
    pub applications: Vec<DesfireApplication>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesfireApplication {
    pub id: u32,
    pub files: Vec<DesfireFile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesfireFileKind {
    #[default]
    Standard,
    Backup,
    Value,
    LinearRecord,
    CyclicRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesfireFile {
    pub id: u8,
    #[serde(default)]
    pub kind: DesfireFileKind,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl DesfireCard {
    pub fn application(&self, id: u32) -> Option<&DesfireApplication> {
        self.applications.iter().find(|a| a.id == id)
    }
}

impl DesfireApplication {
    pub fn file(&self, id: u8) -> Option<&DesfireFile> {
        self.files.iter().find(|f| f.id == id)
    }
}

impl DesfireFile {
    /// Split record file contents into fixed-size records; a short tail is dropped.
    pub fn records(&self, size: usize) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(size.max(1))
    }
}

// ---------------------------------------------------------------------------
// FeliCa
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FelicaCard {
    #[serde(default, with = "hex_bytes")]
    pub idm: Vec<u8>,
    pub systems: Vec<FelicaSystem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FelicaSystem {
    pub code: u16,
    pub services: Vec<FelicaService>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FelicaService {
    pub code: u16,
    #[serde(with = "hex_list")]
    pub blocks: Vec<Vec<u8>>,
}

impl FelicaCard {
    pub fn system(&self, code: u16) -> Option<&FelicaSystem> {
        self.systems.iter().find(|s| s.code == code)
    }
}

impl FelicaSystem {
    pub fn service(&self, code: u16) -> Option<&FelicaService> {
        self.services.iter().find(|s| s.code == code)
    }
}

// ---------------------------------------------------------------------------
// ISO7816
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Iso7816Card {
    #[serde(default, with = "hex_bytes")]
    pub tag_id: Vec<u8>,
    pub applications: Vec<Iso7816Application>,
}

/// Responses captured after selecting one application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Iso7816Application {
    #[serde(with = "hex_bytes")]
    pub aid: Vec<u8>,
    /// File control information returned by SELECT.
    #[serde(default, with = "hex_bytes")]
    pub fci: Vec<u8>,
    #[serde(default)]
    pub files: Vec<Iso7816File>,
    #[serde(default)]
    pub responses: Vec<ApduResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Iso7816File {
    pub sfi: u8,
    #[serde(default, with = "hex_bytes")]
    pub binary: Vec<u8>,
    #[serde(default, with = "hex_list")]
    pub records: Vec<Vec<u8>>,
}

/// Response data (status word stripped) for a proprietary command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApduResponse {
    #[serde(with = "hex_bytes")]
    pub command: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Iso7816Card {
    pub fn application(&self, aid: &[u8]) -> Option<&Iso7816Application> {
        self.applications.iter().find(|a| a.aid == aid)
    }
}

impl Iso7816Application {
    pub fn sfi(&self, sfi: u8) -> Option<&Iso7816File> {
        self.files.iter().find(|f| f.sfi == sfi)
    }

    pub fn response(&self, command: &[u8]) -> Option<&[u8]> {
        self.responses
            .iter()
            .find(|r| r.command == command)
            .map(|r| r.data.as_slice())
    }
}

/// What a transport layer should read after selecting an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelector {
    /// READ RECORD 1..=`records` from a short file identifier.
    Records { sfi: u8, records: u8 },
    /// A proprietary command whose response should be kept.
    Command(&'static [u8]),
}

/// One entry of the application selection table.
#[derive(Debug, Clone, Copy)]
pub struct AppSelection {
    pub name: &'static str,
    pub aid: &'static [u8],
    pub reads: &'static [FileSelector],
}

/// Find the value of a BER-TLV `tag`, descending into constructed objects.
/// Malformed or truncated TLV data yields `None`.
pub fn find_tlv(data: &[u8], tag: u16) -> Option<&[u8]> {
    let mut pos = 0;
    while pos < data.len() {
        let first = data[pos];
        if first == 0x00 || first == 0xFF {
            pos += 1;
            continue;
        }
        let (this_tag, tag_len) = if first & 0x1F == 0x1F {
            (u16::from_be_bytes([first, *data.get(pos + 1)?]), 2)
        } else {
            (first as u16, 1)
        };
        pos += tag_len;
        let (len, len_len) = match *data.get(pos)? {
            l if l < 0x80 => (l as usize, 1),
            0x81 => (*data.get(pos + 1)? as usize, 2),
            0x82 => (
                u16::from_be_bytes([*data.get(pos + 1)?, *data.get(pos + 2)?]) as usize,
                3,
            ),
            _ => return None,
        };
        pos += len_len;
        let value = data.get(pos..pos + len)?;
        if this_tag == tag {
            return Some(value);
        }
        if first & 0x20 != 0 {
            if let Some(found) = find_tlv(value, tag) {
                return Some(found);
            }
        }
        pos += len;
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_locked_sector() {
        let card = ClassicCard {
            tag_id: vec![1, 2, 3, 4],
            sectors: vec![
                ClassicSector::from_blocks(vec![vec![0xAA; 16], vec![0; 16]]),
                ClassicSector::locked(),
            ],
        };
        assert_eq!(card.block(0, 0), Some(&[0xAA; 16][..]));
        assert!(card.sector(1).is_none());
        assert!(card.sector(7).is_none());
        assert_eq!(card.sector(0).unwrap().data_block_count(), 1);
        assert_eq!(card.sector(0).unwrap().read_blocks(0..5).len(), 32);
    }

    #[test]
    fn test_ultralight_read_pages() {
        let card = UltralightCard {
            tag_id: vec![],
            pages: (0..4u8).map(|i| vec![i; 4]).collect(),
        };
        assert_eq!(card.read_pages(2, 2), vec![2, 2, 2, 2, 3, 3, 3, 3]);
        // Pages past the end are skipped
        assert_eq!(card.read_pages(3, 4).len(), 4);
    }

    #[test]
    fn test_desfire_records() {
        let file = DesfireFile {
            id: 0x0e,
            kind: DesfireFileKind::CyclicRecord,
            data: vec![0; 70],
        };
        assert_eq!(file.records(32).count(), 2);
        assert_eq!(file.records(0).count(), 70);
    }

    #[test]
    fn test_card_json_roundtrip() {
        let json = r#"{
            "type": "desfire",
            "tag_id": "04112233445566",
            "applications": [
                {"id": 9441778, "files": [{"id": 8, "data": "00 22 22 4A 33"}]}
            ]
        }"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.family(), "DESFire");
        assert_eq!(card.tag_id(), &[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let app = card.as_desfire().unwrap().application(0x9011f2).unwrap();
        let file = app.file(0x08).unwrap();
        assert_eq!(file.kind, DesfireFileKind::Standard);
        assert_eq!(file.data, vec![0x00, 0x22, 0x22, 0x4A, 0x33]);

        let text = serde_json::to_string(&card).unwrap();
        assert!(text.contains("\"data\":\"0022224A33\""));
        let back: Card = serde_json::from_str(&text).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn test_card_json_rejects_bad_hex() {
        let json = r#"{"type": "ultralight", "pages": ["0102030G"]}"#;
        assert!(serde_json::from_str::<Card>(json).is_err());
    }

    #[test]
    fn test_find_tlv_nested() {
        // 6F { 84 <aid>, A5 { B0 <purse> } }
        let fci = [
            0x6F, 0x0C, 0x84, 0x02, 0xD4, 0x10, 0xA5, 0x06, 0xB0, 0x04, 0x01, 0x02, 0x03, 0x04,
        ];
        assert_eq!(find_tlv(&fci, 0x84), Some(&[0xD4, 0x10][..]));
        assert_eq!(find_tlv(&fci, 0xB0), Some(&[1, 2, 3, 4][..]));
        assert_eq!(find_tlv(&fci, 0x50), None);
    }

    #[test]
    fn test_find_tlv_truncated() {
        assert_eq!(find_tlv(&[0xB0, 0x08, 0x01], 0xB0), None);
        assert_eq!(find_tlv(&[0xB0], 0xB0), None);
        assert_eq!(find_tlv(&[], 0xB0), None);
    }

    #[test]
    fn test_find_tlv_two_byte_tag() {
        let data = [0x9F, 0x38, 0x01, 0x7A];
        assert_eq!(find_tlv(&data, 0x9F38), Some(&[0x7A][..]));
    }
}
