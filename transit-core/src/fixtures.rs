//! Synthetic card dumps for tests, one or more per scheme.
//!
//! Each builder writes fields at the offsets the matching decoder reads, so
//! the expected values in tests can be read straight off this file.

use crate::bits::{set_bits, BitWriter};
use crate::card::{
    ApduResponse, Card, ClassicCard, ClassicSector, DesfireApplication, DesfireCard, DesfireFile,
    DesfireFileKind, FelicaCard, FelicaService, FelicaSystem, Iso7816Application, Iso7816Card,
    Iso7816File, UltralightCard,
};
use crate::schemes::{clipper, ovc, suica, tmoney};

/// One fixture per registered decoder, keyed by the expected card name.
pub fn all_cards() -> Vec<(&'static str, Card)> {
    vec![
        ("Clipper", clipper_card()),
        ("OV-chipkaart", ovc_card()),
        ("Troika", troika_card_e3()),
        ("Ventra", ventra_card()),
        ("Suica", suica_card()),
        ("T-Money", tmoney_card()),
    ]
}

/// Big-endian `value` into `len` bytes at `offset`.
fn put(buf: &mut [u8], offset: usize, len: usize, value: u64) {
    for i in 0..len {
        buf[offset + i] = (value >> (8 * (len - 1 - i))) as u8;
    }
}

// ---------------------------------------------------------------------------
// Clipper
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn clipper_trip(
    agency: u64,
    fare: u64,
    vehicle: u64,
    entry: u64,
    exit: u64,
    from: u64,
    to: u64,
    route: u64,
    transport: u64,
) -> [u8; 32] {
    let mut r = [0u8; 32];
    put(&mut r, 0x02, 2, agency);
    put(&mut r, 0x06, 2, fare);
    put(&mut r, 0x0a, 2, vehicle);
    put(&mut r, 0x0c, 4, entry);
    put(&mut r, 0x10, 4, exit);
    put(&mut r, 0x14, 2, from);
    put(&mut r, 0x16, 2, to);
    put(&mut r, 0x1c, 2, route);
    put(&mut r, 0x1e, 2, transport);
    r
}

/// Serial 572691763, $305.83, expiry 2029-12-31. BART 16th St Mission to
/// 12th St Oakland on 2024-03-15 08:12-08:33 ($6.30), a Muni bus boarding on
/// 2024-03-14 18:00 ($2.50), a $50 refill on 2024-03-10 17:45.
pub fn clipper_card() -> Card {
    let mut expiry = vec![0u8; 16];
    put(&mut expiry, 8, 2, 47_481);

    let mut balance = vec![0u8; 32];
    put(&mut balance, 18, 2, 0x7777);

    let mut serial = vec![0u8; 16];
    put(&mut serial, 1, 4, 0x2222_9533);

    let mut trips = Vec::new();
    trips.extend(clipper_trip(0x04, 630, 0, 3_919_479_120, 3_919_480_380, 0x0c, 0x14, 0, 0x6f));
    trips.extend(clipper_trip(0x12, 250, 1234, 3_919_428_000, 0, 0xFFFF, 0xFFFF, 0x14, 0x61));
    trips.extend([0u8; 32]);

    let mut refills = vec![0u8; 64];
    put(&mut refills, 0x02, 2, 0x04);
    put(&mut refills, 0x04, 4, 3_919_081_500);
    put(&mut refills, 0x08, 4, 0x1234_5678);
    put(&mut refills, 0x0e, 2, 5000);

    let file = |id: u8, kind: DesfireFileKind, data: Vec<u8>| DesfireFile { id, kind, data };
    Card::Desfire(DesfireCard {
        tag_id: vec![0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        applications: vec![DesfireApplication {
            id: clipper::APP_ID,
            files: vec![
                file(0x01, DesfireFileKind::Standard, expiry),
                file(0x02, DesfireFileKind::Backup, balance),
                file(0x04, DesfireFileKind::CyclicRecord, refills),
                file(0x08, DesfireFileKind::Standard, serial),
                file(0x0e, DesfireFileKind::CyclicRecord, trips),
            ],
        }],
    })
}

// ---------------------------------------------------------------------------
// OV-chipkaart
// ---------------------------------------------------------------------------

const OVC_MAGIC: [u8; 12] = [
    0x84, 0x00, 0x00, 0x00, 0x00, 0x06, 0x03, 0xA0, 0x00, 0x13, 0xAE, 0xE4,
];

fn blank_4k() -> Vec<ClassicSector> {
    (0..40)
        .map(|s| ClassicSector::from_blocks(vec![vec![0; 16]; if s < 32 { 4 } else { 16 }]))
        .collect()
}

/// Presence mask and field values, in mask order.
fn ovc_record(date: u32, time: u32, fields: &[(u32, usize, u32)]) -> [u8; 32] {
    let mut r = [0u8; 32];
    let mask = fields.iter().fold(0u32, |m, &(bit, _, _)| m | (1u32 << bit));
    let mut w = BitWriter::new(&mut r);
    w.write(14, date).write(11, time).write(12, mask);
    for &(_, len, value) in fields {
        w.write(len, value);
    }
    r
}

fn ovc_credit(id: u32, credit_id: u32, cents: u32) -> Vec<u8> {
    let mut b = vec![0u8; 16];
    set_bits(&mut b, 9, 12, id);
    set_bits(&mut b, 56, 12, credit_id);
    set_bits(&mut b, 77, 1, 1);
    set_bits(&mut b, 78, 15, cents);
    b
}

/// Serial 194796081, €12.50 (current credit copy). NS Amsterdam Centraal to
/// Utrecht Centraal across midnight 2024-03-15/16 (€8.80), a GVB metro
/// transfer on 2024-03-12 (€1.35), a €20 reload, one subscription.
pub fn ovc_card() -> Card {
    let mut sectors = blank_4k();

    let mut block0 = vec![0u8; 16];
    block0[..4].copy_from_slice(&[0x0B, 0x9C, 0x5A, 0x31]);
    sectors[0].blocks[0] = block0;
    sectors[0].blocks[1][..12].copy_from_slice(&OVC_MAGIC);

    // Index: copy 2 is newer and selects credit block 10
    let index = &mut sectors[39].blocks;
    BitWriter::new(&mut index[1]).write(16, 7).write(1, 0);
    BitWriter::new(&mut index[2]).write(16, 8).write(1, 1);
    index[9] = ovc_credit(4, 41, 999);
    index[10] = ovc_credit(5, 42, 1250);

    let (kind, company, station, machine, amount) = (0, 1, 3, 4, 7);
    let records = [
        ovc_record(9935, 23 * 60 + 30, &[
            (kind, 7, ovc::TYPE_CHECK_IN),
            (company, 16, ovc::COMPANY_NS),
            (station, 16, 0x0001),
        ]),
        ovc_record(9936, 10, &[
            (kind, 7, ovc::TYPE_CHECK_OUT),
            (company, 16, ovc::COMPANY_NS),
            (station, 16, 0x0002),
            (amount, 16, 880),
        ]),
        ovc_record(9932, 8 * 60 + 5, &[
            (kind, 7, ovc::TYPE_TRANSFER),
            (company, 16, ovc::COMPANY_GVB),
            (station, 16, 0x0010),
        ]),
        ovc_record(9932, 8 * 60 + 20, &[
            (kind, 7, ovc::TYPE_CHECK_OUT),
            (company, 16, ovc::COMPANY_GVB),
            (station, 16, 0x0013),
            (amount, 16, 135),
        ]),
        ovc_record(9932, 7 * 60, &[
            (kind, 7, ovc::TYPE_PURCHASE),
            (company, 16, ovc::COMPANY_RESELLER),
            (machine, 24, 123_456),
            (amount, 16, 2000),
        ]),
    ];
    for (i, record) in records.iter().enumerate() {
        sectors[35].blocks[i * 2] = record[..16].to_vec();
        sectors[35].blocks[i * 2 + 1] = record[16..].to_vec();
    }

    // Voordeelurenabonnement, 2024-01-01 to 2024-12-31, unlimited trips
    BitWriter::new(&mut sectors[32].blocks[0])
        .write(12, 0x0019)
        .write(14, 9861)
        .write(14, 10226)
        .write(24, 0x00AB_CDEF)
        .write(8, 0)
        .write(8, 0xFF);

    Card::Classic(ClassicCard {
        tag_id: vec![0x31, 0x5A, 0x9C, 0x0B],
        sectors,
    })
}

// ---------------------------------------------------------------------------
// Troika
// ---------------------------------------------------------------------------

fn troika_card(data: &[u8]) -> Card {
    let mut sectors = vec![ClassicSector::from_blocks(vec![vec![0; 16]; 4]); 16];
    let mut blocks: Vec<Vec<u8>> = data.chunks(16).map(<[u8]>::to_vec).collect();
    blocks.push(vec![0xFF; 16]);
    sectors[8] = ClassicSector::from_blocks(blocks);
    Card::Classic(ClassicCard {
        tag_id: vec![0xA1, 0xB2, 0xC3, 0xD4],
        sectors,
    })
}

fn troika_header(data: &mut [u8], sub_layout: u32) {
    set_bits(data, 0, 10, 0x117);
    set_bits(data, 20, 32, 2_345_678_901);
    set_bits(data, 52, 4, 0xE);
    set_bits(data, 56, 5, sub_layout);
}

/// Layout E/3: serial 2345678901, RUB 0.00 (sign flag set, magnitude 0),
/// expiry 2026-12-31, last validation 2024-03-15 08:12 at Teatralnaya.
pub fn troika_card_e3() -> Card {
    let mut data = vec![0u8; 48];
    troika_header(&mut data, 3);
    set_bits(&mut data, 61, 16, 12_783);
    set_bits(&mut data, 128, 23, 4_314_732);
    set_bits(&mut data, 151, 2, 1);
    set_bits(&mut data, 153, 16, 0x0102);
    set_bits(&mut data, 187, 1, 1);
    set_bits(&mut data, 188, 22, 0);
    troika_card(&data)
}

/// Layout E/5: RUB 50.00, expiry 2027-06-30, bus validation 2024-03-14 18:05.
pub fn troika_card_e5() -> Card {
    let mut data = vec![0u8; 48];
    troika_header(&mut data, 5);
    set_bits(&mut data, 61, 13, 3_102);
    set_bits(&mut data, 128, 23, 2_735_645);
    set_bits(&mut data, 151, 2, 2);
    set_bits(&mut data, 153, 16, 0x4321);
    set_bits(&mut data, 167, 19, 5_000);
    troika_card(&data)
}

// ---------------------------------------------------------------------------
// Ventra
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn ventra_record(
    days: u32,
    minutes: u32,
    transfer: bool,
    route: u32,
    operator: u32,
    location: u32,
    balance: u32,
    fare: u32,
    seq: u32,
) -> Vec<u8> {
    let mut r = vec![0u8; 16];
    set_bits(&mut r, 0, 16, days);
    set_bits(&mut r, 16, 11, minutes);
    set_bits(&mut r, 27, 1, transfer as u32);
    set_bits(&mut r, 32, 16, route);
    set_bits(&mut r, 48, 8, operator);
    set_bits(&mut r, 56, 16, location);
    set_bits(&mut r, 72, 16, balance);
    set_bits(&mut r, 88, 16, fare);
    set_bits(&mut r, 104, 16, seq);
    r
}

/// UID 04A1B2C3D4E5F6. Clark/Lake on 2024-03-13 17:40 ($2.50), then a route
/// 22 bus transfer on 2024-03-14 08:05 leaving $8.44.
pub fn ventra_card() -> Card {
    let mut pages = vec![vec![0u8; 4]; 16];
    pages[0] = vec![0x04, 0xA1, 0xB2, 0x97];
    pages[1] = vec![0xC3, 0xD4, 0xE5, 0xF6];
    pages[4] = vec![0x0A, 0x00, 0x00, 0x64];

    let older = ventra_record(8838, 17 * 60 + 40, false, 0, 0x01, 0x4001, 1094, 250, 7);
    let newer = ventra_record(8839, 8 * 60 + 5, true, 22, 0x01, 0x0123, 844, 250, 8);
    for (start, record) in [(8, older), (12, newer)] {
        for (i, chunk) in record.chunks(4).enumerate() {
            pages[start + i] = chunk.to_vec();
        }
    }

    Card::Ultralight(UltralightCard {
        tag_id: vec![0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6],
        pages,
    })
}

// ---------------------------------------------------------------------------
// Suica
// ---------------------------------------------------------------------------

fn suica_block(console: u8, process: u8, (month, day): (u32, u32), balance: u16, seq: u16) -> Vec<u8> {
    let mut b = vec![0u8; 16];
    b[0] = console;
    b[1] = process;
    set_bits(&mut b, 32, 7, 24);
    set_bits(&mut b, 39, 4, month);
    set_bits(&mut b, 43, 5, day);
    b[10..12].copy_from_slice(&balance.to_le_bytes());
    b[13..15].copy_from_slice(&seq.to_be_bytes());
    b
}

/// ¥870. Newest first: shop purchase 2024-03-15 12:34 (¥200), Tokyo to
/// Shinjuku on 2024-03-14 (¥200), a charge on 2024-03-10.
pub fn suica_card() -> Card {
    let mut shop = suica_block(0xC8, 0x46, (3, 15), 870, 0x12);
    set_bits(&mut shop, 48, 5, 12);
    set_bits(&mut shop, 53, 6, 34);

    let mut ride = suica_block(0x16, 0x01, (3, 14), 1070, 0x11);
    ride[6..10].copy_from_slice(&[0x25, 0x01, 0x25, 0x0A]);

    let charge = suica_block(0x08, 0x02, (3, 10), 1270, 0x10);

    Card::Felica(FelicaCard {
        idm: vec![0x01, 0x01, 0x12, 0x12, 0x34, 0x56, 0x78, 0x9A],
        systems: vec![FelicaSystem {
            code: suica::SYSTEM_CODE,
            services: vec![FelicaService {
                code: suica::HISTORY_SERVICE,
                blocks: vec![shop, ride, charge, vec![0; 16]],
            }],
        }],
    })
}

// ---------------------------------------------------------------------------
// T-money
// ---------------------------------------------------------------------------

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag, value.len() as u8];
    out.extend_from_slice(value);
    out
}

fn tmoney_record(kind: u8, balance: u64, counter: u64, amount: u64, time: [u8; 7]) -> Vec<u8> {
    let mut r = vec![0u8; 46];
    r[0] = kind;
    put(&mut r, 2, 4, balance);
    put(&mut r, 6, 4, counter);
    put(&mut r, 10, 4, amount);
    r[26..33].copy_from_slice(&time);
    r
}

/// Card number 1010123456789012, ₩12350. A ₩1250 ride on 2024-03-15
/// 08:12:30, a ₩10000 top-up the evening before, one blank record.
pub fn tmoney_card() -> Card {
    let mut purse = vec![0u8; 16];
    purse[4..12].copy_from_slice(&[0x10, 0x10, 0x12, 0x34, 0x56, 0x78, 0x90, 0x12]);
    let mut fci_body = tlv(0x84, &tmoney::AID);
    fci_body.extend(tlv(0xA5, &tlv(0xB0, &purse)));
    let fci = tlv(0x6F, &fci_body);

    let records = vec![
        tmoney_record(tmoney::TYPE_RIDE, 12_350, 57, 1_250, [0x20, 0x24, 0x03, 0x15, 0x08, 0x12, 0x30]),
        tmoney_record(tmoney::TYPE_TOP_UP, 13_600, 56, 10_000, [0x20, 0x24, 0x03, 0x14, 0x19, 0x00, 0x00]),
        vec![0xFF; 46],
    ];

    Card::Iso7816(Iso7816Card {
        tag_id: vec![0x08, 0x12, 0x34, 0x56],
        applications: vec![Iso7816Application {
            aid: tmoney::AID.to_vec(),
            fci,
            files: vec![Iso7816File {
                sfi: 4,
                binary: Vec::new(),
                records,
            }],
            responses: vec![ApduResponse {
                command: tmoney::GET_BALANCE.to_vec(),
                data: 12_350u32.to_be_bytes().to_vec(),
            }],
        }],
    })
}
