use std::cell::RefCell;
use std::io::Cursor;
use std::net::Ipv4Addr;
use std::rc::Rc;

use hex_literal::hex;
use pcapng_io::pcapng::*;
use pcapng_io::{Linktype, PcapNGError, RecordKind, TsPrecision};

const SHB_LE: &[u8] = &hex!(
    "
0a 0d 0d 0a 1c 00 00 00 4d 3c 2b 1a 01 00 00 00
ff ff ff ff ff ff ff ff 1c 00 00 00"
);
const IDB_LE: &[u8] = &hex!(
    "
01 00 00 00 14 00 00 00 01 00 00 00 ff ff 00 00
14 00 00 00"
);
const EPB_LE: &[u8] = &hex!(
    "
06 00 00 00 24 00 00 00 00 00 00 00 ae d4 05 00
67 45 23 91 04 00 00 00 04 00 00 00 de ad be ef
24 00 00 00"
);

const SHB_BE: &[u8] = &hex!(
    "
0a 0d 0d 0a 00 00 00 1c 1a 2b 3c 4d 00 01 00 00
ff ff ff ff ff ff ff ff 00 00 00 1c"
);
const IDB_BE: &[u8] = &hex!(
    "
00 00 00 01 00 00 00 14 00 01 00 00 00 00 ff ff
00 00 00 14"
);
const EPB_BE: &[u8] = &hex!(
    "
00 00 00 06 00 00 00 24 00 00 00 00 00 05 d4 ae
91 23 45 67 00 00 00 04 00 00 00 04 de ad be ef
00 00 00 24"
);

// IDB with an if_tsresol option (value given per test)
fn idb_with_tsresol(tsresol: u8) -> Vec<u8> {
    let mut v = hex!(
        "
01 00 00 00 20 00 00 00 01 00 00 00 ff ff 00 00
09 00 01 00 00 00 00 00 00 00 00 00 20 00 00 00"
    )
    .to_vec();
    v[20] = tsresol;
    v
}

// EPB with ts_high = 0, ts_low given per test
fn epb_with_ts_low(ts_low: u32) -> Vec<u8> {
    let mut v = hex!(
        "
06 00 00 00 24 00 00 00 00 00 00 00 00 00 00 00
00 00 00 00 04 00 00 00 04 00 00 00 de ad be ef
24 00 00 00"
    )
    .to_vec();
    v[16..20].copy_from_slice(&ts_low.to_le_bytes());
    v
}

fn file(parts: &[&[u8]]) -> Cursor<Vec<u8>> {
    let mut v = Vec::new();
    for p in parts {
        v.extend_from_slice(p);
    }
    Cursor::new(v)
}

fn open(parts: &[&[u8]]) -> PcapNGReader<Cursor<Vec<u8>>> {
    PcapNGReader::open(file(parts)).expect("open")
}

#[test]
fn minimal_native_order_file() {
    let mut reader = open(&[SHB_LE, IDB_LE, EPB_LE]);
    let (offset, record) = reader.next_record().expect("read").expect("record");
    assert_eq!(offset, (SHB_LE.len() + IDB_LE.len()) as u64);
    assert_eq!(record.kind, RecordKind::Packet);
    assert_eq!(record.if_id, Some(0));
    assert_eq!(record.linktype, Some(Linktype::ETHERNET));
    assert_eq!(record.caplen, 4);
    assert_eq!(record.origlen, 4);
    assert_eq!(record.data, vec![0xde, 0xad, 0xbe, 0xef]);
    let ts = record.ts.expect("timestamp");
    // 0x0005D4AE91234567 / 1_000_000
    assert_eq!(ts.secs, 1_641_221_107);
    assert_eq!(ts.nsecs, 959_143_000);
    assert_eq!(ts.precision, TsPrecision::Microseconds);
    assert!(reader.next_record().expect("eof").is_none());
    assert!(reader.is_eof());

    // section and interface registries
    assert_eq!(reader.sections().len(), 1);
    let section = &reader.sections()[0];
    assert!(!section.big_endian);
    assert_eq!(section.section_len, -1);
    assert_eq!(section.shb_offset, 0);
    assert_eq!(section.interfaces.len(), 1);
    assert_eq!(section.interfaces[0].snaplen, 65535);
    assert_eq!(reader.file_encap(), FileEncap::Uniform(Linktype::ETHERNET));
    assert_eq!(
        reader.file_ts_precision(),
        FileTsPrecision::Uniform(TsPrecision::Microseconds)
    );
}

#[test]
fn swapped_order_file_decodes_identically() {
    let mut le = open(&[SHB_LE, IDB_LE, EPB_LE]);
    let mut be = open(&[SHB_BE, IDB_BE, EPB_BE]);
    let (_, r1) = le.next_record().unwrap().unwrap();
    let (_, r2) = be.next_record().unwrap().unwrap();
    assert_eq!(r1, r2);
    assert!(be.sections()[0].big_endian);
}

#[test]
fn tsresol_decimal_nanoseconds() {
    let idb = idb_with_tsresol(9);
    let epb = epb_with_ts_low(1_234_567_890);
    let mut reader = open(&[SHB_LE, &idb, &epb]);
    let (_, record) = reader.next_record().unwrap().unwrap();
    let ts = record.ts.unwrap();
    assert_eq!(ts.secs, 1);
    assert_eq!(ts.nsecs, 234_567_890);
    assert_eq!(ts.precision, TsPrecision::Nanoseconds);
}

#[test]
fn tsresol_power_of_two() {
    let idb = idb_with_tsresol(0x86);
    let epb = epb_with_ts_low(128);
    let mut reader = open(&[SHB_LE, &idb, &epb]);
    let (_, record) = reader.next_record().unwrap().unwrap();
    let ts = record.ts.unwrap();
    assert_eq!(ts.secs, 2);
    assert_eq!(ts.nsecs, 0);
    // 64 units per second buckets below deciseconds
    assert_eq!(ts.precision, TsPrecision::Deciseconds);
}

#[test]
fn nrb_names_are_delivered() {
    const NRB: &[u8] = &hex!(
        "
04 00 00 00 24 00 00 00 01 00 0e 00 7f 00 00 01
6c 6f 63 61 6c 68 6f 73 74 00 00 00 00 00 00 00
24 00 00 00"
    );
    let resolved: Rc<RefCell<Vec<(Ipv4Addr, Vec<u8>)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = resolved.clone();
    let mut reader = open(&[SHB_LE, IDB_LE, NRB, EPB_LE]);
    reader.set_ipv4_resolver(Box::new(move |addr, name| {
        sink.borrow_mut().push((addr, name.to_vec()));
    }));
    let (_, record) = reader.next_record().unwrap().unwrap();
    assert_eq!(record.caplen, 4);
    let resolved = resolved.borrow();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].0, Ipv4Addr::new(127, 0, 0, 1));
    assert_eq!(resolved[0].1, b"localhost");
}

#[test]
fn nrb_unterminated_name_is_fatal() {
    // IPv4 record whose name runs to the end of the record without a NUL
    const NRB_BAD: &[u8] = &hex!(
        "
04 00 00 00 1c 00 00 00 01 00 08 00 7f 00 00 01
61 62 63 64 00 00 00 00 1c 00 00 00"
    );
    let called = Rc::new(RefCell::new(0u32));
    let sink = called.clone();
    let mut reader = open(&[SHB_LE, IDB_LE, NRB_BAD, EPB_LE]);
    reader.set_ipv4_resolver(Box::new(move |_, _| {
        *sink.borrow_mut() += 1;
    }));
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
    assert!(err.to_string().contains("not terminated"));
    // no callback may fire for a block that failed validation
    assert_eq!(*called.borrow(), 0);
}

#[test]
fn interface_id_out_of_range() {
    // EPB referencing interface 5 in a section with 2 interfaces
    let mut epb = EPB_LE.to_vec();
    epb[8] = 5;
    let mut reader = open(&[SHB_LE, IDB_LE, IDB_LE, &epb]);
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
    assert!(err.to_string().contains("interface id 5"));
}

#[test]
fn simple_packet_block_caplen_derivation() {
    // IDB with snaplen 2, SPB with origlen 4: caplen is clamped to 2
    const IDB_SNAP2: &[u8] = &hex!(
        "
01 00 00 00 14 00 00 00 01 00 00 00 02 00 00 00
14 00 00 00"
    );
    const SPB: &[u8] = &hex!(
        "
03 00 00 00 14 00 00 00 04 00 00 00 de ad be ef
14 00 00 00"
    );
    let mut reader = open(&[SHB_LE, IDB_SNAP2, SPB]);
    let (_, record) = reader.next_record().unwrap().unwrap();
    assert_eq!(record.kind, RecordKind::Packet);
    assert_eq!(record.if_id, Some(0));
    assert_eq!(record.caplen, 2);
    assert_eq!(record.origlen, 4);
    assert_eq!(record.data, vec![0xde, 0xad]);
    assert!(record.ts.is_none());
}

#[test]
fn simple_packet_block_requires_an_interface() {
    const SPB: &[u8] = &hex!(
        "
03 00 00 00 14 00 00 00 04 00 00 00 de ad be ef
14 00 00 00"
    );
    let mut reader = open(&[SHB_LE, SPB]);
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
}

#[test]
fn obsolete_packet_block() {
    // PB: if_id 0, drops 7, same timestamp/payload as EPB_LE
    const PB: &[u8] = &hex!(
        "
02 00 00 00 24 00 00 00 00 00 07 00 ae d4 05 00
67 45 23 91 04 00 00 00 04 00 00 00 de ad be ef
24 00 00 00"
    );
    let mut reader = open(&[SHB_LE, IDB_LE, PB]);
    let (_, record) = reader.next_record().unwrap().unwrap();
    assert_eq!(record.kind, RecordKind::Packet);
    assert_eq!(record.drop_count, Some(7));
    assert_eq!(record.data, vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(record.ts.unwrap().secs, 1_641_221_107);
}

#[test]
fn probe_rejects_other_formats_nondestructively() {
    for garbage in [
        &b""[..],
        &b"\x0a\x0d"[..],
        &b"\xd4\xc3\xb2\xa1\x02\x00\x04\x00\x00\x00\x00\x00"[..], // legacy pcap magic
        &b"\x0a\x0d\x0d\x0a\x1c\x00\x00\x00\x42\x42\x42\x42"[..], // bad BOM
    ] {
        let cursor = Cursor::new(garbage.to_vec());
        let err = PcapNGReader::open(cursor).expect_err("must not open");
        assert!(err.is_not_our_format(), "{:?}", err);
        // the probe must leave the position unchanged
        assert_eq!(err.into_inner().position(), 0);
    }
}

#[test]
fn probe_rejects_oversize_first_block() {
    let mut shb = SHB_LE.to_vec();
    shb[4..8].copy_from_slice(&0xf000_0000u32.to_le_bytes());
    let err = PcapNGReader::open(Cursor::new(shb)).expect_err("must not open");
    assert!(err.is_not_our_format());
}

#[test]
fn unsupported_shb_version() {
    let mut shb = SHB_LE.to_vec();
    // major version 2
    shb[12] = 2;
    let err = PcapNGReader::open(Cursor::new(shb)).expect_err("must not open");
    assert!(
        matches!(err.error, PcapNGError::UnsupportedFormat(_)),
        "{:?}",
        err
    );
    // minor version 2 is treated as 1.0
    let mut shb = SHB_LE.to_vec();
    shb[14] = 2;
    assert!(PcapNGReader::open(Cursor::new(shb)).is_ok());
}

#[test]
fn oversize_block_is_rejected() {
    let mut epb = EPB_LE.to_vec();
    epb[4..8].copy_from_slice(&0xf000_0000u32.to_le_bytes());
    let mut reader = open(&[SHB_LE, IDB_LE, &epb]);
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
    assert!(err.to_string().contains("maximum block size"));
}

#[test]
fn undersize_block_is_rejected() {
    let mut epb = EPB_LE.to_vec();
    epb[4..8].copy_from_slice(&8u32.to_le_bytes());
    let mut reader = open(&[SHB_LE, IDB_LE, &epb]);
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
    assert!(err.to_string().contains("minimum block size"));
}

#[test]
fn truncated_block_is_short_read() {
    let mut reader = open(&[SHB_LE, IDB_LE, &EPB_LE[..20]]);
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::ShortRead(_)), "got {:?}", err);
}

#[test]
fn trailer_mismatch_is_fatal() {
    let mut epb = EPB_LE.to_vec();
    let n = epb.len();
    epb[n - 4] = 0x23;
    let mut reader = open(&[SHB_LE, IDB_LE, &epb]);
    let err = reader.next_record().unwrap_err();
    assert!(err.to_string().contains("total length"));
}

#[test]
fn unpadded_declared_length_is_tolerated() {
    // unknown block declaring 15 bytes; the file stores 16, and the
    // trailer replicates the declared 15
    const QUIRK: &[u8] = &hex!("78 56 34 12 0f 00 00 00 41 42 43 00 0f 00 00 00");
    let mut reader = open(&[SHB_LE, QUIRK, IDB_LE, EPB_LE]);
    // the unknown block is skipped, the packet after it is still found
    let (_, record) = reader.next_record().unwrap().unwrap();
    assert_eq!(record.caplen, 4);
}

#[test]
fn multiple_sections() {
    let mut reader = open(&[SHB_LE, IDB_LE, EPB_LE, SHB_BE, IDB_BE, EPB_BE]);
    let (_, r1) = reader.next_record().unwrap().unwrap();
    let (_, r2) = reader.next_record().unwrap().unwrap();
    assert_eq!(r1, r2);
    assert!(reader.next_record().unwrap().is_none());
    assert_eq!(reader.sections().len(), 2);
    assert!(!reader.sections()[0].big_endian);
    assert!(reader.sections()[1].big_endian);
    // interface ids are scoped to their section
    assert_eq!(reader.sections()[1].interfaces.len(), 1);
}

#[test]
fn random_access_reread() {
    let mut reader = open(&[SHB_LE, IDB_LE, EPB_LE, SHB_BE, IDB_BE, EPB_BE]);
    let (offset1, r1) = reader.next_record().unwrap().unwrap();
    // a random-access read must not consume the sequential cursor
    let reread = reader.read_record_at(offset1).expect("seek read");
    assert_eq!(reread, r1);
    let (offset2, r2) = reader.next_record().unwrap().unwrap();
    assert_eq!(r2, r1);
    // the second record lives in the big-endian section
    let reread = reader.read_record_at(offset2).expect("seek read");
    assert_eq!(reread, r2);
    assert!(reader.next_record().unwrap().is_none());
}

#[test]
fn random_access_rejects_metadata_blocks() {
    let mut reader = open(&[SHB_LE, IDB_LE, EPB_LE]);
    let _ = reader.next_record().unwrap().unwrap();
    // offset of the IDB
    let err = reader.read_record_at(SHB_LE.len() as u64).unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
    assert!(err.to_string().contains("does not carry a record"));
}

#[test]
fn dsb_is_retained_for_mirroring() {
    const DSB: &[u8] = &hex!(
        "
0a 00 00 00 20 00 00 00 4b 53 4c 54 09 00 00 00
73 6f 6d 65 6b 65 79 31 31 00 00 00 20 00 00 00"
    );
    let mut reader = open(&[SHB_LE, IDB_LE, DSB, EPB_LE]);
    let (_, _record) = reader.next_record().unwrap().unwrap();
    assert_eq!(reader.decryption_secrets().len(), 1);
    let dsb = &reader.decryption_secrets()[0];
    assert_eq!(dsb.secrets_type, SecretsType::TlsKeyLog);
    assert_eq!(dsb.data, b"somekey11");
}

#[test]
fn statistics_attach_to_interface() {
    // ISB for interface 0 with isb_ifdrop = 10
    const ISB: &[u8] = &hex!(
        "
05 00 00 00 28 00 00 00 00 00 00 00 97 c3 04 00
aa 47 ca 64 05 00 08 00 0a 00 00 00 00 00 00 00
00 00 00 00 28 00 00 00"
    );
    let mut reader = open(&[SHB_LE, IDB_LE, ISB, EPB_LE]);
    let (_, _record) = reader.next_record().unwrap().unwrap();
    let iface = &reader.sections()[0].interfaces[0];
    assert_eq!(iface.stats.len(), 1);
    assert_eq!(iface.stats[0].if_drop, Some(10));
    assert_eq!(iface.stats[0].ts, 0x0004_C397_64CA_47AA);
}

#[test]
fn statistics_for_unknown_interface_are_fatal() {
    const ISB: &[u8] = &hex!(
        "
05 00 00 00 18 00 00 00 03 00 00 00 97 c3 04 00
aa 47 ca 64 18 00 00 00"
    );
    let mut reader = open(&[SHB_LE, IDB_LE, ISB]);
    let err = reader.next_record().unwrap_err();
    assert!(matches!(err, PcapNGError::BadFile(_)), "got {:?}", err);
}

#[test]
fn extension_option_handlers_and_local_options() {
    use pcapng_io::registry::{register_option_handler, OptionHandler};

    fn upper_parser(_big_endian: bool, value: &[u8]) -> Result<Vec<u8>, PcapNGError> {
        Ok(value.to_ascii_uppercase())
    }
    fn raw_sizer(value: &[u8]) -> u32 {
        value.len() as u32
    }
    fn raw_writer(value: &[u8], out: &mut Vec<u8>) -> Result<(), PcapNGError> {
        out.extend_from_slice(value);
        Ok(())
    }
    register_option_handler(
        IDB_MAGIC,
        2988,
        OptionHandler {
            parser: upper_parser,
            sizer: raw_sizer,
            writer: raw_writer,
        },
    )
    .expect("register");

    // IDB with option 2988 (registered) and 0x8123 (local, kept raw)
    const IDB_EXT: &[u8] = &hex!(
        "
01 00 00 00 28 00 00 00 01 00 00 00 ff ff 00 00
ac 0b 02 00 61 62 00 00 23 81 01 00 7a 00 00 00
00 00 00 00 28 00 00 00"
    );
    let mut reader = open(&[SHB_LE, IDB_EXT, EPB_LE]);
    let _ = reader.next_record().unwrap().unwrap();
    let iface = &reader.sections()[0].interfaces[0];
    assert!(iface.raw_options.contains(&(2988, b"AB".to_vec())));
    assert!(iface.raw_options.contains(&(0x8123, b"z".to_vec())));
}

#[test]
fn errors_do_not_lose_prior_records() {
    let mut bad_epb = EPB_LE.to_vec();
    bad_epb[8] = 9; // interface out of range
    let mut reader = open(&[SHB_LE, IDB_LE, EPB_LE, &bad_epb]);
    let (_, record) = reader.next_record().unwrap().unwrap();
    assert_eq!(record.caplen, 4);
    assert!(reader.next_record().is_err());
}
