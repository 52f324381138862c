use std::cell::RefCell;
use std::io::Cursor;
use std::net::Ipv4Addr;
use std::rc::Rc;

use pcapng_io::pcapng::*;
use pcapng_io::{
    Linktype, PcapNGError, Record, RecordKind, SyscallInfo, Timestamp, TsPrecision, Verdict,
};

fn reopen(bytes: Vec<u8>) -> PcapNGReader<Cursor<Vec<u8>>> {
    PcapNGReader::open(Cursor::new(bytes)).expect("reopen written file")
}

fn ethernet_writer() -> PcapNGWriter<Vec<u8>> {
    let mut writer = PcapNGWriter::new(
        Vec::new(),
        Some(Linktype::ETHERNET),
        &SectionHeaderInfo::default(),
    )
    .expect("writer");
    let if_id = writer
        .add_interface(&InterfaceDescription::new(Linktype::ETHERNET, 65535))
        .expect("interface");
    assert_eq!(if_id, 0);
    writer
}

fn packet(data: &[u8]) -> Record {
    let mut record = Record::packet(Linktype::ETHERNET, data.len() as u32, data.len() as u32, data.to_vec());
    record.if_id = Some(0);
    record.ts = Some(Timestamp {
        secs: 1_641_241_107,
        nsecs: 959_143_000,
        precision: TsPrecision::Microseconds,
    });
    record
}

#[test]
fn write_then_read_round_trip() {
    let mut writer = PcapNGWriter::new(
        Vec::new(),
        Some(Linktype::ETHERNET),
        &SectionHeaderInfo {
            hardware: Some("test hardware".to_owned()),
            os: Some("test os".to_owned()),
            user_appl: Some("pcapng-io tests".to_owned()),
            comment: None,
        },
    )
    .expect("writer");
    let mut desc = InterfaceDescription::new(Linktype::ETHERNET, 65535);
    desc.name = Some("eth0".to_owned());
    desc.speed = Some(1_000_000_000);
    writer.add_interface(&desc).expect("interface");

    let mut record = packet(&[0xde, 0xad, 0xbe, 0xef]);
    record.comment = Some("first packet".to_owned());
    record.flags = Some(0x0004_0001);
    record.drop_count = Some(3);
    record.packet_id = Some(0x0102_0304_0506_0708);
    record.queue = Some(2);
    record.verdicts = vec![
        Verdict::Hardware(vec![1, 2]),
        Verdict::LinuxEbpfTc(2),
        Verdict::LinuxEbpfXdp(4),
    ];
    writer.write_record(&record).expect("write record");
    let bytes = writer.finish().expect("finish");

    let mut reader = reopen(bytes);
    let (_, read_back) = reader.next_record().expect("read").expect("record");
    assert_eq!(read_back, record);
    assert!(reader.next_record().unwrap().is_none());

    let section = &reader.sections()[0];
    assert_eq!(section.hardware.as_deref(), Some("test hardware"));
    assert_eq!(section.os.as_deref(), Some("test os"));
    assert_eq!(section.user_appl.as_deref(), Some("pcapng-io tests"));
    let iface = &section.interfaces[0];
    assert_eq!(iface.name.as_deref(), Some("eth0"));
    assert_eq!(iface.speed, Some(1_000_000_000));
    assert_eq!(iface.linktype, Linktype::ETHERNET);
}

#[test]
fn timestamp_precision_round_trip() {
    for &exp in &[0u8, 1, 2, 3, 4, 6, 9] {
        let mut writer =
            PcapNGWriter::new(Vec::new(), None, &SectionHeaderInfo::default()).expect("writer");
        let mut desc = InterfaceDescription::new(Linktype::ETHERNET, 0);
        desc.tsresol = exp;
        writer.add_interface(&desc).expect("interface");
        let nsecs = if exp == 0 {
            0
        } else {
            7 * 10u32.pow(9 - exp as u32)
        };
        let mut record = packet(&[1, 2, 3, 4]);
        record.ts = Some(Timestamp {
            secs: 1234,
            nsecs,
            precision: TsPrecision::Nanoseconds,
        });
        writer.write_record(&record).expect("write");
        let bytes = writer.finish().expect("finish");
        let mut reader = reopen(bytes);
        let (_, read_back) = reader.next_record().unwrap().unwrap();
        let ts = read_back.ts.expect("timestamp");
        assert_eq!(ts.secs, 1234, "tsresol {}", exp);
        assert_eq!(ts.nsecs, nsecs, "tsresol {}", exp);
    }
}

#[test]
fn packet_too_large_is_refused() {
    let mut writer = ethernet_writer();
    let record = packet(&vec![0u8; 262_145]);
    let err = writer.write_record(&record).unwrap_err();
    assert!(matches!(err, PcapNGError::PacketTooLarge(_)), "{:?}", err);
}

#[test]
fn unknown_interface_is_refused() {
    let mut writer = ethernet_writer();
    let mut record = packet(&[1, 2, 3]);
    record.if_id = Some(4);
    let err = writer.write_record(&record).unwrap_err();
    assert!(matches!(err, PcapNGError::UnwritableEncap(_)), "{:?}", err);
}

#[test]
fn encap_mismatch_is_refused() {
    let mut writer = ethernet_writer();
    let mut record = packet(&[1, 2, 3]);
    record.linktype = Some(Linktype::RAW);
    let err = writer.write_record(&record).unwrap_err();
    assert!(matches!(err, PcapNGError::UnwritableEncap(_)), "{:?}", err);

    // and on the interface level, against the per-file encapsulation
    let mut writer = ethernet_writer();
    let err = writer
        .add_interface(&InterfaceDescription::new(Linktype::RAW, 0))
        .unwrap_err();
    assert!(matches!(err, PcapNGError::UnwritableEncap(_)), "{:?}", err);
}

#[test]
fn dsb_is_flushed_before_the_next_packet() {
    let mut writer = ethernet_writer();
    writer
        .write_dsb(DecryptionSecrets {
            secrets_type: SecretsType::TlsKeyLog,
            data: b"CLIENT_RANDOM 01 23\x0a".to_vec(),
        })
        .expect("queue dsb");
    writer.write_record(&packet(&[1, 2, 3, 4])).expect("packet");
    let bytes = writer.finish().expect("finish");

    let magics = block_magics(&bytes);
    assert_eq!(magics, vec![SHB_MAGIC, IDB_MAGIC, DSB_MAGIC, EPB_MAGIC]);

    let mut reader = reopen(bytes);
    let _ = reader.next_record().unwrap().unwrap();
    assert_eq!(reader.decryption_secrets().len(), 1);
}

#[test]
fn statistics_flush_at_finish_in_order() {
    let mut writer = ethernet_writer();
    writer
        .add_interface(&InterfaceDescription::new(Linktype::ETHERNET, 65535))
        .expect("second interface");
    writer.write_record(&packet(&[1, 2, 3, 4])).expect("packet");
    writer
        .write_interface_statistics(
            1,
            InterfaceStats {
                ts: 77,
                if_recv: Some(100),
                ..Default::default()
            },
        )
        .expect("stats if 1");
    writer
        .write_interface_statistics(
            0,
            InterfaceStats {
                ts: 42,
                if_drop: Some(5),
                comment: Some("counters".to_owned()),
                ..Default::default()
            },
        )
        .expect("stats if 0");
    let bytes = writer.finish().expect("finish");

    let mut reader = reopen(bytes);
    let _ = reader.next_record().unwrap().unwrap();
    assert!(reader.next_record().unwrap().is_none());
    let ifaces = &reader.sections()[0].interfaces;
    assert_eq!(ifaces[0].stats.len(), 1);
    assert_eq!(ifaces[0].stats[0].if_drop, Some(5));
    assert_eq!(ifaces[0].stats[0].comment.as_deref(), Some("counters"));
    assert_eq!(ifaces[1].stats.len(), 1);
    assert_eq!(ifaces[1].stats[0].if_recv, Some(100));
}

#[test]
fn nrb_chunking_at_one_mebibyte() {
    let mut writer = ethernet_writer();
    let name = vec![b'x'; 1000];
    for i in 0..1100u32 {
        writer.add_ipv4_name(Ipv4Addr::from(0x0a00_0000 + i), &name);
    }
    let bytes = writer.finish().expect("finish");

    // several blocks, each under the cap
    let mut nrb_count = 0;
    let mut name_count = 0;
    let mut rem = &bytes[..];
    while !rem.is_empty() {
        let (next, block) = parse_block_le(rem).expect("block");
        if let Block::NameResolution(ref nrb) = block {
            assert!(nrb.block_len1 as usize <= 1024 * 1024);
            nrb_count += 1;
            for record in &nrb.nr {
                let (_, names) = record.addr_and_names().expect("names");
                name_count += names.len();
            }
        }
        rem = next;
    }
    assert!(nrb_count > 1, "expected chunking, got {} block(s)", nrb_count);
    assert_eq!(name_count, 1100);

    // reading back yields the concatenation
    let resolved = Rc::new(RefCell::new(0usize));
    let sink = resolved.clone();
    let mut reader = reopen(bytes);
    reader.set_ipv4_resolver(Box::new(move |_, name| {
        assert_eq!(name.len(), 1000);
        *sink.borrow_mut() += 1;
    }));
    assert!(reader.next_record().unwrap().is_none());
    assert_eq!(*resolved.borrow(), 1100);
}

#[test]
fn oversized_names_are_dropped() {
    let mut writer = ethernet_writer();
    writer.add_ipv4_name(Ipv4Addr::new(10, 0, 0, 1), &vec![b'y'; 70_000]);
    writer.add_ipv4_name(Ipv4Addr::new(10, 0, 0, 2), b"ok");
    let bytes = writer.finish().expect("finish");

    let resolved = Rc::new(RefCell::new(Vec::new()));
    let sink = resolved.clone();
    let mut reader = reopen(bytes);
    reader.set_ipv4_resolver(Box::new(move |addr, name| {
        sink.borrow_mut().push((addr, name.to_vec()));
    }));
    assert!(reader.next_record().unwrap().is_none());
    let resolved = resolved.borrow();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].0, Ipv4Addr::new(10, 0, 0, 2));
}

#[test]
fn syscall_record_round_trip() {
    let mut writer =
        PcapNGWriter::new(Vec::new(), None, &SectionHeaderInfo::default()).expect("writer");
    let record = Record {
        kind: RecordKind::Syscall,
        if_id: None,
        ts: Some(Timestamp {
            secs: 1_500_000_000,
            nsecs: 123,
            precision: TsPrecision::Nanoseconds,
        }),
        caplen: 8,
        origlen: 8,
        linktype: None,
        comment: None,
        flags: None,
        drop_count: None,
        packet_id: None,
        queue: None,
        verdicts: Vec::new(),
        syscall: Some(SyscallInfo {
            cpu_id: 3,
            thread_id: 4242,
            event_type: 17,
            nparams: Some(2),
            big_endian: false,
        }),
        data: vec![1, 2, 3, 4, 5, 6, 7, 8],
    };
    writer.write_record(&record).expect("write");
    let bytes = writer.finish().expect("finish");

    let mut reader = reopen(bytes);
    let (_, read_back) = reader.next_record().unwrap().unwrap();
    assert_eq!(read_back, record);
    assert_eq!(reader.file_encap(), FileEncap::PerPacket);
}

#[test]
fn journal_record_round_trip() {
    let entry = b"__REALTIME_TIMESTAMP=1576742146001001\nMESSAGE=hi\n".to_vec();
    let mut writer =
        PcapNGWriter::new(Vec::new(), None, &SectionHeaderInfo::default()).expect("writer");
    let record = Record {
        kind: RecordKind::SystemdJournal,
        if_id: None,
        ts: None,
        caplen: entry.len() as u32,
        origlen: entry.len() as u32,
        linktype: None,
        comment: None,
        flags: None,
        drop_count: None,
        packet_id: None,
        queue: None,
        verdicts: Vec::new(),
        syscall: None,
        data: entry.clone(),
    };
    writer.write_record(&record).expect("write");
    let bytes = writer.finish().expect("finish");

    let mut reader = reopen(bytes);
    let (_, read_back) = reader.next_record().unwrap().unwrap();
    assert_eq!(read_back.kind, RecordKind::SystemdJournal);
    assert_eq!(read_back.data, entry);
    let ts = read_back.ts.expect("timestamp recovered from the entry");
    assert_eq!(ts.secs, 1_576_742_146);
    assert_eq!(ts.nsecs, 1_001_000);
    assert_eq!(ts.precision, TsPrecision::Microseconds);
}

fn block_magics(bytes: &[u8]) -> Vec<u32> {
    let mut magics = Vec::new();
    let mut rem = bytes;
    while !rem.is_empty() {
        let (next, block) = parse_block_le(rem).expect("block");
        magics.push(block.magic());
        rem = next;
    }
    magics
}
