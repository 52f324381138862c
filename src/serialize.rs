use crate::pcapng::*;
use cookie_factory::bytes::{le_i64, le_u16, le_u32, le_u64};
use cookie_factory::combinator::{cond, slice};
use cookie_factory::multi::many_ref;
use cookie_factory::sequence::tuple;
use cookie_factory::{gen, GenError, SerializeFn};
use rusticata_macros::align32;
use std::borrow::Cow;
use std::io::Write;

/// Common trait for all serialization functions
pub trait ToVec {
    /// Serialize to bytes representation (little-endian).
    /// Check values and fix all fields before serializing.
    fn to_vec(&mut self) -> Result<Vec<u8>, GenError> {
        self.fix();
        self.to_vec_raw()
    }

    /// Check and correct all fields: use magic, fix lengths fields and other values if possible.
    fn fix(&mut self) {}

    /// Serialize to bytes representation (little-endian). Do not check values
    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError>;
}

fn padding_for<'a, W: Write + 'a>(unaligned_length: u32) -> impl SerializeFn<W> + 'a {
    let length = align32!(unaligned_length) - unaligned_length;
    slice(if length > 0 {
        &[0, 0, 0, 0][..length as usize]
    } else {
        b""
    })
}

impl<'a> ToVec for PcapNGOption<'a> {
    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::new();
        gen(pcapngoption_le(self), &mut v).map(|res| res.0.to_vec())
    }
}

fn pcapngoption_le<'a, 'b: 'a, W: Write + 'a>(i: &'b PcapNGOption) -> impl SerializeFn<W> + 'a {
    tuple((
        le_u16(i.code.0),
        le_u16(i.len),
        slice(&i.value),
        padding_for(i.value.len() as u32),
    ))
}

fn options_length(options: &[PcapNGOption]) -> usize {
    options.iter().map(|o| align32!(4 + o.value.len())).sum()
}

fn fix_options(options: &mut Vec<PcapNGOption>) {
    options.retain(|e| e.code != OptionCode::EndOfOpt);
    if !options.is_empty() {
        // a non-empty option list must carry the end-of-options sentinel
        options.push(PcapNGOption {
            code: OptionCode::EndOfOpt,
            len: 0,
            value: Cow::Borrowed(&[]),
        })
    }
}

impl<'a> ToVec for SectionHeaderBlock<'a> {
    /// Check and correct all fields: use magic, version and fix lengths fields
    fn fix(&mut self) {
        self.block_type = SHB_MAGIC;
        self.bom = BOM_MAGIC;
        self.major_version = 1;
        self.minor_version = 0;
        fix_options(&mut self.options);
        // fix length
        let length = (28 + options_length(&self.options)) as u32;
        self.block_len1 = length;
        self.block_len2 = length;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u32(self.bom),
                le_u16(self.major_version),
                le_u16(self.minor_version),
                le_i64(self.section_len),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for InterfaceDescriptionBlock<'a> {
    /// Check and correct all fields: use magic, set time resolution and fix lengths fields
    fn fix(&mut self) {
        self.block_type = IDB_MAGIC;
        self.reserved = 0;
        // a non-default time resolution must be declared in the options
        if self.if_tsresol != 6 && !self.options.iter().any(|o| o.code == OptionCode::IfTsresol) {
            self.options.push(PcapNGOption {
                code: OptionCode::IfTsresol,
                len: 1,
                value: Cow::Owned(vec![self.if_tsresol, 0, 0, 0]),
            });
        }
        if self.if_tsoffset != 0 && !self.options.iter().any(|o| o.code == OptionCode::IfTsoffset) {
            self.options.push(PcapNGOption {
                code: OptionCode::IfTsoffset,
                len: 8,
                value: Cow::Owned(self.if_tsoffset.to_le_bytes().to_vec()),
            });
        }
        fix_options(&mut self.options);
        // fix length
        let length = (20 + options_length(&self.options)) as u32;
        self.block_len1 = length;
        self.block_len2 = length;
    }

    /// Serialize to bytes representation. Do not check values
    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u16(self.linktype.0 as u16),
                le_u16(self.reserved),
                le_u32(self.snaplen),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for EnhancedPacketBlock<'a> {
    /// Check and correct all fields: use magic, version and fix lengths fields
    fn fix(&mut self) {
        self.block_type = EPB_MAGIC;
        fix_options(&mut self.options);
        // fix length
        let length = (32 + self.data.len() + options_length(&self.options)) as u32;
        self.block_len1 = align32!(length);
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u32(self.if_id),
                le_u32(self.ts_high),
                le_u32(self.ts_low),
                le_u32(self.caplen),
                le_u32(self.origlen),
                slice(self.data),
                padding_for(self.data.len() as u32),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for PacketBlock<'a> {
    fn fix(&mut self) {
        self.block_type = PB_MAGIC;
        fix_options(&mut self.options);
        // fix length
        let length = (32 + self.data.len() + options_length(&self.options)) as u32;
        self.block_len1 = align32!(length);
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u16(self.if_id),
                le_u16(self.drops_count),
                le_u32(self.ts_high),
                le_u32(self.ts_low),
                le_u32(self.caplen),
                le_u32(self.origlen),
                slice(self.data),
                padding_for(self.data.len() as u32),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for SimplePacketBlock<'a> {
    fn fix(&mut self) {
        self.block_type = SPB_MAGIC;
        // fix length
        self.block_len1 = (16 + align32!(self.data.len())) as u32;
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u32(self.origlen),
                slice(self.data),
                padding_for(self.data.len() as u32),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

fn namerecord_le<'a, 'b: 'a, W: Write + 'a>(i: &'b NameRecord) -> impl SerializeFn<W> + 'a {
    tuple((
        le_u16(i.record_type.0),
        le_u16(i.record_value.len() as u16),
        slice(i.record_value),
        padding_for(i.record_value.len() as u32),
    ))
}

fn namerecords_length(nr: &[NameRecord]) -> usize {
    nr.iter().map(|n| 4 + align32!(n.record_value.len())).sum()
}

impl<'a> ToVec for NameResolutionBlock<'a> {
    fn fix(&mut self) {
        self.block_type = NRB_MAGIC;
        fix_options(&mut self.options);
        // fix length; 4 more bytes for the end-of-records record
        let length =
            (12 + namerecords_length(&self.nr) + 4 + options_length(&self.options)) as u32;
        self.block_len1 = align32!(length);
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                many_ref(&self.nr, namerecord_le),
                // end-of-records record
                le_u16(0),
                le_u16(0),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for InterfaceStatisticsBlock<'a> {
    fn fix(&mut self) {
        self.block_type = ISB_MAGIC;
        fix_options(&mut self.options);
        // fix length
        self.block_len1 = (24 + align32!(options_length(&self.options))) as u32;
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u32(self.if_id),
                le_u32(self.ts_high),
                le_u32(self.ts_low),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for SystemdJournalExportBlock<'a> {
    fn fix(&mut self) {
        self.block_type = SJE_MAGIC;
        // fix length
        self.block_len1 = (12 + align32!(self.data.len())) as u32;
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                slice(self.data),
                padding_for(self.data.len() as u32),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for DecryptionSecretsBlock<'a> {
    fn fix(&mut self) {
        self.block_type = DSB_MAGIC;
        self.secrets_len = self.data.len() as u32;
        fix_options(&mut self.options);
        // fix length
        self.block_len1 =
            (20 + align32!(self.data.len()) + options_length(&self.options)) as u32;
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u32(self.secrets_type.0),
                le_u32(self.secrets_len),
                slice(self.data),
                padding_for(self.data.len() as u32),
                many_ref(&self.options, pcapngoption_le),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for SysdigEventBlock<'a> {
    fn fix(&mut self) {
        self.block_type = if self.nparams.is_some() {
            SYSDIG_EVENT_V2_MAGIC
        } else {
            SYSDIG_EVENT_MAGIC
        };
        let header_len = if self.nparams.is_some() { 28 } else { 24 };
        // fix length
        self.block_len1 = (12 + header_len + align32!(self.data.len())) as u32;
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::with_capacity(64);
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                le_u16(self.cpu_id),
                le_u64(self.ts),
                le_u64(self.thread_id),
                le_u32(self.event_len),
                le_u16(self.event_type),
                cond(self.nparams.is_some(), le_u32(self.nparams.unwrap_or(0))),
                slice(self.data),
                padding_for(self.data.len() as u32),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for UnknownBlock<'a> {
    fn fix(&mut self) {
        // do not touch type, it is unknown
        // fix length
        self.block_len1 = (12 + align32!(self.data.len())) as u32;
        self.block_len2 = self.block_len1;
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        let mut v = Vec::new();
        gen(
            tuple((
                le_u32(self.block_type),
                le_u32(self.block_len1),
                slice(self.data),
                padding_for(self.data.len() as u32),
                le_u32(self.block_len2),
            )),
            &mut v,
        )
        .map(|res| res.0.to_vec())
    }
}

impl<'a> ToVec for Block<'a> {
    fn fix(&mut self) {
        match self {
            Block::SectionHeader(b) => b.fix(),
            Block::InterfaceDescription(b) => b.fix(),
            Block::EnhancedPacket(b) => b.fix(),
            Block::Packet(b) => b.fix(),
            Block::SimplePacket(b) => b.fix(),
            Block::NameResolution(b) => b.fix(),
            Block::InterfaceStatistics(b) => b.fix(),
            Block::DecryptionSecrets(b) => b.fix(),
            Block::SysdigEvent(b) => b.fix(),
            Block::SystemdJournalExport(b) => b.fix(),
            Block::Unknown(b) => b.fix(),
        }
    }

    fn to_vec_raw(&self) -> Result<Vec<u8>, GenError> {
        match self {
            Block::SectionHeader(b) => b.to_vec_raw(),
            Block::InterfaceDescription(b) => b.to_vec_raw(),
            Block::EnhancedPacket(b) => b.to_vec_raw(),
            Block::Packet(b) => b.to_vec_raw(),
            Block::SimplePacket(b) => b.to_vec_raw(),
            Block::NameResolution(b) => b.to_vec_raw(),
            Block::InterfaceStatistics(b) => b.to_vec_raw(),
            Block::DecryptionSecrets(b) => b.to_vec_raw(),
            Block::SysdigEvent(b) => b.to_vec_raw(),
            Block::SystemdJournalExport(b) => b.to_vec_raw(),
            Block::Unknown(b) => b.to_vec_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use crate::pcapng::*;
    use crate::serialize::ToVec;
    use crate::Linktype;

    #[test]
    fn test_serialize_shb() {
        let shb = SectionHeaderBlock {
            block_type: SHB_MAGIC,
            block_len1: 28,
            bom: BOM_MAGIC,
            major_version: 1,
            minor_version: 0,
            section_len: -1,
            options: Vec::new(),
            block_len2: 28,
        };
        let v = shb.to_vec_raw().expect("serialize");
        assert_eq!(v.len(), 28);
        let res = parse_sectionheaderblock_le(&v);
        assert!(res.is_ok());
    }

    #[test]
    fn test_serialize_shb_fix() {
        let mut shb = SectionHeaderBlock {
            block_type: 0,
            block_len1: 0,
            bom: 0,
            major_version: 0,
            minor_version: 0,
            section_len: -1,
            options: vec![
                // Unaligned option length
                PcapNGOption {
                    code: OptionCode::ShbUserAppl,
                    len: 5,
                    value: Cow::Borrowed(b"meows"),
                },
                // Missing endofopt
            ],
            block_len2: 0,
        };

        let v = shb.to_vec().expect("serialize");
        let (rem, shb2) = parse_sectionheaderblock_le(&v).expect("reparse");
        assert!(rem.is_empty());
        assert_eq!(shb2.shb_userappl(), Some(Ok("meows")));
    }

    #[test]
    fn test_serialize_idb() {
        let mut idb = InterfaceDescriptionBlock {
            block_type: IDB_MAGIC,
            block_len1: 20,
            linktype: Linktype::RAW,
            reserved: 0,
            snaplen: 65535,
            options: vec![],
            block_len2: 20,
            if_tsresol: 6,
            if_tsoffset: 0,
        };
        let v = idb.to_vec().expect("serialize");
        // default resolution requires no option
        assert_eq!(v.len(), 20);
        let res = parse_interfacedescriptionblock_le(&v);
        assert!(res.is_ok());
    }

    #[test]
    fn test_serialize_idb_tsresol() {
        let mut idb = InterfaceDescriptionBlock {
            block_type: IDB_MAGIC,
            block_len1: 0,
            linktype: Linktype::ETHERNET,
            reserved: 0,
            snaplen: 0,
            options: vec![],
            block_len2: 0,
            if_tsresol: 9,
            if_tsoffset: 0,
        };
        let v = idb.to_vec().expect("serialize");
        let (rem, idb2) = parse_interfacedescriptionblock_le(&v).expect("reparse");
        assert!(rem.is_empty());
        assert_eq!(idb2.if_tsresol, 9);
        assert_eq!(idb2.ts_resolution(), 1_000_000_000);
    }

    #[test]
    fn test_serialize_epb() {
        let mut epb = EnhancedPacketBlock {
            block_type: EPB_MAGIC,
            block_len1: 0,
            if_id: 0,
            ts_high: 0x0005_D4AE,
            ts_low: 0x9123_4567,
            caplen: 4,
            origlen: 4,
            data: &[0xde, 0xad, 0xbe, 0xef],
            options: Vec::new(),
            block_len2: 0,
        };
        let v = epb.to_vec().expect("serialize");
        assert_eq!(v.len(), 36);
        let (rem, epb2) = parse_enhancedpacketblock_le(&v).expect("reparse");
        assert!(rem.is_empty());
        assert_eq!(epb2.packet_data(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_serialize_nrb_round_trip() {
        let mut nrb = NameResolutionBlock {
            block_type: NRB_MAGIC,
            block_len1: 0,
            nr: vec![NameRecord {
                record_type: NameRecordType::Ipv4,
                record_value: b"\x7f\x00\x00\x01localhost\x00",
            }],
            options: Vec::new(),
            block_len2: 0,
        };
        let v = nrb.to_vec().expect("serialize");
        let (rem, nrb2) = parse_nameresolutionblock_le(&v).expect("reparse");
        assert!(rem.is_empty());
        assert_eq!(nrb2.nr.len(), 1);
        let (addr, names) = nrb2.nr[0].addr_and_names().expect("names");
        assert_eq!(addr, &[127, 0, 0, 1]);
        assert_eq!(names, vec![&b"localhost"[..]]);
    }

    #[test]
    fn test_serialize_sysdig_v2() {
        let mut evt = SysdigEventBlock {
            block_type: SYSDIG_EVENT_V2_MAGIC,
            block_len1: 0,
            cpu_id: 1,
            ts: 1_500_000_000_000_000_123,
            thread_id: 4242,
            event_len: 8,
            event_type: 17,
            nparams: Some(2),
            data: &[1, 2, 3, 4, 5, 6, 7, 8],
            block_len2: 0,
        };
        let v = evt.to_vec().expect("serialize");
        let (rem, evt2) = parse_sysdigeventv2block_le(&v).expect("reparse");
        assert!(rem.is_empty());
        assert_eq!(evt2.cpu_id, 1);
        assert_eq!(evt2.ts, 1_500_000_000_000_000_123);
        assert_eq!(evt2.nparams, Some(2));
        assert_eq!(&evt2.data[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_serialize_dsb() {
        let mut dsb = DecryptionSecretsBlock {
            block_type: DSB_MAGIC,
            block_len1: 0,
            secrets_type: SecretsType::TlsKeyLog,
            secrets_len: 0,
            data: b"CLIENT_RANDOM 0123456789\x0a",
            options: Vec::new(),
            block_len2: 0,
        };
        let v = dsb.to_vec().expect("serialize");
        let (rem, dsb2) = parse_decryptionsecretsblock_le(&v).expect("reparse");
        assert!(rem.is_empty());
        assert_eq!(dsb2.secrets_type, SecretsType::TlsKeyLog);
        assert_eq!(dsb2.secrets_len as usize, dsb2.data.len());
    }
}
