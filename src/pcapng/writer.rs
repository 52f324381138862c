use std::borrow::Cow;
use std::io::Write;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};

use cookie_factory::GenError;
use rusticata_macros::align32;

use crate::linktype::Linktype;
use crate::record::{Record, RecordKind, Verdict};
use crate::registry::{lookup_option_handler, BlockFamily};
use crate::serialize::ToVec;
use crate::PcapNGError;

use super::*;

/// Maximum size of a Name Resolution Block emitted by the writer; name
/// records beyond this start a new block.
pub const NRES_BLOCK_MAX_SIZE: usize = 1024 * 1024;

/// Descriptive strings for the Section Header Block of an output file.
#[derive(Clone, Debug, Default)]
pub struct SectionHeaderInfo {
    pub hardware: Option<String>,
    pub os: Option<String>,
    pub user_appl: Option<String>,
    pub comment: Option<String>,
}

/// Configuration of one output interface.
#[derive(Clone, Debug)]
pub struct InterfaceDescription {
    pub linktype: Linktype,
    pub snaplen: u32,
    /// Raw `if_tsresol` exponent byte (default 6, microseconds)
    pub tsresol: u8,
    pub fcslen: Option<u8>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub os: Option<String>,
    pub hardware: Option<String>,
    pub speed: Option<u64>,
    pub comment: Option<String>,
    /// Options the engine does not interpret, written raw or through a
    /// registered option handler
    pub extra_options: Vec<(u16, Vec<u8>)>,
}

impl InterfaceDescription {
    pub fn new(linktype: Linktype, snaplen: u32) -> InterfaceDescription {
        InterfaceDescription {
            linktype,
            snaplen,
            tsresol: 6,
            fcslen: None,
            name: None,
            description: None,
            os: None,
            hardware: None,
            speed: None,
            comment: None,
            extra_options: Vec::new(),
        }
    }
}

struct WriterInterface {
    linktype: Linktype,
    time_units_per_second: u64,
    stats: Vec<InterfaceStats>,
}

/// Writer producing a pcapng output file (always little-endian).
///
/// Blocks are sized before emission: the option area is measured first,
/// then the header, fixed body, payload, padding, options and trailer are
/// written in one buffer per block. Decryption secrets handed to
/// [`write_dsb`] are deferred and flushed before the next packet;
/// accumulated name-resolution entries and per-interface statistics are
/// flushed by [`finish`].
///
/// [`write_dsb`]: PcapNGWriter::write_dsb
/// [`finish`]: PcapNGWriter::finish
pub struct PcapNGWriter<W>
where
    W: Write,
{
    writer: W,
    file_encap: Option<Linktype>,
    interfaces: Vec<WriterInterface>,
    pending_dsbs: Vec<DecryptionSecrets>,
    v4_names: Vec<(Ipv4Addr, Vec<u8>)>,
    v6_names: Vec<(Ipv6Addr, Vec<u8>)>,
}

impl<W> PcapNGWriter<W>
where
    W: Write,
{
    /// Open a writer on `writer` and emit the Section Header Block.
    ///
    /// `file_encap` is the per-file encapsulation: when set, every
    /// interface added later must match it; when `None`, the file is
    /// per-packet and each interface chooses its own.
    pub fn new(
        mut writer: W,
        file_encap: Option<Linktype>,
        section: &SectionHeaderInfo,
    ) -> Result<PcapNGWriter<W>, PcapNGError> {
        let mut options = Vec::new();
        push_string_option(&mut options, OptionCode::Comment, &section.comment);
        push_string_option(&mut options, OptionCode::ShbHardware, &section.hardware);
        push_string_option(&mut options, OptionCode::ShbOs, &section.os);
        push_string_option(&mut options, OptionCode::ShbUserAppl, &section.user_appl);
        let mut shb = SectionHeaderBlock {
            block_type: SHB_MAGIC,
            block_len1: 0,
            bom: BOM_MAGIC,
            major_version: 1,
            minor_version: 0,
            section_len: -1,
            options,
            block_len2: 0,
        };
        let v = shb.to_vec().map_err(gen_error)?;
        writer.write_all(&v)?;
        Ok(PcapNGWriter {
            writer,
            file_encap,
            interfaces: Vec::new(),
            pending_dsbs: Vec::new(),
            v4_names: Vec::new(),
            v6_names: Vec::new(),
        })
    }

    /// Add an interface to the section and emit its Interface Description
    /// Block. Returns the interface id for subsequent records.
    pub fn add_interface(&mut self, desc: &InterfaceDescription) -> Result<u32, PcapNGError> {
        if let Some(file_encap) = self.file_encap {
            if desc.linktype != file_encap {
                return Err(PcapNGError::UnwritableEncap(format!(
                    "interface encapsulation {} disagrees with the per-file encapsulation {}",
                    desc.linktype, file_encap
                )));
            }
        }
        let mut options = Vec::new();
        push_string_option(&mut options, OptionCode::Comment, &desc.comment);
        push_string_option(&mut options, OptionCode::IfName, &desc.name);
        push_string_option(&mut options, OptionCode::IfDescription, &desc.description);
        push_string_option(&mut options, OptionCode::IfOs, &desc.os);
        push_string_option(&mut options, OptionCode::IfHardware, &desc.hardware);
        if let Some(speed) = desc.speed {
            options.push(PcapNGOption::owned(
                OptionCode::IfSpeed,
                speed.to_le_bytes().to_vec(),
            ));
        }
        if let Some(fcslen) = desc.fcslen {
            options.push(PcapNGOption::owned(OptionCode::IfFcslen, vec![fcslen]));
        }
        for (code, value) in &desc.extra_options {
            options.push(extra_option(
                BlockFamily::InterfaceDescription,
                *code,
                value,
            )?);
        }
        let mut idb = InterfaceDescriptionBlock {
            block_type: IDB_MAGIC,
            block_len1: 0,
            linktype: desc.linktype,
            reserved: 0,
            snaplen: desc.snaplen,
            options,
            block_len2: 0,
            if_tsresol: desc.tsresol,
            if_tsoffset: 0,
        };
        let v = idb.to_vec().map_err(gen_error)?;
        self.writer.write_all(&v)?;
        let if_id = self.interfaces.len() as u32;
        self.interfaces.push(WriterInterface {
            linktype: desc.linktype,
            time_units_per_second: build_ts_resolution(desc.tsresol),
            stats: Vec::new(),
        });
        Ok(if_id)
    }

    /// Write one record. Packet records become Enhanced Packet Blocks;
    /// kernel events and journal entries keep their dedicated block types.
    ///
    /// Deferred Decryption Secrets Blocks are flushed first, so mirrored
    /// secrets always precede the packets they apply to.
    pub fn write_record(&mut self, record: &Record) -> Result<(), PcapNGError> {
        self.flush_pending_dsbs()?;
        match record.kind {
            RecordKind::Packet => self.write_packet_record(record),
            RecordKind::Syscall => self.write_syscall_record(record),
            RecordKind::SystemdJournal => self.write_journal_record(record),
        }
    }

    fn write_packet_record(&mut self, record: &Record) -> Result<(), PcapNGError> {
        let if_id = record.if_id.ok_or_else(|| {
            PcapNGError::UnwritableEncap("packet record carries no interface id".to_owned())
        })?;
        let iface = self.interfaces.get(if_id as usize).ok_or_else(|| {
            PcapNGError::UnwritableEncap(format!(
                "interface id {} has not been added to this writer",
                if_id
            ))
        })?;
        match record.linktype {
            Some(linktype) if linktype == iface.linktype => (),
            Some(linktype) => {
                return Err(PcapNGError::UnwritableEncap(format!(
                    "record encapsulation {} disagrees with interface {} encapsulation {}",
                    linktype, if_id, iface.linktype
                )))
            }
            None => {
                return Err(PcapNGError::UnwritableEncap(
                    "packet record carries no encapsulation".to_owned(),
                ))
            }
        }
        let caplen = record.data.len() as u32;
        let max = iface.linktype.max_snaplen();
        if caplen > max {
            return Err(PcapNGError::PacketTooLarge(format!(
                "captured length {} is larger than {} for this encapsulation",
                caplen, max
            )));
        }
        let (ts_high, ts_low) = match record.ts {
            Some(ts) => ts_to_raw(ts.secs, ts.nsecs, iface.time_units_per_second),
            None => (0, 0),
        };
        let mut options = Vec::new();
        push_string_option(&mut options, OptionCode::Comment, &record.comment);
        if let Some(flags) = record.flags {
            options.push(PcapNGOption::owned(
                OptionCode::EpbFlags,
                flags.to_le_bytes().to_vec(),
            ));
        }
        if let Some(drop_count) = record.drop_count {
            options.push(PcapNGOption::owned(
                OptionCode::EpbDropCount,
                drop_count.to_le_bytes().to_vec(),
            ));
        }
        if let Some(packet_id) = record.packet_id {
            options.push(PcapNGOption::owned(
                OptionCode::EpbPacketId,
                packet_id.to_le_bytes().to_vec(),
            ));
        }
        if let Some(queue) = record.queue {
            options.push(PcapNGOption::owned(
                OptionCode::EpbQueue,
                queue.to_le_bytes().to_vec(),
            ));
        }
        for verdict in &record.verdicts {
            options.push(PcapNGOption::owned(
                OptionCode::EpbVerdict,
                verdict_option_value(verdict),
            ));
        }
        let mut epb = EnhancedPacketBlock {
            block_type: EPB_MAGIC,
            block_len1: 0,
            if_id,
            ts_high,
            ts_low,
            caplen,
            origlen: record.origlen,
            data: &record.data,
            options,
            block_len2: 0,
        };
        let v = epb.to_vec().map_err(gen_error)?;
        self.writer.write_all(&v)?;
        Ok(())
    }

    fn write_syscall_record(&mut self, record: &Record) -> Result<(), PcapNGError> {
        let info = record.syscall.ok_or_else(|| {
            PcapNGError::Internal("syscall record carries no event header".to_owned())
        })?;
        let ts = match record.ts {
            Some(ts) => ts
                .secs
                .wrapping_mul(1_000_000_000)
                .wrapping_add(ts.nsecs as u64),
            None => 0,
        };
        let mut evt = SysdigEventBlock {
            block_type: 0,
            block_len1: 0,
            cpu_id: info.cpu_id,
            ts,
            thread_id: info.thread_id,
            event_len: record.origlen,
            event_type: info.event_type,
            nparams: info.nparams,
            data: &record.data,
            block_len2: 0,
        };
        let v = evt.to_vec().map_err(gen_error)?;
        self.writer.write_all(&v)?;
        Ok(())
    }

    fn write_journal_record(&mut self, record: &Record) -> Result<(), PcapNGError> {
        let mut sje = SystemdJournalExportBlock {
            block_type: SJE_MAGIC,
            block_len1: 0,
            data: &record.data,
            block_len2: 0,
        };
        let v = sje.to_vec().map_err(gen_error)?;
        self.writer.write_all(&v)?;
        Ok(())
    }

    /// Queue a Decryption Secrets Block; it is emitted before the next
    /// packet, or at finish.
    pub fn write_dsb(&mut self, secrets: DecryptionSecrets) -> Result<(), PcapNGError> {
        self.pending_dsbs.push(secrets);
        Ok(())
    }

    /// Add an address-to-name binding emitted in the Name Resolution
    /// Blocks at finish.
    pub fn add_ipv4_name(&mut self, addr: Ipv4Addr, name: &[u8]) {
        self.v4_names.push((addr, name.to_vec()));
    }

    /// IPv6 variant of [`Self::add_ipv4_name`].
    pub fn add_ipv6_name(&mut self, addr: Ipv6Addr, name: &[u8]) {
        self.v6_names.push((addr, name.to_vec()));
    }

    /// Queue a statistics snapshot for `if_id`, flushed in order at finish.
    pub fn write_interface_statistics(
        &mut self,
        if_id: u32,
        stats: InterfaceStats,
    ) -> Result<(), PcapNGError> {
        let iface = self.interfaces.get_mut(if_id as usize).ok_or_else(|| {
            PcapNGError::UnwritableEncap(format!(
                "interface id {} has not been added to this writer",
                if_id
            ))
        })?;
        iface.stats.push(stats);
        Ok(())
    }

    fn flush_pending_dsbs(&mut self) -> Result<(), PcapNGError> {
        let dsbs = mem::take(&mut self.pending_dsbs);
        for dsb in &dsbs {
            let mut block = DecryptionSecretsBlock {
                block_type: DSB_MAGIC,
                block_len1: 0,
                secrets_type: dsb.secrets_type,
                secrets_len: dsb.data.len() as u32,
                data: &dsb.data,
                options: Vec::new(),
                block_len2: 0,
            };
            let v = block.to_vec().map_err(gen_error)?;
            self.writer.write_all(&v)?;
        }
        Ok(())
    }

    fn flush_name_records(&mut self) -> Result<(), PcapNGError> {
        let v4_names = mem::take(&mut self.v4_names);
        let v6_names = mem::take(&mut self.v6_names);
        let mut records: Vec<(NameRecordType, Vec<u8>)> = Vec::new();
        for (addr, name) in &v4_names {
            push_name_record(&mut records, NameRecordType::Ipv4, &addr.octets(), name);
        }
        for (addr, name) in &v6_names {
            push_name_record(&mut records, NameRecordType::Ipv6, &addr.octets(), name);
        }
        if records.is_empty() {
            return Ok(());
        }
        // chunk the records so no single block exceeds the size cap
        let mut start = 0;
        // block header, end-of-records record, trailer
        let mut size = 16;
        for (i, (_, value)) in records.iter().enumerate() {
            let record_size = 4 + align32!(value.len());
            if size + record_size > NRES_BLOCK_MAX_SIZE && i > start {
                self.write_nrb(&records[start..i])?;
                start = i;
                size = 16;
            }
            size += record_size;
        }
        self.write_nrb(&records[start..])
    }

    fn write_nrb(&mut self, chunk: &[(NameRecordType, Vec<u8>)]) -> Result<(), PcapNGError> {
        let nr = chunk
            .iter()
            .map(|(record_type, value)| NameRecord {
                record_type: *record_type,
                record_value: value,
            })
            .collect();
        let mut nrb = NameResolutionBlock {
            block_type: NRB_MAGIC,
            block_len1: 0,
            nr,
            options: Vec::new(),
            block_len2: 0,
        };
        let v = nrb.to_vec().map_err(gen_error)?;
        self.writer.write_all(&v)?;
        Ok(())
    }

    fn flush_statistics(&mut self) -> Result<(), PcapNGError> {
        let interfaces = mem::take(&mut self.interfaces);
        for (if_id, iface) in interfaces.iter().enumerate() {
            for stats in &iface.stats {
                let mut options = Vec::new();
                push_string_option(&mut options, OptionCode::Comment, &stats.comment);
                if let Some(start_time) = stats.start_time {
                    options.push(ts_option(OptionCode::IsbStartTime, start_time));
                }
                if let Some(end_time) = stats.end_time {
                    options.push(ts_option(OptionCode::IsbEndTime, end_time));
                }
                push_u64_option(&mut options, OptionCode::IsbIfRecv, stats.if_recv);
                push_u64_option(&mut options, OptionCode::IsbIfDrop, stats.if_drop);
                push_u64_option(&mut options, OptionCode::IsbFilterAccept, stats.filter_accept);
                push_u64_option(&mut options, OptionCode::IsbOsDrop, stats.os_drop);
                push_u64_option(&mut options, OptionCode::IsbUsrDeliv, stats.usr_deliv);
                let mut isb = InterfaceStatisticsBlock {
                    block_type: ISB_MAGIC,
                    block_len1: 0,
                    if_id: if_id as u32,
                    ts_high: (stats.ts >> 32) as u32,
                    ts_low: stats.ts as u32,
                    options,
                    block_len2: 0,
                };
                let v = isb.to_vec().map_err(gen_error)?;
                self.writer.write_all(&v)?;
            }
        }
        self.interfaces = interfaces;
        Ok(())
    }

    /// Flush the deferred blocks (secrets, name resolutions, per-interface
    /// statistics in order) and return the output handle.
    pub fn finish(mut self) -> Result<W, PcapNGError> {
        self.flush_pending_dsbs()?;
        self.flush_name_records()?;
        self.flush_statistics()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn gen_error(e: GenError) -> PcapNGError {
    match e {
        GenError::BufferTooSmall(n) => {
            PcapNGError::OutOfMemory(format!("serialization buffer too small ({} bytes)", n))
        }
        other => PcapNGError::Internal(format!("serialization failed: {:?}", other)),
    }
}

fn push_string_option(
    options: &mut Vec<PcapNGOption<'static>>,
    code: OptionCode,
    value: &Option<String>,
) {
    if let Some(s) = value {
        options.push(PcapNGOption::owned(code, s.as_bytes().to_vec()));
    }
}

fn push_u64_option(
    options: &mut Vec<PcapNGOption<'static>>,
    code: OptionCode,
    value: Option<u64>,
) {
    if let Some(v) = value {
        options.push(PcapNGOption::owned(code, v.to_le_bytes().to_vec()));
    }
}

/// Encode a 64-bit timestamp option, most significant half first.
fn ts_option(code: OptionCode, raw_ts: u64) -> PcapNGOption<'static> {
    let mut value = ((raw_ts >> 32) as u32).to_le_bytes().to_vec();
    value.extend_from_slice(&(raw_ts as u32).to_le_bytes());
    PcapNGOption::owned(code, value)
}

fn verdict_option_value(verdict: &Verdict) -> Vec<u8> {
    match verdict {
        Verdict::Hardware(bytes) => {
            let mut out = vec![0u8];
            out.extend_from_slice(bytes);
            out
        }
        Verdict::LinuxEbpfTc(v) => {
            let mut out = vec![1u8];
            out.extend_from_slice(&v.to_le_bytes());
            out
        }
        Verdict::LinuxEbpfXdp(v) => {
            let mut out = vec![2u8];
            out.extend_from_slice(&v.to_le_bytes());
            out
        }
    }
}

/// Build one name record, dropping names too long to fit a single record.
fn push_name_record(
    records: &mut Vec<(NameRecordType, Vec<u8>)>,
    record_type: NameRecordType,
    addr: &[u8],
    name: &[u8],
) {
    if name.len() > 65535 - addr.len() - 1 {
        log::warn!(
            "dropping resolved name of {} bytes: too long for a name resolution record",
            name.len()
        );
        return;
    }
    let mut value = addr.to_vec();
    value.extend_from_slice(name);
    value.push(0);
    records.push((record_type, value));
}

/// Encode an extension option through its registered handler, or keep it
/// raw when none is registered.
fn extra_option(
    family: BlockFamily,
    code: u16,
    value: &[u8],
) -> Result<PcapNGOption<'static>, PcapNGError> {
    if let Some(handler) = lookup_option_handler(family, code) {
        let mut out = Vec::with_capacity((handler.sizer)(value) as usize);
        (handler.writer)(value, &mut out)?;
        let len = out.len() as u16;
        return Ok(PcapNGOption {
            code: OptionCode(code),
            len,
            value: Cow::Owned(out),
        });
    }
    Ok(PcapNGOption::owned(OptionCode(code), value.to_vec()))
}
