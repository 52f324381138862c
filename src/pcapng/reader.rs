use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};

use rusticata_macros::align32;

use crate::linktype::Linktype;
use crate::record::{Record, RecordKind, SyscallInfo, Timestamp, TsPrecision};
use crate::registry::{lookup_block_handler, lookup_option_handler, BlockFamily};
use crate::{PcapError, PcapNGError};

use super::*;

/// Collaborator consuming the per-encapsulation pseudo-header prefix of a
/// packet payload.
///
/// Given the encapsulation, the captured length and the payload, the codec
/// returns the number of leading bytes forming the pseudo-header; the
/// engine strips them from the record and subtracts them from both length
/// fields.
pub trait PseudoHeaderCodec {
    fn prefix_len(
        &mut self,
        linktype: Linktype,
        caplen: u32,
        data: &[u8],
    ) -> Result<usize, PcapNGError>;
}

/// Callback invoked for each name of an IPv4 name-resolution record.
pub type Ipv4Resolver = Box<dyn FnMut(Ipv4Addr, &[u8])>;
/// Callback invoked for each name of an IPv6 name-resolution record.
pub type Ipv6Resolver = Box<dyn FnMut(Ipv6Addr, &[u8])>;

/// Error returned by [`PcapNGReader::open`], giving the input handle back
/// so the caller can probe it as another format.
///
/// The handle position is restored to where it was before the probe.
pub struct OpenError<R> {
    pub error: PcapNGError,
    pub reader: R,
}

impl<R> OpenError<R> {
    /// True if the input was simply not recognized as pcapng (as opposed to
    /// a recognized-but-broken file or an I/O failure).
    pub fn is_not_our_format(&self) -> bool {
        matches!(self.error, PcapNGError::NotOurFormat)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> fmt::Debug for OpenError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenError").field("error", &self.error).finish()
    }
}

impl<R> fmt::Display for OpenError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<R> std::error::Error for OpenError<R> {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ReaderState {
    InSection,
    AtEof,
}

/// Streaming reader over a pcapng input.
///
/// The reader walks blocks sequentially with [`next_record`], folding
/// metadata blocks (section headers, interface descriptions, statistics,
/// secrets, name resolutions) into its state and surfacing payload blocks
/// as [`Record`]s. A second, random-access cursor is available through
/// [`read_record_at`]: it re-reads a block at a known offset without
/// consuming or advancing the sequential cursor, using the retained section
/// list to resolve byte order and interfaces.
///
/// ## Example
///
/// ```rust,no_run
/// use pcapng_io::PcapNGReader;
/// use std::fs::File;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::open("capture.pcapng")?;
/// let mut reader = match PcapNGReader::open(file) {
///     Ok(r) => r,
///     Err(e) if e.is_not_our_format() => {
///         // try another capture format on e.into_inner()
///         return Ok(());
///     }
///     Err(e) => return Err(e.error.into()),
/// };
/// while let Some((_offset, record)) = reader.next_record()? {
///     println!("{} bytes captured", record.caplen);
/// }
/// # Ok(())
/// # }
/// ```
///
/// [`next_record`]: PcapNGReader::next_record
/// [`read_record_at`]: PcapNGReader::read_record_at
pub struct PcapNGReader<R>
where
    R: Read + Seek,
{
    reader: R,
    state: ReaderState,
    /// Scratch buffer of the sequential cursor, one block at a time
    buf: Vec<u8>,
    /// Scratch buffer of the random-access cursor
    seek_buf: Vec<u8>,
    /// File offset of the next sequential block
    offset: u64,
    sections: Vec<SectionInfo>,
    file_encap: FileEncap,
    file_tsprec: FileTsPrecision,
    dsbs: Vec<DecryptionSecrets>,
    ipv4_resolver: Option<Ipv4Resolver>,
    ipv6_resolver: Option<Ipv6Resolver>,
    phdr_codec: Option<Box<dyn PseudoHeaderCodec>>,
}

impl<R> fmt::Debug for PcapNGReader<R>
where
    R: Read + Seek,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcapNGReader")
            .field("state", &self.state)
            .field("offset", &self.offset)
            .field("sections", &self.sections)
            .field("file_encap", &self.file_encap)
            .field("file_tsprec", &self.file_tsprec)
            .field("dsbs", &self.dsbs)
            .field("ipv4_resolver", &self.ipv4_resolver.as_ref().map(|_| "<fn>"))
            .field("ipv6_resolver", &self.ipv6_resolver.as_ref().map(|_| "<fn>"))
            .field("phdr_codec", &self.phdr_codec.as_ref().map(|_| "<codec>"))
            .finish_non_exhaustive()
    }
}

impl<R> PcapNGReader<R>
where
    R: Read + Seek,
{
    /// Probe `reader` and, if it starts with a valid Section Header Block,
    /// build a reader positioned after that block.
    ///
    /// Probing is non-destructive: when the input is not pcapng (short
    /// input, unknown byte-order magic, nonsensical length), the handle is
    /// seeked back to its starting position and returned inside the error,
    /// with kind `NotOurFormat`.
    pub fn open(mut reader: R) -> Result<PcapNGReader<R>, OpenError<R>> {
        let start = match reader.stream_position() {
            Ok(pos) => pos,
            Err(e) => {
                return Err(OpenError {
                    error: e.into(),
                    reader,
                })
            }
        };
        if let Err(error) = Self::probe(&mut reader) {
            let _ = reader.seek(SeekFrom::Start(start));
            return Err(OpenError { error, reader });
        }
        // rewind the probe bytes; the first block is consumed for real below
        if let Err(e) = reader.seek(SeekFrom::Start(start)) {
            return Err(OpenError {
                error: e.into(),
                reader,
            });
        }
        let mut ng = PcapNGReader {
            reader,
            state: ReaderState::InSection,
            buf: Vec::new(),
            seek_buf: Vec::new(),
            offset: start,
            sections: Vec::new(),
            file_encap: FileEncap::Unknown,
            file_tsprec: FileTsPrecision::Unknown,
            dsbs: Vec::new(),
            ipv4_resolver: None,
            ipv6_resolver: None,
            phdr_codec: None,
        };
        // consume the first SHB; this also gates the declared version
        match ng.advance() {
            Ok(Some(_)) => {
                // the first block of a section is never a record
                let _ = ng.reader.seek(SeekFrom::Start(start));
                return Err(OpenError {
                    error: PcapNGError::Internal(
                        "first block produced a record before any section".to_owned(),
                    ),
                    reader: ng.reader,
                });
            }
            Ok(None) => (),
            Err(error) => {
                let _ = ng.reader.seek(SeekFrom::Start(start));
                return Err(OpenError {
                    error,
                    reader: ng.reader,
                });
            }
        }
        Ok(ng)
    }

    /// Check the 12 probe bytes: SHB block type, plausible length, known
    /// byte-order magic. Any short read collapses to `NotOurFormat`.
    fn probe(reader: &mut R) -> Result<(), PcapNGError> {
        let mut probe = [0u8; 12];
        match read_or_eof(reader, &mut probe) {
            Ok(12) => (),
            Ok(_) => return Err(PcapNGError::NotOurFormat),
            Err(e) => return Err(e.into()),
        }
        let block_type = u32::from_le_bytes([probe[0], probe[1], probe[2], probe[3]]);
        if block_type != SHB_MAGIC {
            return Err(PcapNGError::NotOurFormat);
        }
        let bom = u32::from_le_bytes([probe[8], probe[9], probe[10], probe[11]]);
        let big_endian = if bom == BOM_MAGIC {
            false
        } else if bom == BOM_MAGIC.swap_bytes() {
            true
        } else {
            return Err(PcapNGError::NotOurFormat);
        };
        let len_bytes = [probe[4], probe[5], probe[6], probe[7]];
        let block_len = if big_endian {
            u32::from_be_bytes(len_bytes)
        } else {
            u32::from_le_bytes(len_bytes)
        };
        if block_len < 28 || block_len > MAX_BLOCK_SIZE {
            return Err(PcapNGError::NotOurFormat);
        }
        Ok(())
    }

    /// Read the next record of the sequential cursor, or `None` at end of
    /// file. Returns the file offset of the block that produced the
    /// record, usable later with [`read_record_at`].
    ///
    /// Metadata blocks encountered on the way are consumed internally. A
    /// decode failure is fatal for this call, but records read before the
    /// failure have already been handed out.
    ///
    /// [`read_record_at`]: PcapNGReader::read_record_at
    pub fn next_record(&mut self) -> Result<Option<(u64, Record)>, PcapNGError> {
        loop {
            match self.advance()? {
                Some(record) => return Ok(Some(record)),
                None => {
                    if self.state == ReaderState::AtEof {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Read one block at the sequential cursor; `Ok(None)` means the block
    /// was metadata, or that EOF was reached (then `state` is `AtEof`).
    fn advance(&mut self) -> Result<Option<(u64, Record)>, PcapNGError> {
        let big_endian_hint = self.sections.last().map(|s| s.big_endian).unwrap_or(false);
        let mut buf = mem::take(&mut self.buf);
        let fetched = fetch_block(
            &mut self.reader,
            &mut buf,
            &mut self.offset,
            big_endian_hint,
        );
        let result = match fetched {
            Ok(Some((block_offset, big_endian))) => self
                .process_block(&buf, block_offset, big_endian)
                .map(|r| r.map(|record| (block_offset, record))),
            Ok(None) => {
                self.state = ReaderState::AtEof;
                Ok(None)
            }
            Err(e) => Err(e),
        };
        self.buf = buf;
        result
    }

    /// Random-access cursor: re-read the block at `offset` and materialize
    /// its record.
    ///
    /// The block must have been discovered by a previous sequential pass:
    /// its owning section is located by scanning the retained section list
    /// backward. The sequential cursor is neither consumed nor advanced,
    /// and the underlying file position is restored before returning.
    pub fn read_record_at(&mut self, offset: u64) -> Result<Record, PcapNGError> {
        let saved = self.reader.stream_position()?;
        let result = self.read_record_at_inner(offset);
        self.reader.seek(SeekFrom::Start(saved))?;
        result
    }

    fn read_record_at_inner(&mut self, offset: u64) -> Result<Record, PcapNGError> {
        let section_idx = self
            .sections
            .iter()
            .rposition(|s| s.shb_offset <= offset)
            .ok_or_else(|| {
                PcapNGError::BadFile(format!(
                    "offset {} precedes the first section header",
                    offset
                ))
            })?;
        let big_endian = self.sections[section_idx].big_endian;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = mem::take(&mut self.seek_buf);
        let mut cursor = offset;
        let fetched = fetch_block(&mut self.reader, &mut buf, &mut cursor, big_endian);
        let result = match fetched {
            Ok(Some((block_offset, be))) => {
                self.materialize_at(&buf, block_offset, be, section_idx)
            }
            Ok(None) => Err(PcapNGError::ShortRead(format!(
                "no block at offset {}",
                offset
            ))),
            Err(e) => Err(e),
        };
        self.seek_buf = buf;
        result
    }

    fn materialize_at(
        &mut self,
        buf: &[u8],
        block_offset: u64,
        big_endian: bool,
        section_idx: usize,
    ) -> Result<Record, PcapNGError> {
        let parse = if big_endian {
            parse_block_be
        } else {
            parse_block_le
        };
        let (_rem, block) =
            parse(buf).map_err(|e| parse_failure(raw_block_type(buf, big_endian), block_offset, e))?;
        let section = &self.sections[section_idx];
        let record = match block {
            Block::EnhancedPacket(ref epb) => epb_record(epb, section, block_offset, big_endian)?,
            Block::Packet(ref pb) => pb_record(pb, section, block_offset, big_endian)?,
            Block::SimplePacket(ref spb) => spb_record(spb, section, block_offset)?,
            Block::SysdigEvent(ref evt) => sysdig_record(evt, big_endian),
            Block::SystemdJournalExport(ref sje) => journal_record(sje, block_offset)?,
            ref other => {
                return Err(PcapNGError::BadFile(format!(
                    "block type 0x{:08x} at offset {} does not carry a record",
                    other.magic(),
                    block_offset
                )))
            }
        };
        self.strip_pseudo_header(record)
    }

    /// Parse the framed block in `buf` and fold it into the reader state.
    ///
    /// Only the sequential cursor comes through here; the random-access
    /// cursor goes through [`Self::materialize_at`], which never mutates
    /// the section registry.
    fn process_block(
        &mut self,
        buf: &[u8],
        block_offset: u64,
        big_endian: bool,
    ) -> Result<Option<Record>, PcapNGError> {
        let parse = if big_endian {
            parse_block_be
        } else {
            parse_block_le
        };
        let (_rem, block) =
            parse(buf).map_err(|e| parse_failure(raw_block_type(buf, big_endian), block_offset, e))?;
        match block {
            Block::SectionHeader(ref shb) => {
                self.process_shb(shb, block_offset)?;
                Ok(None)
            }
            Block::InterfaceDescription(ref idb) => {
                self.process_idb(idb, block_offset, big_endian)?;
                Ok(None)
            }
            Block::EnhancedPacket(ref epb) => {
                let section = self.current_section(block_offset)?;
                let record = epb_record(epb, section, block_offset, big_endian)?;
                self.strip_pseudo_header(record).map(Some)
            }
            Block::Packet(ref pb) => {
                let section = self.current_section(block_offset)?;
                let record = pb_record(pb, section, block_offset, big_endian)?;
                self.strip_pseudo_header(record).map(Some)
            }
            Block::SimplePacket(ref spb) => {
                let section = self.current_section(block_offset)?;
                let record = spb_record(spb, section, block_offset)?;
                self.strip_pseudo_header(record).map(Some)
            }
            Block::NameResolution(ref nrb) => {
                self.process_nrb(nrb, block_offset, big_endian)?;
                Ok(None)
            }
            Block::InterfaceStatistics(ref isb) => {
                self.process_isb(isb, block_offset, big_endian)?;
                Ok(None)
            }
            Block::DecryptionSecrets(ref dsb) => {
                self.dsbs.push(DecryptionSecrets {
                    secrets_type: dsb.secrets_type,
                    data: dsb.data.to_vec(),
                });
                Ok(None)
            }
            Block::SysdigEvent(ref evt) => {
                if self.file_encap == FileEncap::Unknown {
                    self.file_encap = FileEncap::PerPacket;
                }
                Ok(Some(sysdig_record(evt, big_endian)))
            }
            Block::SystemdJournalExport(ref sje) => {
                let record = journal_record(sje, block_offset)?;
                if self.file_encap == FileEncap::Unknown {
                    self.file_encap = FileEncap::PerPacket;
                }
                Ok(Some(record))
            }
            Block::Unknown(ref unknown) => {
                // the stored type is read as little-endian; normalize it
                let block_type = if big_endian {
                    unknown.block_type.swap_bytes()
                } else {
                    unknown.block_type
                };
                if let Some(handler) = lookup_block_handler(block_type) {
                    (handler.reader)(block_type, big_endian, unknown.data)
                } else {
                    log::debug!(
                        "skipping unknown block type 0x{:08x} at offset {}",
                        block_type,
                        block_offset
                    );
                    Ok(None)
                }
            }
        }
    }

    fn process_shb(
        &mut self,
        shb: &SectionHeaderBlock,
        block_offset: u64,
    ) -> Result<(), PcapNGError> {
        if !shb.is_supported_version() {
            return Err(PcapNGError::UnsupportedFormat(format!(
                "section header at offset {} declares unsupported version {}.{}",
                block_offset, shb.major_version, shb.minor_version
            )));
        }
        for opt in &shb.options {
            match opt.code {
                OptionCode::Comment
                | OptionCode::ShbHardware
                | OptionCode::ShbOs
                | OptionCode::ShbUserAppl
                | OptionCode::EndOfOpt => (),
                code => {
                    process_unhandled_option(
                        BlockFamily::SectionHeader,
                        code,
                        opt,
                        shb.big_endian(),
                    );
                }
            }
        }
        let section = SectionInfo {
            big_endian: shb.big_endian(),
            major_version: shb.major_version,
            minor_version: shb.minor_version,
            section_len: shb.section_len,
            shb_offset: block_offset,
            hardware: opt_string(shb.shb_hardware()),
            os: opt_string(shb.shb_os()),
            user_appl: opt_string(shb.shb_userappl()),
            comment: opt_string(shb.comment()),
            interfaces: Vec::new(),
        };
        self.sections.push(section);
        Ok(())
    }

    fn process_idb(
        &mut self,
        idb: &InterfaceDescriptionBlock,
        block_offset: u64,
        big_endian: bool,
    ) -> Result<(), PcapNGError> {
        let time_units_per_second = idb.ts_resolution();
        let ts_precision = ts_precision_from_units(time_units_per_second);
        let fcslen = match idb.if_fcslen() {
            Some(Ok(len)) => len as i8,
            _ => -1,
        };
        let mut raw_options = Vec::new();
        for opt in &idb.options {
            match opt.code {
                OptionCode::Comment
                | OptionCode::IfName
                | OptionCode::IfDescription
                | OptionCode::IfOs
                | OptionCode::IfHardware
                | OptionCode::IfSpeed
                | OptionCode::IfTsresol
                | OptionCode::IfTsoffset
                | OptionCode::IfFilter
                | OptionCode::IfFcslen
                | OptionCode::EndOfOpt => (),
                code => {
                    // interface options are kept for downstream consumers
                    // even when nothing here interprets them
                    let value = process_unhandled_option(
                        BlockFamily::InterfaceDescription,
                        code,
                        opt,
                        big_endian,
                    )
                    .or_else(|| opt.as_bytes().ok().map(<[u8]>::to_vec));
                    if let Some(value) = value {
                        raw_options.push((code.0, value));
                    }
                }
            }
        }
        let info = InterfaceInfo {
            linktype: idb.linktype,
            snaplen: idb.snaplen,
            time_units_per_second,
            if_tsresol: idb.if_tsresol,
            ts_precision,
            fcslen,
            name: opt_string(idb.if_name()),
            description: opt_string(idb.if_description()),
            os: opt_string(idb.if_os()),
            hardware: opt_string(idb.if_hardware()),
            speed: idb.if_speed(big_endian).and_then(|r| r.ok()),
            filter: idb.if_filter(big_endian),
            raw_options,
            stats: Vec::new(),
        };
        self.file_encap = self.file_encap.fold(info.linktype);
        self.file_tsprec = self.file_tsprec.fold(ts_precision);
        let section = self.sections.last_mut().ok_or_else(|| {
            PcapNGError::Internal(format!(
                "interface description at offset {} outside any section",
                block_offset
            ))
        })?;
        section.interfaces.push(info);
        Ok(())
    }

    fn process_nrb(
        &mut self,
        nrb: &NameResolutionBlock,
        block_offset: u64,
        big_endian: bool,
    ) -> Result<(), PcapNGError> {
        // validate the whole block before any name is delivered
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for record in &nrb.nr {
            match record.record_type {
                NameRecordType::Ipv4 | NameRecordType::Ipv6 => {
                    let (_, names) = record.addr_and_names().map_err(|e| {
                        PcapNGError::BadFile(format!(
                            "name resolution block at offset {}: {}",
                            block_offset,
                            name_record_error(e)
                        ))
                    })?;
                    if record.record_type == NameRecordType::Ipv4 {
                        let addr = record.ipv4_addr().ok_or_else(|| {
                            PcapNGError::Internal("validated IPv4 record without address".to_owned())
                        })?;
                        for name in names {
                            v4.push((addr, name));
                        }
                    } else {
                        let addr = record.ipv6_addr().ok_or_else(|| {
                            PcapNGError::Internal("validated IPv6 record without address".to_owned())
                        })?;
                        for name in names {
                            v6.push((addr, name));
                        }
                    }
                }
                other => {
                    log::debug!(
                        "skipping name resolution record with unknown type {:?}",
                        other
                    );
                }
            }
        }
        for opt in &nrb.options {
            match opt.code {
                OptionCode::Comment
                | OptionCode::NrbDnsName
                | OptionCode::NrbDnsIp4Addr
                | OptionCode::NrbDnsIp6Addr
                | OptionCode::EndOfOpt => (),
                code => {
                    process_unhandled_option(BlockFamily::NameResolution, code, opt, big_endian);
                }
            }
        }
        if let Some(cb) = self.ipv4_resolver.as_mut() {
            for (addr, name) in v4 {
                cb(addr, name);
            }
        }
        if let Some(cb) = self.ipv6_resolver.as_mut() {
            for (addr, name) in v6 {
                cb(addr, name);
            }
        }
        Ok(())
    }

    fn process_isb(
        &mut self,
        isb: &InterfaceStatisticsBlock,
        block_offset: u64,
        big_endian: bool,
    ) -> Result<(), PcapNGError> {
        for opt in &isb.options {
            match opt.code {
                OptionCode::Comment
                | OptionCode::IsbStartTime
                | OptionCode::IsbEndTime
                | OptionCode::IsbIfRecv
                | OptionCode::IsbIfDrop
                | OptionCode::IsbFilterAccept
                | OptionCode::IsbOsDrop
                | OptionCode::IsbUsrDeliv
                | OptionCode::EndOfOpt => (),
                code => {
                    process_unhandled_option(
                        BlockFamily::InterfaceStatistics,
                        code,
                        opt,
                        big_endian,
                    );
                }
            }
        }
        let stats = InterfaceStats {
            ts: ((isb.ts_high as u64) << 32) | isb.ts_low as u64,
            start_time: opt_ok(isb.isb_starttime(big_endian)),
            end_time: opt_ok(isb.isb_endtime(big_endian)),
            if_recv: opt_ok(isb.isb_ifrecv(big_endian)),
            if_drop: opt_ok(isb.isb_ifdrop(big_endian)),
            filter_accept: opt_ok(isb.isb_filteraccept(big_endian)),
            os_drop: opt_ok(isb.isb_osdrop(big_endian)),
            usr_deliv: opt_ok(isb.isb_usrdeliv(big_endian)),
            comment: opt_string(isb.comment()),
        };
        let section = self.sections.last_mut().ok_or_else(|| {
            PcapNGError::Internal(format!(
                "interface statistics at offset {} outside any section",
                block_offset
            ))
        })?;
        let n_interfaces = section.interfaces.len();
        let iface = section
            .interfaces
            .get_mut(isb.if_id as usize)
            .ok_or_else(|| {
                PcapNGError::BadFile(format!(
                    "interface statistics at offset {}: interface id {} is not less than the section interface count {}",
                    block_offset, isb.if_id, n_interfaces
                ))
            })?;
        iface.stats.push(stats);
        Ok(())
    }

    fn current_section(&self, block_offset: u64) -> Result<&SectionInfo, PcapNGError> {
        self.sections.last().ok_or_else(|| {
            PcapNGError::Internal(format!(
                "packet block at offset {} outside any section",
                block_offset
            ))
        })
    }

    /// Invoke the pseudo-header collaborator and strip its prefix from the
    /// record.
    fn strip_pseudo_header(&mut self, mut record: Record) -> Result<Record, PcapNGError> {
        if record.kind != RecordKind::Packet {
            return Ok(record);
        }
        let codec = match self.phdr_codec.as_mut() {
            Some(c) => c,
            None => return Ok(record),
        };
        let linktype = match record.linktype {
            Some(l) => l,
            None => return Ok(record),
        };
        let prefix = codec.prefix_len(linktype, record.caplen, &record.data)?;
        if prefix > record.data.len() {
            return Err(PcapNGError::Internal(format!(
                "pseudo-header length {} exceeds the packet data length {}",
                prefix,
                record.data.len()
            )));
        }
        record.data.drain(..prefix);
        record.caplen -= prefix as u32;
        record.origlen = record.origlen.saturating_sub(prefix as u32);
        Ok(record)
    }

    /// All sections discovered so far, in file order.
    pub fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    /// The file-scope encapsulation: uniform if every interface agrees.
    pub fn file_encap(&self) -> FileEncap {
        self.file_encap
    }

    /// The file-scope timestamp precision: uniform if every interface
    /// agrees.
    pub fn file_ts_precision(&self) -> FileTsPrecision {
        self.file_tsprec
    }

    /// Decryption Secrets Blocks seen so far, for mirroring into an output
    /// file.
    pub fn decryption_secrets(&self) -> &[DecryptionSecrets] {
        &self.dsbs
    }

    /// True once the sequential cursor has reached end of file.
    pub fn is_eof(&self) -> bool {
        self.state == ReaderState::AtEof
    }

    /// Register the sink invoked for each IPv4 name-resolution entry.
    pub fn set_ipv4_resolver(&mut self, resolver: Ipv4Resolver) {
        self.ipv4_resolver = Some(resolver);
    }

    /// Register the sink invoked for each IPv6 name-resolution entry.
    pub fn set_ipv6_resolver(&mut self, resolver: Ipv6Resolver) {
        self.ipv6_resolver = Some(resolver);
    }

    /// Register the collaborator that consumes per-encapsulation
    /// pseudo-headers from packet payloads.
    pub fn set_pseudo_header_codec(&mut self, codec: Box<dyn PseudoHeaderCodec>) {
        self.phdr_codec = Some(codec);
    }

    /// Close the reader, releasing its state and returning the input
    /// handle.
    pub fn close(self) -> R {
        self.reader
    }
}

/// Fill `buf` from the reader, stopping early only on end of file.
fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match reader.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Block framer: read one complete block at the current position into
/// `buf`, validating the length fields before the body is allocated.
///
/// `Ok(None)` is a clean end of file (no byte read); a partial header or
/// body is a `ShortRead`. On success `offset` is advanced past the block,
/// rounding the declared length up to a multiple of 4 (files in the wild
/// omit the final padding from the declared length), and `buf` holds the
/// padded block. Returns the block's offset and byte order.
fn fetch_block<R: Read>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    offset: &mut u64,
    big_endian_hint: bool,
) -> Result<Option<(u64, bool)>, PcapNGError> {
    let block_offset = *offset;
    let mut hdr = [0u8; 8];
    match read_or_eof(reader, &mut hdr)? {
        0 => return Ok(None),
        8 => (),
        n => {
            return Err(PcapNGError::ShortRead(format!(
                "block header at offset {} truncated after {} bytes",
                block_offset, n
            )))
        }
    }
    let raw_type = u32::from_le_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]);
    // the SHB type constant is byte-order invariant; its body defines the
    // order for the rest of the section
    let mut bom = [0u8; 4];
    let (big_endian, pre_read) = if raw_type == SHB_MAGIC {
        match read_or_eof(reader, &mut bom)? {
            4 => (),
            n => {
                return Err(PcapNGError::ShortRead(format!(
                    "section header at offset {} truncated after {} bytes",
                    block_offset,
                    8 + n
                )))
            }
        }
        let bom_val = u32::from_le_bytes(bom);
        if bom_val == BOM_MAGIC {
            (false, 12usize)
        } else if bom_val == BOM_MAGIC.swap_bytes() {
            (true, 12usize)
        } else {
            return Err(PcapNGError::BadFile(format!(
                "section header at offset {}: unknown byte-order magic 0x{:08x}",
                block_offset, bom_val
            )));
        }
    } else {
        (big_endian_hint, 8usize)
    };
    let block_type = if big_endian {
        raw_type.swap_bytes()
    } else {
        raw_type
    };
    let len_bytes = [hdr[4], hdr[5], hdr[6], hdr[7]];
    let block_len = if big_endian {
        u32::from_be_bytes(len_bytes)
    } else {
        u32::from_le_bytes(len_bytes)
    };
    if block_len < 12 {
        return Err(PcapNGError::BadFile(format!(
            "block type 0x{:08x} at offset {}: total length {} is less than the minimum block size 12",
            block_type, block_offset, block_len
        )));
    }
    if block_len > MAX_BLOCK_SIZE {
        // reject before allocating anything beyond the header
        return Err(PcapNGError::BadFile(format!(
            "block type 0x{:08x} at offset {}: total length {} exceeds the maximum block size {}",
            block_type, block_offset, block_len, MAX_BLOCK_SIZE
        )));
    }
    if pre_read == 12 && block_len < 28 {
        return Err(PcapNGError::BadFile(format!(
            "section header at offset {}: total length {} is less than the minimum section header size 28",
            block_offset, block_len
        )));
    }
    let padded = align32!(block_len) as usize;
    buf.clear();
    buf.resize(padded, 0);
    buf[..8].copy_from_slice(&hdr);
    if pre_read == 12 {
        buf[8..12].copy_from_slice(&bom);
    }
    if let Err(e) = reader.read_exact(&mut buf[pre_read..]) {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Err(PcapNGError::ShortRead(format!(
                "block type 0x{:08x} at offset {}: file ends inside the block body",
                block_type, block_offset
            )));
        }
        return Err(e.into());
    }
    // the trailer must replicate the declared total length, even when the
    // declared length omits the padding
    let trailer_bytes = [
        buf[padded - 4],
        buf[padded - 3],
        buf[padded - 2],
        buf[padded - 1],
    ];
    let trailer = if big_endian {
        u32::from_be_bytes(trailer_bytes)
    } else {
        u32::from_le_bytes(trailer_bytes)
    };
    if trailer != block_len {
        return Err(PcapNGError::BadFile(format!(
            "block type 0x{:08x} at offset {}: trailing total length {} does not match the leading total length {}",
            block_type, block_offset, trailer, block_len
        )));
    }
    *offset = block_offset + padded as u64;
    Ok(Some((block_offset, big_endian)))
}

fn raw_block_type(buf: &[u8], big_endian: bool) -> u32 {
    if buf.len() >= 4 {
        let raw = [buf[0], buf[1], buf[2], buf[3]];
        if big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        }
    } else {
        0
    }
}

fn parse_failure(block_type: u32, block_offset: u64, e: nom::Err<PcapError>) -> PcapNGError {
    match e {
        nom::Err::Incomplete(_) => PcapNGError::BadFile(format!(
            "block type 0x{:08x} at offset {}: declared lengths are inconsistent with the block content",
            block_type, block_offset
        )),
        nom::Err::Error(err) | nom::Err::Failure(err) => PcapNGError::BadFile(format!(
            "block type 0x{:08x} at offset {}: {}",
            block_type, block_offset, err
        )),
    }
}

fn name_record_error(e: NameRecordError) -> &'static str {
    match e {
        NameRecordError::TooShort => "record is too short for its address type",
        NameRecordError::UnterminatedName => "name is not terminated within its record",
    }
}

fn opt_string(opt: Option<Result<&str, PcapNGOptionError>>) -> Option<String> {
    match opt {
        Some(Ok(s)) => Some(s.to_owned()),
        _ => None,
    }
}

fn opt_ok(opt: Option<Result<u64, PcapNGOptionError>>) -> Option<u64> {
    match opt {
        Some(Ok(v)) => Some(v),
        _ => None,
    }
}

/// Hand an option the engine does not recognize to the extension registry,
/// or note it at debug level. Local options are kept opaque.
fn process_unhandled_option(
    family: BlockFamily,
    code: OptionCode,
    opt: &PcapNGOption,
    big_endian: bool,
) -> Option<Vec<u8>> {
    if code.is_local() {
        return opt.as_bytes().ok().map(|b| b.to_vec());
    }
    if let Some(handler) = lookup_option_handler(family, code.0) {
        // hand the declared value to the parser, not the padded bytes
        let value = match opt.as_bytes() {
            Ok(b) => b,
            Err(_) => opt.value(),
        };
        match (handler.parser)(big_endian, value) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("registered parser for option {} failed: {}", code.0, e);
                None
            }
        }
    } else {
        log::debug!("no handler for option code {} in {:?} block", code.0, family);
        None
    }
}

/// Build a packet record from a decoded EPB, validating the interface
/// reference and the captured length against the section state.
fn epb_record(
    epb: &EnhancedPacketBlock,
    section: &SectionInfo,
    block_offset: u64,
    big_endian: bool,
) -> Result<Record, PcapNGError> {
    let iface = section.interface(epb.if_id).ok_or_else(|| {
        PcapNGError::BadFile(format!(
            "packet block at offset {}: interface id {} is not less than the section interface count {}",
            block_offset,
            epb.if_id,
            section.interfaces.len()
        ))
    })?;
    check_caplen(epb.caplen, iface.linktype, block_offset)?;
    let (secs, nsecs) = build_ts(epb.ts_high, epb.ts_low, iface.time_units_per_second);
    let mut record = Record::packet(
        iface.linktype,
        epb.caplen,
        epb.origlen,
        epb.packet_data().to_vec(),
    );
    record.if_id = Some(epb.if_id);
    record.ts = Some(Timestamp {
        secs,
        nsecs,
        precision: iface.ts_precision,
    });
    packet_options_into_record(&epb.options, big_endian, block_offset, &mut record)?;
    Ok(record)
}

/// Same as [`epb_record`], for the obsolete Packet Block.
fn pb_record(
    pb: &PacketBlock,
    section: &SectionInfo,
    block_offset: u64,
    big_endian: bool,
) -> Result<Record, PcapNGError> {
    let iface = section.interface(pb.if_id as u32).ok_or_else(|| {
        PcapNGError::BadFile(format!(
            "packet block at offset {}: interface id {} is not less than the section interface count {}",
            block_offset,
            pb.if_id,
            section.interfaces.len()
        ))
    })?;
    check_caplen(pb.caplen, iface.linktype, block_offset)?;
    let (secs, nsecs) = build_ts(pb.ts_high, pb.ts_low, iface.time_units_per_second);
    let mut record = Record::packet(
        iface.linktype,
        pb.caplen,
        pb.origlen,
        pb.packet_data().to_vec(),
    );
    record.if_id = Some(pb.if_id as u32);
    record.ts = Some(Timestamp {
        secs,
        nsecs,
        precision: iface.ts_precision,
    });
    // 0xffff means the drops count is not available
    if pb.drops_count != 0xffff {
        record.drop_count = Some(pb.drops_count as u64);
    }
    packet_options_into_record(&pb.options, big_endian, block_offset, &mut record)?;
    Ok(record)
}

fn spb_record(
    spb: &SimplePacketBlock,
    section: &SectionInfo,
    block_offset: u64,
) -> Result<Record, PcapNGError> {
    // the SPB implicitly references the first interface of its section
    let iface = section.interface(0).ok_or_else(|| {
        PcapNGError::BadFile(format!(
            "simple packet block at offset {} in a section with no interface",
            block_offset
        ))
    })?;
    let caplen = spb.caplen(iface.snaplen);
    check_caplen(caplen, iface.linktype, block_offset)?;
    if (caplen as usize) > spb.data.len() {
        return Err(PcapNGError::BadFile(format!(
            "simple packet block at offset {}: derived captured length {} exceeds the block content",
            block_offset, caplen
        )));
    }
    let mut record = Record::packet(
        iface.linktype,
        caplen,
        spb.origlen,
        spb.data[..caplen as usize].to_vec(),
    );
    record.if_id = Some(0);
    Ok(record)
}

fn sysdig_record(evt: &SysdigEventBlock, big_endian: bool) -> Record {
    Record {
        kind: RecordKind::Syscall,
        if_id: None,
        ts: Some(Timestamp {
            secs: evt.ts / 1_000_000_000,
            nsecs: (evt.ts % 1_000_000_000) as u32,
            precision: TsPrecision::Nanoseconds,
        }),
        caplen: evt.data.len() as u32,
        origlen: evt.event_len,
        linktype: None,
        comment: None,
        flags: None,
        drop_count: None,
        packet_id: None,
        queue: None,
        verdicts: Vec::new(),
        syscall: Some(SyscallInfo {
            cpu_id: evt.cpu_id,
            thread_id: evt.thread_id,
            event_type: evt.event_type,
            nparams: evt.nparams,
            big_endian,
        }),
        data: evt.data.to_vec(),
    }
}

fn journal_record(
    sje: &SystemdJournalExportBlock,
    block_offset: u64,
) -> Result<Record, PcapNGError> {
    let entry = sje.entry_data();
    if entry.len() < MIN_SYSTEMD_JOURNAL_EXPORT_ENTRY_SIZE {
        return Err(PcapNGError::BadFile(format!(
            "systemd journal block at offset {}: entry of {} bytes is too small to hold a timestamp field",
            block_offset,
            entry.len()
        )));
    }
    // journal timestamps are in microseconds
    let ts = sje.realtime_timestamp().map(|us| Timestamp {
        secs: us / 1_000_000,
        nsecs: ((us % 1_000_000) * 1_000) as u32,
        precision: TsPrecision::Microseconds,
    });
    Ok(Record {
        kind: RecordKind::SystemdJournal,
        if_id: None,
        ts,
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
        data: entry.to_vec(),
    })
}

fn check_caplen(caplen: u32, linktype: Linktype, block_offset: u64) -> Result<(), PcapNGError> {
    let max = linktype.max_snaplen();
    if caplen > max {
        return Err(PcapNGError::BadFile(format!(
            "packet block at offset {}: captured length {} is larger than {}",
            block_offset, caplen, max
        )));
    }
    Ok(())
}

/// Decode the standardized packet options into record fields, preserving
/// verdict order.
fn packet_options_into_record(
    options: &[PcapNGOption],
    big_endian: bool,
    block_offset: u64,
    record: &mut Record,
) -> Result<(), PcapNGError> {
    for opt in options {
        match opt.code {
            OptionCode::EndOfOpt => (),
            OptionCode::Comment => {
                if record.comment.is_none() {
                    record.comment = opt.as_str().ok().map(str::to_owned);
                }
            }
            OptionCode::EpbFlags => {
                record.flags = Some(opt.as_u32(big_endian).map_err(|_| {
                    PcapNGError::BadFile(format!(
                        "packet block at offset {}: flags option length {} is not 4",
                        block_offset, opt.len
                    ))
                })?);
            }
            OptionCode::EpbHash => {
                // hash algorithms are not verified here
                log::debug!("ignoring packet hash option ({} bytes)", opt.len);
            }
            OptionCode::EpbDropCount => {
                record.drop_count = Some(opt.as_u64(big_endian).map_err(|_| {
                    PcapNGError::BadFile(format!(
                        "packet block at offset {}: drop count option length {} is not 8",
                        block_offset, opt.len
                    ))
                })?);
            }
            OptionCode::EpbPacketId => {
                record.packet_id = Some(opt.as_u64(big_endian).map_err(|_| {
                    PcapNGError::BadFile(format!(
                        "packet block at offset {}: packet id option length {} is not 8",
                        block_offset, opt.len
                    ))
                })?);
            }
            OptionCode::EpbQueue => {
                record.queue = Some(opt.as_u32(big_endian).map_err(|_| {
                    PcapNGError::BadFile(format!(
                        "packet block at offset {}: queue option length {} is not 4",
                        block_offset, opt.len
                    ))
                })?);
            }
            OptionCode::EpbVerdict => {
                let value = opt.as_bytes().map_err(|_| {
                    PcapNGError::BadFile(format!(
                        "packet block at offset {}: verdict option length {} is invalid",
                        block_offset, opt.len
                    ))
                })?;
                match parse_epb_verdict(value, big_endian) {
                    Ok(Some(verdict)) => record.verdicts.push(verdict),
                    Ok(None) => (),
                    Err(e) => {
                        return Err(PcapNGError::BadFile(format!(
                            "packet block at offset {}: {}",
                            block_offset, e.0
                        )))
                    }
                }
            }
            code => {
                process_unhandled_option(BlockFamily::Packet, code, opt, big_endian);
            }
        }
    }
    Ok(())
}
