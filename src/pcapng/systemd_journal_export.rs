use nom::error::ParseError;
use nom::IResult;

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};
use crate::PcapError;

use super::*;

const REALTIME_FIELD: &[u8] = b"__REALTIME_TIMESTAMP=";

/// Smallest journal entry this engine accepts: `__REALTIME_TIMESTAMP=0\n`.
pub const MIN_SYSTEMD_JOURNAL_EXPORT_ENTRY_SIZE: usize = 23;

/// A systemd Journal Export Block carries one journal entry in the journal
/// export text format, padded to 4 bytes.
#[derive(Debug)]
pub struct SystemdJournalExportBlock<'a> {
    pub block_type: u32,
    pub block_len1: u32,
    /// Journal entry, with padding
    pub data: &'a [u8],
    pub block_len2: u32,
}

impl SystemdJournalExportBlock<'_> {
    /// Journal entry without the trailing zero padding.
    pub fn entry_data(&self) -> &[u8] {
        let mut data = self.data;
        while let Some((&0, rest)) = data.split_last() {
            data = rest;
        }
        data
    }

    /// Extract the `__REALTIME_TIMESTAMP` field, in microseconds since the
    /// epoch, if the entry carries one in parseable form.
    pub fn realtime_timestamp(&self) -> Option<u64> {
        let data = self.entry_data();
        let pos = data
            .windows(REALTIME_FIELD.len())
            .position(|w| w == REALTIME_FIELD)?;
        let value = &data[pos + REALTIME_FIELD.len()..];
        let end = value.iter().position(|&b| b == b'\n')?;
        std::str::from_utf8(&value[..end]).ok()?.parse().ok()
    }
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, SystemdJournalExportBlock<'a>>
    for SystemdJournalExportBlock<'a>
{
    const HDR_SZ: usize = 12;
    const MAGIC: u32 = SJE_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], SystemdJournalExportBlock<'a>, E> {
        let block = SystemdJournalExportBlock {
            block_type,
            block_len1,
            data: i,
            block_len2,
        };
        Ok((i, block))
    }
}

/// Parse a SystemdJournalExport Block (little-endian)
#[inline]
pub fn parse_systemdjournalexportblock_le(
    i: &[u8],
) -> IResult<&[u8], SystemdJournalExportBlock, PcapError> {
    ng_block_parser::<SystemdJournalExportBlock, PcapLE, _, _>()(i)
}

/// Parse a SystemdJournalExport Block (big-endian)
#[inline]
pub fn parse_systemdjournalexportblock_be(
    i: &[u8],
) -> IResult<&[u8], SystemdJournalExportBlock, PcapError> {
    ng_block_parser::<SystemdJournalExportBlock, PcapBE, _, _>()(i)
}
