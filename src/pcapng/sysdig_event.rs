use nom::error::ParseError;
use nom::IResult;

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};
use crate::PcapError;

use super::*;

/// A Sysdig event block (v1 or v2) carries one kernel event.
///
/// All header fields follow the section byte order; the event payload after
/// the fixed header is opaque and keeps its on-file encoding, so consumers
/// need the section byte order to interpret it.
#[derive(Debug)]
pub struct SysdigEventBlock<'a> {
    pub block_type: u32,
    pub block_len1: u32,
    pub cpu_id: u16,
    /// Wall-clock nanoseconds since the epoch
    pub ts: u64,
    pub thread_id: u64,
    pub event_len: u32,
    pub event_type: u16,
    /// Parameter count, v2 blocks only
    pub nparams: Option<u32>,
    /// Opaque event payload, in the section byte order
    pub data: &'a [u8],
    pub block_len2: u32,
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, SysdigEventBlock<'a>>
    for SysdigEventBlock<'a>
{
    const HDR_SZ: usize = 36;
    const MAGIC: u32 = SYSDIG_EVENT_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], SysdigEventBlock<'a>, E> {
        // caller function already tested header type(magic) and length
        // read end of header
        let (i, cpu_id) = En::parse_u16(i)?;
        let (i, ts) = En::parse_u64(i)?;
        let (i, thread_id) = En::parse_u64(i)?;
        let (i, event_len) = En::parse_u32(i)?;
        let (i, event_type) = En::parse_u16(i)?;
        let block = SysdigEventBlock {
            block_type,
            block_len1,
            cpu_id,
            ts,
            thread_id,
            event_len,
            event_type,
            nparams: None,
            data: i,
            block_len2,
        };
        Ok((i, block))
    }
}

// v2 has the same layout plus a trailing 32-bit parameter count.
pub(crate) struct SysdigEventV2Parser;

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, SysdigEventBlock<'a>>
    for SysdigEventV2Parser
{
    const HDR_SZ: usize = 40;
    const MAGIC: u32 = SYSDIG_EVENT_V2_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], SysdigEventBlock<'a>, E> {
        let (i, cpu_id) = En::parse_u16(i)?;
        let (i, ts) = En::parse_u64(i)?;
        let (i, thread_id) = En::parse_u64(i)?;
        let (i, event_len) = En::parse_u32(i)?;
        let (i, event_type) = En::parse_u16(i)?;
        let (i, nparams) = En::parse_u32(i)?;
        let block = SysdigEventBlock {
            block_type,
            block_len1,
            cpu_id,
            ts,
            thread_id,
            event_len,
            event_type,
            nparams: Some(nparams),
            data: i,
            block_len2,
        };
        Ok((i, block))
    }
}

/// Parse a Sysdig event block, version 1 (little-endian)
pub fn parse_sysdigeventblock_le(i: &[u8]) -> IResult<&[u8], SysdigEventBlock, PcapError> {
    ng_block_parser::<SysdigEventBlock, PcapLE, _, _>()(i)
}

/// Parse a Sysdig event block, version 1 (big-endian)
pub fn parse_sysdigeventblock_be(i: &[u8]) -> IResult<&[u8], SysdigEventBlock, PcapError> {
    ng_block_parser::<SysdigEventBlock, PcapBE, _, _>()(i)
}

/// Parse a Sysdig event block, version 2 (little-endian)
pub fn parse_sysdigeventv2block_le(i: &[u8]) -> IResult<&[u8], SysdigEventBlock, PcapError> {
    ng_block_parser::<SysdigEventV2Parser, PcapLE, _, _>()(i)
}

/// Parse a Sysdig event block, version 2 (big-endian)
pub fn parse_sysdigeventv2block_be(i: &[u8]) -> IResult<&[u8], SysdigEventBlock, PcapError> {
    ng_block_parser::<SysdigEventV2Parser, PcapBE, _, _>()(i)
}
