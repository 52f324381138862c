use nom::error::ParseError;
use nom::IResult;

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};
use crate::{PcapError, PcapNGOption};

use super::*;

/// An Interface Statistics Block (ISB) holds capture counters for one
/// interface of its section.
#[derive(Debug)]
pub struct InterfaceStatisticsBlock<'a> {
    pub block_type: u32,
    pub block_len1: u32,
    pub if_id: u32,
    pub ts_high: u32,
    pub ts_low: u32,
    pub options: Vec<PcapNGOption<'a>>,
    pub block_len2: u32,
}

impl InterfaceStatisticsBlock<'_> {
    /// Return the `isb_starttime` option value, if present
    ///
    /// If the option is present multiple times, the first value is returned.
    pub fn isb_starttime(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_ts(&self.options, OptionCode::IsbStartTime, big_endian)
    }

    /// Return the `isb_endtime` option value, if present
    ///
    /// If the option is present multiple times, the first value is returned.
    pub fn isb_endtime(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_ts(&self.options, OptionCode::IsbEndTime, big_endian)
    }

    /// Return the `isb_ifrecv` option value, if present
    pub fn isb_ifrecv(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_u64(&self.options, OptionCode::IsbIfRecv, big_endian)
    }

    /// Return the `isb_ifdrop` option value, if present
    pub fn isb_ifdrop(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_u64(&self.options, OptionCode::IsbIfDrop, big_endian)
    }

    /// Return the `isb_filteraccept` option value, if present
    pub fn isb_filteraccept(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_u64(&self.options, OptionCode::IsbFilterAccept, big_endian)
    }

    /// Return the `isb_osdrop` option value, if present
    pub fn isb_osdrop(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_u64(&self.options, OptionCode::IsbOsDrop, big_endian)
    }

    /// Return the `isb_usrdeliv` option value, if present
    pub fn isb_usrdeliv(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_u64(&self.options, OptionCode::IsbUsrDeliv, big_endian)
    }

    /// Return the `opt_comment` option value, if present
    pub fn comment(&self) -> Option<Result<&str, PcapNGOptionError>> {
        options_get_as_string(&self.options, OptionCode::Comment)
    }
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, InterfaceStatisticsBlock<'a>>
    for InterfaceStatisticsBlock<'a>
{
    const HDR_SZ: usize = 24;
    const MAGIC: u32 = ISB_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], InterfaceStatisticsBlock<'a>, E> {
        // caller function already tested header type(magic) and length
        // read end of header
        let (i, if_id) = En::parse_u32(i)?;
        let (i, ts_high) = En::parse_u32(i)?;
        let (i, ts_low) = En::parse_u32(i)?;
        // read options
        let (i, options) = opt_parse_options::<En, E>(i, block_len1 as usize, 24)?;
        let block = InterfaceStatisticsBlock {
            block_type,
            block_len1,
            if_id,
            ts_high,
            ts_low,
            options,
            block_len2,
        };
        Ok((i, block))
    }
}

/// Parse an InterfaceStatistics Block (little-endian)
#[inline]
pub fn parse_interfacestatisticsblock_le(
    i: &[u8],
) -> IResult<&[u8], InterfaceStatisticsBlock<'_>, PcapError> {
    ng_block_parser::<InterfaceStatisticsBlock, PcapLE, _, _>()(i)
}

/// Parse an InterfaceStatistics Block (big-endian)
#[inline]
pub fn parse_interfacestatisticsblock_be(
    i: &[u8],
) -> IResult<&[u8], InterfaceStatisticsBlock<'_>, PcapError> {
    ng_block_parser::<InterfaceStatisticsBlock, PcapBE, _, _>()(i)
}
