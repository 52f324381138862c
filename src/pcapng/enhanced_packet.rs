use nom::bytes::streaming::take;
use nom::error::{ErrorKind, ParseError};
use nom::{Err, IResult};
use rusticata_macros::align32;

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};
use crate::record::Verdict;
use crate::utils::{array_ref4, array_ref8};
use crate::{PcapError, PcapNGOption};

use super::*;

/// An Enhanced Packet Block (EPB) is the standard container for storing
/// the packets coming from the network.
///
/// This struct is a thin abstraction layer, and stores the raw block data.
/// For ex the `data` field is stored with the padding.
#[derive(Debug)]
pub struct EnhancedPacketBlock<'a> {
    // Block type, read as little-endian.
    // If block value is the reverse of the expected magic, this means block is encoded as big-endian
    pub block_type: u32,
    pub block_len1: u32,
    pub if_id: u32,
    pub ts_high: u32,
    pub ts_low: u32,
    /// Captured packet length
    pub caplen: u32,
    /// Original packet length
    pub origlen: u32,
    /// Raw data from packet (with padding)
    pub data: &'a [u8],
    pub options: Vec<PcapNGOption<'a>>,
    pub block_len2: u32,
}

impl<'a> EnhancedPacketBlock<'a> {
    /// Decode the packet timestamp
    ///
    /// The resolution is stored in the Interface Description Block matching
    /// `self.if_id`. Return the timestamp seconds and nanoseconds.
    #[inline]
    pub fn decode_ts(&self, time_units_per_second: u64) -> (u64, u32) {
        build_ts(self.ts_high, self.ts_low, time_units_per_second)
    }

    /// Return the captured packet data without padding
    pub fn packet_data(&self) -> &[u8] {
        let caplen = self.caplen as usize;
        if caplen < self.data.len() {
            &self.data[..caplen]
        } else {
            self.data
        }
    }

    /// Return true if packet data was truncated (caplen < origlen)
    pub fn truncated(&self) -> bool {
        self.origlen != self.caplen
    }
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, EnhancedPacketBlock<'a>>
    for EnhancedPacketBlock<'a>
{
    const HDR_SZ: usize = 32;
    const MAGIC: u32 = EPB_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], EnhancedPacketBlock<'a>, E> {
        // caller function already tested header type(magic) and length
        // read end of header
        let (b_hdr, packet_data) = i.split_at(20);
        let if_id = En::u32_from_bytes(*array_ref4(b_hdr, 0));
        let ts_high = En::u32_from_bytes(*array_ref4(b_hdr, 4));
        let ts_low = En::u32_from_bytes(*array_ref4(b_hdr, 8));
        let caplen = En::u32_from_bytes(*array_ref4(b_hdr, 12));
        let origlen = En::u32_from_bytes(*array_ref4(b_hdr, 16));
        // read packet data
        // align32 can overflow
        if caplen >= u32::MAX - 4 {
            return Err(Err::Error(E::from_error_kind(i, ErrorKind::Verify)));
        }
        let padded_length = align32!(caplen);
        // total length must be large enough for the packet data
        if (block_len1 as u64) < 32 + padded_length as u64 {
            return Err(Err::Error(E::from_error_kind(i, ErrorKind::Verify)));
        }
        let (i, data) = take(padded_length)(packet_data)?;
        // read options
        let current_offset = (32 + padded_length) as usize;
        let (i, options) = opt_parse_options::<En, E>(i, block_len1 as usize, current_offset)?;
        let block = EnhancedPacketBlock {
            block_type,
            block_len1,
            if_id,
            ts_high,
            ts_low,
            caplen,
            origlen,
            data,
            options,
            block_len2,
        };
        Ok((i, block))
    }
}

/// Parse an Enhanced Packet Block (little-endian)
pub fn parse_enhancedpacketblock_le(i: &[u8]) -> IResult<&[u8], EnhancedPacketBlock, PcapError> {
    ng_block_parser::<EnhancedPacketBlock, PcapLE, _, _>()(i)
}

/// Parse an Enhanced Packet Block (big-endian)
pub fn parse_enhancedpacketblock_be(i: &[u8]) -> IResult<&[u8], EnhancedPacketBlock, PcapError> {
    ng_block_parser::<EnhancedPacketBlock, PcapBE, _, _>()(i)
}

/// An obsolete Packet Block (PB), superseded by the Enhanced Packet Block.
///
/// Differs from the EPB by its 16-bit interface id followed by a 16-bit
/// drops count. Still found in old captures, so it is decoded; it is never
/// written.
#[derive(Debug)]
pub struct PacketBlock<'a> {
    pub block_type: u32,
    pub block_len1: u32,
    pub if_id: u16,
    /// Packets dropped by the system between this packet and the previous
    /// one, or 0xffff if not available
    pub drops_count: u16,
    pub ts_high: u32,
    pub ts_low: u32,
    pub caplen: u32,
    pub origlen: u32,
    /// Raw data from packet (with padding)
    pub data: &'a [u8],
    pub options: Vec<PcapNGOption<'a>>,
    pub block_len2: u32,
}

impl<'a> PacketBlock<'a> {
    /// Return the captured packet data without padding
    pub fn packet_data(&self) -> &[u8] {
        let caplen = self.caplen as usize;
        if caplen < self.data.len() {
            &self.data[..caplen]
        } else {
            self.data
        }
    }
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, PacketBlock<'a>> for PacketBlock<'a> {
    const HDR_SZ: usize = 32;
    const MAGIC: u32 = PB_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], PacketBlock<'a>, E> {
        // caller function already tested header type(magic) and length
        // read end of header
        let (i, if_id) = En::parse_u16(i)?;
        let (i, drops_count) = En::parse_u16(i)?;
        let (i, ts_high) = En::parse_u32(i)?;
        let (i, ts_low) = En::parse_u32(i)?;
        let (i, caplen) = En::parse_u32(i)?;
        let (i, origlen) = En::parse_u32(i)?;
        // align32 can overflow
        if caplen >= u32::MAX - 4 {
            return Err(Err::Error(E::from_error_kind(i, ErrorKind::Verify)));
        }
        let padded_length = align32!(caplen);
        if (block_len1 as u64) < 32 + padded_length as u64 {
            return Err(Err::Error(E::from_error_kind(i, ErrorKind::Verify)));
        }
        let (i, data) = take(padded_length)(i)?;
        let current_offset = (32 + padded_length) as usize;
        let (i, options) = opt_parse_options::<En, E>(i, block_len1 as usize, current_offset)?;
        let block = PacketBlock {
            block_type,
            block_len1,
            if_id,
            drops_count,
            ts_high,
            ts_low,
            caplen,
            origlen,
            data,
            options,
            block_len2,
        };
        Ok((i, block))
    }
}

/// Parse a Packet Block (little-endian)
pub fn parse_packetblock_le(i: &[u8]) -> IResult<&[u8], PacketBlock, PcapError> {
    ng_block_parser::<PacketBlock, PcapLE, _, _>()(i)
}

/// Parse a Packet Block (big-endian)
pub fn parse_packetblock_be(i: &[u8]) -> IResult<&[u8], PacketBlock, PcapError> {
    ng_block_parser::<PacketBlock, PcapBE, _, _>()(i)
}

/// Error raised by [`parse_epb_verdict`] for shapes the format forbids.
#[derive(Debug, PartialEq)]
pub struct VerdictError(pub &'static str);

/// Decode one `epb_verdict` option body.
///
/// Tags 1 (Linux eBPF TC) and 2 (Linux eBPF XDP) are fixed 9-byte records
/// whose 64-bit tail follows the section byte order. Tag 0 is kept as
/// opaque hardware bytes. Higher tags are skipped (`Ok(None)`), an empty or
/// mis-sized body is an error.
pub fn parse_epb_verdict(value: &[u8], big_endian: bool) -> Result<Option<Verdict>, VerdictError> {
    let (tag, rest) = match value.split_first() {
        Some(t) => t,
        None => return Err(VerdictError("verdict option length is < 1")),
    };
    match tag {
        0 => Ok(Some(Verdict::Hardware(rest.to_vec()))),
        1 | 2 => {
            if value.len() != 9 {
                return Err(VerdictError("verdict option length is != 9"));
            }
            let raw = *array_ref8(rest, 0);
            let v = if big_endian {
                u64::from_be_bytes(raw)
            } else {
                u64::from_le_bytes(raw)
            };
            if *tag == 1 {
                Ok(Some(Verdict::LinuxEbpfTc(v)))
            } else {
                Ok(Some(Verdict::LinuxEbpfXdp(v)))
            }
        }
        _ => {
            log::debug!("ignoring verdict with unknown type {}", tag);
            Ok(None)
        }
    }
}
