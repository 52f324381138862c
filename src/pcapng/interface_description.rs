use nom::error::ParseError;
use nom::IResult;

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};
use crate::{Linktype, PcapError, PcapNGOption};

use super::*;

/// An Interface Description Block (IDB) is the container for information
/// describing an interface on which packet data is captured.
///
/// The position of the IDB inside its section defines the interface id that
/// packet blocks of the same section reference.
#[derive(Debug)]
pub struct InterfaceDescriptionBlock<'a> {
    pub block_type: u32,
    pub block_len1: u32,
    pub linktype: Linktype,
    pub reserved: u16,
    pub snaplen: u32,
    pub options: Vec<PcapNGOption<'a>>,
    pub block_len2: u32,
    pub if_tsresol: u8,
    pub if_tsoffset: i64,
}

impl<'a> InterfaceDescriptionBlock<'a> {
    /// Decode the interface time resolution, in units per second
    ///
    /// An exponent beyond the representable range is clamped to `u64::MAX`.
    #[inline]
    pub fn ts_resolution(&self) -> u64 {
        build_ts_resolution(self.if_tsresol)
    }

    /// Return the interface timestamp offset
    #[inline]
    pub fn ts_offset(&self) -> i64 {
        self.if_tsoffset
    }

    /// Return the `if_name` option value, if present
    pub fn if_name(&self) -> Option<Result<&str, PcapNGOptionError>> {
        options_get_as_string(&self.options, OptionCode::IfName)
    }

    /// Return the `if_description` option value, if present
    pub fn if_description(&self) -> Option<Result<&str, PcapNGOptionError>> {
        options_get_as_string(&self.options, OptionCode::IfDescription)
    }

    /// Return the `if_os` option value, if present
    pub fn if_os(&self) -> Option<Result<&str, PcapNGOptionError>> {
        options_get_as_string(&self.options, OptionCode::IfOs)
    }

    /// Return the `if_hardware` option value, if present
    pub fn if_hardware(&self) -> Option<Result<&str, PcapNGOptionError>> {
        options_get_as_string(&self.options, OptionCode::IfHardware)
    }

    /// Return the `if_speed` option value (bits per second), if present
    pub fn if_speed(&self, big_endian: bool) -> Option<Result<u64, PcapNGOptionError>> {
        options_get_as_u64(&self.options, OptionCode::IfSpeed, big_endian)
    }

    /// Return the `if_fcslen` option value, if present
    pub fn if_fcslen(&self) -> Option<Result<u8, PcapNGOptionError>> {
        self.options.iter().find_map(|opt| {
            if opt.code == OptionCode::IfFcslen {
                Some(opt.as_u8())
            } else {
                None
            }
        })
    }

    /// Return the decoded `if_filter` option, if present
    pub fn if_filter(&self, big_endian: bool) -> Option<InterfaceFilter> {
        self.options.iter().find_map(|opt| {
            if opt.code == OptionCode::IfFilter {
                opt.as_bytes()
                    .ok()
                    .map(|b| InterfaceFilter::from_bytes(b, big_endian))
            } else {
                None
            }
        })
    }
}

/// A capture filter attached to an interface (`if_filter`).
///
/// The first byte of the option selects the representation; shapes not
/// matching the tag are kept opaque rather than dropped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InterfaceFilter {
    /// A libpcap filter string (tag 0)
    Pcap(String),
    /// A BPF instruction stream (tag 1)
    Bpf(Vec<BpfInsn>),
    /// Unknown tag, or a malformed body for a known tag
    Opaque(Vec<u8>),
}

/// One BPF instruction of an `if_filter` program.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BpfInsn {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl InterfaceFilter {
    /// Decode an `if_filter` option body read from a section with the given
    /// byte order.
    pub fn from_bytes(value: &[u8], big_endian: bool) -> InterfaceFilter {
        match value.split_first() {
            Some((0, rest)) => match std::str::from_utf8(rest) {
                Ok(s) => InterfaceFilter::Pcap(s.to_owned()),
                Err(_) => InterfaceFilter::Opaque(value.to_vec()),
            },
            Some((1, rest)) if !rest.is_empty() && rest.len() % 8 == 0 => {
                let insns = rest
                    .chunks_exact(8)
                    .map(|chunk| {
                        use std::convert::TryInto;
                        let code: [u8; 2] = chunk[0..2].try_into().expect("chunk of 8");
                        let k: [u8; 4] = chunk[4..8].try_into().expect("chunk of 8");
                        let (code, k) = if big_endian {
                            (u16::from_be_bytes(code), u32::from_be_bytes(k))
                        } else {
                            (u16::from_le_bytes(code), u32::from_le_bytes(k))
                        };
                        BpfInsn {
                            code,
                            jt: chunk[2],
                            jf: chunk[3],
                            k,
                        }
                    })
                    .collect();
                InterfaceFilter::Bpf(insns)
            }
            _ => InterfaceFilter::Opaque(value.to_vec()),
        }
    }
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, InterfaceDescriptionBlock<'a>>
    for InterfaceDescriptionBlock<'a>
{
    const HDR_SZ: usize = 20;
    const MAGIC: u32 = IDB_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], InterfaceDescriptionBlock<'a>, E> {
        // caller function already tested header type(magic) and length
        // read end of header
        let (i, linktype) = En::parse_u16(i)?;
        let (i, reserved) = En::parse_u16(i)?;
        let (i, snaplen) = En::parse_u32(i)?;
        // read options
        let (i, options) = opt_parse_options::<En, E>(i, block_len1 as usize, 20)?;
        let (if_tsresol, if_tsoffset) = if_extract_tsoffset_and_tsresol::<En>(&options);
        let block = InterfaceDescriptionBlock {
            block_type,
            block_len1,
            linktype: Linktype(linktype as i32),
            reserved,
            snaplen,
            options,
            block_len2,
            if_tsresol,
            if_tsoffset,
        };
        Ok((i, block))
    }
}

fn if_extract_tsoffset_and_tsresol<En: PcapEndianness>(options: &[PcapNGOption]) -> (u8, i64) {
    let mut if_tsresol: u8 = 6;
    let mut if_tsoffset: i64 = 0;
    for opt in options {
        match opt.code {
            OptionCode::IfTsresol => {
                if !opt.value.is_empty() {
                    if_tsresol = opt.value[0];
                }
            }
            OptionCode::IfTsoffset => {
                if opt.value.len() >= 8 {
                    use std::convert::TryFrom;
                    let int_bytes =
                        <[u8; 8]>::try_from(&opt.value[..8]).expect("Convert bytes to i64");
                    if_tsoffset = En::u64_from_bytes(int_bytes) as i64;
                }
            }
            _ => (),
        }
    }
    (if_tsresol, if_tsoffset)
}

/// Parse an Interface Description Block (little-endian)
pub fn parse_interfacedescriptionblock_le(
    i: &[u8],
) -> IResult<&[u8], InterfaceDescriptionBlock, PcapError> {
    ng_block_parser::<InterfaceDescriptionBlock, PcapLE, _, _>()(i)
}

/// Parse an Interface Description Block (big-endian)
pub fn parse_interfacedescriptionblock_be(
    i: &[u8],
) -> IResult<&[u8], InterfaceDescriptionBlock, PcapError> {
    ng_block_parser::<InterfaceDescriptionBlock, PcapBE, _, _>()(i)
}
