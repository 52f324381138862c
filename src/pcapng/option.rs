use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;

use nom::combinator::{complete, map_parser};
use nom::multi::many0;
use nom::IResult;
use nom::{bytes::streaming::take, error::ParseError};
use rusticata_macros::{align32, newtype_enum};

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct OptionCode(pub u16);

newtype_enum! {
impl debug OptionCode {
    EndOfOpt = 0,
    Comment = 1,
    ShbHardware = 2,
    IfName = 2,
    IsbStartTime = 2,
    EpbFlags = 2,
    NrbDnsName = 2,
    ShbOs = 3,
    IfDescription = 3,
    IsbEndTime = 3,
    EpbHash = 3,
    NrbDnsIp4Addr = 3,
    ShbUserAppl = 4,
    IfIpv4Addr = 4,
    IsbIfRecv = 4,
    EpbDropCount = 4,
    NrbDnsIp6Addr = 4,
    IfIpv6Addr = 5,
    IsbIfDrop = 5,
    EpbPacketId = 5,
    IfMacAddr = 6,
    IsbFilterAccept = 6,
    EpbQueue = 6,
    IfEuiAddr = 7,
    IsbOsDrop = 7,
    EpbVerdict = 7,
    IfSpeed = 8,
    IsbUsrDeliv = 8,
    IfTsresol = 9,
    IfTzone = 10,
    IfFilter = 11,
    IfOs = 12,
    IfFcslen = 13,
    IfTsoffset = 14,
    IfHardware = 15,
}
}

impl OptionCode {
    /// True for option codes with the high bit set, which are reserved for
    /// local use and never carry a standardized meaning.
    pub fn is_local(self) -> bool {
        self.0 & 0x8000 != 0
    }
}

/// The error type which is returned when calling functions on [PcapNGOption]
#[derive(Debug, PartialEq)]
pub enum PcapNGOptionError {
    InvalidLength,
    Utf8Error,
}

impl fmt::Display for PcapNGOptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcapNGOptionError::InvalidLength => write!(f, "Invalid length"),
            PcapNGOptionError::Utf8Error => write!(f, "Invalid UTF-8 string"),
        }
    }
}

impl std::error::Error for PcapNGOptionError {}

/// A TLV option inside a block body.
///
/// `value` holds the raw bytes up to the next 4-byte boundary; `len` is the
/// declared value length without padding.
#[derive(Clone, Debug)]
pub struct PcapNGOption<'a> {
    pub code: OptionCode,
    pub len: u16,
    pub value: Cow<'a, [u8]>,
}

impl<'a> PcapNGOption<'a> {
    /// Return a reference to the option value, as raw bytes (not related to the `len` field)
    #[inline]
    pub fn value(&self) -> &[u8] {
        self.value.as_ref()
    }

    /// Return a reference to the option value, using the `len` field to limit it, or None if length is invalid
    pub fn as_bytes(&self) -> Result<&[u8], PcapNGOptionError> {
        let len = usize::from(self.len);
        if len <= self.value.len() {
            Ok(&self.value[..len])
        } else {
            Err(PcapNGOptionError::InvalidLength)
        }
    }

    /// Return the option value interpreted as string
    ///
    /// Returns an error if the length of the option is invalid, or if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&str, PcapNGOptionError> {
        self.as_bytes()
            .and_then(|b| std::str::from_utf8(b).or(Err(PcapNGOptionError::Utf8Error)))
    }

    /// Return the option value interpreted as u8
    ///
    /// Option data length must be exactly 1 byte
    pub fn as_u8(&self) -> Result<u8, PcapNGOptionError> {
        if self.len != 1 {
            return Err(PcapNGOptionError::InvalidLength);
        }
        self.value()
            .first()
            .copied()
            .ok_or(PcapNGOptionError::InvalidLength)
    }

    /// Return the option value interpreted as u32, in the given byte order
    ///
    /// Option data length must be exactly 4 bytes
    pub fn as_u32(&self, big_endian: bool) -> Result<u32, PcapNGOptionError> {
        if self.len != 4 {
            return Err(PcapNGOptionError::InvalidLength);
        }
        <[u8; 4]>::try_from(&self.value()[..4])
            .map(|b| {
                if big_endian {
                    u32::from_be_bytes(b)
                } else {
                    u32::from_le_bytes(b)
                }
            })
            .or(Err(PcapNGOptionError::InvalidLength))
    }

    /// Return the option value interpreted as u64, in the given byte order
    ///
    /// Option data length must be exactly 8 bytes
    pub fn as_u64(&self, big_endian: bool) -> Result<u64, PcapNGOptionError> {
        if self.len != 8 {
            return Err(PcapNGOptionError::InvalidLength);
        }
        <[u8; 8]>::try_from(&self.value()[..8])
            .map(|b| {
                if big_endian {
                    u64::from_be_bytes(b)
                } else {
                    u64::from_le_bytes(b)
                }
            })
            .or(Err(PcapNGOptionError::InvalidLength))
    }

    /// Return the option value interpreted as i64, in the given byte order
    ///
    /// Option data length must be exactly 8 bytes
    pub fn as_i64(&self, big_endian: bool) -> Result<i64, PcapNGOptionError> {
        self.as_u64(big_endian).map(|v| v as i64)
    }

    /// Return the option value interpreted as a split 64-bit timestamp
    /// (most significant 32 bits first), in the given byte order
    ///
    /// Option data length must be exactly 8 bytes
    pub fn as_timestamp(&self, big_endian: bool) -> Result<u64, PcapNGOptionError> {
        if self.len != 8 {
            return Err(PcapNGOptionError::InvalidLength);
        }
        let value = self.value();
        let high = <[u8; 4]>::try_from(&value[..4]).or(Err(PcapNGOptionError::InvalidLength))?;
        let low = <[u8; 4]>::try_from(&value[4..8]).or(Err(PcapNGOptionError::InvalidLength))?;
        let (high, low) = if big_endian {
            (u32::from_be_bytes(high), u32::from_be_bytes(low))
        } else {
            (u32::from_le_bytes(high), u32::from_le_bytes(low))
        };
        Ok(((high as u64) << 32) | (low as u64))
    }

    /// Build an owned option from a code and value bytes.
    pub fn owned(code: OptionCode, value: Vec<u8>) -> PcapNGOption<'static> {
        PcapNGOption {
            code,
            len: value.len() as u16,
            value: Cow::Owned(value),
        }
    }
}

/// Parse a pcap-ng Option (little-endian)
#[inline]
pub fn parse_option_le<'i, E: ParseError<&'i [u8]>>(
    i: &'i [u8],
) -> IResult<&'i [u8], PcapNGOption<'i>, E> {
    parse_option::<PcapLE, E>(i)
}

/// Parse a pcap-ng Option (big-endian)
#[inline]
pub fn parse_option_be<'i, E: ParseError<&'i [u8]>>(
    i: &'i [u8],
) -> IResult<&'i [u8], PcapNGOption<'i>, E> {
    parse_option::<PcapBE, E>(i)
}

pub(crate) fn parse_option<'i, En: PcapEndianness, E: ParseError<&'i [u8]>>(
    i: &'i [u8],
) -> IResult<&'i [u8], PcapNGOption<'i>, E> {
    let (i, code) = En::parse_u16(i)?;
    let (i, len) = En::parse_u16(i)?;
    let (i, value) = take(align32!(len as u32))(i)?;
    let option = PcapNGOption {
        code: OptionCode(code),
        len,
        value: Cow::Borrowed(value),
    };
    Ok((i, option))
}

/// Parse the option area of a block, bounded by the declared block length.
///
/// `len` is the declared total block length and `opt_offset` the offset of
/// the option area inside the block. Trailing bytes that do not form a whole
/// option (for ex. stray padding) are tolerated and skipped.
pub(crate) fn opt_parse_options<'i, En: PcapEndianness, E: ParseError<&'i [u8]>>(
    i: &'i [u8],
    len: usize,
    opt_offset: usize,
) -> IResult<&'i [u8], Vec<PcapNGOption<'i>>, E> {
    if len > opt_offset {
        map_parser(
            take(len - opt_offset),
            many0(complete(parse_option::<En, E>)),
        )(i)
    } else {
        Ok((i, Vec::new()))
    }
}

pub(crate) fn options_get_as_string<'a>(
    options: &'a [PcapNGOption],
    code: OptionCode,
) -> Option<Result<&'a str, PcapNGOptionError>> {
    options.iter().find_map(|opt| {
        if opt.code == code {
            Some(opt.as_str())
        } else {
            None
        }
    })
}

pub(crate) fn options_get_as_u64(
    options: &[PcapNGOption],
    code: OptionCode,
    big_endian: bool,
) -> Option<Result<u64, PcapNGOptionError>> {
    options.iter().find_map(|opt| {
        if opt.code == code {
            Some(opt.as_u64(big_endian))
        } else {
            None
        }
    })
}

pub(crate) fn options_get_as_ts(
    options: &[PcapNGOption],
    code: OptionCode,
    big_endian: bool,
) -> Option<Result<u64, PcapNGOptionError>> {
    options.iter().find_map(|opt| {
        if opt.code == code {
            Some(opt.as_timestamp(big_endian))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::PcapError;

    #[test]
    fn parse_padded_option() {
        let input = &hex!("01 00 05 00 68 65 6c 6c 6f 00 00 00");
        let (rem, opt) = parse_option_le::<PcapError>(input).unwrap();
        assert!(rem.is_empty());
        assert_eq!(opt.code, OptionCode::Comment);
        assert_eq!(opt.len, 5);
        assert_eq!(opt.as_str(), Ok("hello"));
    }

    #[test]
    fn option_accessors_check_length() {
        let opt = PcapNGOption::owned(OptionCode::IfSpeed, vec![0, 1, 2]);
        assert_eq!(opt.as_u32(false), Err(PcapNGOptionError::InvalidLength));
        assert_eq!(opt.as_u64(false), Err(PcapNGOptionError::InvalidLength));
    }

    #[test]
    fn split_timestamp_both_orders() {
        let le = PcapNGOption::owned(OptionCode::IsbStartTime, hex!("97 c3 04 00 aa 47 ca 64").to_vec());
        let be = PcapNGOption::owned(OptionCode::IsbStartTime, hex!("00 04 c3 97 64 ca 47 aa").to_vec());
        assert_eq!(le.as_timestamp(false), Ok(0x0004_c397_64ca_47aa));
        assert_eq!(be.as_timestamp(true), Ok(0x0004_c397_64ca_47aa));
    }

    #[test]
    fn local_option_codes() {
        assert!(OptionCode(0x8001).is_local());
        assert!(!OptionCode(0x0001).is_local());
    }
}
