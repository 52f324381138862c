use std::net::{Ipv4Addr, Ipv6Addr};

use nom::bytes::streaming::take;
use nom::error::ParseError;
use nom::IResult;
use rusticata_macros::{align32, newtype_enum};

use crate::endianness::{PcapBE, PcapEndianness, PcapLE};
use crate::{PcapError, PcapNGOption};

use super::*;

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct NameRecordType(pub u16);

newtype_enum! {
    impl debug NameRecordType {
        End = 0,
        Ipv4 = 1,
        Ipv6 = 2
    }
}

/// One record of a Name Resolution Block.
///
/// `record_value` holds the exact declared bytes, without padding. Records
/// with types other than IPv4/IPv6 are preserved opaquely.
#[derive(Debug)]
pub struct NameRecord<'a> {
    pub record_type: NameRecordType,
    pub record_value: &'a [u8],
}

/// Error raised when walking the names of a [`NameRecord`].
#[derive(Debug, PartialEq)]
pub enum NameRecordError {
    /// The record is too short to hold an address of its type
    TooShort,
    /// A name is not NUL-terminated within the record
    UnterminatedName,
}

impl<'a> NameRecord<'a> {
    /// Split an IPv4/IPv6 record into its address bytes and the
    /// NUL-terminated names that follow.
    ///
    /// Every name must be terminated within the record; an unterminated
    /// name is a hard error, reported before any name is returned.
    pub fn addr_and_names(&self) -> Result<(&'a [u8], Vec<&'a [u8]>), NameRecordError> {
        let addr_len = match self.record_type {
            NameRecordType::Ipv4 => 4,
            NameRecordType::Ipv6 => 16,
            _ => return Err(NameRecordError::TooShort),
        };
        if self.record_value.len() < addr_len {
            return Err(NameRecordError::TooShort);
        }
        let (addr, mut rest) = self.record_value.split_at(addr_len);
        let mut names = Vec::new();
        while !rest.is_empty() {
            match rest.iter().position(|&b| b == 0) {
                Some(pos) => {
                    names.push(&rest[..pos]);
                    rest = &rest[pos + 1..];
                }
                None => return Err(NameRecordError::UnterminatedName),
            }
        }
        Ok((addr, names))
    }

    /// The record address as an `Ipv4Addr`, for IPv4 records.
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        if self.record_type == NameRecordType::Ipv4 && self.record_value.len() >= 4 {
            let b = &self.record_value[..4];
            Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        } else {
            None
        }
    }

    /// The record address as an `Ipv6Addr`, for IPv6 records.
    pub fn ipv6_addr(&self) -> Option<Ipv6Addr> {
        use std::convert::TryFrom;
        if self.record_type == NameRecordType::Ipv6 {
            <[u8; 16]>::try_from(self.record_value.get(..16)?)
                .ok()
                .map(Ipv6Addr::from)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct NameResolutionBlock<'a> {
    pub block_type: u32,
    pub block_len1: u32,
    /// Records in file order, excluding the end-of-records marker
    pub nr: Vec<NameRecord<'a>>,
    pub options: Vec<PcapNGOption<'a>>,
    pub block_len2: u32,
}

impl<'a> NameResolutionBlock<'a> {
    /// Return the `opt_comment` option value, if present
    pub fn comment(&self) -> Option<Result<&str, PcapNGOptionError>> {
        options_get_as_string(&self.options, OptionCode::Comment)
    }
}

impl<'a, En: PcapEndianness> PcapNGBlockParser<'a, En, NameResolutionBlock<'a>>
    for NameResolutionBlock<'a>
{
    const HDR_SZ: usize = 16;
    const MAGIC: u32 = NRB_MAGIC;

    fn inner_parse<E: ParseError<&'a [u8]>>(
        block_type: u32,
        block_len1: u32,
        i: &'a [u8],
        block_len2: u32,
    ) -> IResult<&'a [u8], NameResolutionBlock<'a>, E> {
        let start_i = i;
        // caller function already tested header type(magic) and length
        // read records
        let (i, nr) = parse_name_record_list::<En, E>(i)?;
        // read options
        let current_offset = 12 + (i.as_ptr() as usize) - (start_i.as_ptr() as usize);
        let (i, options) = opt_parse_options::<En, E>(i, block_len1 as usize, current_offset)?;
        let block = NameResolutionBlock {
            block_type,
            block_len1,
            nr,
            options,
            block_len2,
        };
        Ok((i, block))
    }
}

fn parse_name_record<'a, En: PcapEndianness, E: ParseError<&'a [u8]>>(
    i: &'a [u8],
) -> IResult<&'a [u8], NameRecord<'a>, E> {
    let (i, record_type) = En::parse_u16(i)?;
    let (i, record_len) = En::parse_u16(i)?;
    let (i, record_value) = take(record_len)(i)?;
    let padding = align32!(record_len as u32) - record_len as u32;
    let (i, _) = take(padding)(i)?;
    let name_record = NameRecord {
        record_type: NameRecordType(record_type),
        record_value,
    };
    Ok((i, name_record))
}

fn parse_name_record_list<'a, En: PcapEndianness, E: ParseError<&'a [u8]>>(
    mut i: &'a [u8],
) -> IResult<&'a [u8], Vec<NameRecord<'a>>, E> {
    let mut records = Vec::new();
    loop {
        let (rem, record) = parse_name_record::<En, E>(i)?;
        i = rem;
        // the end-of-records marker closes the stream (options may follow)
        if record.record_type == NameRecordType::End {
            return Ok((i, records));
        }
        records.push(record);
    }
}

/// Parse a Name Resolution Block (little-endian)
#[inline]
pub fn parse_nameresolutionblock_le(i: &[u8]) -> IResult<&[u8], NameResolutionBlock, PcapError> {
    ng_block_parser::<NameResolutionBlock, PcapLE, _, _>()(i)
}

/// Parse a Name Resolution Block (big-endian)
#[inline]
pub fn parse_nameresolutionblock_be(i: &[u8]) -> IResult<&[u8], NameResolutionBlock, PcapError> {
    ng_block_parser::<NameResolutionBlock, PcapBE, _, _>()(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_nul_scanned() {
        let record = NameRecord {
            record_type: NameRecordType::Ipv4,
            record_value: b"\x7f\x00\x00\x01localhost\x00lo\x00",
        };
        let (addr, names) = record.addr_and_names().unwrap();
        assert_eq!(addr, &[127, 0, 0, 1]);
        assert_eq!(names, vec![&b"localhost"[..], &b"lo"[..]]);
        assert_eq!(record.ipv4_addr(), Some(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn unterminated_name_is_hard_error() {
        let record = NameRecord {
            record_type: NameRecordType::Ipv4,
            record_value: b"\x7f\x00\x00\x01localhost",
        };
        assert_eq!(
            record.addr_and_names(),
            Err(NameRecordError::UnterminatedName)
        );
    }

    #[test]
    fn short_record_is_error() {
        let record = NameRecord {
            record_type: NameRecordType::Ipv6,
            record_value: b"\x7f\x00\x00\x01",
        };
        assert_eq!(record.addr_and_names(), Err(NameRecordError::TooShort));
    }
}
