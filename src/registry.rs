//! Process-wide extension registries.
//!
//! Two tables, both initialized lazily on first registration and meant to be
//! populated before any reader or writer is constructed:
//!
//! - block handlers, keyed by block type. The engine's built-in types cannot
//!   be overridden; the standardized-but-unhandled types (IRIG-TS,
//!   ARINC 429, Sysdig EVF) and all local types (high bit set) can.
//! - option handlers, keyed by block family and option code. Registering
//!   twice for the same key silently replaces the previous handler.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::pcapng::{
    ARINC_429_MAGIC, DSB_MAGIC, EPB_MAGIC, IDB_MAGIC, IRIG_TS_MAGIC, ISB_MAGIC, NRB_MAGIC,
    PB_MAGIC, SHB_MAGIC, SPB_MAGIC, SYSDIG_EVENT_MAGIC, SYSDIG_EVENT_V2_MAGIC, SYSDIG_EVF_MAGIC,
};
use crate::{PcapNGError, Record};

/// The fixed seven-way grouping of block types used to key option handlers.
///
/// Block types that share an option namespace collapse to one family: the
/// packet blocks (PB, EPB, SPB) and the Sysdig event versions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BlockFamily {
    SectionHeader,
    InterfaceDescription,
    Packet,
    NameResolution,
    InterfaceStatistics,
    Event,
    DecryptionSecrets,
}

impl BlockFamily {
    /// Map a block type to its option-handler family, or `None` for types
    /// with no standardized option namespace.
    pub fn from_block_type(block_type: u32) -> Option<BlockFamily> {
        match block_type {
            SHB_MAGIC => Some(BlockFamily::SectionHeader),
            IDB_MAGIC => Some(BlockFamily::InterfaceDescription),
            PB_MAGIC | EPB_MAGIC | SPB_MAGIC => Some(BlockFamily::Packet),
            NRB_MAGIC => Some(BlockFamily::NameResolution),
            ISB_MAGIC => Some(BlockFamily::InterfaceStatistics),
            SYSDIG_EVENT_MAGIC | SYSDIG_EVENT_V2_MAGIC => Some(BlockFamily::Event),
            DSB_MAGIC => Some(BlockFamily::DecryptionSecrets),
            _ => None,
        }
    }
}

/// Reader half of a block handler: called with the framed block body (after
/// the 8-byte header, without the trailer) and the section byte order.
/// Returns a record when the block carries payload, `None` when it is
/// metadata.
pub type BlockReaderFn =
    fn(block_type: u32, big_endian: bool, body: &[u8]) -> Result<Option<Record>, PcapNGError>;

/// Writer half of a block handler: encodes a record back into a complete
/// block (header, body, padding and trailer).
pub type BlockWriterFn = fn(record: &Record) -> Result<Vec<u8>, PcapNGError>;

#[derive(Clone, Copy)]
pub struct BlockHandler {
    pub reader: BlockReaderFn,
    pub writer: BlockWriterFn,
}

/// Parser role of an option handler: validates the raw option value and
/// returns the (possibly normalized) bytes to retain.
pub type OptionParserFn = fn(big_endian: bool, value: &[u8]) -> Result<Vec<u8>, PcapNGError>;

/// Sizer role of an option handler: on-disk size of the value, without the
/// 4-byte TLV header and without padding.
pub type OptionSizerFn = fn(value: &[u8]) -> u32;

/// Writer role of an option handler: appends the encoded value bytes
/// (unpadded; the engine pads).
pub type OptionWriterFn = fn(value: &[u8], out: &mut Vec<u8>) -> Result<(), PcapNGError>;

#[derive(Clone, Copy)]
pub struct OptionHandler {
    pub parser: OptionParserFn,
    pub sizer: OptionSizerFn,
    pub writer: OptionWriterFn,
}

fn block_handlers() -> &'static RwLock<HashMap<u32, BlockHandler>> {
    static TABLE: OnceLock<RwLock<HashMap<u32, BlockHandler>>> = OnceLock::new();
    TABLE.get_or_init(Default::default)
}

fn option_handlers() -> &'static RwLock<HashMap<(BlockFamily, u16), OptionHandler>> {
    static TABLE: OnceLock<RwLock<HashMap<(BlockFamily, u16), OptionHandler>>> = OnceLock::new();
    TABLE.get_or_init(Default::default)
}

fn is_registrable_block_type(block_type: u32) -> bool {
    // local types belong to the caller; of the standardized ones, only
    // those the engine does not implement itself may be taken over
    block_type & 0x8000_0000 != 0
        || matches!(
            block_type,
            IRIG_TS_MAGIC | ARINC_429_MAGIC | SYSDIG_EVF_MAGIC
        )
}

/// Register a reader/writer pair for a block type.
///
/// Fails for the engine's built-in types. Intended to be called during
/// process initialization, before any reader or writer exists.
pub fn register_block_handler(
    block_type: u32,
    handler: BlockHandler,
) -> Result<(), PcapNGError> {
    if !is_registrable_block_type(block_type) {
        return Err(PcapNGError::Internal(format!(
            "block type 0x{:08x} is built in and cannot be overridden",
            block_type
        )));
    }
    let mut table = block_handlers()
        .write()
        .map_err(|_| PcapNGError::Internal("block handler table poisoned".to_owned()))?;
    table.insert(block_type, handler);
    Ok(())
}

/// Register an option handler for `(block type, option code)`.
///
/// The block type is collapsed to its family, so a handler registered for
/// the EPB also applies to PB and SPB options. An existing handler for the
/// same key is replaced silently.
pub fn register_option_handler(
    block_type: u32,
    option_code: u16,
    handler: OptionHandler,
) -> Result<(), PcapNGError> {
    let family = BlockFamily::from_block_type(block_type).ok_or_else(|| {
        PcapNGError::Internal(format!(
            "block type 0x{:08x} has no option namespace",
            block_type
        ))
    })?;
    let mut table = option_handlers()
        .write()
        .map_err(|_| PcapNGError::Internal("option handler table poisoned".to_owned()))?;
    table.insert((family, option_code), handler);
    Ok(())
}

pub(crate) fn lookup_block_handler(block_type: u32) -> Option<BlockHandler> {
    block_handlers().read().ok()?.get(&block_type).copied()
}

pub(crate) fn lookup_option_handler(
    family: BlockFamily,
    option_code: u16,
) -> Option<OptionHandler> {
    option_handlers()
        .read()
        .ok()?
        .get(&(family, option_code))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop_reader(_: u32, _: bool, _: &[u8]) -> Result<Option<Record>, PcapNGError> {
        Ok(None)
    }
    fn nop_writer(_: &Record) -> Result<Vec<u8>, PcapNGError> {
        Ok(Vec::new())
    }

    #[test]
    fn builtin_types_cannot_be_overridden() {
        let handler = BlockHandler {
            reader: nop_reader,
            writer: nop_writer,
        };
        assert!(register_block_handler(EPB_MAGIC, handler).is_err());
        assert!(register_block_handler(SHB_MAGIC, handler).is_err());
        assert!(register_block_handler(IRIG_TS_MAGIC, handler).is_ok());
        assert!(register_block_handler(0x8000_1234, handler).is_ok());
    }

    #[test]
    fn block_families() {
        assert_eq!(
            BlockFamily::from_block_type(PB_MAGIC),
            Some(BlockFamily::Packet)
        );
        assert_eq!(
            BlockFamily::from_block_type(SPB_MAGIC),
            Some(BlockFamily::Packet)
        );
        assert_eq!(
            BlockFamily::from_block_type(SYSDIG_EVENT_V2_MAGIC),
            Some(BlockFamily::Event)
        );
        assert_eq!(BlockFamily::from_block_type(0x4242), None);
    }
}
