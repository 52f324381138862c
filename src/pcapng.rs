//! PCAPNG block definitions and parsers
//!
//! Each block type of the pcapng format has its own module. The parsers are
//! written as [nom](https://github.com/Geal/nom) combinators over byte
//! slices, generic over the section byte order, and do not copy block
//! content. The file-handle engine ([`PcapNGReader`](crate::PcapNGReader),
//! [`PcapNGWriter`](crate::PcapNGWriter)) is built on top of them.

mod block;
mod decryption_secrets;
mod enhanced_packet;
mod interface_description;
mod interface_statistics;
mod name_resolution;
mod option;
mod reader;
mod section;
mod section_header;
mod simple_packet;
mod sysdig_event;
mod systemd_journal_export;
mod time;
mod unknown;
mod writer;

pub use block::*;
pub use decryption_secrets::*;
pub use enhanced_packet::*;
pub use interface_description::*;
pub use interface_statistics::*;
pub use name_resolution::*;
pub use option::*;
pub use reader::*;
pub use section::*;
pub use section_header::*;
pub use simple_packet::*;
pub use sysdig_event::*;
pub use systemd_journal_export::*;
pub use time::*;
pub use unknown::*;
pub use writer::*;

/// Section Header Block magic
pub const SHB_MAGIC: u32 = 0x0A0D_0D0A;
/// Interface Description Block magic
pub const IDB_MAGIC: u32 = 0x0000_0001;
/// Packet Block magic (obsolete, superseded by EPB)
pub const PB_MAGIC: u32 = 0x0000_0002;
/// Simple Packet Block magic
pub const SPB_MAGIC: u32 = 0x0000_0003;
/// Name Resolution Block magic
pub const NRB_MAGIC: u32 = 0x0000_0004;
/// Interface Statistic Block magic
pub const ISB_MAGIC: u32 = 0x0000_0005;
/// Enhanced Packet Block magic
pub const EPB_MAGIC: u32 = 0x0000_0006;

/// IRIG timestamp block magic (registrable, not built in)
pub const IRIG_TS_MAGIC: u32 = 0x0000_0007;
/// ARINC 429 in AIM format block magic (registrable, not built in)
pub const ARINC_429_MAGIC: u32 = 0x0000_0008;

/// Systemd Journal Export Block magic
pub const SJE_MAGIC: u32 = 0x0000_0009;

/// Decryption Secrets Block magic
pub const DSB_MAGIC: u32 = 0x0000_000A;

/// Sysdig Event Block magic
pub const SYSDIG_EVENT_MAGIC: u32 = 0x0000_0204;
/// Sysdig Event Filter block magic (registrable, not built in)
pub const SYSDIG_EVF_MAGIC: u32 = 0x0000_0207;
/// Sysdig Event Block v2 magic
pub const SYSDIG_EVENT_V2_MAGIC: u32 = 0x0000_0208;

/// Byte Order magic
pub const BOM_MAGIC: u32 = 0x1A2B_3C4D;

/// Hard cap on the total length of any block.
///
/// An EPB holding a maximum-size D-Bus packet plus 128 KiB of options; the
/// maximum D-Bus packet is larger than the maximum packet of every other
/// link-layer type. Anything above this is treated as file corruption, and
/// rejected before the block body is allocated.
pub const MAX_BLOCK_SIZE: u32 = 32 + crate::linktype::MAX_SNAPLEN_DBUS + 131_072;
