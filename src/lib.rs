//! # PCAPNG file reader and writer
//!
//! This crate implements the PCAP Next Generation capture file format: the
//! self-delimiting, type-tagged blocks carrying sections, interfaces, name
//! resolutions, statistics, decryption secrets, and the payload records
//! (packets, kernel events, journal entries) they scope.
//!
//! It is designed to support the format as found in the wild: little or
//! big-endian sections, multiple sections per file with their own interface
//! tables, obsolete block types, declared lengths missing their final
//! padding. Every length field is validated against a hard cap before the
//! block body is allocated, so adversarial inputs fail cheaply.
//!
//! Two layers are exposed:
//!
//! - slice-level, zero-copy [nom](https://github.com/Geal/nom) parsers, one
//!   per block type (`parse_block_le`, `parse_enhancedpacketblock_be`, ...)
//! - a file-handle engine: [`PcapNGReader`] walks blocks sequentially,
//!   accumulates section state, and surfaces payload blocks as owned
//!   [`Record`]s; a random-access cursor re-reads records at known offsets;
//!   [`PcapNGWriter`] mirrors the pipeline in reverse.
//!
//! # Example: reading a file
//!
//! ```rust,no_run
//! use pcapng_io::PcapNGReader;
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("capture.pcapng")?;
//! let mut reader = PcapNGReader::open(file).map_err(|e| e.error)?;
//! while let Some((offset, record)) = reader.next_record()? {
//!     println!(
//!         "block at {}: captured {} of {} bytes",
//!         offset, record.caplen, record.origlen
//!     );
//! }
//! # Ok(())
//! # }
//! ```

mod utils;

mod error;
pub use error::*;

mod linktype;
pub use linktype::*;

mod record;
pub use record::*;

pub mod pcapng;
pub use pcapng::*;

pub mod registry;

mod endianness;

mod serialize;
pub use serialize::ToVec;
