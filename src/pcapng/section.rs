use crate::linktype::Linktype;
use crate::record::TsPrecision;

use super::{InterfaceFilter, SecretsType};

/// Per-interface state accumulated by the reader while walking a section.
///
/// The position of the descriptor in [`SectionInfo::interfaces`] is the
/// interface id referenced by packet blocks of the same section.
#[derive(Clone, Debug)]
pub struct InterfaceInfo {
    pub linktype: Linktype,
    pub snaplen: u32,
    /// Denominator of the raw timestamps on this interface
    pub time_units_per_second: u64,
    /// Raw `if_tsresol` exponent byte the resolution was derived from
    pub if_tsresol: u8,
    pub ts_precision: TsPrecision,
    /// Frame check sequence length, or -1 if unknown
    pub fcslen: i8,
    pub name: Option<String>,
    pub description: Option<String>,
    pub os: Option<String>,
    pub hardware: Option<String>,
    /// Interface speed in bits per second
    pub speed: Option<u64>,
    pub filter: Option<InterfaceFilter>,
    /// Options this engine does not interpret (local codes, or codes with
    /// a registered extension parser), kept for downstream consumers
    pub raw_options: Vec<(u16, Vec<u8>)>,
    /// Statistics snapshots for this interface, in arrival order
    pub stats: Vec<InterfaceStats>,
}

impl Default for InterfaceInfo {
    fn default() -> Self {
        InterfaceInfo {
            linktype: Linktype::NULL,
            snaplen: 0,
            // default resolution is microseconds (if_tsresol 6)
            time_units_per_second: 1_000_000,
            if_tsresol: 6,
            ts_precision: TsPrecision::Microseconds,
            fcslen: -1,
            name: None,
            description: None,
            os: None,
            hardware: None,
            speed: None,
            filter: None,
            raw_options: Vec::new(),
            stats: Vec::new(),
        }
    }
}

/// One Interface Statistics Block, decoded and attached to its interface.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InterfaceStats {
    /// Raw block timestamp, in interface time units
    pub ts: u64,
    /// Raw `isb_starttime`, in interface time units
    pub start_time: Option<u64>,
    /// Raw `isb_endtime`, in interface time units
    pub end_time: Option<u64>,
    pub if_recv: Option<u64>,
    pub if_drop: Option<u64>,
    pub filter_accept: Option<u64>,
    pub os_drop: Option<u64>,
    pub usr_deliv: Option<u64>,
    pub comment: Option<String>,
}

/// Per-section state. Sections are retained for the life of the reader so
/// random-access re-reads can locate the section owning a file offset.
#[derive(Clone, Debug)]
pub struct SectionInfo {
    /// True if the section magic was read in reversed (big-endian) order
    pub big_endian: bool,
    pub major_version: u16,
    pub minor_version: u16,
    /// Declared section length, or -1 if unknown
    pub section_len: i64,
    /// File offset of the Section Header Block
    pub shb_offset: u64,
    pub hardware: Option<String>,
    pub os: Option<String>,
    pub user_appl: Option<String>,
    pub comment: Option<String>,
    /// Interface descriptors, in file order; never removed
    pub interfaces: Vec<InterfaceInfo>,
}

impl SectionInfo {
    pub fn interface(&self, if_id: u32) -> Option<&InterfaceInfo> {
        self.interfaces.get(if_id as usize)
    }
}

/// Owned copy of a Decryption Secrets Block, retained by the reader so a
/// dumper can mirror the secrets into its output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptionSecrets {
    pub secrets_type: SecretsType,
    pub data: Vec<u8>,
}

/// File-scope encapsulation advertised by a capture.
///
/// Folded over the interfaces seen so far: uniform while every interface
/// agrees, per-packet as soon as one disagrees.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileEncap {
    /// No interface seen yet
    Unknown,
    /// All interfaces agree on this encapsulation
    Uniform(Linktype),
    /// Interfaces disagree; consult each record
    PerPacket,
}

impl FileEncap {
    pub(crate) fn fold(self, linktype: Linktype) -> FileEncap {
        match self {
            FileEncap::Unknown => FileEncap::Uniform(linktype),
            FileEncap::Uniform(l) if l == linktype => self,
            _ => FileEncap::PerPacket,
        }
    }
}

/// File-scope timestamp precision advertised by a capture; same folding as
/// [`FileEncap`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileTsPrecision {
    Unknown,
    Uniform(TsPrecision),
    PerPacket,
}

impl FileTsPrecision {
    pub(crate) fn fold(self, precision: TsPrecision) -> FileTsPrecision {
        match self {
            FileTsPrecision::Unknown => FileTsPrecision::Uniform(precision),
            FileTsPrecision::Uniform(p) if p == precision => self,
            _ => FileTsPrecision::PerPacket,
        }
    }
}
