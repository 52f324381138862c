use crate::linktype::Linktype;

/// Timestamp precision bucket advertised for a record.
///
/// Derived from the interface's time units per second by thresholding, so a
/// resolution of e.g. 8000 units/s is advertised as milliseconds.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum TsPrecision {
    Seconds,
    Deciseconds,
    Centiseconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

/// A decoded record timestamp.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp {
    pub secs: u64,
    pub nsecs: u32,
    pub precision: TsPrecision,
}

/// What kind of payload a [`Record`] carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordKind {
    /// A network packet (EPB, PB or SPB)
    Packet,
    /// A Sysdig kernel event
    Syscall,
    /// A systemd journal export entry
    SystemdJournal,
}

/// A packet verdict attached by a capture component (`epb_verdict`).
///
/// Tag 0 carries hardware-specific bytes and is kept opaque; tags 1 and 2
/// are the Linux eBPF TC and XDP 64-bit verdicts. Higher tags are skipped
/// at decode time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Hardware(Vec<u8>),
    LinuxEbpfTc(u64),
    LinuxEbpfXdp(u64),
}

/// Sysdig event fields that precede the opaque event payload.
///
/// `big_endian` records the byte order of the section the event was read
/// from, since the payload keeps its on-file encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyscallInfo {
    pub cpu_id: u16,
    pub thread_id: u64,
    pub event_type: u16,
    /// Parameter count, present in v2 event blocks only
    pub nparams: Option<u32>,
    pub big_endian: bool,
}

/// The caller-visible output of a payload-carrying block.
///
/// Metadata blocks (SHB, IDB, NRB, ISB, DSB) never surface as records; they
/// are folded into the reader state instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    /// Interface the record was captured on, scoped to its section
    pub if_id: Option<u32>,
    /// Absent for Simple Packet Blocks and undated journal entries
    pub ts: Option<Timestamp>,
    /// Number of payload bytes present in the file
    pub caplen: u32,
    /// Original length on the wire
    pub origlen: u32,
    /// Link-layer encapsulation; `None` for non-packet records
    pub linktype: Option<Linktype>,
    pub comment: Option<String>,
    /// Raw `epb_flags` word
    pub flags: Option<u32>,
    pub drop_count: Option<u64>,
    pub packet_id: Option<u64>,
    pub queue: Option<u32>,
    /// Verdicts in file order
    pub verdicts: Vec<Verdict>,
    /// Sysdig event header, for `RecordKind::Syscall` only
    pub syscall: Option<SyscallInfo>,
    pub data: Vec<u8>,
}

impl Record {
    /// Create a packet record with the mandatory fields; optional fields
    /// start out unset.
    pub fn packet(linktype: Linktype, caplen: u32, origlen: u32, data: Vec<u8>) -> Record {
        Record {
            kind: RecordKind::Packet,
            if_id: None,
            ts: None,
            caplen,
            origlen,
            linktype: Some(linktype),
            comment: None,
            flags: None,
            drop_count: None,
            packet_id: None,
            queue: None,
            verdicts: Vec::new(),
            syscall: None,
            data,
        }
    }

    /// FCS length override carried in the flags word (bits 16-19), if any.
    ///
    /// A non-zero value takes precedence over the interface `if_fcslen`.
    pub fn fcs_len(&self) -> Option<u8> {
        match self.flags {
            Some(flags) => {
                let fcslen = ((flags >> 16) & 0xf) as u8;
                if fcslen != 0 {
                    Some(fcslen)
                } else {
                    None
                }
            }
            None => None,
        }
    }
}
