use rusticata_macros::newtype_enum;

/// Data link type
///
/// The link-layer header type specifies the type of headers at the beginning
/// of the packet.
///
/// See [http://www.tcpdump.org/linktypes.html](http://www.tcpdump.org/linktypes.html)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Linktype(pub i32);

newtype_enum! {
impl display Linktype {
    NULL = 0,
    ETHERNET = 1,

    FDDI = 10,

    RAW = 101,

    LOOP = 108,
    LINUX_SLL = 113,

    // Raw IPv4; the packet begins with an IPv4 header.
    IPV4 = 228,
    // Raw IPv6; the packet begins with an IPv6 header.
    IPv6 = 229,

    // D-Bus messages, which can be far larger than any network packet.
    DBUS = 231,

    // Linux netlink NETLINK NFLOG socket log messages.
    NFLOG = 239,

    NETLINK = 253,
}
}

/// Largest captured length accepted for most encapsulations.
pub const MAX_SNAPLEN_STANDARD: u32 = 262_144;

/// Largest captured length accepted for D-Bus captures, whose messages can
/// be up to 128 MiB.
pub const MAX_SNAPLEN_DBUS: u32 = 128 * 1024 * 1024;

impl Linktype {
    /// Maximum captured packet length accepted for this encapsulation.
    ///
    /// Anything larger in a capture file is treated as file corruption
    /// rather than an actual giant packet.
    pub fn max_snaplen(self) -> u32 {
        if self == Linktype::DBUS {
            MAX_SNAPLEN_DBUS
        } else {
            MAX_SNAPLEN_STANDARD
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_snaplen_per_encap() {
        assert_eq!(Linktype::ETHERNET.max_snaplen(), MAX_SNAPLEN_STANDARD);
        assert_eq!(Linktype::DBUS.max_snaplen(), MAX_SNAPLEN_DBUS);
    }
}
