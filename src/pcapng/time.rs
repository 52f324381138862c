use crate::record::TsPrecision;

/// Compute the timestamp resolution, in units per second
///
/// The high bit of `ts_resol` selects the base (10 if clear, 2 if set), the
/// low 7 bits are the exponent. An exponent that does not fit a `u64` is
/// clamped to `u64::MAX`.
pub fn build_ts_resolution(ts_resol: u8) -> u64 {
    let ts_mode = ts_resol & 0x80;
    if ts_mode == 0 {
        // 10^if_tsresol
        // 10^19 is the largest power of 10 to fit in a u64
        if ts_resol > 19 {
            log::debug!("if_tsresol 10^{} out of range, clamping", ts_resol);
            return u64::MAX;
        }
        10u64.pow(ts_resol as u32)
    } else {
        // 2^if_tsresol
        let exp = ts_resol & 0x7f;
        if exp > 63 {
            log::debug!("if_tsresol 2^{} out of range, clamping", exp);
            return u64::MAX;
        }
        1 << (exp as u64)
    }
}

/// Precision bucket advertised for a resolution, by thresholding.
pub fn ts_precision_from_units(time_units_per_second: u64) -> TsPrecision {
    if time_units_per_second >= 1_000_000_000 {
        TsPrecision::Nanoseconds
    } else if time_units_per_second >= 1_000_000 {
        TsPrecision::Microseconds
    } else if time_units_per_second >= 1_000 {
        TsPrecision::Milliseconds
    } else if time_units_per_second >= 100 {
        TsPrecision::Centiseconds
    } else if time_units_per_second >= 10 {
        TsPrecision::Deciseconds
    } else {
        TsPrecision::Seconds
    }
}

/// Combine the two 32-bit halves of a raw timestamp and convert it to
/// seconds and nanoseconds using the interface resolution.
///
/// The division and the multiplication are staged (and the product widened)
/// so a resolution that does not divide 10^9 cannot overflow.
pub fn build_ts(ts_high: u32, ts_low: u32, time_units_per_second: u64) -> (u64, u32) {
    let ts: u64 = ((ts_high as u64) << 32) | (ts_low as u64);
    let secs = ts / time_units_per_second;
    let rem = ts % time_units_per_second;
    let nsecs = if time_units_per_second == 1_000_000_000 {
        rem
    } else {
        ((rem as u128 * 1_000_000_000) / time_units_per_second as u128) as u64
    };
    (secs, nsecs as u32)
}

/// Convert seconds and nanoseconds back to a raw timestamp in interface
/// units, split into its two 32-bit halves.
///
/// Inverse of [`build_ts`], with the same staging of the arithmetic.
pub fn ts_to_raw(secs: u64, nsecs: u32, time_units_per_second: u64) -> (u32, u32) {
    let whole = secs.wrapping_mul(time_units_per_second);
    let frac = ((nsecs as u128 * time_units_per_second as u128) / 1_000_000_000) as u64;
    let ts = whole.wrapping_add(frac);
    ((ts >> 32) as u32, ts as u32)
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn ts_resolution_power_of_ten() {
        assert_eq!(build_ts_resolution(0), 1);
        assert_eq!(build_ts_resolution(6), 1_000_000);
        assert_eq!(build_ts_resolution(9), 1_000_000_000);
        assert_eq!(build_ts_resolution(20), u64::MAX);
    }

    #[test]
    fn ts_resolution_power_of_two() {
        assert_eq!(build_ts_resolution(0x86), 64);
        assert_eq!(build_ts_resolution(0x80 | 63), 1 << 63);
        assert_eq!(build_ts_resolution(0x80 | 64), u64::MAX);
    }

    #[test]
    fn precision_thresholds() {
        assert_eq!(ts_precision_from_units(1), TsPrecision::Seconds);
        assert_eq!(ts_precision_from_units(10), TsPrecision::Deciseconds);
        assert_eq!(ts_precision_from_units(100), TsPrecision::Centiseconds);
        assert_eq!(ts_precision_from_units(1_000), TsPrecision::Milliseconds);
        assert_eq!(ts_precision_from_units(8_000), TsPrecision::Milliseconds);
        assert_eq!(ts_precision_from_units(1_000_000), TsPrecision::Microseconds);
        assert_eq!(
            ts_precision_from_units(1_000_000_000),
            TsPrecision::Nanoseconds
        );
    }

    #[test]
    fn decode_ts() {
        // from https://datatracker.ietf.org/doc/html/draft-ietf-opsawg-pcapng section 4.6 (ISB)
        // '97 c3 04 00 aa 47 ca 64', in Little Endian, decodes to 2012-06-29 07:28:25.298858 UTC.
        const INPUT_HIGH: [u8; 4] = hex!("97 c3 04 00");
        const INPUT_LOW: [u8; 4] = hex!("aa 47 ca 64");
        let ts_high = u32::from_le_bytes(INPUT_HIGH);
        let ts_low = u32::from_le_bytes(INPUT_LOW);
        let resolution = build_ts_resolution(6);

        let (ts_sec, ts_nsec) = build_ts(ts_high, ts_low, resolution);
        assert_eq!(ts_sec, 1_340_954_905);
        assert_eq!(ts_nsec, 298_858_000);
    }

    #[test]
    fn ts_round_trip_non_decimal_units() {
        // 2^6 units per second
        let units = 64;
        let (high, low) = ts_to_raw(2, 0, units);
        assert_eq!(((high as u64) << 32) | low as u64, 128);
        let (secs, nsecs) = build_ts(high, low, units);
        assert_eq!((secs, nsecs), (2, 0));
    }

    #[test]
    fn ts_no_overflow_with_large_units() {
        // 2^63 units per second: the remainder alone would overflow a u64
        // multiplication by 1e9
        let units = 1u64 << 63;
        let (secs, nsecs) = build_ts(0x4000_0000, 0, units);
        assert_eq!(secs, 0);
        assert_eq!(nsecs, 500_000_000);
    }
}
