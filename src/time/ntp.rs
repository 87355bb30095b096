//! NTP timestamp: the wire format for all AOO clock exchange.
//!
//! 64-bit fixed point: upper 32 bits are seconds since 1900-01-01 UTC,
//! lower 32 bits are a binary fraction of a second. NTP time is never
//! compared to wall clock directly, only by subtraction against another
//! `NtpTime` taken from the same process.

const UNIX_TO_NTP_EPOCH_SECS: u64 = 2_208_988_800; // 1970 - 1900

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpTime(pub u64);

impl NtpTime {
    pub const ZERO: NtpTime = NtpTime(0);

    pub fn from_parts(seconds: u32, fraction: u32) -> Self {
        NtpTime(((seconds as u64) << 32) | fraction as u64)
    }

    pub fn seconds(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn fraction(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Seconds since the NTP epoch (1900-01-01), as a float.
    pub fn to_seconds_f64(&self) -> f64 {
        self.seconds() as f64 + self.fraction() as f64 / u32::MAX as f64
    }

    pub fn from_seconds_f64(seconds: f64) -> Self {
        let whole = seconds.floor();
        let frac = seconds - whole;
        NtpTime::from_parts(whole as u32, (frac * u32::MAX as f64) as u32)
    }

    /// Current wall-clock time as NTP, for hosts that have no monotonic
    /// timer of their own. Falls back to the Unix epoch conversion.
    pub fn now() -> Self {
        let since_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let secs = since_unix.as_secs() + UNIX_TO_NTP_EPOCH_SECS;
        let frac = ((since_unix.subsec_nanos() as f64 / 1_000_000_000.0) * u32::MAX as f64) as u32;
        NtpTime::from_parts(secs as u32, frac)
    }

    /// Elapsed time in seconds between `self` (earlier) and `other` (later).
    /// Only valid for NtpTime values drawn from the same monotonic sequence;
    /// this is subtraction, not a synchronized-clock comparison.
    pub fn elapsed_since(&self, earlier: NtpTime) -> f64 {
        self.to_seconds_f64() - earlier.to_seconds_f64()
    }
}

impl Default for NtpTime {
    fn default() -> Self {
        NtpTime::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_fraction_roundtrip() {
        let t = NtpTime::from_parts(123_456, 0x8000_0000);
        assert_eq!(t.seconds(), 123_456);
        assert_eq!(t.fraction(), 0x8000_0000);
    }

    #[test]
    fn elapsed_is_subtraction() {
        let a = NtpTime::from_seconds_f64(100.0);
        let b = NtpTime::from_seconds_f64(100.25);
        assert!((b.elapsed_since(a) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn from_seconds_f64_roundtrip_within_tolerance() {
        let t = NtpTime::from_seconds_f64(1000.5);
        assert!((t.to_seconds_f64() - 1000.5).abs() < 1e-6);
    }
}
