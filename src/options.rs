//! Control options: typed settings applied via a single `set_option`/
//! `get_option` style entry point on `Source`/`Sink`, rather than a
//! dedicated setter per field.

pub const AOO_MAX_PACKET_SIZE: usize = 4096;
pub const DEFAULT_PACKET_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionValue {
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(v) => Some(*v as f64),
            OptionValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            OptionValue::Float(v) => Some(*v as i64),
            OptionValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Option_ {
    BufferSize,
    PacketSize,
    ResendEnabled,
    ResendInterval,
    ResendLimit,
    ResendBufferSize,
    Redundancy,
    PingInterval,
    SourceTimeout,
    InviteTimeout,
    DllBandwidth,
    DynamicResampling,
    TimerCheck,
    ChannelOnset,
    BinaryDataMsg,
    Reset,
}

/// Runtime-tunable settings shared by Source and Sink. Per-option
/// defaults are chosen to match the behaviors described for loopback and
/// packet-loss test scenarios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub buffer_size: f64,
    pub packet_size: usize,
    pub resend_enabled: bool,
    pub resend_interval: f64,
    pub resend_limit: u32,
    pub resend_buffer_size: f64,
    pub redundancy: u32,
    pub ping_interval: f64,
    pub source_timeout: f64,
    pub invite_timeout: f64,
    pub dll_bandwidth: f64,
    pub dynamic_resampling: bool,
    pub timer_check: bool,
    pub channel_onset: u16,
    pub binary_data_msg: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_size: 0.1,
            packet_size: DEFAULT_PACKET_SIZE,
            resend_enabled: true,
            resend_interval: 0.01,
            resend_limit: 5,
            resend_buffer_size: 1.0,
            redundancy: 1,
            ping_interval: 1.0,
            source_timeout: 10.0,
            invite_timeout: 5.0,
            dll_bandwidth: 0.1,
            dynamic_resampling: true,
            timer_check: true,
            channel_onset: 0,
            binary_data_msg: false,
        }
    }
}

impl Settings {
    pub fn set(&mut self, option: Option_, value: OptionValue) -> Result<(), crate::error::AooError> {
        use crate::error::AooError;
        match option {
            Option_::BufferSize => self.buffer_size = value.as_f64().ok_or(AooError::BadArgument)?,
            Option_::PacketSize => {
                let size = value.as_i64().ok_or(AooError::BadArgument)?;
                self.packet_size = (size.max(64) as usize).min(AOO_MAX_PACKET_SIZE);
            }
            Option_::ResendEnabled => self.resend_enabled = value.as_bool().ok_or(AooError::BadArgument)?,
            Option_::ResendInterval => self.resend_interval = value.as_f64().ok_or(AooError::BadArgument)?,
            Option_::ResendLimit => self.resend_limit = value.as_i64().ok_or(AooError::BadArgument)?.max(0) as u32,
            Option_::ResendBufferSize => self.resend_buffer_size = value.as_f64().ok_or(AooError::BadArgument)?,
            Option_::Redundancy => {
                let r = value.as_i64().ok_or(AooError::BadArgument)?;
                if !(1..=16).contains(&r) {
                    return Err(AooError::BadArgument);
                }
                self.redundancy = r as u32;
            }
            Option_::PingInterval => self.ping_interval = value.as_f64().ok_or(AooError::BadArgument)?,
            Option_::SourceTimeout => self.source_timeout = value.as_f64().ok_or(AooError::BadArgument)?,
            Option_::InviteTimeout => self.invite_timeout = value.as_f64().ok_or(AooError::BadArgument)?,
            Option_::DllBandwidth => {
                let b = value.as_f64().ok_or(AooError::BadArgument)?;
                if !(0.0..=1.0).contains(&b) {
                    return Err(AooError::BadArgument);
                }
                self.dll_bandwidth = b;
            }
            Option_::DynamicResampling => self.dynamic_resampling = value.as_bool().ok_or(AooError::BadArgument)?,
            Option_::TimerCheck => self.timer_check = value.as_bool().ok_or(AooError::BadArgument)?,
            Option_::ChannelOnset => self.channel_onset = value.as_i64().ok_or(AooError::BadArgument)?.max(0) as u16,
            Option_::BinaryDataMsg => self.binary_data_msg = value.as_bool().ok_or(AooError::BadArgument)?,
            Option_::Reset => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_size_is_clamped() {
        let mut s = Settings::default();
        s.set(Option_::PacketSize, OptionValue::Int(16)).unwrap();
        assert_eq!(s.packet_size, 64);
        s.set(Option_::PacketSize, OptionValue::Int(999_999)).unwrap();
        assert_eq!(s.packet_size, AOO_MAX_PACKET_SIZE);
    }

    #[test]
    fn redundancy_out_of_range_rejected() {
        let mut s = Settings::default();
        assert!(s.set(Option_::Redundancy, OptionValue::Int(0)).is_err());
        assert!(s.set(Option_::Redundancy, OptionValue::Int(17)).is_err());
        assert!(s.set(Option_::Redundancy, OptionValue::Int(4)).is_ok());
        assert_eq!(s.redundancy, 4);
    }

    #[test]
    fn wrong_value_kind_rejected() {
        let mut s = Settings::default();
        assert!(s.set(Option_::ResendEnabled, OptionValue::Float(1.0)).is_err());
    }
}
