pub mod dll;
pub mod ntp;

pub use dll::{DllTimer, TimerState};
pub use ntp::NtpTime;
