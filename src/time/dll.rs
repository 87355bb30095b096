//! Timer + DLL (digital locked-loop) filter.
//!
//! Estimates the effective sample rate from block arrival timestamps, per
//! "Using a DLL to filter time" (Fons Adriaensen). The timer records one
//! absolute `NtpTime` and one elapsed-seconds scalar per process call; the
//! DLL turns a sequence of those deltas into a smoothed period/samplerate
//! estimate and flags a discontinuity (xrun) when a delta strays too far
//! from nominal.

use super::ntp::NtpTime;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Filter not yet initialized; the next `update` sets its anchor.
    Reset,
    /// Normal operation.
    Ok,
    /// Measured period deviated from nominal by more than tolerance.
    Error,
}

/// Size of the moving-average window used to smooth the outlier test.
const DEVIATION_WINDOW: usize = 16;

pub struct DllTimer {
    nominal_period: f64,
    tolerance: f64,
    bandwidth: f64,
    state: TimerState,
    last_ntp: Option<NtpTime>,
    /// DLL internal state (Adriaensen's two-pole loop).
    period_est: f64,
    freq_est: f64,
    recent_deltas: VecDeque<f64>,
}

impl DllTimer {
    pub fn new(block_period_seconds: f64, tolerance: f64, bandwidth: f64) -> Self {
        Self {
            nominal_period: block_period_seconds,
            tolerance,
            bandwidth,
            state: TimerState::Reset,
            last_ntp: None,
            period_est: block_period_seconds,
            freq_est: 0.0,
            recent_deltas: VecDeque::with_capacity(DEVIATION_WINDOW),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = TimerState::Reset;
        self.last_ntp = None;
        self.period_est = self.nominal_period;
        self.freq_est = 0.0;
        self.recent_deltas.clear();
    }

    /// Feed one process-call timestamp. Returns true if an xrun should be
    /// signalled upstream (i.e. the call just transitioned into `Error`).
    pub fn update(&mut self, now: NtpTime) -> bool {
        let last = match self.last_ntp {
            None => {
                self.last_ntp = Some(now);
                self.state = TimerState::Ok;
                return false;
            }
            Some(l) => l,
        };

        let delta = now.elapsed_since(last);
        self.last_ntp = Some(now);

        if self.recent_deltas.len() == DEVIATION_WINDOW {
            self.recent_deltas.pop_front();
        }
        self.recent_deltas.push_back(delta);
        let avg: f64 = self.recent_deltas.iter().sum::<f64>() / self.recent_deltas.len() as f64;

        if (avg - self.nominal_period).abs() > self.tolerance * self.nominal_period {
            self.state = TimerState::Error;
            self.reset();
            return true;
        }

        // Two-parameter DLL update: nudge the period estimate towards the
        // measured delta, bandwidth controls how aggressively.
        let err = delta - self.period_est;
        self.period_est += self.bandwidth * err;
        self.freq_est += self.bandwidth * self.bandwidth * err;
        self.period_est += self.freq_est;
        self.state = TimerState::Ok;
        false
    }

    /// Current smoothed block period, in seconds.
    pub fn period(&self) -> f64 {
        self.period_est
    }

    /// Effective sample rate implied by the current period estimate, given
    /// the nominal number of samples per block.
    pub fn samplerate(&self, samples_per_block: u32) -> f64 {
        if self.period_est <= 0.0 {
            return 0.0;
        }
        samples_per_block as f64 / self.period_est
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: f64) -> NtpTime {
        NtpTime::from_seconds_f64(seconds)
    }

    #[test]
    fn first_update_anchors_without_xrun() {
        let mut t = DllTimer::new(0.01, 0.5, 0.1);
        assert!(!t.update(ts(0.0)));
        assert_eq!(t.state(), TimerState::Ok);
    }

    #[test]
    fn steady_ticks_stay_ok() {
        let mut t = DllTimer::new(0.01, 0.5, 0.1);
        let mut now = 0.0;
        t.update(ts(now));
        for _ in 0..50 {
            now += 0.01;
            assert!(!t.update(ts(now)));
        }
        assert_eq!(t.state(), TimerState::Ok);
        assert!((t.period() - 0.01).abs() < 0.002);
    }

    #[test]
    fn large_stall_triggers_xrun_and_resets() {
        let mut t = DllTimer::new(0.01, 0.5, 0.1);
        t.update(ts(0.0));
        for i in 1..16 {
            t.update(ts(i as f64 * 0.01));
        }
        // Simulate a 500ms stall (way beyond tolerance).
        let xrun = t.update(ts(0.15 + 0.5));
        assert!(xrun);
        assert_eq!(t.state(), TimerState::Reset);
    }
}
