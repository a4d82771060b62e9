//! Delay-locked loop for per-cycle timestamps
//!
//! Tracks "filter time" (where this cycle should be under ideal pacing)
//! against observed system time. The estimated period converges toward the
//! real average cycle rate while single-cycle jitter is damped.

use std::f64::consts::{PI, SQRT_2};

/// Default loop bandwidth in Hz
pub const DEFAULT_BANDWIDTH: f64 = 1.5;

/// Cycles between drift reports at trace level
const REPORT_INTERVAL: u64 = 1000;

/// Second-order delay-locked loop
#[derive(Debug, Clone)]
pub struct TimeFilter {
    /// Nominal seconds per cycle
    nominal_period: f64,
    feedback2: f64,
    feedback3: f64,
    /// Estimated seconds per cycle
    period: f64,
    /// Filtered time of the current cycle
    filter_time: f64,
    /// Observed time of the current cycle
    system_time: f64,
    /// System time of the first cycle
    start_time: f64,
    cycles: u64,
    system_period_error: f64,
    filter_period_error: f64,
}

/// Fast approximation of `1 - exp(-x)` for small `x`
fn qexpneg(x: f64) -> f64 {
    1.0 - 1.0 / (1.0 + x * (1.0 + x / 2.0 * (1.0 + x / 3.0)))
}

impl TimeFilter {
    /// Create a filter for cycles of `period` seconds
    pub fn new(period: f64, bandwidth: f64) -> Self {
        let omega = 2.0 * PI * bandwidth * period;
        Self {
            nominal_period: period,
            feedback2: qexpneg(SQRT_2 * omega),
            feedback3: qexpneg(omega * omega),
            period,
            filter_time: 0.0,
            system_time: 0.0,
            start_time: 0.0,
            cycles: 0,
            system_period_error: 0.0,
            filter_period_error: 0.0,
        }
    }

    /// Advance one cycle with the observed `system_time` (seconds)
    ///
    /// Returns the filtered time for this cycle.
    pub fn update(&mut self, system_time: f64) -> f64 {
        self.cycles += 1;
        if self.cycles == 1 {
            self.filter_time = system_time;
            self.start_time = system_time;
        } else {
            let last_filter = self.filter_time;
            let last_system = self.system_time;

            self.filter_time += self.period;
            let loop_error = system_time - self.filter_time;
            // Early on, trust observations more than the initial estimate
            let gain = self.feedback2.max(1.0 / self.cycles as f64);
            self.filter_time += gain * loop_error;
            self.period += self.feedback3 * loop_error;

            self.system_period_error = (system_time - last_system) - self.nominal_period;
            self.filter_period_error = (self.filter_time - last_filter) - self.nominal_period;
        }
        self.system_time = system_time;
        self.filter_time
    }

    /// Number of updates so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Current estimate of seconds per cycle
    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn filter_time(&self) -> f64 {
        self.filter_time
    }

    pub fn system_time(&self) -> f64 {
        self.system_time
    }

    /// Ideal time of the current cycle at exactly the nominal rate
    pub fn device_time(&self) -> f64 {
        self.start_time + self.cycles.saturating_sub(1) as f64 * self.nominal_period
    }

    /// Filtered minus observed time of the current cycle
    pub fn drift(&self) -> f64 {
        self.filter_time - self.system_time
    }

    /// Nominal-rate minus observed time of the current cycle
    pub fn device_drift(&self) -> f64 {
        self.device_time() - self.system_time
    }

    /// Emit drift statistics at trace level every 1000 cycles
    pub fn report(&self) {
        if !log::log_enabled!(log::Level::Trace) || self.cycles == 0 {
            return;
        }
        let x = self.cycles - 1;
        if x == 0 {
            log::trace!("| audiotime drift | filter drift  | systime jitter | filter jitter  |");
        }
        if x % REPORT_INTERVAL == 0 {
            let device_drift = self.device_drift() * 1000.0;
            let filter_drift = self.drift() * 1000.0;
            let device_rate_error = device_drift / self.cycles as f64;
            let filter_jitter = self.filter_period_error * 1000.0 - device_rate_error;
            let system_jitter = self.system_period_error * 1000.0 - device_rate_error;
            log::trace!(
                "| {:15.6} | {:13.6} | {:14.6} | {:14.6} |",
                device_drift,
                filter_drift,
                system_jitter,
                filter_jitter
            );
        }
    }
}
