//! Local device state for the monitored temperature.

use tracing::warn;

/// Temperature every session starts from.
pub const DEFAULT_BASELINE: f64 = 22.0;

/// Current, minimum, maximum and running average of the temperature.
///
/// The baseline counts as the first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    current: f64,
    minimum: f64,
    maximum: f64,
    sum: f64,
    sample_count: u64,
}

/// Outcome of a single reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub new_maximum: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE)
    }
}

impl DeviceState {
    pub fn new(baseline: f64) -> Self {
        Self {
            current: baseline,
            minimum: baseline,
            maximum: baseline,
            sum: baseline,
            sample_count: 1,
        }
    }

    /// Applies one new sample.
    ///
    /// Returns `None` without touching the state if the state is inconsistent
    /// (maximum below minimum). Every successful call counts as a sample,
    /// including repeats of the same value.
    pub fn reconcile(&mut self, value: f64) -> Option<Reconciled> {
        if self.maximum < self.minimum {
            warn!(
                "device state inconsistent: max {} < min {}",
                self.maximum, self.minimum
            );
            return None;
        }

        self.current = value;
        let mut new_maximum = false;
        if self.current > self.maximum {
            self.maximum = self.current;
            new_maximum = true;
        } else if self.current < self.minimum {
            self.minimum = self.current;
        }
        self.sample_count += 1;
        self.sum += self.current;

        Some(Reconciled { new_maximum })
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Mean of all samples including the baseline.
    pub fn average(&self) -> f64 {
        self.sum / self.sample_count as f64
    }
}
