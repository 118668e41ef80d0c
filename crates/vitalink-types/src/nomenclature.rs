//! Standard metric and unit nomenclature codes used by the bundled adapters.
//!
//! Codes follow the ISO/IEEE 11073-10101 `MDC_` naming convention.  Adapters
//! are free to publish any code that fits the identifier caps; this table
//! only covers the metrics the simulated device families emit.

use crate::ident::{MetricId, UnitId};

// Metrics -------------------------------------------------------------------

/// Oxygen saturation as measured by pulse oximetry.
pub fn spo2() -> MetricId {
    MetricId::from_static("MDC_PULS_OXIM_SAT_O2")
}

/// Pulse rate as measured by pulse oximetry.
pub fn pulse_rate() -> MetricId {
    MetricId::from_static("MDC_PULS_OXIM_PULS_RATE")
}

/// Plethysmogram waveform.
pub fn pleth() -> MetricId {
    MetricId::from_static("MDC_PULS_OXIM_PLETH")
}

/// Infusion delivery rate.
pub fn flow_rate() -> MetricId {
    MetricId::from_static("MDC_FLOW_FLUID_PUMP")
}

// Units ---------------------------------------------------------------------

pub fn percent() -> UnitId {
    UnitId::from_static("MDC_DIM_PERCENT")
}

pub fn beats_per_minute() -> UnitId {
    UnitId::from_static("MDC_DIM_BEAT_PER_MIN")
}

pub fn milliliters_per_hour() -> UnitId {
    UnitId::from_static("MDC_DIM_MILLI_L_PER_HR")
}

pub fn dimensionless() -> UnitId {
    UnitId::from_static("MDC_DIM_DIMLESS")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fit_identifier_caps() {
        assert!(spo2().as_str().len() <= MetricId::MAX_LEN);
        assert!(pulse_rate().as_str().len() <= MetricId::MAX_LEN);
        assert!(pleth().as_str().len() <= MetricId::MAX_LEN);
        assert!(flow_rate().as_str().len() <= MetricId::MAX_LEN);
        assert!(percent().as_str().len() <= UnitId::MAX_LEN);
    }
}
