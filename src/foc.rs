// FOC (Field Oriented Control) module
// Angle estimation, current control and modulation for the fast loop

pub mod angle;
pub mod angle_tracker;
pub mod flux_observer;
pub mod hall_sensor;
pub mod pi_controller;
pub mod svpwm;
pub mod transforms;

// Re-export main types for easier access
pub use angle::{ElectricalAngle, SinCos};
pub use angle_tracker::{AngleEvent, AngleTracker, EventRegister};
pub use flux_observer::{FluxCrossing, FluxObserver};
pub use hall_sensor::{Direction, HallEdge, HallEstimator, HallSector, HallTable};
pub use pi_controller::{CurrentController, CurrentGains, VoltageLimits};
pub use transforms::{AlphaBeta, ClarkVariant, Dq};

use crate::config::ModulationConfig;

/// Electrical parameters of the motor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorParameters {
    /// Phase resistance [Ω]
    pub resistance: f32,
    /// Phase inductance [H]
    pub inductance: f32,
    /// Flux linkage [Wb]
    pub flux_linkage: f32,
}

impl MotorParameters {
    /// True once resistance and inductance have been identified
    pub fn is_identified(&self) -> bool {
        self.resistance > 0.0 && self.inductance > 0.0
    }
}

/// Timer configuration of the center-aligned PWM
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmTiming {
    /// Timer input clock [Hz]
    pub clock_hz: u32,
    /// Auto-reload value (full-scale duty)
    pub period: u16,
    pub prescaler: u16,
}

impl PwmTiming {
    /// Switching frequency [Hz]
    pub fn frequency(&self) -> f32 {
        self.clock_hz as f32 / (2.0 * self.period as f32 * (self.prescaler as f32 + 1.0))
    }

    /// Switching period [s]
    pub fn period_seconds(&self) -> f32 {
        2.0 * self.period as f32 * (self.prescaler as f32 + 1.0) / self.clock_hz as f32
    }
}

/// Bus-voltage dependent output scaling
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoltageScaling {
    /// Volts to timer counts
    pub vab_to_pwm: f32,
    pub limits: VoltageLimits,
    /// |Vq| above which field weakening starts
    pub field_weakening_threshold: f32,
}

/// PI gains from the identified motor
///
/// # Arguments
/// * `motor` - Identified resistance and inductance
/// * `timing` - PWM timer configuration
/// * `config` - Gain factors
pub fn calculate_gains(
    motor: &MotorParameters,
    timing: &PwmTiming,
    config: &ModulationConfig,
) -> CurrentGains {
    let kp = timing.frequency() * motor.inductance * config.kp_factor;
    let ki = motor.resistance * config.ki_factor;
    CurrentGains {
        kp_d: kp,
        ki_d: ki,
        kp_q: kp,
        ki_q: ki,
    }
}

/// Voltage-to-duty gain and voltage limits for the present bus voltage
///
/// # Arguments
/// * `bus_voltage` - Measured DC bus voltage [V]
/// * `timing` - PWM timer configuration
/// * `config` - Modulation limits
/// * `field_weakening_ratio` - Fraction of Vq_max where field weakening starts
///
/// # Returns
/// `None` when the bus voltage is not positive
pub fn calculate_voltage_scaling(
    bus_voltage: f32,
    timing: &PwmTiming,
    config: &ModulationConfig,
    field_weakening_ratio: f32,
) -> Option<VoltageScaling> {
    if bus_voltage <= 0.0 || !bus_voltage.is_finite() {
        return None;
    }
    let available = 0.5 * bus_voltage * config.max_modulation * config.svpwm_multiplier;
    let vq_max = available * config.vq_max_proportion;
    Some(VoltageScaling {
        vab_to_pwm: timing.period as f32 / bus_voltage,
        limits: VoltageLimits {
            vd_max: available * config.vd_max_proportion,
            vq_max,
        },
        field_weakening_threshold: vq_max * field_weakening_ratio,
    })
}

/// Per-cycle working set of the current loop (FOCFrame)
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FocFrame {
    /// Measured phase currents [u, v, w]
    pub i_uvw: [f32; 3],
    pub iab: AlphaBeta,
    pub idq: Dq,
    pub idq_req: Dq,
    pub vdq: Dq,
    pub vab: AlphaBeta,
    /// Angle used for the output transform of this cycle
    pub angle: ElectricalAngle,
    /// sincos of `angle`, reused by the next cycle's Park transform
    pub sincos: SinCos,
    pub bus_voltage: f32,
    /// Compare values written this cycle
    pub duty: [u16; 3],
    pub scaling: VoltageScaling,
    pub gains: CurrentGains,
}

impl FocFrame {
    pub fn new() -> Self {
        Self {
            sincos: SinCos::ZERO_ANGLE,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;

    const EPSILON: f32 = 0.0001;

    fn timing() -> PwmTiming {
        PwmTiming {
            clock_hz: 72_000_000,
            period: 2048,
            prescaler: 0,
        }
    }

    #[test]
    fn test_pwm_timing() {
        let t = timing();
        assert!((t.frequency() - 17578.125).abs() < 0.01);
        assert!((t.period_seconds() - 2.0 * 2048.0 / 72.0e6).abs() < 1.0e-9);
    }

    #[test]
    fn test_gain_calculation() {
        let motor = MotorParameters {
            resistance: 0.1,
            inductance: 50.0e-6,
            flux_linkage: 0.0,
        };
        let gains = calculate_gains(&motor, &timing(), &ControlConfig::default().modulation);
        assert!((gains.kp_q - 17578.125 * 50.0e-6 * 0.5).abs() < EPSILON);
        assert!((gains.ki_q - 0.1 * 0.05).abs() < EPSILON);
        assert_eq!(gains.kp_d, gains.kp_q);
    }

    #[test]
    fn test_voltage_scaling() {
        let config = ControlConfig::default();
        let scaling =
            calculate_voltage_scaling(24.0, &timing(), &config.modulation, 0.8).unwrap();
        let available = 0.5 * 24.0 * 0.95 * 1.154_700_5;
        assert!((scaling.vab_to_pwm - 2048.0 / 24.0).abs() < EPSILON);
        assert!((scaling.limits.vd_max - available * 0.3).abs() < EPSILON);
        assert!((scaling.limits.vq_max - available * 0.95).abs() < EPSILON);
        assert!((scaling.field_weakening_threshold - 0.8 * scaling.limits.vq_max).abs() < EPSILON);

        assert!(calculate_voltage_scaling(0.0, &timing(), &config.modulation, 0.8).is_none());
    }
}
