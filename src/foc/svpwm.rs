// Space Vector PWM (SVPWM) by midpoint clamping
//
// The three unmodulated phase voltages are shifted by a common-mode offset
// that centres their envelope on half scale. This is equivalent to
// min-max zero-sequence injection and reaches the full hexagon.

use libm::roundf;

/// Centre three phase values inside `[0, full_scale]`
///
/// # Arguments
/// * `phases` - Unmodulated phase values, already in timer counts
/// * `full_scale` - Timer period (ARR)
///
/// # Returns
/// Offset phase values; all lie in `[0, full_scale]` whenever
/// `max - min <= full_scale`
pub fn midpoint_clamp(phases: [f32; 3], full_scale: f32) -> [f32; 3] {
    let top = phases[0].max(phases[1]).max(phases[2]);
    let bottom = phases[0].min(phases[1]).min(phases[2]);
    let offset = 0.5 * full_scale - 0.5 * (top + bottom);
    [phases[0] + offset, phases[1] + offset, phases[2] + offset]
}

/// Convert phase voltages to timer compare values
///
/// # Arguments
/// * `v_uvw` - Phase voltages [u, v, w] in volts
/// * `vab_to_pwm` - Voltage to count gain (ARR / Vbus)
/// * `period` - Timer period (ARR)
///
/// # Returns
/// Compare values [u, v, w], saturated to `0..=period`
pub fn modulate(v_uvw: [f32; 3], vab_to_pwm: f32, period: u16) -> [u16; 3] {
    let full_scale = period as f32;
    let counts = midpoint_clamp(
        [
            v_uvw[0] * vab_to_pwm,
            v_uvw[1] * vab_to_pwm,
            v_uvw[2] * vab_to_pwm,
        ],
        full_scale,
    );
    counts.map(|c| roundf(c).clamp(0.0, full_scale) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foc::angle::ElectricalAngle;
    use crate::foc::transforms::{inverse_clark, inverse_park, Dq};

    const EPSILON: f32 = 0.001;

    #[test]
    fn test_duties_fit_range() {
        let full_scale = 1024.0;
        let mut seed = 0x1234_5678u32;
        let mut next = || {
            // xorshift32
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed as f32 / u32::MAX as f32) * 4000.0 - 2000.0
        };

        for _ in 0..5000 {
            let phases = [next(), next(), next()];
            let top = phases[0].max(phases[1]).max(phases[2]);
            let bottom = phases[0].min(phases[1]).min(phases[2]);
            let out = midpoint_clamp(phases, full_scale);
            if top - bottom <= full_scale {
                for duty in out {
                    assert!(duty >= -EPSILON && duty <= full_scale + EPSILON);
                }
            }
        }
    }

    #[test]
    fn test_envelope_is_centred() {
        let out = midpoint_clamp([100.0, -300.0, 50.0], 1024.0);
        let top = out[0].max(out[1]).max(out[2]);
        let bottom = out[0].min(out[1]).min(out[2]);
        assert!((top + bottom - 1024.0).abs() < EPSILON);
        // 相間電圧は保存される
        assert!(((out[0] - out[1]) - 400.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_voltage_is_half_duty() {
        assert_eq!(modulate([0.0; 3], 42.0, 1024), [512, 512, 512]);
    }

    #[test]
    fn test_full_hexagon_stays_in_range() {
        // √3/2 * Vbus 振幅でも飽和しない
        let v_bus = 24.0;
        let amplitude = v_bus / 3.0_f32.sqrt() * 0.999;
        for raw in (0..=u16::MAX).step_by(509) {
            let uvw = inverse_clark(inverse_park(
                Dq::new(0.0, amplitude),
                ElectricalAngle(raw).sincos(),
            ));
            let duties = modulate(uvw, 1024.0 / v_bus, 1024);
            assert!(duties.iter().all(|&d| d <= 1024));
            assert!(duties.iter().any(|&d| d > 0 && d < 1024));
        }
    }
}
