// Direct/quadrature current PI controller with integrator clamping

use super::transforms::Dq;

/// Per-axis PI gains
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentGains {
    pub kp_d: f32,
    pub ki_d: f32,
    pub kp_q: f32,
    pub ki_q: f32,
}

/// Output voltage bounds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoltageLimits {
    pub vd_max: f32,
    pub vq_max: f32,
}

/// Current PI controller for the d and q axes
///
/// Anti-windup bounds the integrator itself to the output limit before the
/// proportional term is added; the sum is then clamped again. The update
/// only runs every `divisor` calls, the calls in between return the last
/// output unchanged.
pub struct CurrentController {
    gains: CurrentGains,
    limits: VoltageLimits,
    /// Integral accumulator (Idq_int_err)
    integral: Dq,
    /// Last computed output
    output: Dq,
    divisor: u16,
    countdown: u16,
}

impl CurrentController {
    /// Create a new current controller
    ///
    /// # Arguments
    /// * `gains` - PI gains
    /// * `limits` - Voltage limits
    /// * `divisor` - Update once every `divisor` cycles (0 is treated as 1)
    pub fn new(gains: CurrentGains, limits: VoltageLimits, divisor: u16) -> Self {
        Self {
            gains,
            limits,
            integral: Dq::ZERO,
            output: Dq::ZERO,
            divisor: divisor.max(1),
            countdown: 0,
        }
    }

    /// Run one control cycle
    ///
    /// # Arguments
    /// * `reference` - Requested current (Idq_req)
    /// * `measured` - Measured current (Idq)
    ///
    /// # Returns
    /// Commanded voltage Vdq
    pub fn update(&mut self, reference: Dq, measured: Dq) -> Dq {
        if self.countdown == 0 {
            self.countdown = self.divisor;

            let error = Dq::new(reference.d - measured.d, reference.q - measured.q);

            self.integral.d = (self.integral.d + self.gains.ki_d * error.d)
                .clamp(-self.limits.vd_max, self.limits.vd_max);
            self.integral.q = (self.integral.q + self.gains.ki_q * error.q)
                .clamp(-self.limits.vq_max, self.limits.vq_max);

            self.output = Dq::new(
                (self.gains.kp_d * error.d + self.integral.d)
                    .clamp(-self.limits.vd_max, self.limits.vd_max),
                (self.gains.kp_q * error.q + self.integral.q)
                    .clamp(-self.limits.vq_max, self.limits.vq_max),
            );
        }
        self.countdown -= 1;
        self.output
    }

    /// Clear integrator and output
    pub fn reset(&mut self) {
        self.integral = Dq::ZERO;
        self.output = Dq::ZERO;
        self.countdown = 0;
    }

    pub fn set_gains(&mut self, gains: CurrentGains) {
        self.gains = gains;
    }

    /// Update limits; a negative or NaN bound is ignored
    pub fn set_limits(&mut self, limits: VoltageLimits) {
        if limits.vd_max >= 0.0 && limits.vq_max >= 0.0 {
            self.limits = limits;
        }
    }

    pub fn gains(&self) -> CurrentGains {
        self.gains
    }

    pub fn limits(&self) -> VoltageLimits {
        self.limits
    }

    /// Current integrator state
    pub fn integral(&self) -> Dq {
        self.integral
    }

    /// Last commanded voltage
    pub fn output(&self) -> Dq {
        self.output
    }
}
