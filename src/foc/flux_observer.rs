// Back-EMF flux observer
//
// Integrates the voltage left after the resistive and inductive drop on
// both stationary axes. The integrators are clamped to the flux linkage,
// which keeps offset drift bounded without a high-pass filter.

use super::angle::ElectricalAngle;
use super::transforms::AlphaBeta;
use super::MotorParameters;
use crate::config::params::observer::{CROSSING_ANGLE_NEGATIVE, CROSSING_ANGLE_POSITIVE};
use crate::config::ObserverConfig;

/// α/β crossing of the integrated flux
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FluxCrossing {
    /// Coarse rotor angle at the crossing
    pub angle: ElectricalAngle,
}

/// Flux integrator with crossing detection
pub struct FluxObserver {
    config: ObserverConfig,
    flux: AlphaBeta,
    last_current: AlphaBeta,
    /// α above β at the last accepted crossing
    alpha_above: bool,
    /// Cycles since the last accepted crossing
    since_crossing: u16,
}

impl FluxObserver {
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            config,
            flux: AlphaBeta::default(),
            last_current: AlphaBeta::default(),
            alpha_above: false,
            since_crossing: 0,
        }
    }

    /// Integrate one cycle
    ///
    /// # Arguments
    /// * `v` - Commanded αβ voltage of the cycle the current was measured in
    /// * `i` - Measured αβ current
    /// * `motor` - Phase resistance, inductance and flux linkage
    /// * `dt` - PWM period [s]
    ///
    /// # Returns
    /// `Some(FluxCrossing)` when the integrated axes cross outside the blanking window
    pub fn update(
        &mut self,
        v: AlphaBeta,
        i: AlphaBeta,
        motor: &MotorParameters,
        dt: f32,
    ) -> Option<FluxCrossing> {
        let limit = motor.flux_linkage.max(0.0);
        let decay = self.config.flux_decay;

        self.flux.alpha = (decay * self.flux.alpha + (v.alpha - motor.resistance * i.alpha) * dt
            - motor.inductance * (i.alpha - self.last_current.alpha))
            .clamp(-limit, limit);
        self.flux.beta = (decay * self.flux.beta + (v.beta - motor.resistance * i.beta) * dt
            - motor.inductance * (i.beta - self.last_current.beta))
            .clamp(-limit, limit);
        self.last_current = i;

        self.since_crossing = self.since_crossing.saturating_add(1);
        if self.since_crossing <= self.config.blanking_cycles {
            return None;
        }

        let alpha_above = self.flux.alpha > self.flux.beta;
        if alpha_above == self.alpha_above {
            return None;
        }

        self.alpha_above = alpha_above;
        self.since_crossing = 0;
        let angle = if self.flux.alpha > 0.0 {
            CROSSING_ANGLE_POSITIVE
        } else {
            CROSSING_ANGLE_NEGATIVE
        };
        Some(FluxCrossing {
            angle: ElectricalAngle(angle),
        })
    }

    /// Continuous angle of the integrated flux vector
    ///
    /// `None` while the flux magnitude is zero.
    pub fn angle(&self, motor: &MotorParameters) -> Option<ElectricalAngle> {
        if motor.flux_linkage <= 0.0 || (self.flux.alpha == 0.0 && self.flux.beta == 0.0) {
            return None;
        }
        // |ψ| <= flux_linkage, so both fit in ±2^30
        let scale = (1u32 << 30) as f32 / motor.flux_linkage;
        let phase = idsp::atan2((self.flux.beta * scale) as i32, (self.flux.alpha * scale) as i32);
        Some(ElectricalAngle((phase >> 16) as u16))
    }

    /// Integrated flux [Wb]
    pub fn flux(&self) -> AlphaBeta {
        self.flux
    }

    pub fn reset(&mut self) {
        self.flux = AlphaBeta::default();
        self.last_current = AlphaBeta::default();
        self.alpha_above = false;
        self.since_crossing = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::foc::transforms::{inverse_park, Dq};

    const FLUX: f32 = 0.01;
    const DT: f32 = 50.0e-6;

    fn motor() -> MotorParameters {
        MotorParameters {
            resistance: 0.1,
            inductance: 0.0,
            flux_linkage: FLUX,
        }
    }

    /// 開放端の逆起電力 e = ω ψ (-sin θ, cos θ) を与えて回す
    fn spin(observer: &mut FluxObserver, cycles: u32, step: u16) -> ([u32; 2], ElectricalAngle) {
        let omega = step as f32 / 65536.0 * core::f32::consts::TAU / DT;
        let mut angle = ElectricalAngle(0);
        let mut hits = [0u32; 2];
        for _ in 0..cycles {
            angle = angle.offset(step as i32);
            let emf = inverse_park(Dq::new(0.0, omega * FLUX), angle.sincos());
            if let Some(event) = observer.update(emf, AlphaBeta::default(), &motor(), DT) {
                match event.angle.raw() {
                    CROSSING_ANGLE_NEGATIVE => hits[0] += 1,
                    CROSSING_ANGLE_POSITIVE => hits[1] += 1,
                    _ => unreachable!(),
                }
            }
        }
        (hits, angle)
    }

    #[test]
    fn test_flux_stays_clamped() {
        let mut observer = FluxObserver::new(ControlConfig::default().observer);
        for _ in 0..10_000 {
            observer.update(
                AlphaBeta {
                    alpha: 48.0,
                    beta: -48.0,
                },
                AlphaBeta::default(),
                &motor(),
                DT,
            );
        }
        assert_eq!(observer.flux().alpha, FLUX);
        assert_eq!(observer.flux().beta, -FLUX);
    }

    #[test]
    fn test_two_crossings_per_revolution() {
        let mut observer = FluxObserver::new(ControlConfig::default().observer);
        // 1回転 = 65536/64 = 1024 サイクル、10回転
        let (hits, _) = spin(&mut observer, 10 * 1024, 64);
        assert!(hits[0] >= 9 && hits[0] <= 11, "{:?}", hits);
        assert!(hits[1] >= 9 && hits[1] <= 11, "{:?}", hits);
    }

    #[test]
    fn test_blanking_suppresses_chatter() {
        let mut observer = FluxObserver::new(ControlConfig::default().observer);
        let mut events = 0;
        for n in 0..200 {
            // 毎サイクル符号が入れ替わるノイズ
            let sign = if n % 2 == 0 { 1.0 } else { -1.0 };
            let v = AlphaBeta {
                alpha: sign * 400.0,
                beta: -sign * 400.0,
            };
            if observer.update(v, AlphaBeta::default(), &motor(), DT).is_some() {
                events += 1;
            }
        }
        assert!(events <= 200 / 11 + 1);
    }

    #[test]
    fn test_angle_follows_flux_vector() {
        let mut observer = FluxObserver::new(ControlConfig::default().observer);
        let (_, rotor) = spin(&mut observer, 4096 + 300, 64);
        let estimate = observer.angle(&motor()).unwrap();
        // 磁束はロータ角に一致（1ステップ分の位相遅れ以内）
        let error = estimate.difference(rotor).abs();
        assert!(error < 1200, "error {}", error);
    }

    #[test]
    fn test_crossing_angle_matches_rotor() {
        let mut observer = FluxObserver::new(ControlConfig::default().observer);
        let step = 64;
        let omega = step as f32 / 65536.0 * core::f32::consts::TAU / DT;
        let mut rotor = ElectricalAngle(0);
        let mut checked = 0;
        for n in 0..10 * 1024 {
            rotor = rotor.offset(step);
            let emf = inverse_park(Dq::new(0.0, omega * FLUX), rotor.sincos());
            let event = observer.update(emf, AlphaBeta::default(), &motor(), DT);
            // 積分器が飽和から抜けるまでの2回転は除外
            if let (Some(event), true) = (event, n >= 2048) {
                let error = event.angle.difference(rotor).abs();
                assert!(error < 400, "cycle {} event {} rotor {}", n, event.angle.raw(), rotor.raw());
                checked += 1;
            }
        }
        assert!(checked >= 14, "{} crossings", checked);
    }
}
