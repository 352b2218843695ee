// Angle tracking filter
//
// Fuses Hall edges and flux crossings into one continuously advancing
// electrical angle. Both sources post into a single last-writer-wins
// register; each cycle the tracker consumes whatever was posted since.

use super::angle::{ElectricalAngle, HALF_TURN};
use super::flux_observer::FluxCrossing;
use super::hall_sensor::{Direction, HallEdge};
use crate::config::TrackerConfig;

/// Angle reference event
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AngleEvent {
    Hall(HallEdge),
    Flux(FluxCrossing),
}

/// Last-writer-wins event slot with a generation counter
#[derive(Debug, Default)]
pub struct EventRegister {
    event: Option<AngleEvent>,
    generation: u32,
}

impl EventRegister {
    pub const fn new() -> Self {
        Self {
            event: None,
            generation: 0,
        }
    }

    /// Post an event, replacing any not yet consumed
    pub fn post(&mut self, event: AngleEvent) {
        self.event = Some(event);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Take the pending event
    pub fn take(&mut self) -> Option<AngleEvent> {
        self.event.take()
    }

    /// Number of events posted so far
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn clear(&mut self) {
        self.event = None;
    }
}

/// PLL-like angle tracker
pub struct AngleTracker {
    config: TrackerConfig,
    angle: ElectricalAngle,
    /// Fractional part of the angle, keeps slow steps from truncating away
    residue: f32,
    /// Cycles since the last event
    ticks: u32,
    last_period: f32,
    inv_period: f32,
    /// Smoothed angle advance per cycle
    angle_step: f32,
    /// Signed error of the last event, spread over the following period
    error: f32,
    direction: Direction,
    /// Last known Hall sector center
    hall_center: ElectricalAngle,
}

impl AngleTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            angle: ElectricalAngle::ZERO,
            residue: 0.0,
            ticks: 0,
            last_period: config.restart_period,
            inv_period: 1.0 / config.restart_period,
            angle_step: 0.0,
            error: 0.0,
            direction: Direction::Forward,
            hall_center: ElectricalAngle::ZERO,
        }
    }

    /// Advance one cycle
    ///
    /// # Arguments
    /// * `event` - Event consumed from the register this cycle, if any
    ///
    /// # Returns
    /// Tracked angle for this cycle
    pub fn update(&mut self, event: Option<AngleEvent>) -> ElectricalAngle {
        match event {
            Some(event) => self.on_event(event),
            None => self.ticks = self.ticks.saturating_add(1),
        }

        if self.ticks > self.config.timeout_cycles {
            self.ticks = self.config.restart_cycles;
            self.last_period = self.config.restart_period;
            self.inv_period = 1.0 / self.config.restart_period;
            self.angle_step = 0.0;
            self.error = 0.0;
            self.residue = 0.0;
            self.angle = self.hall_center;
            return self.angle;
        }

        let advance =
            self.direction.sign() * self.angle_step - self.inv_period * self.error + self.residue;
        let whole = libm::truncf(advance);
        self.residue = advance - whole;
        self.angle = self.angle.offset(whole as i32);
        self.angle
    }

    fn on_event(&mut self, event: AngleEvent) {
        let period = self.ticks.max(1) as f32;
        let one_on_ticks = 1.0 / period;
        let k = self.config.event_smoothing;

        let (span, error, direction) = match event {
            AngleEvent::Hall(edge) => {
                self.hall_center = edge.center;
                (edge.traversed_width as f32, edge.error, edge.direction)
            }
            AngleEvent::Flux(crossing) => (
                HALF_TURN as f32,
                self.angle.difference(crossing.angle),
                Direction::Forward,
            ),
        };

        self.last_period = period;
        self.inv_period = (1.0 - k) * self.inv_period + k * one_on_ticks;
        self.angle_step = (1.0 - k) * self.angle_step + k * span * one_on_ticks;
        self.error = error as f32;
        self.direction = direction;
        self.ticks = 0;
    }

    /// Force the angle (console override, open-loop hand-over)
    pub fn set_angle(&mut self, angle: ElectricalAngle) {
        self.angle = angle;
        self.residue = 0.0;
    }

    pub fn set_hall_center(&mut self, center: ElectricalAngle) {
        self.hall_center = center;
    }

    pub fn angle(&self) -> ElectricalAngle {
        self.angle
    }

    pub fn ticks_since_event(&self) -> u32 {
        self.ticks
    }

    pub fn angle_step(&self) -> f32 {
        self.angle_step
    }

    pub fn last_period(&self) -> f32 {
        self.last_period
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::foc::flux_observer::FluxObserver;
    use crate::foc::hall_sensor::{HallEstimator, HallTable};
    use crate::foc::transforms::{inverse_park, AlphaBeta, Dq};
    use crate::foc::MotorParameters;

    const SEQUENCE: [u8; 6] = [1, 3, 2, 6, 4, 5];

    fn tracker() -> AngleTracker {
        AngleTracker::new(ControlConfig::default().tracker)
    }

    fn edge(center: u16, error: i32) -> AngleEvent {
        AngleEvent::Hall(HallEdge {
            state: 1,
            center: ElectricalAngle(center),
            error,
            direction: Direction::Forward,
            traversed_width: 10923,
        })
    }

    #[test]
    fn test_timeout_forces_hall_center() {
        let mut t = tracker();
        t.update(Some(edge(27000, 0)));
        for _ in 0..3000 {
            t.update(None);
        }
        assert_eq!(t.ticks_since_event(), 3000);

        // イベント無しの3001サイクル目
        let angle = t.update(None);
        assert_eq!(angle, ElectricalAngle(27000));
        assert_eq!(t.ticks_since_event(), 1501);
    }

    #[test]
    fn test_last_writer_wins() {
        let mut register = EventRegister::new();
        register.post(edge(100, 0));
        register.post(AngleEvent::Flux(FluxCrossing {
            angle: ElectricalAngle(8192),
        }));
        assert_eq!(register.generation(), 2);
        assert!(matches!(register.take(), Some(AngleEvent::Flux(_))));
        assert!(register.take().is_none());
    }

    #[test]
    fn test_locks_to_constant_speed_hall() {
        let table = HallTable::evenly_spaced(&SEQUENCE, 0);
        let mut hall = HallEstimator::new();
        let mut t = tracker();
        let mut register = EventRegister::new();

        // 20 count/cycle で回転するロータ
        let step = 20u32;
        let mut rotor = 0u32;
        let mut worst = 0;
        for cycle in 0..40_000u32 {
            rotor += step;
            let rotor_angle = ElectricalAngle::wrapping_from(rotor);
            let state = SEQUENCE[(rotor_angle.raw() as u32 * 6 / 65536) as usize];
            if let Some(edge) = hall.update(&table, state, t.angle()).unwrap() {
                register.post(AngleEvent::Hall(edge));
            }
            let tracked = t.update(register.take());
            if cycle > 30_000 {
                worst = worst.max(tracked.difference(rotor_angle).abs());
            }
        }
        assert!((t.angle_step() - step as f32).abs() < 0.5);
        assert!(worst < 600, "worst error {}", worst);
    }

    #[test]
    fn test_flux_event_corrects_error() {
        let mut on_time = tracker();
        let mut late = tracker();
        for t in [&mut on_time, &mut late] {
            for _ in 0..1000 {
                t.update(None);
            }
            t.set_angle(ElectricalAngle(9000));
        }

        on_time.update(Some(AngleEvent::Flux(FluxCrossing {
            angle: ElectricalAngle(9000),
        })));
        late.update(Some(AngleEvent::Flux(FluxCrossing {
            angle: ElectricalAngle(8192),
        })));
        for _ in 0..100 {
            on_time.update(None);
            late.update(None);
        }
        // 808 counts 進みすぎた分が差し引かれる
        assert!(on_time.angle().difference(late.angle()) > 100);
    }

    #[test]
    fn test_tracks_rotor_from_flux_events() {
        let config = ControlConfig::default();
        let motor = MotorParameters {
            resistance: 0.1,
            inductance: 0.0,
            flux_linkage: 0.01,
        };
        let dt = 50.0e-6;
        let mut observer = FluxObserver::new(config.observer);
        let mut register = EventRegister::new();
        let mut t = tracker();

        // センサーレス運転: 逆起電力だけで 20 count/cycle のロータを追う
        let step = 20;
        let omega = step as f32 / 65536.0 * core::f32::consts::TAU / dt;
        let mut rotor = ElectricalAngle(0);
        let mut worst = 0;
        for cycle in 0..60_000u32 {
            rotor = rotor.offset(step);
            let emf = inverse_park(Dq::new(0.0, omega * motor.flux_linkage), rotor.sincos());
            if let Some(crossing) = observer.update(emf, AlphaBeta::default(), &motor, dt) {
                register.post(AngleEvent::Flux(crossing));
            }
            let tracked = t.update(register.take());
            if cycle > 40_000 {
                worst = worst.max(tracked.difference(rotor).abs());
            }
        }
        assert!((t.angle_step() - step as f32).abs() < 1.0, "step {}", t.angle_step());
        assert!(worst < 1000, "worst error {}", worst);
    }
}
