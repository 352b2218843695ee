//! 抵抗・インダクタンス同定
//!
//! W相をハイインピーダンスにしてU→Vに開ループで電流を流します。
//! 電流値はV相の読み値（正方向の駆動で負）をそのまま使います。
//!
//! 1. 低電流点：デューティを1カウントずつ調整して電流を目標帯に保ち、指数フィルタで平均
//! 2. 高電流点：同様に高い目標帯で平均
//! 3. リップル：高電流点の倍のデューティでパルスを間引き、リップルの山と谷を別々に平均
//! 4. R = ΔD/(2·ARR)·Vbus / ΔI、L = (I谷 + I山)·R·T / (I山 − I谷) / 2

use crate::config::IdentificationConfig;
use crate::foc::PwmTiming;
use crate::motor_driver::PhaseOutputs;

use super::PhaseCommand;

/// 同定の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdentificationStage {
    LowPoint,
    HighPoint,
    RippleSetup,
    /// パターン内の位置
    Ripple(u8),
    Complete,
}

#[derive(Clone, Copy)]
enum RippleSample {
    None,
    Valley,
    Peak,
}

/// リップル注入パターン（駆動するか、どちらの平均に取り込むか）
const RIPPLE_PATTERN: [(bool, RippleSample); 6] = [
    (false, RippleSample::Valley),
    (true, RippleSample::None),
    (true, RippleSample::None),
    (false, RippleSample::None),
    (false, RippleSample::Peak),
    (false, RippleSample::None),
];

/// 同定結果
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentifiedMotor {
    pub resistance: f32,
    pub inductance: f32,
}

/// 1周期分の進行結果
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdentificationStatus {
    Running(PhaseCommand),
    Complete(IdentifiedMotor),
}

/// 2点の電流から相抵抗を求める
///
/// # Arguments
/// * `duty_low` / `duty_high` - 各点のデューティ [count]
/// * `current_low` / `current_high` - 各点のV相読み値 [A]（負）
/// * `bus_voltage` - 母線電圧 [V]
/// * `full_scale` - PWM周期（ARR）
pub fn resistance_from_points(
    duty_low: u16,
    duty_high: u16,
    current_low: f32,
    current_high: f32,
    bus_voltage: f32,
    full_scale: u16,
) -> f32 {
    (duty_high as f32 - duty_low as f32) / (2.0 * full_scale as f32) * bus_voltage
        / (current_low - current_high)
}

/// リップルの山と谷から相インダクタンスを求める
pub fn inductance_from_ripple(valley: f32, peak: f32, resistance: f32, pwm_period: f32) -> f32 {
    (valley + peak) * resistance * pwm_period / (peak - valley) / 2.0
}

/// 抵抗・インダクタンス同定のステートマシン
pub struct MotorIdentification {
    config: IdentificationConfig,
    stage: IdentificationStage,
    cycle: u32,
    duty_low: u16,
    duty_high: u16,
    duty_ripple: u16,
    /// 現在出力中のU相デューティ
    duty: u16,
    current_low: f32,
    current_high: f32,
    ripple_valley: f32,
    ripple_peak: f32,
}

impl MotorIdentification {
    pub fn new(config: IdentificationConfig) -> Self {
        Self {
            config,
            stage: IdentificationStage::LowPoint,
            cycle: 0,
            duty_low: 0,
            duty_high: 0,
            duty_ripple: 0,
            duty: 0,
            current_low: 0.0,
            current_high: 0.0,
            ripple_valley: 0.0,
            ripple_peak: 0.0,
        }
    }

    pub fn stage(&self) -> IdentificationStage {
        self.stage
    }

    /// 1周期進める
    ///
    /// # Arguments
    /// * `current` - V相電流 [A]
    /// * `bus_voltage` - 母線電圧 [V]
    /// * `timing` - PWMタイマー設定
    pub fn step(&mut self, current: f32, bus_voltage: f32, timing: &PwmTiming) -> IdentificationStatus {
        let config = self.config;
        self.cycle += 1;

        match self.stage {
            IdentificationStage::LowPoint => {
                self.duty_low = nudge(self.duty_low, current, config.low_band, timing.period);
                self.current_low = smooth(self.current_low, current, config.resistance_filter);
                self.duty = self.duty_low;
                if self.cycle >= config.low_point_end {
                    debug!("R low point: duty={} i={}", self.duty_low, self.current_low);
                    self.stage = IdentificationStage::HighPoint;
                }
            }
            IdentificationStage::HighPoint => {
                self.duty_high = nudge(self.duty_high, current, config.high_band, timing.period);
                self.current_high = smooth(self.current_high, current, config.resistance_filter);
                self.duty = self.duty_high;
                if self.cycle >= config.high_point_end {
                    debug!("R high point: duty={} i={}", self.duty_high, self.current_high);
                    self.stage = IdentificationStage::RippleSetup;
                }
            }
            IdentificationStage::RippleSetup => {
                self.duty_ripple = self
                    .duty_high
                    .saturating_mul(config.ripple_duty_multiplier)
                    .min(timing.period);
                self.stage = IdentificationStage::Ripple(0);
            }
            IdentificationStage::Ripple(position) => {
                let (drive, sample) = RIPPLE_PATTERN[position as usize % RIPPLE_PATTERN.len()];
                self.duty = if drive { self.duty_ripple } else { 0 };
                match sample {
                    RippleSample::Valley => {
                        self.ripple_valley =
                            smooth(self.ripple_valley, current, config.inductance_filter)
                    }
                    RippleSample::Peak => {
                        self.ripple_peak = smooth(self.ripple_peak, current, config.inductance_filter)
                    }
                    RippleSample::None => {}
                }
                self.stage = if self.cycle >= config.total_cycles {
                    IdentificationStage::Complete
                } else {
                    IdentificationStage::Ripple((position + 1) % RIPPLE_PATTERN.len() as u8)
                };
            }
            IdentificationStage::Complete => {
                return IdentificationStatus::Complete(self.finish(bus_voltage, timing));
            }
        }

        IdentificationStatus::Running(PhaseCommand {
            duty: [self.duty, 0, 0],
            outputs: PhaseOutputs::UV_ONLY,
        })
    }

    fn finish(&self, bus_voltage: f32, timing: &PwmTiming) -> IdentifiedMotor {
        let mut resistance = resistance_from_points(
            self.duty_low,
            self.duty_high,
            self.current_low,
            self.current_high,
            bus_voltage,
            timing.period,
        );
        if !resistance.is_finite() || resistance < 0.0 {
            warn!("Resistance measurement degenerate: {}", resistance);
            resistance = 0.0;
        }

        let mut inductance = inductance_from_ripple(
            self.ripple_valley,
            self.ripple_peak,
            resistance,
            timing.period_seconds(),
        );
        if !(inductance > 0.0) || !inductance.is_finite() {
            inductance = self.config.inductance_floor;
        }

        info!("Motor identified: R={} L={}", resistance, inductance);
        IdentifiedMotor {
            resistance,
            inductance,
        }
    }
}

/// 電流が目標帯に入るようデューティを1カウント調整
///
/// 目標帯は電流の大きさ（V相読み値は負）で指定します。
fn nudge(duty: u16, current: f32, band: (f32, f32), period: u16) -> u16 {
    if current > -band.0 {
        duty.saturating_add(1).min(period)
    } else if current < -band.1 {
        duty.saturating_sub(1)
    } else {
        duty
    }
}

/// 指数平滑
#[inline]
fn smooth(acc: f32, sample: f32, factor: f32) -> f32 {
    acc + factor * (sample - acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::sim::RlLoad;

    const EPSILON: f32 = 0.0001;

    fn timing() -> PwmTiming {
        PwmTiming {
            clock_hz: 36_000_000,
            period: 1024,
            prescaler: 0,
        }
    }

    #[test]
    fn test_resistance_formula() {
        // 4A と 12A がV相から戻る（読み値は負）
        let (d1, d2, i1, i2, v) = (40u16, 120u16, -4.0f32, -12.0f32, 24.0f32);
        let r = resistance_from_points(d1, d2, i1, i2, v, 1024);
        let expected = (d2 - d1) as f32 / (2.0 * 1024.0) * v / (i1 - i2);
        assert!((r - expected).abs() < EPSILON);
        assert!((r - 0.1171875).abs() < EPSILON);
    }

    #[test]
    fn test_nudge_keeps_band() {
        assert_eq!(nudge(10, -1.0, (3.0, 10.0), 1024), 11);
        assert_eq!(nudge(10, -12.0, (3.0, 10.0), 1024), 9);
        assert_eq!(nudge(10, -5.0, (3.0, 10.0), 1024), 10);
        assert_eq!(nudge(0, -12.0, (3.0, 10.0), 1024), 0);
        assert_eq!(nudge(1024, 0.0, (3.0, 10.0), 1024), 1024);
    }

    #[test]
    fn test_ripple_pattern_sequence() {
        let mut config = ControlConfig::default().identification;
        config.low_point_end = 2;
        config.high_point_end = 4;
        config.total_cycles = 100;
        let mut ident = MotorIdentification::new(config);

        // 低電流点・高電流点で上昇させる
        for _ in 0..4 {
            ident.step(0.0, 24.0, &timing());
        }
        assert_eq!(ident.stage(), IdentificationStage::RippleSetup);
        ident.step(0.0, 24.0, &timing());

        let mut duties = [0u16; 12];
        for duty in duties.iter_mut() {
            match ident.step(0.0, 24.0, &timing()) {
                IdentificationStatus::Running(cmd) => {
                    *duty = cmd.duty[0];
                    assert_eq!(cmd.outputs, PhaseOutputs::UV_ONLY);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        // 高電流点のデューティ2 → リップルは4
        assert_eq!(duties, [0, 4, 4, 0, 0, 0, 0, 4, 4, 0, 0, 0]);
    }

    #[test]
    fn test_identifies_simulated_motor() {
        let config = ControlConfig::default().identification;
        let mut ident = MotorIdentification::new(config);
        let timing = timing();
        let mut load = RlLoad::new(0.1, 50.0e-6, 24.0, timing);

        let result = loop {
            match ident.step(load.return_current(), 24.0, &timing) {
                IdentificationStatus::Running(cmd) => load.apply(cmd.duty[0]),
                IdentificationStatus::Complete(result) => break result,
            }
        };

        assert!((result.resistance - 0.1).abs() < 0.005, "R={}", result.resistance);
        assert!(
            result.inductance > 0.3 * 50.0e-6 && result.inductance < 3.0 * 50.0e-6,
            "L={}",
            result.inductance
        );
    }

    #[test]
    fn test_degenerate_inductance_clamped() {
        let mut config = ControlConfig::default().identification;
        config.low_point_end = 1;
        config.high_point_end = 2;
        config.total_cycles = 10;
        let mut ident = MotorIdentification::new(config);

        // 電流が流れない（断線）
        let result = loop {
            if let IdentificationStatus::Complete(result) = ident.step(0.0, 24.0, &timing()) {
                break result;
            }
        };
        assert_eq!(result.inductance, config.inductance_floor);
        assert_eq!(result.resistance, 0.0);
    }
}
