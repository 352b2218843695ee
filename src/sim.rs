//! テスト用の模擬インバータ
//!
//! 2相直列のRL負荷、12bit ADCの量子化、指令とは独立に回るロータのHall出力を
//! 持ち、`MotorDriver` を実装します。

use crate::config::{DEFAULT_CURRENT_GAIN, DEFAULT_VOLTAGE_GAIN};
use crate::foc::{ElectricalAngle, HallTable, PwmTiming};
use crate::motor_driver::{MotorDriver, PhaseOutputs};
use crate::sensing::RawSamples;

const ADC_MIDPOINT: f32 = 2048.0;
const ADC_MAX: f32 = 4095.0;
const HALL_SEQUENCE: [u8; 6] = [1, 3, 2, 6, 4, 5];

/// U→Vに直列接続された2相分のRL負荷
pub struct RlLoad {
    resistance: f32,
    inductance: f32,
    bus_voltage: f32,
    timing: PwmTiming,
    current: f32,
}

impl RlLoad {
    pub fn new(resistance: f32, inductance: f32, bus_voltage: f32, timing: PwmTiming) -> Self {
        Self {
            resistance,
            inductance,
            bus_voltage,
            timing,
            current: 0.0,
        }
    }

    /// 1 PWM周期だけU相にデューティを印加（V相はLow）
    ///
    /// 周期平均電圧に対する1次遅れの厳密解。負方向はダイオードでクランプ。
    pub fn apply(&mut self, duty_u: u16) {
        let voltage = duty_u as f32 / self.timing.period as f32 * self.bus_voltage;
        let steady = voltage / (2.0 * self.resistance);
        let tau = self.inductance / self.resistance;
        let decay = libm::expf(-self.timing.period_seconds() / tau);
        self.current = (steady + (self.current - steady) * decay).max(0.0);
    }

    /// U相に流れ込む電流 [A]
    pub fn current(&self) -> f32 {
        self.current
    }

    /// V相のADC読み値相当（負、20mA刻み）
    pub fn return_current(&self) -> f32 {
        libm::roundf(-self.current / 0.02) * 0.02
    }
}

/// Hall入力の模擬
#[derive(Debug, Clone, Copy)]
pub enum HallSource {
    Fixed(u8),
    /// 一定速で回るロータ（読み取りごとに `step` 進む）
    Rotor { angle: ElectricalAngle, step: i32 },
}

pub struct SimInverter {
    pub timing: PwmTiming,
    pub bus_voltage: f32,
    pub throttle: u16,
    pub hall: HallSource,
    /// 設定時はADC値をそのまま返す
    pub raw_override: Option<RawSamples>,
    pub duty: [u16; 3],
    pub outputs: PhaseOutputs,
    /// `set_outputs` の呼び出し回数
    pub output_writes: u32,
    pub load: RlLoad,
}

impl SimInverter {
    pub fn new() -> Self {
        let timing = PwmTiming {
            clock_hz: 36_000_000,
            period: 1024,
            prescaler: 0,
        };
        Self {
            timing,
            bus_voltage: 24.0,
            throttle: 0,
            hall: HallSource::Fixed(1),
            raw_override: None,
            duty: [0; 3],
            outputs: PhaseOutputs::NONE,
            output_writes: 0,
            load: RlLoad::new(0.1, 50.0e-6, 24.0, timing),
        }
    }

    pub fn rotor_angle(&self) -> ElectricalAngle {
        match self.hall {
            HallSource::Fixed(_) => ElectricalAngle::ZERO,
            HallSource::Rotor { angle, .. } => angle,
        }
    }

    fn to_adc(current: f32) -> u16 {
        libm::roundf(ADC_MIDPOINT + current / DEFAULT_CURRENT_GAIN).clamp(0.0, ADC_MAX) as u16
    }
}

impl MotorDriver for SimInverter {
    fn read_samples(&mut self) -> RawSamples {
        if let Some(raw) = self.raw_override {
            return raw;
        }
        // 直前の周期に出力したデューティを負荷へ印加
        let i = if self.outputs == PhaseOutputs::UV_ONLY {
            self.load.apply(self.duty[0]);
            self.load.current()
        } else {
            0.0
        };
        RawSamples {
            phase_current: [Self::to_adc(i), Self::to_adc(-i), Self::to_adc(0.0)],
            bus_voltage: libm::roundf(self.bus_voltage / DEFAULT_VOLTAGE_GAIN) as u16,
            throttle: self.throttle,
        }
    }

    fn read_hall(&mut self) -> u8 {
        match &mut self.hall {
            HallSource::Fixed(state) => *state,
            HallSource::Rotor { angle, step } => {
                *angle = angle.offset(*step);
                let table = HallTable::evenly_spaced(&HALL_SEQUENCE, 0);
                HALL_SEQUENCE
                    .iter()
                    .copied()
                    .find(|&s| {
                        table.sector(s).is_some_and(|sector| {
                            angle.raw().wrapping_sub(sector.start) < sector.width
                        })
                    })
                    .unwrap_or(0)
            }
        }
    }

    fn set_duty_uvw(&mut self, duty: [u16; 3]) {
        self.duty = duty;
    }

    fn set_outputs(&mut self, outputs: PhaseOutputs) {
        self.outputs = outputs;
        self.output_writes += 1;
    }

    fn timing(&self) -> PwmTiming {
        self.timing
    }
}
