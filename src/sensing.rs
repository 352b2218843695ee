//! 信号処理パイプライン
//!
//! ADC生値を物理量へ変換し、Clark/Park変換で `FocFrame` の電流を更新します。
//! オフセットは起動時のウォームアップ期間の移動平均で決め、以後固定します。

use crate::config::{ClarkMode, SensingConfig};
use crate::foc::transforms::{clark, park, ClarkVariant};
use crate::foc::FocFrame;

/// 1周期分のADC生値（DMAで更新される配列に相当）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSamples {
    /// 相電流 [U, V, W]
    pub phase_current: [u16; 3],
    /// 母線電圧
    pub bus_voltage: u16,
    /// スロットル入力
    pub throttle: u16,
}

/// 1相分の測定値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseMeasurement {
    pub raw: u16,
    pub offset: f32,
    /// 物理量 [A]
    pub value: f32,
}

/// 電流オフセットのウォームアップと物理量変換
pub struct PhaseSensing {
    config: SensingConfig,
    phases: [PhaseMeasurement; 3],
    offset_sum: [u32; 3],
    samples: u16,
    bus_voltage: f32,
}

impl PhaseSensing {
    pub fn new(config: SensingConfig) -> Self {
        Self {
            config,
            phases: [PhaseMeasurement::default(); 3],
            offset_sum: [0; 3],
            samples: 0,
            bus_voltage: 0.0,
        }
    }

    /// オフセットのウォームアップが完了したか
    pub fn is_warmed_up(&self) -> bool {
        self.samples >= self.config.warmup_samples
    }

    /// ウォームアップ中のサンプルを1つ取り込む
    ///
    /// # Returns
    /// このサンプルでウォームアップが完了した場合 `true`
    pub fn accumulate_offsets(&mut self, raw: &RawSamples) -> bool {
        if self.is_warmed_up() {
            return false;
        }
        self.samples += 1;
        for (i, phase) in self.phases.iter_mut().enumerate() {
            self.offset_sum[i] += raw.phase_current[i] as u32;
            phase.offset = self.offset_sum[i] as f32 / self.samples as f32;
        }
        self.is_warmed_up()
    }

    /// 生値を物理量へ変換
    ///
    /// # Returns
    /// 相電流 [A] の配列 [U, V, W]
    pub fn convert(&mut self, raw: &RawSamples) -> [f32; 3] {
        for (i, phase) in self.phases.iter_mut().enumerate() {
            phase.raw = raw.phase_current[i];
            phase.value = (phase.raw as f32 - phase.offset) * self.config.current_gain;
        }
        self.bus_voltage = raw.bus_voltage as f32 * self.config.voltage_gain;
        [
            self.phases[0].value,
            self.phases[1].value,
            self.phases[2].value,
        ]
    }

    /// 前回のデューティから信頼できる相を選ぶ
    ///
    /// デューティが高い相はローサイドのオン時間が短く、サンプルが不正確になります。
    pub fn select_clark(&self, last_duty: [u16; 3], period: u16) -> ClarkVariant {
        if self.config.clark_mode == ClarkMode::ThreePhase {
            return ClarkVariant::ThreePhase;
        }
        let threshold = (period as f32 * self.config.clark_saturation_ratio) as u16;
        if last_duty[1] > threshold {
            ClarkVariant::ExcludeV
        } else if last_duty[2] > threshold {
            ClarkVariant::ExcludeW
        } else if last_duty[0] > threshold {
            ClarkVariant::ExcludeU
        } else {
            ClarkVariant::ThreePhase
        }
    }

    /// 変換→Clark→Park を実行して `frame` を更新
    ///
    /// Park変換には前周期の sincos（サンプル取得時点の角度）を使います。
    pub fn process(&mut self, raw: &RawSamples, frame: &mut FocFrame, period: u16) {
        let currents = self.convert(raw);
        let variant = self.select_clark(frame.duty, period);
        frame.i_uvw = currents;
        frame.iab = clark(currents, variant);
        frame.idq = park(frame.iab, frame.sincos);
        frame.bus_voltage = self.bus_voltage;
    }

    pub fn phases(&self) -> &[PhaseMeasurement; 3] {
        &self.phases
    }

    /// 母線電圧 [V]
    pub fn bus_voltage(&self) -> f32 {
        self.bus_voltage
    }
}
