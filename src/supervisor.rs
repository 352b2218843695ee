//! 低速ループ（スーパーバイザ）
//!
//! 高速ループより十分低い周期で呼ばれ、共有状態の指令値だけを更新します。
//!
//! - 母線電圧から電圧→デューティ変換ゲインと電圧上限を再計算
//! - スロットル入力から q軸電流指令を生成（不感帯以下は0）
//! - Vq がしきい値を超えたら超過分に比例した負の d軸電流（弱め界磁）
//! - 指令電力がバッテリー上限を超えたら q軸電流を縮小

use crate::config::{ControlConfig, ModulationConfig, SupervisorConfig};
use crate::foc::transforms::Dq;
use crate::foc::{calculate_voltage_scaling, PwmTiming, VoltageScaling};
use crate::state::SharedControl;

/// 1回分の低速ループ結果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupervisorStatus {
    /// 書き込んだ電流指令
    pub idq_req: Dq,
    /// 指令電力 1.5·|Vq·Iq_req| [W]
    pub request_power: f32,
    pub power_limited: bool,
    pub field_weakening: bool,
    /// 母線電圧が無効なら `None`
    pub scaling: Option<VoltageScaling>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    modulation: ModulationConfig,
    last_scaling: Option<VoltageScaling>,
}

impl Supervisor {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            config: config.supervisor,
            modulation: config.modulation,
            last_scaling: None,
        }
    }

    /// スロットル生値 → q軸電流指令 [A]
    pub fn throttle_current(&self, throttle: u16) -> f32 {
        if throttle > self.config.throttle_deadband {
            (throttle - self.config.throttle_deadband) as f32 * self.config.throttle_gain
        } else {
            0.0
        }
    }

    /// 弱め界磁の d軸電流 [A]（0以下）
    pub fn field_weakening_current(&self, vq: f32, threshold: f32) -> f32 {
        let excess = vq.abs() - threshold;
        if excess > 0.0 {
            -self.config.field_weakening_gain * excess
        } else {
            0.0
        }
    }

    /// バッテリー電力制限
    ///
    /// # Returns
    /// (制限後の q軸電流, 制限前の指令電力)
    pub fn limit_power(&self, vq: f32, iq: f32) -> (f32, f32) {
        let power = 1.5 * (vq * iq).abs();
        if power > self.config.battery_max_power {
            (iq * self.config.battery_max_power / power, power)
        } else {
            (iq, power)
        }
    }

    /// 低速ループ1回分
    pub fn slow_cycle(&mut self, shared: &SharedControl, timing: &PwmTiming) -> SupervisorStatus {
        let telemetry = shared.telemetry();

        let scaling = calculate_voltage_scaling(
            telemetry.bus_voltage,
            timing,
            &self.modulation,
            self.config.field_weakening_ratio,
        );
        match scaling {
            Some(scaling) => shared.set_voltage_scaling(&scaling),
            None if self.last_scaling.is_some() => {
                warn!("Bus voltage lost: {}V", telemetry.bus_voltage)
            }
            None => {}
        }
        self.last_scaling = scaling;

        let iq = self.throttle_current(telemetry.throttle);
        let id = scaling.map_or(0.0, |s| {
            self.field_weakening_current(telemetry.vdq.q, s.field_weakening_threshold)
        });
        let (iq, request_power) = self.limit_power(telemetry.vdq.q, iq);

        let idq_req = Dq::new(id, iq);
        shared.set_current_request(idq_req);

        SupervisorStatus {
            idq_req,
            request_power,
            power_limited: request_power > self.config.battery_max_power,
            field_weakening: id < 0.0,
            scaling,
        }
    }
}
