//! 過電流・過電圧の監視
//!
//! 生サンプルをしきい値と比較し、違反中は電流指令を縮小します。
//! 連続違反がトリップ回数に達すると故障としてスナップショットを返します。
//! 違反の無い周期が1回でもあればカウンタは0に戻ります。

use crate::config::ProtectionConfig;
use crate::error::FaultSnapshot;
use crate::foc::transforms::Dq;
use crate::sensing::RawSamples;

/// 1周期の監視結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtectionOutcome {
    /// しきい値内
    Normal,
    /// 違反（連続回数）
    Violation(u8),
    /// 連続違反でトリップ
    Trip(FaultSnapshot),
}

/// 保護監視
pub struct ProtectionSupervisor {
    config: ProtectionConfig,
    consecutive: u8,
}

impl ProtectionSupervisor {
    pub fn new(config: ProtectionConfig) -> Self {
        Self {
            config,
            consecutive: 0,
        }
    }

    fn violates(&self, raw: &RawSamples) -> bool {
        raw.phase_current
            .iter()
            .any(|&i| i > self.config.raw_current_limit)
            || raw.bus_voltage > self.config.raw_voltage_limit
    }

    /// 1周期分の監視
    ///
    /// # Arguments
    /// * `raw` - 今周期の生サンプル
    /// * `hall_state` - スナップショット用のHall状態
    /// * `idq_req` - 電流指令（違反時に縮小）
    pub fn check(&mut self, raw: &RawSamples, hall_state: u8, idq_req: &mut Dq) -> ProtectionOutcome {
        if !self.violates(raw) {
            self.consecutive = 0;
            return ProtectionOutcome::Normal;
        }

        *idq_req = idq_req.scaled(self.config.reference_derate);
        self.consecutive = self.consecutive.saturating_add(1);

        if self.consecutive >= self.config.trip_count {
            error!(
                "Over limit trip: i={} {} {} v={}",
                raw.phase_current[0],
                raw.phase_current[1],
                raw.phase_current[2],
                raw.bus_voltage
            );
            return ProtectionOutcome::Trip(FaultSnapshot {
                phase_current: raw.phase_current,
                bus_voltage: raw.bus_voltage,
                hall_state,
            });
        }

        ProtectionOutcome::Violation(self.consecutive)
    }

    /// 連続違反回数
    pub fn consecutive(&self) -> u8 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
