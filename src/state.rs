//! 共有状態
//!
//! 低速ループ・診断コンソールと高速ループの間で受け渡す値です。
//! すべて1ワードのアトミックで、高速ループ側が最大1周期古い値を読む
//! ことは許容します。

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::foc::transforms::Dq;
use crate::foc::VoltageScaling;

/// f32をビット列で保持するアトミックセル
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub const fn zero() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// 高速ループと低速ループの共有値
pub struct SharedControl {
    /// 電流指令 d/q [A]
    id_req: AtomicF32,
    iq_req: AtomicF32,

    /// 電圧→カウント変換ゲインと電圧上限
    vab_to_pwm: AtomicF32,
    vd_max: AtomicF32,
    vq_max: AtomicF32,
    field_weakening_threshold: AtomicF32,
    /// 低速ループが一度でも書き込んだか
    scaling_valid: AtomicBool,

    /// 高速ループからのテレメトリ
    vd: AtomicF32,
    vq: AtomicF32,
    id: AtomicF32,
    iq: AtomicF32,
    bus_voltage: AtomicF32,
    throttle: AtomicU32,

    /// コンソールからの角度上書き（u16、上位ビットで有効）
    angle_override: AtomicU32,

    /// 故障リセット要求
    reset_request: AtomicBool,
}

/// 角度上書き有効ビット
const OVERRIDE_ENABLE: u32 = 1 << 16;

/// 高速ループから見たテレメトリ
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub vdq: Dq,
    pub idq: Dq,
    pub bus_voltage: f32,
    pub throttle: u16,
}

impl SharedControl {
    pub const fn new() -> Self {
        Self {
            id_req: AtomicF32::zero(),
            iq_req: AtomicF32::zero(),
            vab_to_pwm: AtomicF32::zero(),
            vd_max: AtomicF32::zero(),
            vq_max: AtomicF32::zero(),
            field_weakening_threshold: AtomicF32::zero(),
            scaling_valid: AtomicBool::new(false),
            vd: AtomicF32::zero(),
            vq: AtomicF32::zero(),
            id: AtomicF32::zero(),
            iq: AtomicF32::zero(),
            bus_voltage: AtomicF32::zero(),
            throttle: AtomicU32::new(0),
            angle_override: AtomicU32::new(0),
            reset_request: AtomicBool::new(false),
        }
    }

    pub fn current_request(&self) -> Dq {
        Dq::new(self.id_req.load(), self.iq_req.load())
    }

    pub fn set_current_request(&self, idq: Dq) {
        self.id_req.store(idq.d);
        self.iq_req.store(idq.q);
    }

    /// 低速ループが計算した電圧スケーリング
    pub fn voltage_scaling(&self) -> Option<VoltageScaling> {
        if !self.scaling_valid.load(Ordering::Relaxed) {
            return None;
        }
        Some(VoltageScaling {
            vab_to_pwm: self.vab_to_pwm.load(),
            limits: crate::foc::VoltageLimits {
                vd_max: self.vd_max.load(),
                vq_max: self.vq_max.load(),
            },
            field_weakening_threshold: self.field_weakening_threshold.load(),
        })
    }

    pub fn set_voltage_scaling(&self, scaling: &VoltageScaling) {
        self.vab_to_pwm.store(scaling.vab_to_pwm);
        self.vd_max.store(scaling.limits.vd_max);
        self.vq_max.store(scaling.limits.vq_max);
        self.field_weakening_threshold
            .store(scaling.field_weakening_threshold);
        self.scaling_valid.store(true, Ordering::Relaxed);
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            vdq: Dq::new(self.vd.load(), self.vq.load()),
            idq: Dq::new(self.id.load(), self.iq.load()),
            bus_voltage: self.bus_voltage.load(),
            throttle: self.throttle.load(Ordering::Relaxed) as u16,
        }
    }

    pub fn publish_telemetry(&self, telemetry: &Telemetry) {
        self.vd.store(telemetry.vdq.d);
        self.vq.store(telemetry.vdq.q);
        self.id.store(telemetry.idq.d);
        self.iq.store(telemetry.idq.q);
        self.bus_voltage.store(telemetry.bus_voltage);
        self.throttle
            .store(telemetry.throttle as u32, Ordering::Relaxed);
    }

    /// コンソールからの角度上書き
    pub fn set_angle_override(&self, angle: Option<u16>) {
        let word = match angle {
            Some(raw) => OVERRIDE_ENABLE | raw as u32,
            None => 0,
        };
        self.angle_override.store(word, Ordering::Relaxed);
    }

    pub fn angle_override(&self) -> Option<u16> {
        let word = self.angle_override.load(Ordering::Relaxed);
        (word & OVERRIDE_ENABLE != 0).then_some(word as u16)
    }

    pub fn request_fault_reset(&self) {
        self.reset_request.store(true, Ordering::Relaxed);
    }

    /// リセット要求を取り出す（1回のみ true）
    pub fn take_fault_reset(&self) -> bool {
        self.reset_request.swap(false, Ordering::Relaxed)
    }
}

impl Default for SharedControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_invalid_until_written() {
        let shared = SharedControl::new();
        assert!(shared.voltage_scaling().is_none());
        let scaling = VoltageScaling {
            vab_to_pwm: 42.0,
            ..Default::default()
        };
        shared.set_voltage_scaling(&scaling);
        assert_eq!(shared.voltage_scaling(), Some(scaling));
    }

    #[test]
    fn test_angle_override_word() {
        let shared = SharedControl::new();
        assert_eq!(shared.angle_override(), None);
        shared.set_angle_override(Some(0));
        assert_eq!(shared.angle_override(), Some(0));
        shared.set_angle_override(Some(65535));
        assert_eq!(shared.angle_override(), Some(65535));
        shared.set_angle_override(None);
        assert_eq!(shared.angle_override(), None);
    }

    #[test]
    fn test_reset_request_taken_once() {
        let shared = SharedControl::new();
        shared.request_fault_reset();
        assert!(shared.take_fault_reset());
        assert!(!shared.take_fault_reset());
    }
}
