//! グローバル共有状態管理
//!
//! 高速ループ割り込みとタスクの間で共有される状態です。
//! 割り込みから触るものはクリティカルセクションかアトミックで保護します。

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use g4_foc::config::StoredCalibration;
use g4_foc::{MotorState, SharedControl};

/// 高速ループと低速ループの共有値
pub static SHARED: SharedControl = SharedControl::new();

/// 保存待ちのキャリブレーション結果（高速ループ → ストレージタスク）
pub static CALIBRATION_SAVE: Signal<CriticalSectionRawMutex, StoredCalibration> = Signal::new();

/// LED表示用の運転状態
static LED_STATUS: AtomicU8 = AtomicU8::new(LedStatus::Idle as u8);

/// LED表示の区分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LedStatus {
    Idle = 0,
    /// 検出・同定・学習・試験中
    Commissioning = 1,
    Running = 2,
    Fault = 3,
}

impl From<MotorState> for LedStatus {
    fn from(state: MotorState) -> Self {
        match state {
            MotorState::Idle | MotorState::Recovering => LedStatus::Idle,
            MotorState::Detecting
            | MotorState::Measuring
            | MotorState::Align
            | MotorState::Test => LedStatus::Commissioning,
            MotorState::HallRun
            | MotorState::SensorlessRun
            | MotorState::HallNearStationary
            | MotorState::OpenLoopStartup
            | MotorState::OpenLoopTransition => LedStatus::Running,
            MotorState::Error => LedStatus::Fault,
        }
    }
}

pub fn set_led_status(status: LedStatus) {
    LED_STATUS.store(status as u8, Ordering::Relaxed);
}

pub fn led_status() -> LedStatus {
    match LED_STATUS.load(Ordering::Relaxed) {
        1 => LedStatus::Commissioning,
        2 => LedStatus::Running,
        3 => LedStatus::Fault,
        _ => LedStatus::Idle,
    }
}
