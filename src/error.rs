//! 故障コードとラッチ状態

/// 故障の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultCode {
    /// 電流・電圧しきい値の連続超過
    OverLimit,

    /// Hall状態0（全入力Low）
    InvalidHallState0,

    /// Hall状態7（全入力High）
    InvalidHallState7,

    /// その他のHall異常（検出時のパターン異常など）
    GenericHallFault,
}

/// 故障発生時の生サンプル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultSnapshot {
    pub phase_current: [u16; 3],
    pub bus_voltage: u16,
    pub hall_state: u8,
}

/// ラッチされた故障状態
///
/// 最初の故障のみ記録し、外部からの `clear` でのみ解除されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultState {
    code: Option<FaultCode>,
    snapshot: FaultSnapshot,
    break_active: bool,
}

impl FaultState {
    pub const fn new() -> Self {
        Self {
            code: None,
            snapshot: FaultSnapshot {
                phase_current: [0; 3],
                bus_voltage: 0,
                hall_state: 0,
            },
            break_active: false,
        }
    }

    /// 故障をラッチ（既にラッチ済みなら最初の故障を保持）
    pub fn latch(&mut self, code: FaultCode, snapshot: FaultSnapshot) {
        if self.code.is_none() {
            self.code = Some(code);
            self.snapshot = snapshot;
        }
        self.break_active = true;
    }

    /// ソフトウェアブレーキ状態を記録
    pub fn set_break(&mut self, active: bool) {
        self.break_active = active;
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn code(&self) -> Option<FaultCode> {
        self.code
    }

    pub fn snapshot(&self) -> FaultSnapshot {
        self.snapshot
    }

    pub fn is_latched(&self) -> bool {
        self.code.is_some()
    }

    pub fn break_active(&self) -> bool {
        self.break_active
    }
}
