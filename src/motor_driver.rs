//! モータードライバー抽象化レイヤー
//!
//! タイマー・ADC・PWMレジスタへのアクセスを隠蔽するトレイトです。
//! 制御コアはこのトレイト経由でのみハードウェアに触れます。

use crate::foc::PwmTiming;
use crate::sensing::RawSamples;

/// 各相の出力許可
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseOutputs {
    pub u: bool,
    pub v: bool,
    pub w: bool,
}

impl PhaseOutputs {
    /// 全相出力
    pub const ALL: Self = Self {
        u: true,
        v: true,
        w: true,
    };

    /// 全相停止（ソフトウェアブレーキ）
    pub const NONE: Self = Self {
        u: false,
        v: false,
        w: false,
    };

    /// W相をハイインピーダンスにしてU-V間を駆動
    pub const UV_ONLY: Self = Self {
        u: true,
        v: true,
        w: false,
    };

    /// U相を停止してV-W間を駆動
    pub const VW_ONLY: Self = Self {
        u: false,
        v: true,
        w: true,
    };
}

/// 3相インバータのハードウェアインターフェース
pub trait MotorDriver {
    /// PWM周期ごとに更新される生サンプル
    fn read_samples(&mut self) -> RawSamples;

    /// 3bitのHall状態
    fn read_hall(&mut self) -> u8;

    /// 3相のコンペア値を同一周期で書き込む
    fn set_duty_uvw(&mut self, duty: [u16; 3]);

    /// 各相の出力許可／強制停止
    fn set_outputs(&mut self, outputs: PhaseOutputs);

    /// バスクロックとタイマー周期・プリスケーラ
    fn timing(&self) -> PwmTiming;
}
