//! セルフコミッショニング
//!
//! 通常の電流制御の代わりに高速ループから毎周期呼ばれ、小さな
//! ステートマシンを1段進めて戻ります。ブロッキングはしません。
//!
//! - [`identification`]: 相抵抗・相インダクタンスの同定
//! - [`hall_learning`]: Hallセンサーの角度テーブル学習
//! - [`double_pulse`]: インバータ立ち上げ用のダブルパルス試験

pub mod double_pulse;
pub mod hall_learning;
pub mod identification;

pub use double_pulse::{DoublePulse, DoublePulseStatus};
pub use hall_learning::{HallLearning, LearningCommand, LearningPhase, LearningStatus};
pub use identification::{
    IdentificationStage, IdentificationStatus, IdentifiedMotor, MotorIdentification,
};

use crate::motor_driver::PhaseOutputs;

/// 電流制御を通さず直接出力するPWM指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseCommand {
    pub duty: [u16; 3],
    pub outputs: PhaseOutputs,
}
