//! g4-foc: FOCモーター制御コア
//!
//! 電流サンプルからPWMデューティまでの高速ループ（信号処理、保護、角度推定、
//! 電流制御、変調）と、セルフコミッショニング・低速ループを含みます。
//! ハードウェアへのアクセスは [`motor_driver::MotorDriver`] トレイト経由のみです。

#![cfg_attr(not(test), no_std)]

// fmt.rsは他のモジュールより先に宣言する（マクロの可視性のため）
#[macro_use]
mod fmt;

pub mod commissioning;
pub mod config;
pub mod control;
pub mod error;
pub mod foc;
pub mod motor_driver;
pub mod protection;
pub mod sensing;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod sim;

pub use control::{Controller, ModeRequest, MotorState};
pub use error::{FaultCode, FaultState};
pub use state::SharedControl;
pub use supervisor::{Supervisor, SupervisorStatus};
