//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod led;
pub mod storage;
pub mod supervisor;

// タスク関数を再エクスポート
pub use led::led_task;
pub use storage::storage_task;
pub use supervisor::supervisor_task;
