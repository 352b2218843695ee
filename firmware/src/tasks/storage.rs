//! キャリブレーション保存タスク
//!
//! 高速ループから渡されたキャリブレーション結果を最終フラッシュページへ書き込みます。

use embassy_stm32::{crc::Crc, flash::Flash, mode::Blocking};

use crate::eeprom;
use crate::state::CALIBRATION_SAVE;

#[embassy_executor::task]
pub async fn storage_task(mut flash: Flash<'static, Blocking>, mut crc: Crc<'static>) {
    info!("Storage task started");

    loop {
        let calibration = CALIBRATION_SAVE.wait().await;
        info!(
            "Saving calibration: R={} L={}",
            calibration.motor.resistance, calibration.motor.inductance
        );

        if let Err(e) = eeprom::write_calibration(&mut flash, &mut crc, &calibration) {
            error!("Calibration not saved: {:?}", e);
        }
    }
}
