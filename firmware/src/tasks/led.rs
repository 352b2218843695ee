//! LED制御タスク
//!
//! 運転状態を3つのLEDで表示します（LEDはアクティブロー）。
//! - 停止: LED1 点灯
//! - コミッショニング中: LED2 点滅
//! - 運転中: LED2 点灯
//! - 故障: LED3 点滅

use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};

use crate::state::{led_status, LedStatus};

#[embassy_executor::task]
pub async fn led_task(mut leds: [Output<'static>; 3]) {
    info!("LED task started");

    let mut blink = false;
    let mut last = led_status();

    loop {
        let status = led_status();
        if status != last {
            info!("LED status: {:?}", status);
            last = status;
        }
        blink = !blink;

        let pattern = match status {
            LedStatus::Idle => [true, false, false],
            LedStatus::Commissioning => [false, blink, false],
            LedStatus::Running => [false, true, false],
            LedStatus::Fault => [false, false, blink],
        };
        for (led, on) in leds.iter_mut().zip(pattern) {
            if on {
                led.set_low();
            } else {
                led.set_high();
            }
        }

        Timer::after(Duration::from_millis(250)).await;
    }
}
