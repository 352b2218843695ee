//! 高速ループ（ADC注入変換完了割り込み）
//!
//! PWM 1周期ごとに、その周期のサンプルが揃った時点で `Controller::fast_cycle` を実行します。
//! コントローラとインバータは `install` で割り込みコンテキストへ移します。

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use g4_foc::control::Diagnostics;
use g4_foc::Controller;

use crate::current_sense;
use crate::motor_driver::Inverter;
use crate::state::{set_led_status, CALIBRATION_SAVE, SHARED};

struct FastLoop {
    controller: Controller,
    inverter: Inverter,
}

static FAST_LOOP: Mutex<CriticalSectionRawMutex, RefCell<Option<FastLoop>>> =
    Mutex::new(RefCell::new(None));

/// コントローラとインバータを割り込みコンテキストへ渡す
///
/// 割り込みを有効化する前に呼ぶこと。
pub fn install(controller: Controller, inverter: Inverter) {
    FAST_LOOP.lock(|cell| {
        cell.replace(Some(FastLoop {
            controller,
            inverter,
        }));
    });
}

/// 推定器の内部状態を取り出す（未インストールならNone）
pub fn diagnostics() -> Option<Diagnostics> {
    FAST_LOOP.lock(|cell| {
        cell.borrow()
            .as_ref()
            .map(|ctx| ctx.controller.diagnostics())
    })
}

/// 1周期分の処理
#[inline(always)]
fn run_cycle() {
    FAST_LOOP.lock(|cell| {
        if let Some(ctx) = cell.borrow_mut().as_mut() {
            ctx.controller.fast_cycle(&mut ctx.inverter, &SHARED);

            if let Some(calibration) = ctx.controller.take_calibration() {
                CALIBRATION_SAVE.signal(calibration);
            }
            set_led_status(ctx.controller.state().into());
        }
    });
}

/// ADC1/ADC2割り込みのRust側エントリーポイント
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn ADC1_2() {
    current_sense::acknowledge();
    run_cycle();
}
