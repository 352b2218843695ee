#![no_std]
#![no_main]

// fmt.rsは他のモジュールより先に宣言する（マクロの可視性のため）
#[macro_use]
mod fmt;

mod current_sense;
mod eeprom;
mod fast_loop;
mod hardware;
mod motor_driver;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use g4_foc::config::ControlConfig;
use g4_foc::motor_driver::MotorDriver;
use g4_foc::Controller;

use tasks::{led_task, storage_task, supervisor_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("═══════════════════════════════════════════════════════");
    info!("");
    info!("     ██████╗ ██╗  ██╗    ███████╗ ██████╗  ██████╗");
    info!("    ██╔════╝ ██║  ██║    ██╔════╝██╔═══██╗██╔════╝");
    info!("    ██║  ███╗███████║    █████╗  ██║   ██║██║     ");
    info!("    ██║   ██║╚════██║    ██╔══╝  ██║   ██║██║     ");
    info!("    ╚██████╔╝     ██║    ██║     ╚██████╔╝╚██████╗");
    info!("     ╚═════╝      ╚═╝    ╚═╝      ╚═════╝  ╚═════╝");
    info!("");
    info!("     FOC Motor Controller • STM32G431VB @ 170MHz");
    info!("");
    info!("═══════════════════════════════════════════════════════");

    let mut board = hardware::init_board(p);
    let control_config = ControlConfig::default();
    let timing = board.inverter.timing();

    // キャリブレーションをフラッシュから読み込み（無ければ起動後に同定・学習）
    let mut controller = Controller::new(control_config);
    match eeprom::read_calibration(&mut board.flash, &mut board.crc) {
        Ok(calibration) => {
            info!("Calibration data loaded:");
            info!(
                "  R={} ohm, L={} H, flux={} Wb",
                calibration.motor.resistance,
                calibration.motor.inductance,
                calibration.motor.flux_linkage
            );
            controller.load_calibration(&calibration);
        }
        Err(e) => {
            info!("No calibration data ({:?}), commissioning on startup", e);
        }
    }

    spawner.spawn(led_task(board.leds)).unwrap();
    spawner
        .spawn(storage_task(board.flash, board.crc))
        .unwrap();
    spawner
        .spawn(supervisor_task(control_config, timing))
        .unwrap();

    info!("Starting FOC fast loop...");
    fast_loop::install(controller, board.inverter);
    unsafe {
        hardware::enable_fast_loop_interrupt();
    }

    loop {
        Timer::after(Duration::from_millis(1000)).await;
    }
}
