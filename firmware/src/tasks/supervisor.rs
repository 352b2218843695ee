//! 低速ループタスク
//!
//! 100Hzで `Supervisor::slow_cycle` を実行し、電流指令と電圧スケーリングを更新します。

use embassy_time::{Duration, Ticker};
use g4_foc::config::ControlConfig;
use g4_foc::foc::PwmTiming;
use g4_foc::Supervisor;

use crate::fast_loop;
use crate::state::SHARED;

/// 低速ループ周期 [ms]
const SLOW_LOOP_PERIOD_MS: u64 = 10;

/// ステータスログ間隔（周期数）
const LOG_INTERVAL: u32 = 100;

#[embassy_executor::task]
pub async fn supervisor_task(config: ControlConfig, timing: PwmTiming) {
    info!("Supervisor task started ({}ms)", SLOW_LOOP_PERIOD_MS);

    let mut supervisor = Supervisor::new(&config);
    let mut ticker = Ticker::every(Duration::from_millis(SLOW_LOOP_PERIOD_MS));
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        let status = supervisor.slow_cycle(&SHARED, &timing);

        log_counter += 1;
        if log_counter >= LOG_INTERVAL {
            log_counter = 0;
            let telemetry = SHARED.telemetry();
            debug!(
                "Vbus={}V Iq_req={}A Id_req={}A P={}W limited={}",
                telemetry.bus_voltage,
                status.idq_req.q,
                status.idq_req.d,
                status.request_power,
                status.power_limited
            );
            if let Some(diagnostics) = fast_loop::diagnostics() {
                debug!(
                    "{:?} angle={} flux_angle={:?} period={} events={} hall_center={}",
                    diagnostics.state,
                    diagnostics.tracked_angle.raw(),
                    diagnostics.flux_angle.map(|angle| angle.raw()),
                    diagnostics.event_period,
                    diagnostics.events_posted,
                    diagnostics.hall_center.raw()
                );
            }
        }
    }
}
