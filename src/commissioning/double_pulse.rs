//! ダブルパルス試験
//!
//! U相を停止、V相をローに固定し、W相をフルデューティで数周期オンにした後、
//! 短いパルスを1回、オフを1回出します。各周期のV相電流を記録します。

use crate::motor_driver::PhaseOutputs;

use super::PhaseCommand;

/// 記録するサンプル数
pub const CAPTURE_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DoublePulseStatus {
    Running(PhaseCommand),
    /// 記録した電流とサンプル数
    Complete([f32; CAPTURE_LEN], usize),
}

pub struct DoublePulse {
    first_pulse_cycles: u8,
    cycle: u8,
    capture: [f32; CAPTURE_LEN],
}

impl DoublePulse {
    pub fn new(first_pulse_cycles: u8) -> Self {
        Self {
            first_pulse_cycles: first_pulse_cycles.min(CAPTURE_LEN as u8 - 2),
            cycle: 0,
            capture: [0.0; CAPTURE_LEN],
        }
    }

    /// 1周期進める
    ///
    /// # Arguments
    /// * `current` - V相電流 [A]
    /// * `period` - PWM周期（フルスケール）
    pub fn step(&mut self, current: f32, period: u16) -> DoublePulseStatus {
        let cycle = self.cycle as usize;
        if cycle < CAPTURE_LEN {
            self.capture[cycle] = current;
        }

        let duty_w = if self.cycle < self.first_pulse_cycles {
            period
        } else if self.cycle == self.first_pulse_cycles {
            period / 10
        } else {
            debug!("Double pulse test done");
            return DoublePulseStatus::Complete(self.capture, cycle + 1);
        };
        self.cycle += 1;

        DoublePulseStatus::Running(PhaseCommand {
            duty: [0, 0, duty_w],
            outputs: PhaseOutputs::VW_ONLY,
        })
    }
}
