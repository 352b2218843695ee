//! モータードライバー実装
//!
//! TIM1の相補PWM、ADC1/ADC2の注入変換結果、Hall入力GPIOをまとめて
//! `g4_foc::motor_driver::MotorDriver` を実装します。

use embassy_stm32::{
    gpio::Input,
    peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use g4_foc::foc::PwmTiming;
use g4_foc::motor_driver::{MotorDriver, PhaseOutputs};
use g4_foc::sensing::RawSamples;

use crate::current_sense::CurrentSense;

/// 3相インバータ
pub struct Inverter {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    sense: CurrentSense,
    /// H1, H2, H3
    hall: [Input<'static>; 3],
    timing: PwmTiming,
}

impl Inverter {
    pub fn new(
        pwm: ComplementaryPwm<'static, peripherals::TIM1>,
        sense: CurrentSense,
        hall: [Input<'static>; 3],
        timing: PwmTiming,
    ) -> Self {
        Self {
            pwm,
            sense,
            hall,
            timing,
        }
    }

    fn set_channel(&mut self, channel: Channel, enable: bool) {
        if enable {
            self.pwm.enable(channel);
        } else {
            self.pwm.disable(channel);
        }
    }
}

impl MotorDriver for Inverter {
    fn read_samples(&mut self) -> RawSamples {
        self.sense.read()
    }

    fn read_hall(&mut self) -> u8 {
        self.hall
            .iter()
            .enumerate()
            .fold(0, |state, (bit, input)| state | (input.is_high() as u8) << bit)
    }

    fn set_duty_uvw(&mut self, duty: [u16; 3]) {
        self.pwm.set_duty(Channel::Ch1, duty[0]);
        self.pwm.set_duty(Channel::Ch2, duty[1]);
        self.pwm.set_duty(Channel::Ch3, duty[2]);
    }

    fn set_outputs(&mut self, outputs: PhaseOutputs) {
        self.set_channel(Channel::Ch1, outputs.u);
        self.set_channel(Channel::Ch2, outputs.v);
        self.set_channel(Channel::Ch3, outputs.w);
    }

    fn timing(&self) -> PwmTiming {
        self.timing
    }
}
