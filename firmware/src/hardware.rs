//! ハードウェア初期化モジュール
//!
//! クロック・PWM・ADC・Hall入力の初期化と、高速ループ割り込みの設定を集約します。
//! 高速ループはTIM1 OC4REF（tim_trgo2）で起動するADC注入変換の完了割り込みで回ります。

use embassy_stm32::{
    adc::{Adc, AdcChannel},
    crc::{Config as CrcConfig, Crc, InputReverseConfig, PolySize},
    flash::Flash,
    gpio::{Input, Level, Output, Pull, Speed},
    mode::Blocking,
    pac::{self, timer::vals::Mms2},
    time::Hertz,
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
        Channel,
    },
    Config, Peripherals,
};
use g4_foc::foc::PwmTiming;

use crate::current_sense::{self, CurrentSense};
use crate::motor_driver::Inverter;

/// タイマー入力クロック（APB2 = SYSCLK）
pub const TIMER_CLOCK_HZ: u32 = 170_000_000;

/// スイッチング周波数（センターアライン1周期）
pub const PWM_FREQUENCY: Hertz = Hertz(20_000);

/// デッドタイム [タイマーカウント]
pub const PWM_DEAD_TIME: u16 = 85;

/// 高速ループ割り込みの優先度（低速タスクより高い）
const FAST_LOOP_PRIORITY: u8 = 0x10;

/// TRGO2にOC4REFCを出すマスターモード
const MMS2_OC4REFC: u8 = 0b0111;

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, ClockMux};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        config.rcc.mux = clock_mux;
    }
    config
}

/// 初期化済みのボード資源
pub struct Board {
    pub inverter: Inverter,
    pub flash: Flash<'static, Blocking>,
    pub crc: Crc<'static>,
    pub leds: [Output<'static>; 3],
}

/// ボード一式を初期化
///
/// PWMはセンターアライン、全相出力停止の状態で返します。
/// CH4はADCトリガ専用で、OC4REFの立ち上がり（カウンタの山の直後）で注入変換が始まります。
///
/// ## ピン割り当て
/// - TIM1 CH1/CH1N = PE9/PE8（U相）、CH2/CH2N = PE11/PE10（V相）、CH3/CH3N = PE13/PE12（W相）
/// - 相電流: PA2（ADC1_IN3）、PA6（ADC2_IN3）、PB1（ADC1_IN12）
/// - 母線電圧: PC1（ADC2_IN7）
/// - スロットル: PB12（ADC1_IN11）
/// - Hall: PB6 / PB7 / PB8
/// - LED: PC13 / PC14 / PC15
pub fn init_board(p: Peripherals) -> Board {
    let mut pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, embassy_stm32::gpio::OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(
            p.PE8,
            embassy_stm32::gpio::OutputType::PushPull,
        )),
        Some(PwmPin::new(p.PE11, embassy_stm32::gpio::OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(
            p.PE10,
            embassy_stm32::gpio::OutputType::PushPull,
        )),
        Some(PwmPin::new(p.PE13, embassy_stm32::gpio::OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(
            p.PE12,
            embassy_stm32::gpio::OutputType::PushPull,
        )),
        None,
        None,
        PWM_FREQUENCY,
        CountingMode::CenterAlignedUpInterrupts,
    );
    pwm.disable(Channel::Ch1);
    pwm.disable(Channel::Ch2);
    pwm.disable(Channel::Ch3);
    pwm.set_dead_time(PWM_DEAD_TIME);

    let timing = PwmTiming {
        clock_hz: TIMER_CLOCK_HZ,
        period: pwm.get_max_duty(),
        prescaler: pac::TIM1.psc().read(),
    };

    // CH4は出力せずtim_trgo2の生成のみに使う
    pwm.set_duty(Channel::Ch4, timing.period - 1);
    pac::TIM1
        .cr2()
        .modify(|w| w.set_mms2(Mms2::from_bits(MMS2_OC4REFC)));
    info!(
        "PWM: ARR={}, PSC={}, {}Hz",
        timing.period,
        timing.prescaler,
        timing.frequency()
    );

    let sense = CurrentSense::new(
        Adc::new(p.ADC1),
        Adc::new(p.ADC2),
        [
            p.PA2.degrade_adc(),
            p.PB1.degrade_adc(),
            p.PB12.degrade_adc(),
        ],
        [p.PA6.degrade_adc(), p.PC1.degrade_adc()],
    );

    let hall = [
        Input::new(p.PB6, Pull::None),
        Input::new(p.PB7, Pull::None),
        Input::new(p.PB8, Pull::None),
    ];

    let inverter = Inverter::new(pwm, sense, hall, timing);

    // STM32デフォルトのCRC-32（poly=0x04C11DB7）
    let crc = match CrcConfig::new(
        InputReverseConfig::None,
        false,
        PolySize::Width32,
        0xFFFF_FFFF,
        0x04C1_1DB7,
    ) {
        Ok(config) => Crc::new(p.CRC, config),
        Err(_) => {
            error!("CRC config rejected");
            panic!("CRC config");
        }
    };

    let leds = [
        Output::new(p.PC13, Level::High, Speed::Low),
        Output::new(p.PC14, Level::High, Speed::Low),
        Output::new(p.PC15, Level::High, Speed::Low),
    ];

    Board {
        inverter,
        flash: Flash::new_blocking(p.FLASH),
        crc,
        leds,
    }
}

/// 高速ループ割り込み（ADC1_2の注入変換完了）を有効化
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn enable_fast_loop_interrupt() {
    current_sense::start();

    let mut cp = cortex_m::Peripherals::steal();
    cp.NVIC.set_priority(pac::Interrupt::ADC1_2, FAST_LOOP_PRIORITY);
    cortex_m::peripheral::NVIC::unmask(pac::Interrupt::ADC1_2);
    info!("ADC1_2 injected end-of-sequence interrupt enabled");
}
