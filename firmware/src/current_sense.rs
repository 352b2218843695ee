//! 注入変換による電流・電圧サンプリング
//!
//! TIM1のtim_trgo2（OC4REF）でADC1/ADC2の注入シーケンスを同時に起動します。
//! 変換はPWMの山（全ローサイドON）で行われ、高速ループはJDRレジスタを読むだけです。
//!
//! - ADC1: U相電流 → W相電流 → スロットル
//! - ADC2: V相電流 → 母線電圧

use embassy_stm32::{
    adc::{Adc, AnyAdcChannel, SampleTime},
    pac::{self, adc::vals::Exten},
    peripherals::{ADC1, ADC2},
};
use g4_foc::sensing::RawSamples;

/// 注入変換の外部トリガ選択（JEXT8 = tim1_trgo2）
const JEXTSEL_TIM1_TRGO2: u8 = 8;

/// 全注入チャネル共通のサンプル時間
const SAMPLE_TIME: SampleTime = SampleTime::CYCLES24_5;

/// ADC1/ADC2の注入チャネル一式
pub struct CurrentSense {
    _adc1: Adc<'static, ADC1>,
    _adc2: Adc<'static, ADC2>,
    _adc1_channels: [AnyAdcChannel<ADC1>; 3],
    _adc2_channels: [AnyAdcChannel<ADC2>; 2],
}

impl CurrentSense {
    /// 注入シーケンスを設定（トリガ待ちにはしない）
    ///
    /// # Arguments
    /// * `adc1_channels` - [U相電流, W相電流, スロットル]
    /// * `adc2_channels` - [V相電流, 母線電圧]
    pub fn new(
        adc1: Adc<'static, ADC1>,
        adc2: Adc<'static, ADC2>,
        adc1_channels: [AnyAdcChannel<ADC1>; 3],
        adc2_channels: [AnyAdcChannel<ADC2>; 2],
    ) -> Self {
        configure_injected(pac::ADC1, &adc1_channels.each_ref().map(|c| c.get_hw_channel()));
        configure_injected(pac::ADC2, &adc2_channels.each_ref().map(|c| c.get_hw_channel()));
        info!("ADC injected sequences on tim1_trgo2");

        Self {
            _adc1: adc1,
            _adc2: adc2,
            _adc1_channels: adc1_channels,
            _adc2_channels: adc2_channels,
        }
    }

    /// 直近の注入変換結果
    ///
    /// ADC1のシーケンス完了（JEOS）後に呼ぶこと。
    #[inline(always)]
    pub fn read(&self) -> RawSamples {
        let adc1 = pac::ADC1;
        let adc2 = pac::ADC2;
        RawSamples {
            phase_current: [
                adc1.jdr(0).read().jdata(),
                adc2.jdr(0).read().jdata(),
                adc1.jdr(1).read().jdata(),
            ],
            bus_voltage: adc2.jdr(1).read().jdata(),
            throttle: adc1.jdr(2).read().jdata(),
        }
    }
}

fn configure_injected(adc: pac::adc::Adc, channels: &[u8]) {
    for &channel in channels {
        let channel = channel as usize;
        adc.smpr(channel / 10)
            .modify(|w| w.set_smp(channel % 10, SAMPLE_TIME));
    }

    // JL=0 で1変換
    adc.jsqr().write(|w| {
        w.set_jl(channels.len() as u8 - 1);
        for (rank, &channel) in channels.iter().enumerate() {
            w.set_jsq(rank, channel);
        }
        w.set_jextsel(JEXTSEL_TIM1_TRGO2);
        w.set_jexten(Exten::RISING_EDGE);
    });
    adc.isr().write(|w| w.set_jeos(true));
}

/// 注入変換をトリガ待ちにし、ADC1のシーケンス完了割り込みを許可
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn start() {
    for adc in [pac::ADC1, pac::ADC2] {
        adc.cr().modify(|w| w.set_jadstart(true));
    }
    pac::ADC1.ier().modify(|w| w.set_jeosie(true));
}

/// ADC1の注入シーケンス完了フラグをクリア
#[inline(always)]
pub fn acknowledge() {
    pac::ADC1.isr().write(|w| w.set_jeos(true));
}
