//! 制御コアの設定
//!
//! `params` のデフォルト値を集約した `ControlConfig` と、
//! フラッシュ保存用の `StoredCalibration` を提供します。

pub mod params;
pub mod storage;

pub use params::*;
pub use storage::{SoftCrc32, StorageError, StoredCalibration, WordChecksum, CALIBRATION_WORDS};

/// Clark変換の選択方式
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClarkMode {
    /// 飽和していない2相を選んで変換（全相が非飽和なら3相）
    Adaptive,
    /// 常に3相変換
    ThreePhase,
}

/// 信号処理の設定
#[derive(Debug, Clone, Copy)]
pub struct SensingConfig {
    pub warmup_samples: u16,
    pub current_gain: f32,
    pub voltage_gain: f32,
    pub clark_mode: ClarkMode,
    pub clark_saturation_ratio: f32,
}

/// 保護監視の設定
#[derive(Debug, Clone, Copy)]
pub struct ProtectionConfig {
    pub raw_current_limit: u16,
    pub raw_voltage_limit: u16,
    pub reference_derate: f32,
    pub trip_count: u8,
}

/// 電流制御・変調の設定
#[derive(Debug, Clone, Copy)]
pub struct ModulationConfig {
    pub control_divisor: u16,
    pub kp_factor: f32,
    pub ki_factor: f32,
    pub max_modulation: f32,
    pub svpwm_multiplier: f32,
    pub vd_max_proportion: f32,
    pub vq_max_proportion: f32,
}

/// 磁束オブザーバの設定
#[derive(Debug, Clone, Copy)]
pub struct ObserverConfig {
    pub blanking_cycles: u16,
    pub flux_decay: f32,
}

/// 角度トラッカーの設定
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub event_smoothing: f32,
    pub timeout_cycles: u32,
    pub restart_cycles: u32,
    pub restart_period: f32,
}

/// 抵抗・インダクタンス同定の設定
#[derive(Debug, Clone, Copy)]
pub struct IdentificationConfig {
    pub low_point_end: u32,
    pub high_point_end: u32,
    pub total_cycles: u32,
    pub low_band: (f32, f32),
    pub high_band: (f32, f32),
    pub resistance_filter: f32,
    pub inductance_filter: f32,
    pub ripple_duty_multiplier: u16,
    pub inductance_floor: f32,
}

/// Hallテーブル学習の設定
#[derive(Debug, Clone, Copy)]
pub struct HallLearningConfig {
    pub align_cycles: u32,
    pub align_current: f32,
    pub sweep_step: u16,
}

/// オープンループ始動の設定
#[derive(Debug, Clone, Copy)]
pub struct OpenLoopConfig {
    pub angle_step: u16,
    pub startup_current: f32,
    pub startup_cycles: u32,
    pub handover_events: u16,
}

/// スーパーバイザの設定
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub throttle_deadband: u16,
    pub throttle_gain: f32,
    pub field_weakening_ratio: f32,
    pub field_weakening_gain: f32,
    pub battery_max_power: f32,
}

/// 制御コア全体の設定
#[derive(Debug, Clone, Copy)]
pub struct ControlConfig {
    pub sensing: SensingConfig,
    pub protection: ProtectionConfig,
    pub modulation: ModulationConfig,
    pub observer: ObserverConfig,
    pub tracker: TrackerConfig,
    pub identification: IdentificationConfig,
    pub hall_learning: HallLearningConfig,
    pub openloop: OpenLoopConfig,
    pub double_pulse_cycles: u8,
    pub flux_linkage: f32,
    pub supervisor: SupervisorConfig,
}

impl ControlConfig {
    /// デフォルト設定を生成（params.rsの値を使用）
    pub const fn default() -> Self {
        Self {
            sensing: SensingConfig {
                warmup_samples: DEFAULT_OFFSET_WARMUP_SAMPLES,
                current_gain: DEFAULT_CURRENT_GAIN,
                voltage_gain: DEFAULT_VOLTAGE_GAIN,
                clark_mode: ClarkMode::Adaptive,
                clark_saturation_ratio: modulation::DEFAULT_CLARK_SATURATION_RATIO,
            },
            protection: ProtectionConfig {
                raw_current_limit: protection::DEFAULT_RAW_CURRENT_LIMIT,
                raw_voltage_limit: protection::DEFAULT_RAW_VOLTAGE_LIMIT,
                reference_derate: protection::DEFAULT_REFERENCE_DERATE,
                trip_count: protection::DEFAULT_TRIP_COUNT,
            },
            modulation: ModulationConfig {
                control_divisor: modulation::DEFAULT_CONTROL_DIVISOR,
                kp_factor: modulation::DEFAULT_KP_FACTOR,
                ki_factor: modulation::DEFAULT_KI_FACTOR,
                max_modulation: modulation::DEFAULT_MAX_MODULATION,
                svpwm_multiplier: modulation::DEFAULT_SVPWM_MULTIPLIER,
                vd_max_proportion: modulation::DEFAULT_VD_MAX_PROPORTION,
                vq_max_proportion: modulation::DEFAULT_VQ_MAX_PROPORTION,
            },
            observer: ObserverConfig {
                blanking_cycles: observer::DEFAULT_BLANKING_CYCLES,
                flux_decay: observer::DEFAULT_FLUX_DECAY,
            },
            tracker: TrackerConfig {
                event_smoothing: tracker::DEFAULT_EVENT_SMOOTHING,
                timeout_cycles: tracker::DEFAULT_TIMEOUT_CYCLES,
                restart_cycles: tracker::DEFAULT_RESTART_CYCLES,
                restart_period: tracker::DEFAULT_RESTART_PERIOD,
            },
            identification: IdentificationConfig {
                low_point_end: identification::DEFAULT_LOW_POINT_END,
                high_point_end: identification::DEFAULT_HIGH_POINT_END,
                total_cycles: identification::DEFAULT_TOTAL_CYCLES,
                low_band: identification::DEFAULT_LOW_BAND,
                high_band: identification::DEFAULT_HIGH_BAND,
                resistance_filter: identification::DEFAULT_RESISTANCE_FILTER,
                inductance_filter: identification::DEFAULT_INDUCTANCE_FILTER,
                ripple_duty_multiplier: identification::DEFAULT_RIPPLE_DUTY_MULTIPLIER,
                inductance_floor: identification::DEFAULT_INDUCTANCE_FLOOR,
            },
            hall_learning: HallLearningConfig {
                align_cycles: hall_learning::DEFAULT_ALIGN_CYCLES,
                align_current: hall_learning::DEFAULT_ALIGN_CURRENT,
                sweep_step: hall_learning::DEFAULT_SWEEP_STEP,
            },
            openloop: OpenLoopConfig {
                angle_step: openloop::DEFAULT_ANGLE_STEP,
                startup_current: openloop::DEFAULT_STARTUP_CURRENT,
                startup_cycles: openloop::DEFAULT_STARTUP_CYCLES,
                handover_events: openloop::DEFAULT_HANDOVER_EVENTS,
            },
            double_pulse_cycles: double_pulse::DEFAULT_FIRST_PULSE_CYCLES,
            flux_linkage: motor::DEFAULT_FLUX_LINKAGE,
            supervisor: SupervisorConfig {
                throttle_deadband: supervisor::DEFAULT_THROTTLE_DEADBAND,
                throttle_gain: supervisor::DEFAULT_THROTTLE_GAIN,
                field_weakening_ratio: supervisor::DEFAULT_FIELD_WEAKENING_RATIO,
                field_weakening_gain: supervisor::DEFAULT_FIELD_WEAKENING_GAIN,
                battery_max_power: supervisor::DEFAULT_BATTERY_MAX_POWER,
            },
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::default()
    }
}
