//! 制御コアの設定パラメータ（デフォルト値）

/// ADCオフセットのウォームアップサンプル数
pub const DEFAULT_OFFSET_WARMUP_SAMPLES: u16 = 1000;

/// 電流検出ゲイン [A/count]
pub const DEFAULT_CURRENT_GAIN: f32 = 0.0403;

/// 電圧検出ゲイン [V/count]（分圧比込み）
pub const DEFAULT_VOLTAGE_GAIN: f32 = 0.0128;

/// PWM周期カウント（ARR）
pub const DEFAULT_PWM_PERIOD_COUNTS: u16 = 1024;

/// モーターパラメータ（コミッショニング前の初期値）
pub mod motor {
    /// 磁束鎖交数 [Wb]
    pub const DEFAULT_FLUX_LINKAGE: f32 = 0.0045;
}

/// 保護監視
pub mod protection {
    /// 電流生値の上限 [count]
    pub const DEFAULT_RAW_CURRENT_LIMIT: u16 = 3900;

    /// 電圧生値の上限 [count]
    pub const DEFAULT_RAW_VOLTAGE_LIMIT: u16 = 3500;

    /// 違反時の電流指令縮小率
    pub const DEFAULT_REFERENCE_DERATE: f32 = 0.9;

    /// エラーへ遷移する連続違反回数
    pub const DEFAULT_TRIP_COUNT: u8 = 3;
}

/// 電流制御・変調
pub mod modulation {
    /// 電流制御の更新分周（FOC_PERIODS）
    pub const DEFAULT_CONTROL_DIVISOR: u16 = 1;

    /// 比例ゲイン係数（kp = f_pwm * L * 係数）
    pub const DEFAULT_KP_FACTOR: f32 = 0.5;

    /// 積分ゲイン係数（ki = R * 係数）
    pub const DEFAULT_KI_FACTOR: f32 = 0.05;

    /// 最大変調率
    pub const DEFAULT_MAX_MODULATION: f32 = 0.95;

    /// SVPWMによる電圧利用率の拡大（2/√3）
    pub const DEFAULT_SVPWM_MULTIPLIER: f32 = 1.154_700_5;

    /// d軸電圧上限の割合
    pub const DEFAULT_VD_MAX_PROPORTION: f32 = 0.3;

    /// q軸電圧上限の割合
    pub const DEFAULT_VQ_MAX_PROPORTION: f32 = 0.95;

    /// 2相Clark選択の飽和しきい値（ARR比）
    pub const DEFAULT_CLARK_SATURATION_RATIO: f32 = 0.88;
}

/// 磁束オブザーバ
pub mod observer {
    /// ゼロクロス後のブランキングサイクル数
    pub const DEFAULT_BLANKING_CYCLES: u16 = 10;

    /// 積分器の減衰係数（1.0で減衰なし）
    pub const DEFAULT_FLUX_DECAY: f32 = 1.0;

    /// αが正のクロス時の粗角度（45°、ψα = ψβ > 0）
    pub const CROSSING_ANGLE_POSITIVE: u16 = 8192;

    /// αが負のクロス時の粗角度（225°、ψα = ψβ < 0）
    pub const CROSSING_ANGLE_NEGATIVE: u16 = 40960;
}

/// 角度トラッカー
pub mod tracker {
    /// イベント到着時の平滑化係数
    pub const DEFAULT_EVENT_SMOOTHING: f32 = 0.2;

    /// イベント無しでタイムアウトするサイクル数
    pub const DEFAULT_TIMEOUT_CYCLES: u32 = 3000;

    /// タイムアウト後の経過カウンタ再開値
    pub const DEFAULT_RESTART_CYCLES: u32 = 1501;

    /// タイムアウト後の仮周期 [cycles]
    pub const DEFAULT_RESTART_PERIOD: f32 = 500.0;
}

/// 抵抗・インダクタンス同定
pub mod identification {
    /// 低電流点の終了サイクル
    pub const DEFAULT_LOW_POINT_END: u32 = 5000;

    /// 高電流点の終了サイクル
    pub const DEFAULT_HIGH_POINT_END: u32 = 10000;

    /// 同定全体の終了サイクル
    pub const DEFAULT_TOTAL_CYCLES: u32 = 65000;

    /// 低電流点の目標帯 [A]
    pub const DEFAULT_LOW_BAND: (f32, f32) = (3.0, 10.0);

    /// 高電流点の目標帯 [A]
    pub const DEFAULT_HIGH_BAND: (f32, f32) = (10.0, 20.0);

    /// 抵抗測定の指数フィルタ係数
    pub const DEFAULT_RESISTANCE_FILTER: f32 = 0.01;

    /// インダクタンス測定の指数フィルタ係数
    pub const DEFAULT_INDUCTANCE_FILTER: f32 = 0.001;

    /// リップル注入時のデューティ倍率
    pub const DEFAULT_RIPPLE_DUTY_MULTIPLIER: u16 = 2;

    /// インダクタンスの下限 [H]
    pub const DEFAULT_INDUCTANCE_FLOOR: f32 = 1.0e-5;
}

/// Hallテーブル学習
pub mod hall_learning {
    /// ロータ整列のサイクル数
    pub const DEFAULT_ALIGN_CYCLES: u32 = 65535;

    /// 整列・掃引時のd軸電流 [A]
    pub const DEFAULT_ALIGN_CURRENT: f32 = 10.0;

    /// 掃引時の1サイクルあたりの角度ステップ
    pub const DEFAULT_SWEEP_STEP: u16 = 1;
}

/// オープンループ始動
pub mod openloop {
    /// 1サイクルあたりの角度ステップ
    pub const DEFAULT_ANGLE_STEP: u16 = 8;

    /// 始動時のq軸電流 [A]
    pub const DEFAULT_STARTUP_CURRENT: f32 = 5.0;

    /// 強制転流のサイクル数
    pub const DEFAULT_STARTUP_CYCLES: u32 = 40000;

    /// センサレスへ移行するのに必要な磁束イベント数
    pub const DEFAULT_HANDOVER_EVENTS: u16 = 12;
}

/// ダブルパルステスト
pub mod double_pulse {
    /// 1発目のパルス幅 [cycles]
    pub const DEFAULT_FIRST_PULSE_CYCLES: u8 = 7;
}

/// スーパーバイザ（低速ループ）
pub mod supervisor {
    /// スロットル不感帯 [count]
    pub const DEFAULT_THROTTLE_DEADBAND: u16 = 1200;

    /// スロットルゲイン [A/count]
    pub const DEFAULT_THROTTLE_GAIN: f32 = 0.02;

    /// 弱め界磁の開始比率（Vq_maxに対する割合）
    pub const DEFAULT_FIELD_WEAKENING_RATIO: f32 = 0.8;

    /// 弱め界磁ゲイン [A/V]
    pub const DEFAULT_FIELD_WEAKENING_GAIN: f32 = 2.0;

    /// バッテリー最大電力 [W]
    pub const DEFAULT_BATTERY_MAX_POWER: f32 = 250.0;
}
