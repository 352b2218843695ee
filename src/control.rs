//! 制御ステートマシン
//!
//! PWM周期ごとに `fast_cycle` が呼ばれ、以下を1回ずつ実行します。
//!
//! 1. 生サンプル・Hall状態の取得
//! 2. オフセットのウォームアップ（完了までブレーキ保持）
//! 3. 信号処理（Clark/Park）と過電流・過電圧監視
//! 4. 運転状態ごとの処理（角度推定、コミッショニング等）
//! 5. 電流制御・SVPWM、3相デューティの同時書き込み
//! 6. テレメトリの公開

pub mod startup;

pub use startup::OpenLoopStartup;

use crate::commissioning::double_pulse::CAPTURE_LEN;
use crate::commissioning::{
    DoublePulse, DoublePulseStatus, HallLearning, IdentificationStatus, LearningStatus,
    MotorIdentification, PhaseCommand,
};
use crate::config::{ControlConfig, StoredCalibration};
use crate::error::{FaultCode, FaultSnapshot, FaultState};
use crate::foc::hall_sensor::{detect_sensors, validate_state, SensorPresence};
use crate::foc::transforms::{inverse_clark, inverse_park, AlphaBeta, Dq};
use crate::foc::{
    calculate_gains, calculate_voltage_scaling, svpwm, AngleEvent, AngleTracker, CurrentController,
    CurrentGains, ElectricalAngle, EventRegister, FluxObserver, FocFrame, HallEstimator,
    HallTable, MotorParameters, PwmTiming,
};
use crate::motor_driver::{MotorDriver, PhaseOutputs};
use crate::protection::{ProtectionOutcome, ProtectionSupervisor};
use crate::sensing::{PhaseSensing, RawSamples};
use crate::state::{SharedControl, Telemetry};

/// 運転状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    Idle,
    Detecting,
    Measuring,
    HallRun,
    SensorlessRun,
    HallNearStationary,
    OpenLoopStartup,
    OpenLoopTransition,
    Align,
    Test,
    Error,
    Recovering,
}

/// 外部（コンソール等）からの状態遷移要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeRequest {
    Idle,
    Detect,
    Measure,
    Align,
    DoublePulseTest,
    HallNearStationary,
    OpenLoopStart,
}

/// 低速ループ向けの推定器の内部状態
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    pub state: MotorState,
    /// 電流オフセット [U, V, W]（ADCカウント）
    pub current_offsets: [f32; 3],
    /// 磁束ベクトルの角度（磁束ゼロならNone）
    pub flux_angle: Option<ElectricalAngle>,
    pub tracked_angle: ElectricalAngle,
    /// 直前のイベントからのサイクル数
    pub ticks_since_event: u32,
    /// 直前のイベント間隔 [cycles]
    pub event_period: f32,
    pub angle_step: f32,
    /// 投入された角度イベントの累計
    pub events_posted: u32,
    pub hall_center: ElectricalAngle,
}

/// 状態ごとの内部データ
enum Mode {
    Idle,
    /// Hallテーブル未学習なら学習を内包
    Detecting(Option<HallLearning>),
    Measuring(MotorIdentification),
    HallRun,
    SensorlessRun,
    HallNearStationary,
    OpenLoopStartup(OpenLoopStartup),
    OpenLoopTransition(OpenLoopStartup),
    Align,
    Test(DoublePulse),
    Error,
    Recovering,
}

impl Mode {
    fn state(&self) -> MotorState {
        match self {
            Mode::Idle => MotorState::Idle,
            Mode::Detecting(_) => MotorState::Detecting,
            Mode::Measuring(_) => MotorState::Measuring,
            Mode::HallRun => MotorState::HallRun,
            Mode::SensorlessRun => MotorState::SensorlessRun,
            Mode::HallNearStationary => MotorState::HallNearStationary,
            Mode::OpenLoopStartup(_) => MotorState::OpenLoopStartup,
            Mode::OpenLoopTransition(_) => MotorState::OpenLoopTransition,
            Mode::Align => MotorState::Align,
            Mode::Test(_) => MotorState::Test,
            Mode::Error => MotorState::Error,
            Mode::Recovering => MotorState::Recovering,
        }
    }
}

/// 1周期の出力
enum Output {
    /// 全相停止
    Break,
    /// 電流制御 → 逆変換 → SVPWM
    Foc,
    /// デューティ直接指定
    Direct(PhaseCommand),
}

/// 制御コア
pub struct Controller {
    config: ControlConfig,
    mode: Mode,
    frame: FocFrame,
    sensing: PhaseSensing,
    protection: ProtectionSupervisor,
    hall: HallEstimator,
    hall_table: HallTable,
    observer: FluxObserver,
    tracker: AngleTracker,
    events: EventRegister,
    current: CurrentController,
    motor: MotorParameters,
    fault: FaultState,
    /// 最後にドライバーへ書いた出力許可（None: 未書き込み）
    applied_outputs: Option<PhaseOutputs>,
    /// 起動時に有効な校正データを読み込んだか
    calibration_loaded: bool,
    /// 未保存の校正結果がある
    calibration_dirty: bool,
    double_pulse_capture: Option<([f32; CAPTURE_LEN], usize)>,
}

impl Controller {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            mode: Mode::Idle,
            frame: FocFrame::new(),
            sensing: PhaseSensing::new(config.sensing),
            protection: ProtectionSupervisor::new(config.protection),
            hall: HallEstimator::new(),
            hall_table: HallTable::empty(),
            observer: FluxObserver::new(config.observer),
            tracker: AngleTracker::new(config.tracker),
            events: EventRegister::new(),
            current: CurrentController::new(
                CurrentGains::default(),
                Default::default(),
                config.modulation.control_divisor,
            ),
            motor: MotorParameters {
                flux_linkage: config.flux_linkage,
                ..Default::default()
            },
            fault: FaultState::new(),
            applied_outputs: None,
            calibration_loaded: false,
            calibration_dirty: false,
            double_pulse_capture: None,
        }
    }

    /// 永続化された校正データを適用（起動時）
    ///
    /// ウォームアップ完了後はコミッショニングを飛ばしてHallRunに入ります。
    pub fn load_calibration(&mut self, calibration: &StoredCalibration) {
        self.hall_table = calibration.hall_table;
        self.motor = calibration.motor;
        self.calibration_loaded = true;
        info!(
            "Calibration loaded: R={} L={} flux={}",
            self.motor.resistance,
            self.motor.inductance,
            self.motor.flux_linkage
        );
    }

    /// 未保存の校正結果を1回だけ取り出す
    pub fn take_calibration(&mut self) -> Option<StoredCalibration> {
        if !self.calibration_dirty {
            return None;
        }
        self.calibration_dirty = false;
        Some(StoredCalibration::new(self.hall_table, self.motor))
    }

    /// 故障を解除してDetectingへ戻る
    pub fn reset_fault(&mut self) {
        info!("Fault reset (was {:?})", self.fault.code());
        self.fault.clear();
        self.protection.reset();
        self.current.reset();
        self.tracker.reset();
        self.hall.reset();
        self.observer.reset();
        self.events.clear();
        // 次の出力で許可を書き直す
        self.applied_outputs = None;
        self.transition(Mode::Detecting(None));
    }

    /// 外部からの状態遷移要求
    ///
    /// 故障ラッチ中は受け付けません。
    pub fn request(&mut self, request: ModeRequest) -> Result<(), FaultCode> {
        if let Some(code) = self.fault.code() {
            warn!("Mode request {:?} rejected: fault {:?}", request, code);
            return Err(code);
        }
        let mode = match request {
            ModeRequest::Idle => Mode::Idle,
            ModeRequest::Detect => Mode::Detecting(None),
            ModeRequest::Measure => Mode::Measuring(MotorIdentification::new(
                self.config.identification,
            )),
            ModeRequest::Align => Mode::Align,
            ModeRequest::DoublePulseTest => {
                Mode::Test(DoublePulse::new(self.config.double_pulse_cycles))
            }
            ModeRequest::HallNearStationary => Mode::HallNearStationary,
            ModeRequest::OpenLoopStart => Mode::OpenLoopStartup(OpenLoopStartup::new(
                self.config.openloop,
            )),
        };
        self.current.reset();
        self.transition(mode);
        Ok(())
    }

    /// 高速ループ1周期
    pub fn fast_cycle<D: MotorDriver>(&mut self, driver: &mut D, shared: &SharedControl) {
        if shared.take_fault_reset() {
            self.reset_fault();
        }

        let raw = driver.read_samples();
        let hall_state = driver.read_hall();
        let timing = driver.timing();

        if !self.sensing.is_warmed_up() {
            if self.sensing.accumulate_offsets(&raw) {
                self.finish_warmup(&raw, hall_state, &timing, shared);
            }
            self.apply_outputs(driver, PhaseOutputs::NONE);
            return;
        }

        self.sensing.process(&raw, &mut self.frame, timing.period);

        if let Some(scaling) = shared.voltage_scaling() {
            self.frame.scaling = scaling;
            self.current.set_limits(scaling.limits);
        }
        self.frame.idq_req = shared.current_request();

        match self
            .protection
            .check(&raw, hall_state, &mut self.frame.idq_req)
        {
            ProtectionOutcome::Normal => {}
            ProtectionOutcome::Violation(_) => shared.set_current_request(self.frame.idq_req),
            ProtectionOutcome::Trip(snapshot) => {
                shared.set_current_request(self.frame.idq_req);
                self.enter_error(FaultCode::OverLimit, snapshot);
            }
        }

        let output = self.dispatch(&raw, hall_state, &timing, shared);

        match output {
            // 故障中は毎周期ソフトウェアブレークを書き直す
            Output::Break if self.fault.break_active() => {
                driver.set_outputs(PhaseOutputs::NONE);
                self.applied_outputs = Some(PhaseOutputs::NONE);
            }
            Output::Break => {
                self.apply_outputs(driver, PhaseOutputs::NONE);
            }
            Output::Foc => {
                self.run_current_loop(&timing);
                driver.set_duty_uvw(self.frame.duty);
                self.apply_outputs(driver, PhaseOutputs::ALL);
            }
            Output::Direct(command) => {
                self.frame.vdq = Dq::ZERO;
                self.frame.vab = AlphaBeta::default();
                self.frame.duty = command.duty;
                driver.set_duty_uvw(command.duty);
                self.apply_outputs(driver, command.outputs);
            }
        }

        shared.publish_telemetry(&Telemetry {
            vdq: self.frame.vdq,
            idq: self.frame.idq,
            bus_voltage: self.frame.bus_voltage,
            throttle: raw.throttle,
        });
    }

    fn finish_warmup(
        &mut self,
        raw: &RawSamples,
        hall_state: u8,
        timing: &PwmTiming,
        shared: &SharedControl,
    ) {
        self.sensing.convert(raw);
        let bus_voltage = self.sensing.bus_voltage();
        match calculate_voltage_scaling(
            bus_voltage,
            timing,
            &self.config.modulation,
            self.config.supervisor.field_weakening_ratio,
        ) {
            Some(scaling) => {
                self.frame.scaling = scaling;
                self.current.set_limits(scaling.limits);
                shared.set_voltage_scaling(&scaling);
            }
            None => warn!("No bus voltage at end of warm-up: {}", bus_voltage),
        }
        self.update_gains(timing);

        info!("Offset warm-up done, bus={}V", bus_voltage);
        if self.calibration_loaded {
            self.enter_hall_run(hall_state);
        } else {
            self.transition(Mode::Measuring(MotorIdentification::new(
                self.config.identification,
            )));
        }
    }

    fn update_gains(&mut self, timing: &PwmTiming) {
        let gains = if self.motor.is_identified() {
            calculate_gains(&self.motor, timing, &self.config.modulation)
        } else {
            CurrentGains::default()
        };
        self.frame.gains = gains;
        self.current.set_gains(gains);
        debug!("Gains: kp={} ki={}", gains.kp_q, gains.ki_q);
    }

    fn dispatch(
        &mut self,
        raw: &RawSamples,
        hall_state: u8,
        timing: &PwmTiming,
        shared: &SharedControl,
    ) -> Output {
        let override_angle = shared.angle_override().map(ElectricalAngle);

        let mut next = None;
        let mut identified = false;
        let output = match &mut self.mode {
            Mode::Idle | Mode::Recovering => Output::Break,

            Mode::Error => {
                self.fault.set_break(true);
                Output::Break
            }

            Mode::Detecting(learning) => match learning {
                Some(learning) => match learning.step(hall_state) {
                    LearningStatus::Running(command) => {
                        self.frame.angle = command.angle;
                        self.frame.idq_req = command.idq_req;
                        Output::Foc
                    }
                    LearningStatus::Complete(table) => {
                        self.hall_table = table;
                        self.calibration_dirty = true;
                        next = Some(Mode::HallRun);
                        Output::Break
                    }
                },
                None => match detect_sensors(hall_state) {
                    SensorPresence::Absent => {
                        info!("No Hall sensors, sensorless start");
                        next = Some(Mode::OpenLoopStartup(OpenLoopStartup::new(
                            self.config.openloop,
                        )));
                        Output::Break
                    }
                    SensorPresence::Faulty => {
                        self.enter_error(FaultCode::GenericHallFault, snapshot(raw, hall_state));
                        Output::Break
                    }
                    SensorPresence::Present if self.hall_table.is_calibrated() => {
                        next = Some(Mode::HallRun);
                        Output::Break
                    }
                    SensorPresence::Present => {
                        info!("Hall sensors present, learning table");
                        *learning = Some(HallLearning::new(self.config.hall_learning));
                        Output::Break
                    }
                },
            },

            Mode::Measuring(identification) => {
                if self.calibration_loaded {
                    next = Some(Mode::HallRun);
                    Output::Break
                } else {
                    match identification.step(self.frame.i_uvw[1], self.frame.bus_voltage, timing)
                    {
                        IdentificationStatus::Running(command) => Output::Direct(command),
                        IdentificationStatus::Complete(result) => {
                            self.motor.resistance = result.resistance;
                            self.motor.inductance = result.inductance;
                            self.motor.flux_linkage = self.config.flux_linkage;
                            self.calibration_dirty = true;
                            identified = true;
                            next = Some(Mode::Detecting(None));
                            Output::Break
                        }
                    }
                }
            }

            Mode::HallRun => {
                match self
                    .hall
                    .update(&self.hall_table, hall_state, self.tracker.angle())
                {
                    Ok(Some(edge)) => self.events.post(AngleEvent::Hall(edge)),
                    Ok(None) => {}
                    Err(code) => {
                        self.enter_error(code, snapshot(raw, hall_state));
                        return Output::Break;
                    }
                }
                self.frame.angle = self.tracker.update(self.events.take());
                Output::Foc
            }

            Mode::SensorlessRun => {
                if let Some(crossing) = self.observer.update(
                    self.frame.vab,
                    self.frame.iab,
                    &self.motor,
                    timing.period_seconds(),
                ) {
                    self.events.post(AngleEvent::Flux(crossing));
                }
                self.frame.angle = self.tracker.update(self.events.take());
                Output::Foc
            }

            Mode::HallNearStationary => match validate_state(hall_state) {
                Ok(state) => {
                    let center = self
                        .hall_table
                        .sector(state)
                        .map_or(ElectricalAngle::ZERO, |s| ElectricalAngle(s.center));
                    self.tracker.set_hall_center(center);
                    self.tracker.set_angle(center);
                    self.frame.angle = center;
                    Output::Foc
                }
                Err(code) => {
                    self.enter_error(code, snapshot(raw, hall_state));
                    Output::Break
                }
            },

            Mode::OpenLoopStartup(startup) => {
                self.frame.angle = startup.advance();
                self.frame.idq_req = startup.reference();
                if startup.ramp_complete() {
                    self.observer.reset();
                    self.tracker.reset();
                    self.events.clear();
                    next = Some(Mode::OpenLoopTransition(*startup));
                }
                Output::Foc
            }

            Mode::OpenLoopTransition(startup) => {
                let angle = startup.advance();
                self.frame.idq_req = startup.reference();
                let crossing = self.observer.update(
                    self.frame.vab,
                    self.frame.iab,
                    &self.motor,
                    timing.period_seconds(),
                );
                if let Some(crossing) = crossing {
                    self.events.post(AngleEvent::Flux(crossing));
                }
                self.tracker.update(self.events.take());
                if crossing.is_some() && startup.note_crossing() {
                    self.tracker.set_angle(angle);
                    next = Some(Mode::SensorlessRun);
                }
                self.frame.angle = angle;
                Output::Foc
            }

            Mode::Align => {
                self.frame.angle = ElectricalAngle::ZERO;
                self.frame.idq_req = Dq::new(self.config.hall_learning.align_current, 0.0);
                Output::Foc
            }

            Mode::Test(test) => match test.step(self.frame.i_uvw[1], timing.period) {
                DoublePulseStatus::Running(command) => Output::Direct(command),
                DoublePulseStatus::Complete(capture, len) => {
                    self.double_pulse_capture = Some((capture, len));
                    next = Some(Mode::Idle);
                    Output::Break
                }
            },
        };

        if identified {
            self.update_gains(timing);
        }

        if let Some(mode) = next {
            if matches!(mode, Mode::HallRun) {
                self.enter_hall_run(hall_state);
            } else {
                self.transition(mode);
            }
        }

        if let (Some(angle), Output::Foc) = (override_angle, &output) {
            self.tracker.set_angle(angle);
            self.frame.angle = angle;
        }

        output
    }

    /// 電流制御 → 逆Park（今周期の角度）→ 逆Clark → SVPWM
    fn run_current_loop(&mut self, timing: &PwmTiming) {
        let sincos = self.frame.angle.sincos();
        self.frame.vdq = self.current.update(self.frame.idq_req, self.frame.idq);
        self.frame.vab = inverse_park(self.frame.vdq, sincos);
        self.frame.duty = svpwm::modulate(
            inverse_clark(self.frame.vab),
            self.frame.scaling.vab_to_pwm,
            timing.period,
        );
        // 次周期のPark変換はこの角度で取得したサンプルに対して行う
        self.frame.sincos = sincos;
    }

    fn enter_hall_run(&mut self, hall_state: u8) {
        self.hall.reset();
        self.tracker.reset();
        self.events.clear();
        self.current.reset();
        // 最初の読み取りは区間中心に合わせるだけで速度推定には使わない
        if let Ok(Some(edge)) = self
            .hall
            .update(&self.hall_table, hall_state, ElectricalAngle::ZERO)
        {
            self.tracker.set_angle(edge.center);
            self.tracker.set_hall_center(edge.center);
        }
        self.transition(Mode::HallRun);
    }

    fn enter_error(&mut self, code: FaultCode, snapshot: FaultSnapshot) {
        error!("Fault {:?}, entering Error", code);
        self.fault.latch(code, snapshot);
        self.current.reset();
        self.transition(Mode::Error);
    }

    fn transition(&mut self, mode: Mode) {
        let from = self.mode.state();
        let to = mode.state();
        if from != to {
            info!("State {:?} -> {:?}", from, to);
        }
        self.mode = mode;
    }

    fn apply_outputs<D: MotorDriver>(&mut self, driver: &mut D, outputs: PhaseOutputs) {
        if self.applied_outputs != Some(outputs) {
            driver.set_outputs(outputs);
            self.applied_outputs = Some(outputs);
        }
    }

    pub fn state(&self) -> MotorState {
        self.mode.state()
    }

    pub fn fault(&self) -> &FaultState {
        &self.fault
    }

    pub fn frame(&self) -> &FocFrame {
        &self.frame
    }

    pub fn motor(&self) -> &MotorParameters {
        &self.motor
    }

    pub fn hall_table(&self) -> &HallTable {
        &self.hall_table
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let phases = self.sensing.phases();
        Diagnostics {
            state: self.state(),
            current_offsets: [phases[0].offset, phases[1].offset, phases[2].offset],
            flux_angle: self.observer.angle(&self.motor),
            tracked_angle: self.tracker.angle(),
            ticks_since_event: self.tracker.ticks_since_event(),
            event_period: self.tracker.last_period(),
            angle_step: self.tracker.angle_step(),
            events_posted: self.events.generation(),
            hall_center: self.hall.current_center(),
        }
    }

    /// 直近のダブルパルス試験で記録したV相電流
    pub fn double_pulse_capture(&self) -> Option<&[f32]> {
        self.double_pulse_capture
            .as_ref()
            .map(|(capture, len)| &capture[..*len])
    }
}

fn snapshot(raw: &RawSamples, hall_state: u8) -> FaultSnapshot {
    FaultSnapshot {
        phase_current: raw.phase_current,
        bus_voltage: raw.bus_voltage,
        hall_state,
    }
}
