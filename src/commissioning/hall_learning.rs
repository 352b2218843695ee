//! Hallテーブル学習
//!
//! d軸電流で角度0に整列したあと、指令角を1回転ぶん正転・逆転で掃引し、
//! Hall状態ごとに観測角度の総和とサンプル数を集計します。
//! 読み取ったHall状態は前周期に指令した角度に対応します。

use crate::config::HallLearningConfig;
use crate::foc::angle::HALF_TURN;
use crate::foc::hall_sensor::{HallSector, HallTable};
use crate::foc::transforms::Dq;
use crate::foc::ElectricalAngle;

const FULL_TURN: u32 = 65536;

/// 学習の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LearningPhase {
    /// 整列中（残り周期）
    Align { remaining: u32 },
    SweepForward,
    SweepBackward,
    Done,
}

/// 1周期分の指令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LearningCommand {
    pub angle: ElectricalAngle,
    pub idq_req: Dq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LearningStatus {
    Running(LearningCommand),
    Complete(HallTable),
}

/// Hall状態ごとの集計
#[derive(Debug, Clone, Copy, Default)]
struct SectorTally {
    sum: u64,
    count: u32,
}

pub struct HallLearning {
    config: HallLearningConfig,
    phase: LearningPhase,
    angle: ElectricalAngle,
    /// 現在の掃引で進んだ角度
    swept: u32,
    tallies: [SectorTally; 6],
    /// 角度0をまたぐHall状態
    rollover_state: Option<u8>,
}

impl HallLearning {
    pub fn new(config: HallLearningConfig) -> Self {
        Self {
            config,
            phase: LearningPhase::Align {
                remaining: config.align_cycles,
            },
            angle: ElectricalAngle::ZERO,
            swept: 0,
            tallies: [SectorTally::default(); 6],
            rollover_state: None,
        }
    }

    pub fn phase(&self) -> LearningPhase {
        self.phase
    }

    /// 1周期進める
    ///
    /// # Arguments
    /// * `hall_state` - 今周期のHall状態（前周期の指令角に対応）
    pub fn step(&mut self, hall_state: u8) -> LearningStatus {
        let step = self.config.sweep_step.max(1);

        match self.phase {
            LearningPhase::Align { remaining } => {
                self.angle = ElectricalAngle::ZERO;
                self.phase = if remaining <= 1 {
                    debug!("Hall learning: alignment done");
                    self.swept = 0;
                    LearningPhase::SweepForward
                } else {
                    LearningPhase::Align {
                        remaining: remaining - 1,
                    }
                };
            }
            LearningPhase::SweepForward => {
                self.record(hall_state);
                self.angle = self.angle.offset(step as i32);
                self.swept += step as u32;
                if self.swept >= FULL_TURN {
                    debug!("Hall learning: forward sweep done");
                    self.swept = 0;
                    self.phase = LearningPhase::SweepBackward;
                }
            }
            LearningPhase::SweepBackward => {
                self.record(hall_state);
                self.angle = self.angle.offset(-(step as i32));
                self.swept += step as u32;
                if self.swept >= FULL_TURN {
                    self.phase = LearningPhase::Done;
                }
            }
            LearningPhase::Done => {
                let table = self.build_table(step);
                info!("Hall learning complete");
                return LearningStatus::Complete(table);
            }
        }

        LearningStatus::Running(LearningCommand {
            angle: self.angle,
            idq_req: Dq::new(self.config.align_current, 0.0),
        })
    }

    /// 前周期の指令角を該当Hall状態に加算
    fn record(&mut self, hall_state: u8) {
        let index = match hall_state {
            1..=6 => hall_state as usize - 1,
            _ => return,
        };

        // 掃引開始点（角度0）で見えた状態が0をまたぐ
        let rollover = *self.rollover_state.get_or_insert(hall_state);

        let mut angle = self.angle.raw() as u32;
        if hall_state == rollover && angle < HALF_TURN as u32 {
            angle += FULL_TURN;
        }

        let tally = &mut self.tallies[index];
        tally.sum += angle as u64;
        tally.count += 1;
    }

    fn build_table(&self, step: u16) -> HallTable {
        let mut table = HallTable::empty();
        for (index, tally) in self.tallies.iter().enumerate() {
            if tally.count == 0 {
                warn!("Hall state {} never observed", index + 1);
                continue;
            }
            let mean = (tally.sum + tally.count as u64 / 2) / tally.count as u64;
            let center = (mean % FULL_TURN as u64) as u16;
            // 正転・逆転の2回分
            let width = (tally.count / 2 * step as u32).min(u16::MAX as u32) as u16;
            table.sectors[index] = HallSector {
                start: center.wrapping_sub(width / 2),
                end: center.wrapping_add(width / 2),
                center,
                width,
            };
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;

    const SEQUENCE: [u8; 6] = [1, 3, 2, 6, 4, 5];
    const SECTOR_WIDTH: f32 = 65536.0 / 6.0;

    fn hall_of(angle: ElectricalAngle, offset: u16) -> u8 {
        let shifted = angle.raw().wrapping_sub(offset) as u32;
        SEQUENCE[(shifted * 6 / FULL_TURN) as usize]
    }

    fn learn(offset: u16, step: u16) -> HallTable {
        let mut config = ControlConfig::default().hall_learning;
        config.align_cycles = 20;
        config.sweep_step = step;
        let mut learning = HallLearning::new(config);

        let mut commanded = ElectricalAngle::ZERO;
        for _ in 0..1_000_000 {
            match learning.step(hall_of(commanded, offset)) {
                LearningStatus::Running(cmd) => {
                    assert_eq!(cmd.idq_req.q, 0.0);
                    commanded = cmd.angle;
                }
                LearningStatus::Complete(table) => return table,
            }
        }
        panic!("learning did not finish");
    }

    #[test]
    fn test_even_sweep_gives_equal_sectors() {
        let step = 16;
        let table = learn(0, step);
        assert!(table.is_calibrated());

        for sector in table.sectors.iter() {
            assert!(
                (sector.width as f32 - SECTOR_WIDTH).abs() <= 2.0 * step as f32,
                "width {}",
                sector.width
            );
        }

        // 正転順に1/6回転ずつ並ぶ
        for k in 0..6 {
            let this = table.sector(SEQUENCE[k]).unwrap();
            let next = table.sector(SEQUENCE[(k + 1) % 6]).unwrap();
            let spacing = ElectricalAngle(next.center).difference(ElectricalAngle(this.center));
            assert!(
                (spacing as f32 - SECTOR_WIDTH).abs() <= 2.0 * step as f32,
                "spacing {}",
                spacing
            );
        }
    }

    #[test]
    fn test_sector_straddling_zero() {
        let step = 16;
        let offset = 5000;
        let table = learn(offset, step);

        for (k, &state) in SEQUENCE.iter().enumerate() {
            let expected = offset as f32 + (k as f32 + 0.5) * SECTOR_WIDTH;
            let expected = ElectricalAngle::wrapping_from(expected as u32);
            let center = ElectricalAngle(table.sector(state).unwrap().center);
            assert!(
                center.difference(expected).abs() <= 2 * step as i32,
                "state {} center {} expected {}",
                state,
                center.raw(),
                expected.raw()
            );
        }
    }

    #[test]
    fn test_alignment_holds_zero() {
        let mut config = ControlConfig::default().hall_learning;
        config.align_cycles = 3;
        let mut learning = HallLearning::new(config);
        for _ in 0..2 {
            match learning.step(1) {
                LearningStatus::Running(cmd) => {
                    assert_eq!(cmd.angle, ElectricalAngle::ZERO);
                    assert_eq!(cmd.idq_req.d, config.align_current);
                }
                _ => panic!("unexpected completion"),
            }
        }
        assert!(matches!(learning.phase(), LearningPhase::Align { .. }));
        learning.step(1);
        assert_eq!(learning.phase(), LearningPhase::SweepForward);
    }
}
