//! オープンループ始動
//!
//! q軸に始動電流を流しながら指令角を一定ステップで進めます。
//! 規定周期の後は磁束オブザーバを並走させ、ゼロクロスを規定回数
//! 観測したらセンサーレス運転へ引き継ぎます。

use crate::config::OpenLoopConfig;
use crate::foc::transforms::Dq;
use crate::foc::ElectricalAngle;

#[derive(Debug, Clone, Copy)]
pub struct OpenLoopStartup {
    config: OpenLoopConfig,
    angle: ElectricalAngle,
    cycles: u32,
    crossings: u16,
}

impl OpenLoopStartup {
    pub fn new(config: OpenLoopConfig) -> Self {
        Self {
            config,
            angle: ElectricalAngle::ZERO,
            cycles: 0,
            crossings: 0,
        }
    }

    /// 指令角を1ステップ進める
    pub fn advance(&mut self) -> ElectricalAngle {
        self.angle = self.angle.offset(self.config.angle_step as i32);
        self.cycles = self.cycles.saturating_add(1);
        self.angle
    }

    /// 始動電流指令
    pub fn reference(&self) -> Dq {
        Dq::new(0.0, self.config.startup_current)
    }

    /// 加速区間が終わったか
    pub fn ramp_complete(&self) -> bool {
        self.cycles >= self.config.startup_cycles
    }

    /// オブザーバのゼロクロスを数える
    ///
    /// # Returns
    /// 引き継ぎに必要な回数に達した場合 `true`
    pub fn note_crossing(&mut self) -> bool {
        self.crossings = self.crossings.saturating_add(1);
        trace!("Open loop crossing {}", self.crossings);
        self.crossings >= self.config.handover_events
    }

    pub fn angle(&self) -> ElectricalAngle {
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;

    #[test]
    fn test_angle_advances_and_wraps() {
        let mut config = ControlConfig::default().openloop;
        config.angle_step = 20000;
        let mut startup = OpenLoopStartup::new(config);
        assert_eq!(startup.advance().raw(), 20000);
        assert_eq!(startup.advance().raw(), 40000);
        assert_eq!(startup.advance().raw(), 60000);
        assert_eq!(startup.advance().raw(), 14464);
        assert_eq!(startup.reference(), Dq::new(0.0, config.startup_current));
    }

    #[test]
    fn test_ramp_and_handover_counts() {
        let mut config = ControlConfig::default().openloop;
        config.startup_cycles = 3;
        config.handover_events = 2;
        let mut startup = OpenLoopStartup::new(config);
        startup.advance();
        startup.advance();
        assert!(!startup.ramp_complete());
        startup.advance();
        assert!(startup.ramp_complete());

        assert!(!startup.note_crossing());
        assert!(startup.note_crossing());
    }
}
