// Hall sensor angle lookup
//
// Each of the six valid Hall states maps to a sector of the electrical
// revolution. On every state change the sector boundary the rotor just
// crossed is compared against the tracked angle.

use super::angle::{ElectricalAngle, HALF_TURN};
use crate::error::FaultCode;

/// One Hall sector, all values in angle counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallSector {
    pub start: u16,
    pub end: u16,
    pub center: u16,
    pub width: u16,
}

/// Sector table indexed by Hall state 1-6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallTable {
    pub sectors: [HallSector; 6],
}

impl HallTable {
    /// Table with every sector zeroed (not calibrated)
    pub const fn empty() -> Self {
        Self {
            sectors: [HallSector {
                start: 0,
                end: 0,
                center: 0,
                width: 0,
            }; 6],
        }
    }

    /// Ideal table with six 60° sectors
    ///
    /// # Arguments
    /// * `sequence` - Hall states in forward rotation order
    /// * `offset` - Start angle of the first state in `sequence`
    pub fn evenly_spaced(sequence: &[u8; 6], offset: u16) -> Self {
        let mut table = Self::empty();
        for (k, &state) in sequence.iter().enumerate() {
            let start = offset.wrapping_add(((k as u32 * 65536) / 6) as u16);
            let end = offset.wrapping_add((((k as u32 + 1) * 65536) / 6) as u16);
            let width = end.wrapping_sub(start);
            if let Some(sector) = table.sector_mut(state) {
                *sector = HallSector {
                    start,
                    end,
                    center: start.wrapping_add(width / 2),
                    width,
                };
            }
        }
        table
    }

    /// Sector for a Hall state, `None` for 0, 7 and anything larger
    pub fn sector(&self, state: u8) -> Option<&HallSector> {
        match state {
            1..=6 => Some(&self.sectors[state as usize - 1]),
            _ => None,
        }
    }

    pub fn sector_mut(&mut self, state: u8) -> Option<&mut HallSector> {
        match state {
            1..=6 => Some(&mut self.sectors[state as usize - 1]),
            _ => None,
        }
    }

    /// True once every sector has a non-zero width
    pub fn is_calibrated(&self) -> bool {
        self.sectors.iter().all(|s| s.width > 0)
    }
}

/// Rotation direction inferred from consecutive Hall sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> f32 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

/// Hall state change
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallEdge {
    /// New Hall state
    pub state: u8,
    /// Center of the new sector
    pub center: ElectricalAngle,
    /// Tracked angle minus the crossed sector boundary
    pub error: i32,
    pub direction: Direction,
    /// Width of the sector the rotor just left
    pub traversed_width: u16,
}

/// Result of the sensor presence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorPresence {
    Present,
    Absent,
    Faulty,
}

/// Classify the raw Hall pattern read during detection
///
/// 6 and 7 are what the pulled-up inputs read with no sensor connected;
/// 8 and above cannot come from three lines and indicate a wiring fault.
pub fn detect_sensors(raw: u8) -> SensorPresence {
    match raw {
        6 | 7 => SensorPresence::Absent,
        0..=5 => SensorPresence::Present,
        _ => SensorPresence::Faulty,
    }
}

/// Validate a Hall state read during running
pub fn validate_state(state: u8) -> Result<u8, FaultCode> {
    match state {
        0 => Err(FaultCode::InvalidHallState0),
        7 => Err(FaultCode::InvalidHallState7),
        1..=6 => Ok(state),
        _ => Err(FaultCode::GenericHallFault),
    }
}

/// Hall edge detector
pub struct HallEstimator {
    /// Previous valid state (0 before the first read)
    last_state: u8,
    last_center: ElectricalAngle,
}

impl HallEstimator {
    pub const fn new() -> Self {
        Self {
            last_state: 0,
            last_center: ElectricalAngle::ZERO,
        }
    }

    /// Process one Hall sample
    ///
    /// # Arguments
    /// * `table` - Calibrated sector table
    /// * `state` - Raw 3-bit Hall state
    /// * `tracked` - Present tracked angle
    ///
    /// # Returns
    /// * `Ok(Some(edge))` - The state changed
    /// * `Ok(None)` - Same sector as last cycle
    /// * `Err(FaultCode)` - Invalid Hall state
    pub fn update(
        &mut self,
        table: &HallTable,
        state: u8,
        tracked: ElectricalAngle,
    ) -> Result<Option<HallEdge>, FaultCode> {
        let state = validate_state(state)?;
        if state == self.last_state {
            return Ok(None);
        }

        let sector = table.sector(state).copied().unwrap_or_default();
        let center = ElectricalAngle(sector.center);

        let direction = if self.last_state == 0
            || center.raw().wrapping_sub(self.last_center.raw()) < HALF_TURN
        {
            Direction::Forward
        } else {
            Direction::Backward
        };

        let boundary = match direction {
            Direction::Forward => ElectricalAngle(sector.start),
            Direction::Backward => ElectricalAngle(sector.end),
        };

        let traversed_width = table
            .sector(self.last_state)
            .map_or(sector.width, |previous| previous.width);

        self.last_state = state;
        self.last_center = center;

        Ok(Some(HallEdge {
            state,
            center,
            error: tracked.difference(boundary),
            direction,
            traversed_width,
        }))
    }

    /// Center of the present sector
    pub fn current_center(&self) -> ElectricalAngle {
        self.last_center
    }

    pub fn last_state(&self) -> u8 {
        self.last_state
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for HallEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENCE: [u8; 6] = [1, 3, 2, 6, 4, 5];

    #[test]
    fn test_evenly_spaced_partition() {
        let table = HallTable::evenly_spaced(&SEQUENCE, 3000);
        assert!(table.is_calibrated());
        let mut total = 0u32;
        for pair in SEQUENCE.windows(2) {
            let a = table.sector(pair[0]).unwrap();
            let b = table.sector(pair[1]).unwrap();
            assert_eq!(a.end, b.start);
            total += a.width as u32;
        }
        total += table.sector(5).unwrap().width as u32;
        assert_eq!(total, 65536);
    }

    #[test]
    fn test_forward_edge_error_against_start() {
        let table = HallTable::evenly_spaced(&SEQUENCE, 0);
        let mut hall = HallEstimator::new();
        hall.update(&table, 1, ElectricalAngle(5000)).unwrap();

        let start_of_3 = table.sector(3).unwrap().start;
        let edge = hall
            .update(&table, 3, ElectricalAngle(start_of_3 - 100))
            .unwrap()
            .unwrap();
        assert_eq!(edge.direction, Direction::Forward);
        assert_eq!(edge.error, -100);
        assert_eq!(edge.traversed_width, table.sector(1).unwrap().width);
    }

    #[test]
    fn test_backward_edge_across_wrap() {
        let table = HallTable::evenly_spaced(&SEQUENCE, 0);
        let mut hall = HallEstimator::new();
        hall.update(&table, 1, ElectricalAngle(100)).unwrap();

        // 1 → 5 は 0 をまたぐ逆回転
        let end_of_5 = table.sector(5).unwrap().end;
        let edge = hall
            .update(&table, 5, ElectricalAngle(end_of_5.wrapping_add(40)))
            .unwrap()
            .unwrap();
        assert_eq!(edge.direction, Direction::Backward);
        assert_eq!(edge.error, 40);
    }

    #[test]
    fn test_unchanged_state_is_silent() {
        let table = HallTable::evenly_spaced(&SEQUENCE, 0);
        let mut hall = HallEstimator::new();
        assert!(hall.update(&table, 2, ElectricalAngle(0)).unwrap().is_some());
        assert!(hall.update(&table, 2, ElectricalAngle(10)).unwrap().is_none());
    }

    #[test]
    fn test_invalid_states() {
        let table = HallTable::evenly_spaced(&SEQUENCE, 0);
        let mut hall = HallEstimator::new();
        assert_eq!(
            hall.update(&table, 0, ElectricalAngle(0)),
            Err(FaultCode::InvalidHallState0)
        );
        assert_eq!(
            hall.update(&table, 7, ElectricalAngle(0)),
            Err(FaultCode::InvalidHallState7)
        );
        assert_eq!(validate_state(9), Err(FaultCode::GenericHallFault));
    }

    #[test]
    fn test_sensor_presence() {
        assert_eq!(detect_sensors(6), SensorPresence::Absent);
        assert_eq!(detect_sensors(7), SensorPresence::Absent);
        assert_eq!(detect_sensors(3), SensorPresence::Present);
        assert_eq!(detect_sensors(8), SensorPresence::Faulty);
    }
}
