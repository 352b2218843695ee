// Electrical angle representation and table-based sine/cosine
//
// One electrical revolution maps onto the full u16 range, so all angle
// arithmetic is plain wrapping integer arithmetic.

/// Half of one electrical revolution
pub const HALF_TURN: u16 = 32768;

/// Quarter of one electrical revolution
pub const QUARTER_TURN: u16 = 16384;

/// Index offset between sine and cosine in [`SINE_TABLE`]
const COSINE_OFFSET: usize = 64;

/// sin(2πk/256) for k = 0..256, indexed by the top 8 bits of an angle
pub static SINE_TABLE: [f32; 256] = [
    0.0000000, 0.0245412, 0.0490677, 0.0735646, 0.0980171, 0.1224107, 0.1467305, 0.1709619,
    0.1950903, 0.2191012, 0.2429802, 0.2667128, 0.2902847, 0.3136817, 0.3368899, 0.3598950,
    0.3826834, 0.4052413, 0.4275551, 0.4496113, 0.4713967, 0.4928982, 0.5141027, 0.5349976,
    0.5555702, 0.5758082, 0.5956993, 0.6152316, 0.6343933, 0.6531728, 0.6715590, 0.6895405,
    0.7071068, 0.7242471, 0.7409511, 0.7572088, 0.7730105, 0.7883464, 0.8032075, 0.8175848,
    0.8314696, 0.8448536, 0.8577286, 0.8700870, 0.8819213, 0.8932243, 0.9039893, 0.9142098,
    0.9238795, 0.9329928, 0.9415441, 0.9495282, 0.9569403, 0.9637761, 0.9700313, 0.9757021,
    0.9807853, 0.9852776, 0.9891765, 0.9924795, 0.9951847, 0.9972905, 0.9987955, 0.9996988,
    1.0000000, 0.9996988, 0.9987955, 0.9972905, 0.9951847, 0.9924795, 0.9891765, 0.9852776,
    0.9807853, 0.9757021, 0.9700313, 0.9637761, 0.9569403, 0.9495282, 0.9415441, 0.9329928,
    0.9238795, 0.9142098, 0.9039893, 0.8932243, 0.8819213, 0.8700870, 0.8577286, 0.8448536,
    0.8314696, 0.8175848, 0.8032075, 0.7883464, 0.7730105, 0.7572088, 0.7409511, 0.7242471,
    0.7071068, 0.6895405, 0.6715590, 0.6531728, 0.6343933, 0.6152316, 0.5956993, 0.5758082,
    0.5555702, 0.5349976, 0.5141027, 0.4928982, 0.4713967, 0.4496113, 0.4275551, 0.4052413,
    0.3826834, 0.3598950, 0.3368899, 0.3136817, 0.2902847, 0.2667128, 0.2429802, 0.2191012,
    0.1950903, 0.1709619, 0.1467305, 0.1224107, 0.0980171, 0.0735646, 0.0490677, 0.0245412,
    0.0000000, -0.0245412, -0.0490677, -0.0735646, -0.0980171, -0.1224107, -0.1467305, -0.1709619,
    -0.1950903, -0.2191012, -0.2429802, -0.2667128, -0.2902847, -0.3136817, -0.3368899, -0.3598950,
    -0.3826834, -0.4052413, -0.4275551, -0.4496113, -0.4713967, -0.4928982, -0.5141027, -0.5349976,
    -0.5555702, -0.5758082, -0.5956993, -0.6152316, -0.6343933, -0.6531728, -0.6715590, -0.6895405,
    -0.7071068, -0.7242471, -0.7409511, -0.7572088, -0.7730105, -0.7883464, -0.8032075, -0.8175848,
    -0.8314696, -0.8448536, -0.8577286, -0.8700870, -0.8819213, -0.8932243, -0.9039893, -0.9142098,
    -0.9238795, -0.9329928, -0.9415441, -0.9495282, -0.9569403, -0.9637761, -0.9700313, -0.9757021,
    -0.9807853, -0.9852776, -0.9891765, -0.9924795, -0.9951847, -0.9972905, -0.9987955, -0.9996988,
    -1.0000000, -0.9996988, -0.9987955, -0.9972905, -0.9951847, -0.9924795, -0.9891765, -0.9852776,
    -0.9807853, -0.9757021, -0.9700313, -0.9637761, -0.9569403, -0.9495282, -0.9415441, -0.9329928,
    -0.9238795, -0.9142098, -0.9039893, -0.8932243, -0.8819213, -0.8700870, -0.8577286, -0.8448536,
    -0.8314696, -0.8175848, -0.8032075, -0.7883464, -0.7730105, -0.7572088, -0.7409511, -0.7242471,
    -0.7071068, -0.6895405, -0.6715590, -0.6531728, -0.6343933, -0.6152316, -0.5956993, -0.5758082,
    -0.5555702, -0.5349976, -0.5141027, -0.4928982, -0.4713967, -0.4496113, -0.4275551, -0.4052413,
    -0.3826834, -0.3598950, -0.3368899, -0.3136817, -0.2902847, -0.2667128, -0.2429802, -0.2191012,
    -0.1950903, -0.1709619, -0.1467305, -0.1224107, -0.0980171, -0.0735646, -0.0490677, -0.0245412,
];

/// Electrical rotor angle, 65536 counts per revolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElectricalAngle(pub u16);

/// Sine and cosine pair of an [`ElectricalAngle`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SinCos {
    pub sin: f32,
    pub cos: f32,
}

impl SinCos {
    /// sincos of angle zero
    pub const ZERO_ANGLE: Self = Self { sin: 0.0, cos: 1.0 };
}

impl ElectricalAngle {
    pub const ZERO: Self = Self(0);

    /// Create an angle from any integer count, taken modulo one revolution
    #[inline]
    pub const fn wrapping_from(counts: u32) -> Self {
        Self(counts as u16)
    }

    /// Raw angle count
    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Advance by a signed number of counts, wrapping around the revolution
    #[inline]
    pub const fn offset(self, counts: i32) -> Self {
        Self(self.0.wrapping_add(counts as u16))
    }

    /// Signed distance `self - reference`, folded into -32768..=32767
    #[inline]
    pub const fn difference(self, reference: Self) -> i32 {
        self.0.wrapping_sub(reference.0) as i16 as i32
    }

    /// Sine and cosine from the 256-entry table
    ///
    /// The index is the top 8 bits of the angle, so it can never leave the table.
    #[inline]
    pub fn sincos(self) -> SinCos {
        let index = (self.0 >> 8) as usize;
        SinCos {
            sin: SINE_TABLE[index],
            cos: SINE_TABLE[(index + COSINE_OFFSET) & 0xFF],
        }
    }

    /// Angle in radians (0 to 2π)
    #[allow(dead_code)]
    pub fn to_radians(self) -> f32 {
        self.0 as f32 * (core::f32::consts::TAU / 65536.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    /// Table quantization: 1/256 revolution
    const QUANTIZATION: f32 = core::f32::consts::TAU / 256.0;

    #[test]
    fn test_sincos_is_periodic() {
        for raw in (0u32..200_000).step_by(97) {
            let wrapped = ElectricalAngle::wrapping_from(raw % 65536).sincos();
            let direct = ElectricalAngle::wrapping_from(raw).sincos();
            assert_eq!(wrapped, direct);
        }
    }

    #[test]
    fn test_sincos_on_unit_circle() {
        for raw in 0..=u16::MAX {
            let sc = ElectricalAngle(raw).sincos();
            let norm = sc.sin * sc.sin + sc.cos * sc.cos;
            assert!((norm - 1.0).abs() < 1.0e-5, "angle {} norm {}", raw, norm);
        }
    }

    #[test]
    fn test_sincos_tracks_libm() {
        for raw in (0..=u16::MAX).step_by(251) {
            let angle = ElectricalAngle(raw);
            let sc = angle.sincos();
            let radians = angle.to_radians();
            assert!((sc.sin - libm::sinf(radians)).abs() <= QUANTIZATION + EPSILON);
            assert!((sc.cos - libm::cosf(radians)).abs() <= QUANTIZATION + EPSILON);
        }
    }

    #[test]
    fn test_quadrant_points() {
        let sc = ElectricalAngle(QUARTER_TURN).sincos();
        assert!((sc.sin - 1.0).abs() < EPSILON);
        assert!(sc.cos.abs() < EPSILON);

        let sc = ElectricalAngle(HALF_TURN).sincos();
        assert!(sc.sin.abs() < EPSILON);
        assert!((sc.cos + 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_difference_wraps() {
        assert_eq!(ElectricalAngle(100).difference(ElectricalAngle(65500)), 136);
        assert_eq!(ElectricalAngle(65500).difference(ElectricalAngle(100)), -136);
        assert_eq!(ElectricalAngle(10).offset(-20), ElectricalAngle(65526));
    }
}
