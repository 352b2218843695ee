// Coordinate transformations for FOC (Field Oriented Control)
// Clark / Park transforms and their inverses, amplitude-invariant form

use super::angle::SinCos;

const ONE_ON_SQRT3: f32 = 0.577_350_26; // 1/√3
const TWO_ON_SQRT3: f32 = 1.154_700_5; // 2/√3
const SQRT3_ON_2: f32 = 0.866_025_4; // √3/2

/// Stationary-frame (αβ) quantity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlphaBeta {
    pub alpha: f32,
    pub beta: f32,
}

/// Rotating-frame (dq) quantity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dq {
    pub d: f32,
    pub q: f32,
}

impl Dq {
    pub const ZERO: Self = Self { d: 0.0, q: 0.0 };

    pub const fn new(d: f32, q: f32) -> Self {
        Self { d, q }
    }

    /// Scale both axes
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            d: self.d * factor,
            q: self.q * factor,
        }
    }
}

/// Phases used by a Clark transform
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClarkVariant {
    /// All three phases
    ThreePhase,
    /// U and W, phase V excluded
    ExcludeV,
    /// U and V, phase W excluded
    ExcludeW,
    /// V and W, phase U excluded
    ExcludeU,
}

/// Clark transformation (uvw → αβ)
///
/// The two-phase variants reconstruct the excluded phase from
/// `iu + iv + iw = 0`, so every variant agrees on balanced input.
///
/// # Arguments
/// * `phases` - Phase quantities [u, v, w]
/// * `variant` - Which phases to trust
pub fn clark(phases: [f32; 3], variant: ClarkVariant) -> AlphaBeta {
    let [u, v, w] = phases;
    match variant {
        ClarkVariant::ThreePhase => AlphaBeta {
            alpha: (2.0 * u - v - w) / 3.0,
            beta: ONE_ON_SQRT3 * (v - w),
        },
        ClarkVariant::ExcludeV => AlphaBeta {
            alpha: u,
            beta: -ONE_ON_SQRT3 * u - TWO_ON_SQRT3 * w,
        },
        ClarkVariant::ExcludeW => AlphaBeta {
            alpha: u,
            beta: ONE_ON_SQRT3 * u + TWO_ON_SQRT3 * v,
        },
        ClarkVariant::ExcludeU => AlphaBeta {
            alpha: -v - w,
            beta: ONE_ON_SQRT3 * (v - w),
        },
    }
}

/// Park transformation (αβ → dq)
///
/// # Arguments
/// * `ab` - Stationary-frame quantity
/// * `sc` - Sine/cosine of the rotor angle the sample belongs to
pub fn park(ab: AlphaBeta, sc: SinCos) -> Dq {
    Dq {
        d: sc.cos * ab.alpha + sc.sin * ab.beta,
        q: sc.cos * ab.beta - sc.sin * ab.alpha,
    }
}

/// Inverse Park transformation (dq → αβ)
///
/// # Arguments
/// * `dq` - Rotating-frame quantity
/// * `sc` - Sine/cosine of the rotor angle
pub fn inverse_park(dq: Dq, sc: SinCos) -> AlphaBeta {
    AlphaBeta {
        alpha: sc.cos * dq.d - sc.sin * dq.q,
        beta: sc.sin * dq.d + sc.cos * dq.q,
    }
}

/// Inverse Clark transformation (αβ → uvw)
///
/// # Returns
/// Phase quantities [u, v, w]
pub fn inverse_clark(ab: AlphaBeta) -> [f32; 3] {
    [
        ab.alpha,
        -0.5 * ab.alpha + SQRT3_ON_2 * ab.beta,
        -0.5 * ab.alpha - SQRT3_ON_2 * ab.beta,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foc::angle::ElectricalAngle;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn balanced(amplitude: f32, angle: ElectricalAngle) -> [f32; 3] {
        inverse_clark(inverse_park(Dq::new(amplitude, 0.0), angle.sincos()))
    }

    #[test]
    fn test_clark_variants_agree_on_balanced_input() {
        for raw in (0..=u16::MAX).step_by(1234) {
            let phases = balanced(7.5, ElectricalAngle(raw));
            let reference = clark(phases, ClarkVariant::ThreePhase);
            for variant in [
                ClarkVariant::ExcludeU,
                ClarkVariant::ExcludeV,
                ClarkVariant::ExcludeW,
            ] {
                let ab = clark(phases, variant);
                assert!(approx_eq(ab.alpha, reference.alpha), "{:?}", variant);
                assert!(approx_eq(ab.beta, reference.beta), "{:?}", variant);
            }
        }
    }

    #[test]
    fn test_park_recovers_dq() {
        let sc = ElectricalAngle(12345).sincos();
        let dq = Dq::new(1.5, -4.0);
        let back = park(inverse_park(dq, sc), sc);
        assert!(approx_eq(back.d, dq.d));
        assert!(approx_eq(back.q, dq.q));
    }

    #[test]
    fn test_inverse_clark_sums_to_zero() {
        let phases = inverse_clark(AlphaBeta {
            alpha: 3.0,
            beta: -2.0,
        });
        assert!(approx_eq(phases.iter().sum::<f32>(), 0.0));
        assert!(approx_eq(phases[0], 3.0));
    }

    #[test]
    fn test_zero_input_gives_zero_output() {
        let ab = clark([0.0; 3], ClarkVariant::ExcludeV);
        let dq = park(ab, ElectricalAngle(4000).sincos());
        assert_eq!(dq, Dq::ZERO);
    }
}
