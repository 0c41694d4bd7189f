//! Volume curves and pan laws
//!
//! A volume curve maps the linear 0..=1 control value to an amplitude factor.
//! A pan law maps the -1..=1 pan control to a (left, right) gain pair.
//! Both are pure functions selected per cue.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Amplitude mapping applied to the volume control value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolumeCurve {
    /// Amplitude equals the control value
    Linear,
    ExpX2,
    ExpX3,
    /// x⁴, a close fit to perceived loudness over a ~60 dB range
    #[default]
    ExpX4,
    ExpX5,
    /// e^(6.908x) / 1000, exactly 60 dB of range; zero stays silent
    Exp60Db,
}

impl VolumeCurve {
    pub const ALL: [VolumeCurve; 6] = [
        VolumeCurve::Linear,
        VolumeCurve::ExpX2,
        VolumeCurve::ExpX3,
        VolumeCurve::ExpX4,
        VolumeCurve::ExpX5,
        VolumeCurve::Exp60Db,
    ];

    /// Amplitude factor for a volume control value in [0, 1]
    #[inline]
    pub fn factor(self, volume: f64) -> f64 {
        match self {
            VolumeCurve::Linear => volume,
            VolumeCurve::ExpX2 => volume * volume,
            VolumeCurve::ExpX3 => volume * volume * volume,
            VolumeCurve::ExpX4 => {
                let sq = volume * volume;
                sq * sq
            }
            VolumeCurve::ExpX5 => {
                let sq = volume * volume;
                sq * sq * volume
            }
            VolumeCurve::Exp60Db => {
                if volume <= 0.0 {
                    0.0
                } else {
                    (volume * 6.908).exp() / 1000.0
                }
            }
        }
    }
}

/// Gain pair applied for a pan control value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PanLaw {
    /// Straight crossfade, -6 dB per side at center
    FullLinear,
    /// Center is unity on both sides; panning attenuates only the far side
    LeftRightCutLinear,
    /// Square-root crossfade, -3 dB at center
    SquareLaw,
    /// Sine/cosine crossfade, -3 dB at center
    #[default]
    SineLaw,
}

impl PanLaw {
    pub const ALL: [PanLaw; 4] = [
        PanLaw::FullLinear,
        PanLaw::LeftRightCutLinear,
        PanLaw::SquareLaw,
        PanLaw::SineLaw,
    ];

    /// (left, right) gains for a pan value in [-1, 1]
    #[inline]
    pub fn gains(self, pan: f64) -> (f64, f64) {
        (self.left(pan), self.right(pan))
    }

    #[inline]
    pub fn left(self, pan: f64) -> f64 {
        match self {
            PanLaw::FullLinear => 1.0 - (1.0 + pan) / 2.0,
            PanLaw::LeftRightCutLinear => (1.0 - pan).clamp(0.0, 1.0),
            PanLaw::SquareLaw => (1.0 - (1.0 + pan) / 2.0).sqrt(),
            PanLaw::SineLaw => (FRAC_PI_2 * (1.0 - (1.0 + pan) / 2.0)).sin(),
        }
    }

    #[inline]
    pub fn right(self, pan: f64) -> f64 {
        match self {
            PanLaw::FullLinear => (1.0 + pan) / 2.0,
            PanLaw::LeftRightCutLinear => (1.0 + pan).clamp(0.0, 1.0),
            PanLaw::SquareLaw => ((1.0 + pan) / 2.0).sqrt(),
            PanLaw::SineLaw => (FRAC_PI_2 * (1.0 + pan) / 2.0).sin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_volume_curve_endpoints() {
        for curve in VolumeCurve::ALL {
            assert!(curve.factor(0.0).abs() < EPS, "{:?} at 0", curve);
            assert!((curve.factor(1.0) - 1.0).abs() < 1e-3, "{:?} at 1", curve);
        }
    }

    #[test]
    fn test_volume_curve_monotonic() {
        for curve in VolumeCurve::ALL {
            let mut last = -1.0;
            for i in 0..=100 {
                let v = curve.factor(i as f64 / 100.0);
                assert!(v >= last, "{:?} not monotonic at {}", curve, i);
                last = v;
            }
        }
    }

    #[test]
    fn test_exp_x4_half_volume() {
        assert!((VolumeCurve::ExpX4.factor(0.5) - 0.0625).abs() < EPS);
        assert!((VolumeCurve::ExpX2.factor(0.5) - 0.25).abs() < EPS);
    }

    #[test]
    fn test_pan_hard_left_right() {
        for law in PanLaw::ALL {
            let (l, r) = law.gains(-1.0);
            assert!((l - 1.0).abs() < EPS && r.abs() < EPS, "{:?} hard left", law);
            let (l, r) = law.gains(1.0);
            assert!(l.abs() < EPS && (r - 1.0).abs() < EPS, "{:?} hard right", law);
        }
    }

    #[test]
    fn test_pan_center() {
        let (l, r) = PanLaw::FullLinear.gains(0.0);
        assert!((l - 0.5).abs() < EPS && (r - 0.5).abs() < EPS);

        let (l, r) = PanLaw::LeftRightCutLinear.gains(0.0);
        assert!((l - 1.0).abs() < EPS && (r - 1.0).abs() < EPS);

        for law in [PanLaw::SquareLaw, PanLaw::SineLaw] {
            let (l, r) = law.gains(0.0);
            assert!((l * l + r * r - 1.0).abs() < 1e-9, "{:?} not equal power", law);
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(VolumeCurve::default(), VolumeCurve::ExpX4);
        assert_eq!(PanLaw::default(), PanLaw::SineLaw);
    }
}
