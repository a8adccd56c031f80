//! Unit newtypes for the quantities the engine moves around.
//!
//! Energy and power are easy to confuse when both are plain `f64`: an
//! incident's ENS total is energy (MWh), while a unit's nominal and available
//! power are MW. Wrapping them keeps `energy + power` from compiling.
//!
//! ```
//! use ens_core::units::{Megawatts, MegawattHours};
//!
//! let p = Megawatts(2.5);
//! let e: MegawattHours = p.over_hours(2.0);
//! assert_eq!(e, MegawattHours(5.0));
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $type {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            pub const ZERO: Self = Self(0.0);
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Energy in megawatt-hours (MWh)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MegawattHours(pub f64);

impl_unit_ops!(MegawattHours, "MWh");

impl Megawatts {
    /// Energy delivered at this power for `hours`.
    #[inline]
    pub fn over_hours(self, hours: f64) -> MegawattHours {
        MegawattHours(self.0 * hours)
    }

    /// Ratio against a nominal rating, zero when the rating is zero.
    #[inline]
    pub fn ratio_of(self, nominal: Megawatts) -> f64 {
        if nominal.0.abs() < 1e-12 {
            0.0
        } else {
            self.0 / nominal.0
        }
    }
}

/// Compass direction in degrees, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "°");

impl Degrees {
    /// Wrap into `[0, 360)`.
    pub fn normalized(self) -> Self {
        Self(self.0.rem_euclid(360.0))
    }

    /// Mean direction on the circle: the angle of the summed unit vectors.
    /// `None` without samples or when they cancel out.
    pub fn circular_mean<I>(directions: I) -> Option<Degrees>
    where
        I: IntoIterator<Item = Degrees>,
    {
        let (mut sin, mut cos, mut n) = (0.0_f64, 0.0_f64, 0usize);
        for d in directions {
            let rad = d.0.to_radians();
            sin += rad.sin();
            cos += rad.cos();
            n += 1;
        }
        if n == 0 || (sin.hypot(cos) / n as f64) < 1e-9 {
            return None;
        }
        Some(Degrees(sin.atan2(cos).to_degrees()).normalized())
    }

    /// Index of the compass sector this direction falls in, for a rose of
    /// `sectors` equal slices centred on north.
    pub fn sector(self, sectors: usize) -> usize {
        if sectors == 0 {
            return 0;
        }
        let width = 360.0 / sectors as f64;
        let shifted = (self.normalized().0 + width / 2.0).rem_euclid(360.0);
        ((shifted / width).floor() as usize) % sectors
    }
}
