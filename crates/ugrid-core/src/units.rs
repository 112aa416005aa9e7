//! Unit newtypes for distribution-level quantities.
//!
//! The reader works in SI base units (V, VA, W, var) because the equipment
//! catalog and the solver boundary both do. Wrapping them keeps a transformer
//! rating from being added to a bus voltage by accident.
//!
//! ```
//! use ugrid_core::units::{Kilovolts, VoltAmperes, Volts};
//!
//! let secondary = Kilovolts(0.48).to_volts();
//! assert_eq!(secondary, Volts(480.0));
//! assert_eq!(VoltAmperes::from_kva(150.0).kva(), 150.0);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
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

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Voltage magnitude in volts (V)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Volts(pub f64);

impl_unit_ops!(Volts, "V");

/// Voltage magnitude in kilovolts (kV), as written in the equipment catalog
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

impl Kilovolts {
    #[inline]
    pub fn to_volts(self) -> Volts {
        Volts(self.0 * 1000.0)
    }
}

impl Volts {
    #[inline]
    pub fn to_kilovolts(self) -> Kilovolts {
        Kilovolts(self.0 / 1000.0)
    }
}

/// Apparent power in volt-amperes (VA)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VoltAmperes(pub f64);

impl_unit_ops!(VoltAmperes, "VA");

impl VoltAmperes {
    #[inline]
    pub fn from_kva(kva: f64) -> Self {
        Self(kva * 1000.0)
    }

    #[inline]
    pub fn kva(self) -> f64 {
        self.0 / 1000.0
    }
}

/// Active power in watts (W)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Watts(pub f64);

impl_unit_ops!(Watts, "W");

impl Watts {
    #[inline]
    pub fn from_kw(kw: f64) -> Self {
        Self(kw * 1000.0)
    }

    #[inline]
    pub fn kw(self) -> f64 {
        self.0 / 1000.0
    }

    /// Apparent power given reactive power: S = √(P² + Q²)
    #[inline]
    pub fn apparent_power(self, q: Vars) -> VoltAmperes {
        VoltAmperes((self.0.powi(2) + q.0.powi(2)).sqrt())
    }

    /// Reactive power drawn at a lagging power factor: Q = P·√(1/pf − 1)
    #[inline]
    pub fn reactive_at(self, power_factor: f64) -> Vars {
        let pf = power_factor.clamp(1e-6, 1.0);
        Vars(self.0 * (1.0 / pf - 1.0).sqrt())
    }
}

/// Reactive power in volt-amperes reactive (var)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Vars(pub f64);

impl_unit_ops!(Vars, "var");

/// Quantity normalised to a nominal reference value
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");
