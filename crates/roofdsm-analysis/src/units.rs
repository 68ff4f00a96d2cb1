//! Unit-typed quantities.
//!
//! Areas, lengths and angles cross several stages and two unit systems
//! (meters for raster math, feet for material quantities). Each quantity is
//! a newtype so a square-meter value cannot be passed where square feet are
//! expected, nor degrees where radians are.

/// Square feet per square meter.
pub const SQFT_PER_SQM: f64 = 10.7639;

macro_rules! quantity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub f64);

        impl $name {
            /// Raw numeric value.
            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl std::ops::Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl std::ops::Mul<f64> for $name {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                Self(self.0 * rhs)
            }
        }

        impl std::ops::Div<f64> for $name {
            type Output = Self;
            fn div(self, rhs: f64) -> Self {
                Self(self.0 / rhs)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|q| q.0).sum())
            }
        }
    };
}

quantity!(
    /// A length in meters.
    Meters
);
quantity!(
    /// An area in square meters.
    SquareMeters
);
quantity!(
    /// An area in square feet.
    SquareFeet
);
quantity!(
    /// An angle in degrees.
    Degrees
);
quantity!(
    /// An angle in radians.
    Radians
);

impl Meters {
    /// Area of a square with this side length.
    pub fn squared(self) -> SquareMeters {
        SquareMeters(self.0 * self.0)
    }
}

impl SquareMeters {
    /// Convert to square feet.
    pub fn to_square_feet(self) -> SquareFeet {
        SquareFeet(self.0 * SQFT_PER_SQM)
    }
}

impl SquareFeet {
    /// Convert to square meters.
    pub fn to_square_meters(self) -> SquareMeters {
        SquareMeters(self.0 / SQFT_PER_SQM)
    }

    /// Roofing squares (100 sq ft each).
    pub fn squares(self) -> f64 {
        self.0 / 100.0
    }
}

impl Degrees {
    /// Convert to radians.
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

impl Radians {
    /// Convert to degrees.
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    /// Cosine of the angle.
    pub fn cos(self) -> f64 {
        self.0.cos()
    }

    /// Tangent of the angle.
    pub fn tan(self) -> f64 {
        self.0.tan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_area_conversion() {
        let sqm = SquareMeters(100.0);
        assert_relative_eq!(sqm.to_square_feet().value(), 1076.39);
        assert_relative_eq!(sqm.to_square_feet().to_square_meters().value(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_angle_conversion() {
        let deg = Degrees(45.0);
        assert_relative_eq!(deg.to_radians().tan(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(deg.to_radians().to_degrees().value(), 45.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_area() {
        assert_eq!(Meters(0.5).squared(), SquareMeters(0.25));
        assert_eq!(SquareFeet(2875.0).squares(), 28.75);
    }
}
