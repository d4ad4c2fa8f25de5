//! Scale factor and target dimension calculation

use crate::error::{Result, BatchScaleError};

/// Uniform scale applied to both dimensions. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(BatchScaleError::invalid_parameters(format!(
                "Scale factor must be a positive number, got {}", factor
            )));
        }
        Ok(Self(factor))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// `floor(dimension * factor)`, saturating at `u32::MAX`
    pub fn apply(self, dimension: u32) -> u32 {
        (f64::from(dimension) * self.0).floor() as u32
    }
}

impl TryFrom<f64> for ScaleFactor {
    type Error = BatchScaleError;

    fn try_from(factor: f64) -> Result<Self> {
        Self::new(factor)
    }
}

impl std::fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Largest side a JPEG can carry
pub const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Destination dimensions for a source of `width` x `height`.
///
/// Products are truncated, not rounded. A dimension that truncates to zero
/// or exceeds [`MAX_DIMENSION`] cannot be encoded and is reported as invalid
/// before any resampling happens.
pub fn target_dimensions(width: u32, height: u32, scale: ScaleFactor) -> Result<(u32, u32)> {
    let target = (scale.apply(width), scale.apply(height));
    if target.0 == 0 || target.1 == 0 {
        return Err(BatchScaleError::invalid_parameters(format!(
            "Scaling {}x{} by {} collapses to {}x{}",
            width, height, scale, target.0, target.1
        )));
    }
    if target.0 > MAX_DIMENSION || target.1 > MAX_DIMENSION {
        return Err(BatchScaleError::invalid_parameters(format!(
            "Scaling {}x{} by {} gives {}x{}, above the JPEG limit of {} pixels per side",
            width, height, scale, target.0, target.1, MAX_DIMENSION
        )));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(factor: f64) -> ScaleFactor {
        ScaleFactor::new(factor).unwrap()
    }

    #[test]
    fn test_truncates_instead_of_rounding() {
        // 101 * 0.3333 = 33.66, 57 * 0.3333 = 18.998
        assert_eq!(target_dimensions(101, 57, scale(0.3333)).unwrap(), (33, 18));
        assert_eq!(target_dimensions(999, 999, scale(0.5)).unwrap(), (499, 499));
    }

    #[test]
    fn test_exact_and_upscale() {
        assert_eq!(target_dimensions(1000, 800, scale(0.5)).unwrap(), (500, 400));
        assert_eq!(target_dimensions(10, 7, scale(1.0)).unwrap(), (10, 7));
        assert_eq!(target_dimensions(10, 7, scale(2.5)).unwrap(), (25, 17));
    }

    #[test]
    fn test_collapsing_dimension_is_an_error() {
        let err = target_dimensions(1, 100, scale(0.5)).unwrap_err();
        assert!(matches!(err, BatchScaleError::InvalidParameters { .. }));
    }

    #[test]
    fn test_oversized_dimension_is_an_error() {
        let err = target_dimensions(1000, 1, scale(66.0)).unwrap_err();
        assert!(matches!(err, BatchScaleError::InvalidParameters { .. }));
        assert!(target_dimensions(4000, 3000, scale(20.0)).is_err());

        assert_eq!(
            target_dimensions(MAX_DIMENSION, 1, scale(1.0)).unwrap(),
            (MAX_DIMENSION, 1)
        );
    }

    #[test]
    fn test_invalid_factors() {
        for factor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(ScaleFactor::new(factor).is_err(), "{} accepted", factor);
        }
        assert!(ScaleFactor::try_from(0.25).is_ok());
    }

    #[test]
    fn test_apply_saturates() {
        assert_eq!(scale(1e12).apply(u32::MAX), u32::MAX);
    }
}
