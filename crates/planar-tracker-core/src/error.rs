/// Invalid tracker configuration.
///
/// Returned from constructors; thresholds are never silently clamped.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be finite and > 0 (got {value})")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be finite and >= 0 (got {value})")]
    Negative { name: &'static str, value: f64 },
    #[error("{name} must be in [{min}, {max}] (got {value})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name} must be an odd kernel size >= 1 (got {value})")]
    InvalidKernel { name: &'static str, value: usize },
    #[error("distortion needs 0, 4, 5 or 8 coefficients (got {0})")]
    DistortionLength(usize),
    #[error("invalid intrinsic matrix: {0}")]
    InvalidIntrinsics(&'static str),
}

pub fn ensure_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

pub fn ensure_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// Inclusive range check.
pub fn ensure_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

pub fn ensure_odd_kernel(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 && value % 2 == 1 {
        Ok(())
    } else {
        Err(ConfigError::InvalidKernel { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_never_positive() {
        assert!(ensure_positive("x", f64::NAN).is_err());
        assert!(ensure_non_negative("x", f64::NAN).is_err());
        assert!(ensure_range("x", f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn kernel_must_be_odd() {
        assert!(ensure_odd_kernel("k", 1).is_ok());
        assert!(ensure_odd_kernel("k", 7).is_ok());
        assert_eq!(
            ensure_odd_kernel("k", 4),
            Err(ConfigError::InvalidKernel { name: "k", value: 4 })
        );
        assert!(ensure_odd_kernel("k", 0).is_err());
    }

    #[test]
    fn negative_padding_is_reported_with_name() {
        let err = ensure_non_negative("pad_px", -4.0).unwrap_err();
        assert!(err.to_string().contains("pad_px"));
    }
}
