//! Errors reported when a layout, position store or spatial index is misconfigured.
//!
//! Runtime degeneracies (coincident nodes, disconnected graphs, a topology that changes
//! underneath a step) are recovered where they happen and never show up here.

/// Configuration errors. Returned eagerly by builders and setters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value for `{name}`: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("a position store cannot be initialized from itself")]
    SelfInitializer,

    #[error("a polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),

    #[error("a star needs at least 5 points, got {0}")]
    DegenerateStar(usize),

    #[error("the animator thread panicked while stepping the layout")]
    AnimatorPanicked,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Rejects values that are not finite or not strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::invalid(name, value, "must be finite"));
    }
    if value <= 0.0 {
        return Err(Error::invalid(name, value, "must be greater than 0"));
    }
    Ok(())
}

/// Rejects values outside of `[min, max]`.
pub(crate) fn ensure_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(Error::invalid(name, value, "out of range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_check_rejects_zero_and_nan() {
        assert!(ensure_positive("x", 1.0).is_ok());
        assert!(matches!(
            ensure_positive("x", 0.0),
            Err(Error::InvalidParameter { name: "x", .. })
        ));
        assert!(ensure_positive("x", f64::NAN).is_err());
        assert!(ensure_positive("x", f64::INFINITY).is_err());
    }

    #[test]
    fn range_check_is_inclusive() {
        assert!(ensure_range("s", 0.0, 0.0, 1.0).is_ok());
        assert!(ensure_range("s", 1.0, 0.0, 1.0).is_ok());
        assert!(ensure_range("s", 1.5, 0.0, 1.0).is_err());
    }

    #[test]
    fn messages_name_the_parameter() {
        let msg = Error::invalid("max_iterations", 0.0, "must be greater than 0").to_string();
        assert!(msg.contains("max_iterations"));
    }
}
