//! Window functions: canopy height → search radius
//!
//! Taller trees have wider crowns, so the local-maximum search radius grows
//! with the height of the candidate cell. Radii are in the CHM's ground units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use crowntrace_core::{Error, Result};

/// Height-to-radius mapping used by the variable window filter
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowFunction {
    /// Same radius for every height
    Constant { radius: f64 },
    /// `slope * h + intercept`
    Linear { slope: f64, intercept: f64 },
    /// `coefficient * h^exponent + intercept`
    Power {
        coefficient: f64,
        exponent: f64,
        intercept: f64,
    },
    /// Caller-supplied mapping; not serializable
    #[serde(skip)]
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl WindowFunction {
    /// Wrap an arbitrary closure
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        WindowFunction::Custom(Arc::new(f))
    }

    /// Raw radius for a height, without validation
    pub fn radius(&self, height: f64) -> f64 {
        match self {
            WindowFunction::Constant { radius } => *radius,
            WindowFunction::Linear { slope, intercept } => slope * height + intercept,
            WindowFunction::Power {
                coefficient,
                exponent,
                intercept,
            } => coefficient * height.powf(*exponent) + intercept,
            WindowFunction::Custom(f) => f(height),
        }
    }

    /// Radius for a height, rejecting negative or undefined results
    pub fn checked_radius(&self, height: f64) -> Result<f64> {
        let radius = self.radius(height);
        if !radius.is_finite() {
            return Err(Error::invalid_parameter(
                "window",
                radius,
                format!("window radius for height {} is undefined", height),
            ));
        }
        if radius < 0.0 {
            return Err(Error::invalid_parameter(
                "window",
                radius,
                format!("window radius for height {} is negative", height),
            ));
        }
        Ok(radius)
    }
}

impl Default for WindowFunction {
    fn default() -> Self {
        WindowFunction::Linear {
            slope: 0.06,
            intercept: 0.5,
        }
    }
}

impl fmt::Debug for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowFunction::Constant { radius } => {
                f.debug_struct("Constant").field("radius", radius).finish()
            }
            WindowFunction::Linear { slope, intercept } => f
                .debug_struct("Linear")
                .field("slope", slope)
                .field("intercept", intercept)
                .finish(),
            WindowFunction::Power {
                coefficient,
                exponent,
                intercept,
            } => f
                .debug_struct("Power")
                .field("coefficient", coefficient)
                .field("exponent", exponent)
                .field("intercept", intercept)
                .finish(),
            WindowFunction::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}
