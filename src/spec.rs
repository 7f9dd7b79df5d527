//! Typed job payload schema, validated at the boundary before a job is
//! created. After validation the payload travels as opaque JSON; the queue
//! and stores never look inside it.

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Schema version accepted by this build.
pub const SPEC_VERSION: u32 = 1;

/// Simulation workflow to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    CantileverBeam,
    TaylorImpact,
    TensionTest,
}

/// Part dimensions in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub length_m: f64,
    pub width_m: f64,
    pub height_m: f64,
}

/// Linear-elastic material properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub youngs_modulus_pa: f64,
    pub poisson_ratio: f64,
}

/// Applied loads. Sign encodes direction, so no positivity constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loading {
    pub tip_load_n: f64,
}

/// Element counts along each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discretization {
    pub elements_length: u32,
    pub elements_width: u32,
    pub elements_height: u32,
}

/// Full job input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default = "default_version")]
    pub version: u32,
    pub model_name: String,
    pub test_type: TestType,
    pub geometry: Geometry,
    pub material: Material,
    pub loading: Loading,
    pub discretization: Discretization,
}

fn default_version() -> u32 {
    SPEC_VERSION
}

impl JobSpec {
    /// Check every schema constraint, reporting the first violation.
    ///
    /// NaN dimensions fail the positivity checks.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.version != SPEC_VERSION {
            return Err(SpecError::UnsupportedVersion {
                version: self.version,
                expected: SPEC_VERSION,
            });
        }
        if self.model_name.trim().is_empty() {
            return Err(SpecError::EmptyModelName);
        }

        if !(self.geometry.length_m > 0.0) {
            return Err(SpecError::NonPositive { field: "length_m" });
        }
        if !(self.geometry.width_m > 0.0) {
            return Err(SpecError::NonPositive { field: "width_m" });
        }
        if !(self.geometry.height_m > 0.0) {
            return Err(SpecError::NonPositive { field: "height_m" });
        }

        if !(self.material.youngs_modulus_pa > 0.0) {
            return Err(SpecError::NonPositive {
                field: "youngs_modulus_pa",
            });
        }
        if !(0.0..=0.5).contains(&self.material.poisson_ratio) {
            return Err(SpecError::PoissonOutOfRange {
                value: self.material.poisson_ratio,
            });
        }

        if self.discretization.elements_length == 0 {
            return Err(SpecError::NonPositive {
                field: "elements_length",
            });
        }
        if self.discretization.elements_width == 0 {
            return Err(SpecError::NonPositive {
                field: "elements_width",
            });
        }
        if self.discretization.elements_height == 0 {
            return Err(SpecError::NonPositive {
                field: "elements_height",
            });
        }

        Ok(())
    }
}
