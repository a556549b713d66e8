//! halbach-femm: Parametric Halbach wiggler geometry for FEMM
//!
//! This crate provides:
//! - A single parameter set describing a permanent-magnet Halbach wiggler
//! - Layout of one Halbach cell, tiling along the beam axis, steel yokes and
//!   the asymptotic boundary box
//! - Lua script generation for FEMM magnetostatic problems
//! - Running FEMM and reading back the on-axis field profile
//!
//! All lengths are in the configured length unit. FEMM's asymptotic boundary
//! coefficient is always computed in SI, so the unit scale feeds into it.

pub mod codegen;
pub mod config;
pub mod error;
pub mod femm;
pub mod geometry;
pub mod material;
pub mod solver;

pub use codegen::generate_femm_script;
pub use config::MagnetConfig;
pub use error::{WigglerError, WigglerResult};
pub use femm::{FemmDocument, ContourPlot};
pub use geometry::{Cell, Lattice, MagnetBlock, Rect, Row, WigglerGeometry};
pub use material::{Material, MaterialKind, MaterialLibrary};
pub use solver::{solve_and_extract, FemmProcess, FieldProfile, FieldSample, Solver};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Vacuum permeability in H/m
pub const MU_0: f64 = 4.0 * std::f64::consts::PI * 1e-7;

/// Main entry point: lay out the wiggler and generate a FEMM Lua script
pub fn translate(config: &MagnetConfig, emit: &EmitConfig) -> WigglerResult<String> {
    let geometry = WigglerGeometry::build(config)?;
    config.validate_materials(&emit.material_library())?;
    let document = FemmDocument::from_geometry(&geometry, emit)?;
    let script = generate_femm_script(&document, emit)?;
    Ok(script)
}

/// Options for the emitted FEMM document
#[derive(Debug, Clone)]
pub struct EmitConfig {
    /// File name FEMM saves the drawn problem under
    pub fem_file: String,
    /// Solver precision passed to `mi_probdef`
    pub precision: f64,
    /// Planar depth; defaults to the magnet width when unset
    pub depth: Option<f64>,
    /// Minimum mesh angle in degrees
    pub min_angle: f64,
    /// Append analysis and on-axis field extraction to the script
    pub solve: Option<SolveConfig>,
    /// Material names accepted on top of the built-in FEMM library
    pub allow_materials: Vec<String>,
}

impl EmitConfig {
    /// Built-in library extended with `allow_materials`
    pub fn material_library(&self) -> MaterialLibrary {
        let mut library = MaterialLibrary::new();
        for name in &self.allow_materials {
            library.allow(name);
        }
        library
    }
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            fem_file: "wiggler.FEM".to_string(),
            precision: 1e-8,
            depth: None,
            min_angle: 30.0,
            solve: None,
            allow_materials: Vec::new(),
        }
    }
}

/// On-axis field extraction settings
#[derive(Debug, Clone)]
pub struct SolveConfig {
    /// Number of contour samples requested from `mo_makeplot`
    pub samples: usize,
    /// Two-column text file FEMM writes the field profile to
    pub field_file: PathBuf,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            samples: 25_000,
            field_file: PathBuf::from("field_profile.txt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LengthUnit {
    Inches,
    Millimeters,
    Centimeters,
    Mils,
    Meters,
    Micrometers,
}

impl LengthUnit {
    pub const ALL: [LengthUnit; 6] = [
        LengthUnit::Inches,
        LengthUnit::Millimeters,
        LengthUnit::Centimeters,
        LengthUnit::Mils,
        LengthUnit::Meters,
        LengthUnit::Micrometers,
    ];

    /// How many of this unit make up one meter
    pub fn per_meter(&self) -> f64 {
        match self {
            LengthUnit::Millimeters => 1000.0,
            LengthUnit::Micrometers => 1_000_000.0,
            LengthUnit::Centimeters => 100.0,
            LengthUnit::Meters => 1.0,
            LengthUnit::Inches => 1.0 / 0.0254,
            LengthUnit::Mils => 1000.0 / 0.0254,
        }
    }

    /// Convert from this unit to meters
    pub fn to_meters(&self, value: f64) -> f64 {
        value / self.per_meter()
    }

    /// Convert from meters to this unit
    pub fn from_meters(&self, value: f64) -> f64 {
        value * self.per_meter()
    }

    /// Keyword FEMM expects in `mi_probdef`
    pub fn femm_name(&self) -> &'static str {
        match self {
            LengthUnit::Inches => "inches",
            LengthUnit::Millimeters => "millimeters",
            LengthUnit::Centimeters => "centimeters",
            LengthUnit::Mils => "mils",
            LengthUnit::Meters => "meters",
            LengthUnit::Micrometers => "micrometers",
        }
    }
}

impl FromStr for LengthUnit {
    type Err = WigglerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in" | "inch" | "inches" => Ok(LengthUnit::Inches),
            "mm" | "millimeter" | "millimeters" => Ok(LengthUnit::Millimeters),
            "cm" | "centimeter" | "centimeters" => Ok(LengthUnit::Centimeters),
            "mil" | "mils" => Ok(LengthUnit::Mils),
            "m" | "meter" | "meters" => Ok(LengthUnit::Meters),
            "um" | "µm" | "micrometer" | "micrometers" => Ok(LengthUnit::Micrometers),
            _ => Err(WigglerError::UnknownUnit {
                kind: "length",
                value: s.to_string(),
                expected: "inches, millimeters, centimeters, mils, meters, micrometers",
            }),
        }
    }
}

impl TryFrom<String> for LengthUnit {
    type Error = WigglerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LengthUnit> for String {
    fn from(unit: LengthUnit) -> Self {
        unit.femm_name().to_string()
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.femm_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ForceUnit {
    Newtons,
    Lbf,
    Kgf,
}

impl ForceUnit {
    /// Multiplier applied to FEMM's weighted stress tensor result (Newtons)
    pub fn scale(&self) -> f64 {
        match self {
            ForceUnit::Newtons => 1.0,
            ForceUnit::Lbf => 0.2248089,
            ForceUnit::Kgf => 0.1019716,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ForceUnit::Newtons => "Newtons",
            ForceUnit::Lbf => "lbf",
            ForceUnit::Kgf => "kgf",
        }
    }
}

impl FromStr for ForceUnit {
    type Err = WigglerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "n" | "newton" | "newtons" => Ok(ForceUnit::Newtons),
            "lbf" => Ok(ForceUnit::Lbf),
            "kgf" => Ok(ForceUnit::Kgf),
            _ => Err(WigglerError::UnknownUnit {
                kind: "force",
                value: s.to_string(),
                expected: "lbf, Newtons, kgf",
            }),
        }
    }
}

impl TryFrom<String> for ForceUnit {
    type Error = WigglerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ForceUnit> for String {
    fn from(unit: ForceUnit) -> Self {
        unit.name().to_string()
    }
}

impl fmt::Display for ForceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale factors resolved from the configured units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitScales {
    /// Length units per meter
    pub length_scale: f64,
    pub force_scale: f64,
}

impl UnitScales {
    pub fn resolve(length: LengthUnit, force: ForceUnit) -> Self {
        Self {
            length_scale: length.per_meter(),
            force_scale: force.scale(),
        }
    }

    /// Coefficient of FEMM's "Asymptotic" mixed boundary condition.
    ///
    /// `mi_probdef` units do not apply to c0, so the SI expression
    /// `1 / (2 µ0 r)` is rescaled to the drawing unit here.
    pub fn asymptotic_c0(&self, magnet_length: f64) -> f64 {
        self.length_scale / (2.0 * MU_0 * magnet_length)
    }
}
