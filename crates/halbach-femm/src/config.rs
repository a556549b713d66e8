//! Wiggler parameter set

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{WigglerError, WigglerResult};
use crate::material::{MaterialKind, MaterialLibrary};
use crate::{ForceUnit, LengthUnit, UnitScales};

/// Physical description of a Halbach wiggler.
///
/// Lengths are in `length_unit`. "Width" is the vertical extent of a magnet
/// and "length" its extent along the beam axis (x).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetConfig {
    pub length_unit: LengthUnit,
    pub force_unit: ForceUnit,
    /// Vertical size of every magnet block
    pub magnet_width: f64,
    /// Horizontal size of the full-length blocks
    pub magnet_length: f64,
    /// Drift length between full blocks; the odd blocks fill it
    pub drift_length: f64,
    /// Half of the vertical gap between the two magnet rows
    pub magnet_sep: f64,
    /// Return-yoke thickness, 0 for no yoke
    pub steel_thick: f64,
    /// Air gap between adjacent blocks
    pub inter_magnet: f64,
    /// Clearance before the first and after the last block
    pub margin: f64,
    /// Horizontal distance from the lattice to the boundary box
    pub bound_horiz: f64,
    pub num_repeats: u32,
    /// Names must match the FEMM material library exactly
    pub magnet_material: String,
    pub steel_material: String,
    pub air_material: String,
    /// 0 selects FEMM's automatic mesh sizing
    pub mesh_size: f64,
}

impl Default for MagnetConfig {
    fn default() -> Self {
        Self {
            length_unit: LengthUnit::Millimeters,
            force_unit: ForceUnit::Newtons,
            magnet_width: 100.0,
            magnet_length: 50.00191431900077,
            drift_length: 30.0,
            magnet_sep: 25.0,
            steel_thick: 50.0,
            inter_magnet: 0.0,
            margin: 1.0,
            bound_horiz: 700.0,
            num_repeats: 41,
            magnet_material: "N52".to_string(),
            steel_material: "1020 Steel".to_string(),
            air_material: "Air".to_string(),
            mesh_size: 0.0,
        }
    }
}

impl MagnetConfig {
    /// Load a parameter file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> WigglerResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> WigglerResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn scales(&self) -> UnitScales {
        UnitScales::resolve(self.length_unit, self.force_unit)
    }

    /// Length of the drift-filling blocks
    pub fn odd_magnet_length(&self) -> f64 {
        self.drift_length - 2.0 * self.inter_magnet
    }

    /// Extent of one Halbach period along x
    pub fn cell_pitch(&self) -> f64 {
        2.0 * self.magnet_length + 2.0 * self.odd_magnet_length() + 4.0 * self.inter_magnet
    }

    /// Length covered by the tiled periods alone
    pub fn periodic_length(&self) -> f64 {
        self.cell_pitch() * (self.num_repeats as f64 + 1.0)
    }

    /// Full extent from x = 0 to the end of the trailing margin
    pub fn lattice_length(&self) -> f64 {
        self.periodic_length() + 2.0 * self.margin + self.odd_magnet_length()
    }

    /// Check geometric consistency
    pub fn validate(&self) -> WigglerResult<()> {
        let lengths = [
            ("magnet_width", self.magnet_width),
            ("magnet_length", self.magnet_length),
            ("drift_length", self.drift_length),
            ("magnet_sep", self.magnet_sep),
            ("steel_thick", self.steel_thick),
            ("inter_magnet", self.inter_magnet),
            ("margin", self.margin),
            ("bound_horiz", self.bound_horiz),
            ("mesh_size", self.mesh_size),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value < 0.0 {
                return Err(WigglerError::Config(format!(
                    "{name} must be a finite, non-negative length (got {value})"
                )));
            }
        }

        if self.magnet_width <= 0.0 || self.magnet_length <= 0.0 {
            return Err(WigglerError::Config(format!(
                "magnet_width and magnet_length must be positive (got {} x {})",
                self.magnet_width, self.magnet_length
            )));
        }

        let odd = self.odd_magnet_length();
        if odd <= 0.0 {
            return Err(WigglerError::Config(format!(
                "odd magnet length drift_length - 2*inter_magnet = {odd} must be positive \
                 (drift_length = {}, inter_magnet = {})",
                self.drift_length, self.inter_magnet
            )));
        }

        // The air label sits between the left boundary and the lattice
        if self.bound_horiz <= 0.0 {
            return Err(WigglerError::Config(
                "bound_horiz must be positive to leave room for the surrounding air".to_string(),
            ));
        }

        let outer = self.magnet_sep + self.magnet_width + self.steel_thick;
        if outer >= 4.0 * self.magnet_width {
            return Err(WigglerError::Config(format!(
                "magnet rows and yoke reach y = {outer}, outside the boundary box half-height {}",
                4.0 * self.magnet_width
            )));
        }

        for (name, value) in [
            ("magnet_material", &self.magnet_material),
            ("steel_material", &self.steel_material),
            ("air_material", &self.air_material),
        ] {
            if value.trim().is_empty() {
                return Err(WigglerError::Config(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }

    /// Check that every referenced material exists and fits its role
    pub fn validate_materials(&self, library: &MaterialLibrary) -> WigglerResult<()> {
        let magnet = library.require(&self.magnet_material)?;
        if !matches!(magnet.kind, MaterialKind::PermanentMagnet | MaterialKind::Other) {
            return Err(WigglerError::Config(format!(
                "magnet_material {:?} is not a permanent magnet material",
                magnet.name
            )));
        }

        if self.steel_thick > 0.0 {
            library.require(&self.steel_material)?;
        }
        library.require(&self.air_material)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_device() {
        let config = MagnetConfig::default();
        config.validate().unwrap();

        assert_eq!(config.odd_magnet_length(), 30.0);
        assert!((config.cell_pitch() - 160.00382863800155).abs() < 1e-9);

        let total_m = config.length_unit.to_meters(config.periodic_length());
        assert!((total_m - 6.720160802796065).abs() < 1e-9);

        let expected = 160.00382863800155 * 42.0 + 2.0 + 30.0;
        assert!((config.lattice_length() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_odd_length_rejected() {
        let config = MagnetConfig {
            drift_length: 10.0,
            inter_magnet: 5.0,
            ..MagnetConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("odd magnet length"), "{err}");
    }

    #[test]
    fn test_negative_length_rejected() {
        let config = MagnetConfig {
            steel_thick: -1.0,
            ..MagnetConfig::default()
        };
        assert!(matches!(config.validate(), Err(WigglerError::Config(_))));
    }

    #[test]
    fn test_oversized_yoke_rejected() {
        let config = MagnetConfig {
            steel_thick: 300.0,
            ..MagnetConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MagnetConfig::from_json(
            r#"{"magnet_width": 50, "magnet_sep": 20, "inter_magnet": 5,
                "num_repeats": 5, "length_unit": "mm", "magnet_material": "N55"}"#,
        )
        .unwrap();
        assert_eq!(config.magnet_width, 50.0);
        assert_eq!(config.num_repeats, 5);
        assert_eq!(config.magnet_material, "N55");
        assert_eq!(config.drift_length, 30.0);
        assert_eq!(config.odd_magnet_length(), 20.0);
    }

    #[test]
    fn test_json_rejects_unknown_unit_and_negative_repeats() {
        assert!(MagnetConfig::from_json(r#"{"length_unit": "cubits"}"#).is_err());
        assert!(MagnetConfig::from_json(r#"{"num_repeats": -1}"#).is_err());
    }

    #[test]
    fn test_material_validation() {
        let library = MaterialLibrary::new();
        MagnetConfig::default().validate_materials(&library).unwrap();

        let config = MagnetConfig {
            magnet_material: "Unobtainium".to_string(),
            ..MagnetConfig::default()
        };
        assert!(matches!(
            config.validate_materials(&library),
            Err(WigglerError::UnknownMaterial { .. })
        ));

        let config = MagnetConfig {
            magnet_material: "1020 Steel".to_string(),
            ..MagnetConfig::default()
        };
        assert!(matches!(config.validate_materials(&library), Err(WigglerError::Config(_))));
    }
}
