//! FEMM material library names
//!
//! FEMM resolves `mi_getmaterial` by exact name, so lookups here are exact
//! and a case-insensitive match is only offered as a hint.

use std::collections::BTreeMap;

use crate::error::{WigglerError, WigglerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    PermanentMagnet,
    SoftMagnetic,
    Air,
    /// Added by the user; role unknown
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
}

const PERMANENT_MAGNETS: &[&str] = &[
    "N30", "N33", "N35", "N38", "N40", "N42", "N45", "N48", "N50", "N52", "N55",
    "NdFeB 32 MGOe", "NdFeB 37 MGOe", "NdFeB 40 MGOe", "NdFeB 52 MGOe",
    "SmCo 20 MGOe", "SmCo 24 MGOe", "SmCo 27 MGOe",
    "Alnico 5", "Alnico 8", "Ceramic 5", "Ceramic 8",
];

const SOFT_MAGNETIC: &[&str] = &[
    "Pure Iron", "1006 Steel", "1010 Steel", "1018 Steel", "1020 Steel", "1117 Steel",
    "M-15 Steel", "M-19 Steel", "M-22 Steel", "M-27 Steel", "M-36 Steel", "M-43 Steel",
    "M-45 Steel", "Hiperco-50", "416 Stainless Steel", "430 Stainless Steel",
];

/// Names available to `mi_getmaterial`
pub struct MaterialLibrary {
    materials: BTreeMap<String, Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        let mut lib = Self {
            materials: BTreeMap::new(),
        };

        lib.add("Air", MaterialKind::Air);
        for name in PERMANENT_MAGNETS {
            lib.add(name, MaterialKind::PermanentMagnet);
        }
        for name in SOFT_MAGNETIC {
            lib.add(name, MaterialKind::SoftMagnetic);
        }

        lib
    }

    pub fn add(&mut self, name: &str, kind: MaterialKind) {
        self.materials.insert(name.to_string(), Material {
            name: name.to_string(),
            kind,
        });
    }

    /// Accept a user-provided name that FEMM is known to have
    pub fn allow(&mut self, name: &str) {
        if !self.materials.contains_key(name) {
            self.add(name, MaterialKind::Other);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn require(&self, name: &str) -> WigglerResult<&Material> {
        self.get(name).ok_or_else(|| {
            let hint = match self.names().find(|k| k.eq_ignore_ascii_case(name)) {
                Some(k) => format!(" (did you mean {k:?}?)"),
                None => format!(" (available: {})", self.names().collect::<Vec<_>>().join(", ")),
            };
            WigglerError::UnknownMaterial {
                name: name.to_string(),
                hint,
            }
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }
}

impl Default for MaterialLibrary {
    fn default() -> Self {
        Self::new()
    }
}
