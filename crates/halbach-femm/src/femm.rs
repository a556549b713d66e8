//! FEMM problem description built from wiggler geometry
//!
//! Nothing here talks to FEMM. The document is an ordered, immutable list of
//! what to draw, which `codegen` turns into a Lua script at the very end.

use nalgebra::Vector2;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

use crate::error::{WigglerError, WigglerResult};
use crate::geometry::{Rect, WigglerGeometry};
use crate::{EmitConfig, LengthUnit};

/// Nodes closer than this fraction of the problem extent are merged
const SNAP_TOLERANCE: f64 = 1e-9;

/// FEMM groups: magnets are kept apart from steel and air
const MAGNET_GROUP: u32 = 0;
const BACKGROUND_GROUP: u32 = 1;

/// Boundary condition definition (`mi_addboundprop`)
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryProp {
    pub name: String,
    pub kind: BoundaryKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryKind {
    /// Mixed condition approximating open space
    Asymptotic { c0: f64 },
    Periodic,
    Antiperiodic,
}

impl BoundaryKind {
    /// `BdryFormat` code for `mi_addboundprop`
    pub fn format_code(&self) -> u32 {
        match self {
            BoundaryKind::Asymptotic { .. } => 2,
            BoundaryKind::Periodic => 4,
            BoundaryKind::Antiperiodic => 5,
        }
    }

    pub fn c0(&self) -> f64 {
        match self {
            BoundaryKind::Asymptotic { c0 } => *c0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Vector2<f64>,
    pub end: Vector2<f64>,
    /// Boundary property assigned after drawing
    pub boundary: Option<String>,
}

impl Segment {
    pub fn midpoint(&self) -> Vector2<f64> {
        (self.start + self.end) / 2.0
    }
}

/// Block label and the properties set on it (`mi_setblockprop`)
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLabel {
    pub at: Vector2<f64>,
    pub material: String,
    pub automesh: bool,
    pub mesh_size: f64,
    pub magnetization_deg: f64,
    pub group: u32,
}

/// On-axis field plot requested after the solve
#[derive(Debug, Clone, PartialEq)]
pub struct ContourPlot {
    pub start: Vector2<f64>,
    pub end: Vector2<f64>,
    pub samples: usize,
    pub field_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FemmDocument {
    pub length_unit: LengthUnit,
    pub precision: f64,
    pub depth: f64,
    pub min_angle: f64,
    pub materials: Vec<String>,
    pub boundaries: Vec<BoundaryProp>,
    pub nodes: Vec<Vector2<f64>>,
    pub segments: Vec<Segment>,
    pub labels: Vec<BlockLabel>,
    /// View window (lower left, upper right)
    pub zoom: (Vector2<f64>, Vector2<f64>),
    pub fem_file: String,
    pub contour: Option<ContourPlot>,
    pub cell_pitch: f64,
    pub lattice_length: f64,
}

impl FemmDocument {
    /// Lower a wiggler geometry into FEMM drawing operations
    pub fn from_geometry(geometry: &WigglerGeometry, emit: &EmitConfig) -> WigglerResult<Self> {
        let config = &geometry.config;
        let depth = emit.depth.unwrap_or(config.magnet_width);
        if !depth.is_finite() || depth <= 0.0 {
            return Err(WigglerError::Config(format!("problem depth must be positive (got {depth})")));
        }

        let bounds = &geometry.boundary.rect;
        let mut drawing = Drawing::new(SNAP_TOLERANCE * bounds.width.max(bounds.height));
        let automesh = config.mesh_size == 0.0;
        let label = |at: Vector2<f64>, material: &str, magnetization_deg: f64, group: u32| BlockLabel {
            at,
            material: material.to_string(),
            automesh,
            mesh_size: config.mesh_size,
            magnetization_deg,
            group,
        };

        let boundary_name = "Asymptotic";
        drawing.rect(bounds, Some(boundary_name));

        let (axis_start, axis_end) = geometry.axis();
        drawing.node(axis_start);
        drawing.node(axis_end);

        let mut labels = Vec::with_capacity(geometry.lattice.block_count() + 3);
        for block in geometry.lattice.blocks() {
            drawing.rect(&block.rect, None);
            labels.push(label(block.rect.center, &block.material, block.magnetization_deg, MAGNET_GROUP));
        }

        let mut materials = vec![config.magnet_material.clone()];
        if let Some(yoke) = &geometry.yoke {
            for rect in [&yoke.top, &yoke.bottom] {
                drawing.rect(rect, None);
                labels.push(label(rect.center, &yoke.material, 0.0, BACKGROUND_GROUP));
            }
            materials.push(yoke.material.clone());
        }

        labels.push(label(geometry.air.label, &geometry.air.material, 0.0, BACKGROUND_GROUP));
        if !materials.contains(&geometry.air.material) {
            materials.push(geometry.air.material.clone());
        }

        let boundaries = vec![
            BoundaryProp {
                name: boundary_name.to_string(),
                kind: BoundaryKind::Asymptotic { c0: geometry.boundary.c0 },
            },
            BoundaryProp {
                name: "Periodic".to_string(),
                kind: BoundaryKind::Periodic,
            },
            BoundaryProp {
                name: "Antiperiodic".to_string(),
                kind: BoundaryKind::Antiperiodic,
            },
        ];

        let contour = emit.solve.as_ref().map(|solve| ContourPlot {
            start: axis_start,
            end: axis_end,
            samples: solve.samples,
            field_file: solve.field_file.clone(),
        });
        if let Some(plot) = &contour {
            if plot.samples < 2 {
                return Err(WigglerError::Config(format!(
                    "contour plot needs at least 2 samples (got {})",
                    plot.samples
                )));
            }
        }

        let margin_y = 1.5 * config.magnet_width;
        let zoom = (
            Vector2::new(-config.magnet_length, -(config.magnet_sep + margin_y)),
            Vector2::new(geometry.lattice_length + config.magnet_length, config.magnet_sep + margin_y),
        );

        debug!(
            "FEMM document: {} nodes, {} segments, {} labels",
            drawing.nodes.len(),
            drawing.segments.len(),
            labels.len()
        );

        Ok(Self {
            length_unit: config.length_unit,
            precision: emit.precision,
            depth,
            min_angle: emit.min_angle,
            materials,
            boundaries,
            nodes: drawing.nodes,
            segments: drawing.segments,
            labels,
            zoom,
            fem_file: emit.fem_file.clone(),
            contour,
            cell_pitch: geometry.cell.pitch,
            lattice_length: geometry.lattice_length,
        })
    }

    pub fn boundary_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.boundary.is_some())
    }
}

/// Node and segment lists with duplicates removed.
///
/// Abutting blocks share edges, but the two sides of a shared edge are
/// computed from different block centers and may differ by a few ULP. Nodes
/// closer than `tolerance` are snapped onto the first one drawn, and segments
/// are keyed by node index so FEMM gets every edge exactly once.
struct Drawing {
    tolerance: f64,
    nodes: Vec<Vector2<f64>>,
    segments: Vec<Segment>,
    buckets: HashMap<(i64, i64), Vec<usize>>,
    segment_keys: HashSet<(usize, usize)>,
}

impl Drawing {
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            nodes: Vec::new(),
            segments: Vec::new(),
            buckets: HashMap::new(),
            segment_keys: HashSet::new(),
        }
    }

    fn bucket(&self, p: &Vector2<f64>) -> (i64, i64) {
        (
            (p.x / self.tolerance).floor() as i64,
            (p.y / self.tolerance).floor() as i64,
        )
    }

    /// Index of the node at `p`, reusing an existing node within tolerance
    fn node(&mut self, p: Vector2<f64>) -> usize {
        let (bx, by) = self.bucket(&p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let near = self.buckets.get(&(bx + dx, by + dy)).and_then(|ids| {
                    ids.iter()
                        .copied()
                        .find(|&id| (self.nodes[id] - p).norm() <= self.tolerance)
                });
                if let Some(id) = near {
                    return id;
                }
            }
        }

        let id = self.nodes.len();
        self.nodes.push(p);
        self.buckets.entry((bx, by)).or_default().push(id);
        id
    }

    fn segment(&mut self, a: usize, b: usize, boundary: Option<&str>) {
        if a == b || !self.segment_keys.insert((a.min(b), a.max(b))) {
            return;
        }
        self.segments.push(Segment {
            start: self.nodes[a],
            end: self.nodes[b],
            boundary: boundary.map(str::to_string),
        });
    }

    fn rect(&mut self, rect: &Rect, boundary: Option<&str>) {
        let ids = rect.corners().map(|c| self.node(c));
        for i in 0..ids.len() {
            self.segment(ids[i], ids[(i + 1) % ids.len()], boundary);
        }
    }
}
