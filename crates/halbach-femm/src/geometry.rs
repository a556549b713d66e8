//! Halbach cell layout, lattice tiling and enclosure
//!
//! x runs along the beam axis, y is vertical. The two magnet rows sit
//! symmetrically about y = 0 with the beam gap between them.

use nalgebra::Vector2;
use tracing::{debug, info, warn};

use crate::config::MagnetConfig;
use crate::error::WigglerResult;
use crate::UnitScales;

/// Magnetization angles in x-order for the top row of a cell
pub const TOP_ROW_ANGLES: [f64; 4] = [0.0, -90.0, 180.0, 90.0];
/// Magnetization angles in x-order for the bottom row of a cell
pub const BOTTOM_ROW_ANGLES: [f64; 4] = [180.0, 0.0, -90.0, 90.0];

const CELL_SEQUENCE: [BlockKind; 4] = [BlockKind::Odd, BlockKind::Full, BlockKind::Odd, BlockKind::Full];

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub center: Vector2<f64>,
    /// Extent along x
    pub width: f64,
    /// Extent along y
    pub height: f64,
}

impl Rect {
    pub fn new(center: Vector2<f64>, width: f64, height: f64) -> Self {
        Self { center, width, height }
    }

    pub fn from_corners(min: Vector2<f64>, max: Vector2<f64>) -> Self {
        Self {
            center: (min + max) / 2.0,
            width: max.x - min.x,
            height: max.y - min.y,
        }
    }

    pub fn min(&self) -> Vector2<f64> {
        self.center - Vector2::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn max(&self) -> Vector2<f64> {
        self.center + Vector2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Corners counter-clockwise from the lower left
    pub fn corners(&self) -> [Vector2<f64>; 4] {
        let (lo, hi) = (self.min(), self.max());
        [
            Vector2::new(lo.x, lo.y),
            Vector2::new(hi.x, lo.y),
            Vector2::new(hi.x, hi.y),
            Vector2::new(lo.x, hi.y),
        ]
    }

    pub fn translated(&self, dx: f64) -> Self {
        Self {
            center: self.center + Vector2::new(dx, 0.0),
            ..*self
        }
    }

    /// True when the interiors intersect by more than rounding noise;
    /// abutting edges do not count
    pub fn overlaps(&self, other: &Rect) -> bool {
        let tol = 1e-9 * (self.width + self.height + other.width + other.height);
        let (a_lo, a_hi) = (self.min(), self.max());
        let (b_lo, b_hi) = (other.min(), other.max());
        a_lo.x + tol < b_hi.x
            && b_lo.x + tol < a_hi.x
            && a_lo.y + tol < b_hi.y
            && b_lo.y + tol < a_hi.y
    }

    pub fn contains(&self, p: &Vector2<f64>) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Top,
    Bottom,
}

impl Row {
    pub fn sign(&self) -> f64 {
        match self {
            Row::Top => 1.0,
            Row::Bottom => -1.0,
        }
    }

    pub fn angles(&self) -> &'static [f64; 4] {
        match self {
            Row::Top => &TOP_ROW_ANGLES,
            Row::Bottom => &BOTTOM_ROW_ANGLES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Fills a drift section, `drift_length - 2*inter_magnet` long
    Odd,
    /// Full `magnet_length` block
    Full,
}

impl BlockKind {
    fn length(&self, config: &MagnetConfig) -> f64 {
        match self {
            BlockKind::Odd => config.odd_magnet_length(),
            BlockKind::Full => config.magnet_length,
        }
    }
}

/// One permanent magnet
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetBlock {
    pub rect: Rect,
    /// FEMM `magdir`, degrees counter-clockwise from +x
    pub magnetization_deg: f64,
    pub material: String,
    pub row: Row,
    pub kind: BlockKind,
}

impl MagnetBlock {
    pub fn translated(&self, dx: f64) -> Self {
        Self {
            rect: self.rect.translated(dx),
            ..self.clone()
        }
    }
}

/// One Halbach period: four blocks per row
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub blocks: Vec<MagnetBlock>,
    pub pitch: f64,
}

impl Cell {
    /// Lay out the first period, starting at `margin`
    pub fn layout(config: &MagnetConfig) -> Self {
        let mut blocks = Vec::with_capacity(2 * CELL_SEQUENCE.len());
        for row in [Row::Top, Row::Bottom] {
            blocks.extend(layout_row(config, row));
        }
        Self {
            blocks,
            pitch: config.cell_pitch(),
        }
    }

    pub fn row(&self, row: Row) -> impl Iterator<Item = &MagnetBlock> {
        self.blocks.iter().filter(move |b| b.row == row)
    }

    pub fn translated(&self, dx: f64) -> Self {
        Self {
            blocks: self.blocks.iter().map(|b| b.translated(dx)).collect(),
            pitch: self.pitch,
        }
    }
}

fn layout_row(config: &MagnetConfig, row: Row) -> Vec<MagnetBlock> {
    let y = row.sign() * (config.magnet_sep + config.magnet_width / 2.0);
    let mut cursor = config.margin;

    CELL_SEQUENCE
        .iter()
        .zip(row.angles())
        .map(|(&kind, &angle)| {
            cursor += config.inter_magnet;
            let length = kind.length(config);
            let block = MagnetBlock {
                rect: Rect::new(Vector2::new(cursor + length / 2.0, y), length, config.magnet_width),
                magnetization_deg: angle,
                material: config.magnet_material.clone(),
                row,
                kind,
            };
            cursor += length;
            debug!(
                "{:?} {:?} block at ({:.6}, {:.6}), magdir {}",
                row, kind, block.rect.center.x, block.rect.center.y, angle
            );
            block
        })
        .collect()
}

/// The tiled magnet array
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    /// Replica k is the base cell shifted by k * pitch
    pub cells: Vec<Cell>,
    /// Closing drift blocks, one per row
    pub drift: Vec<MagnetBlock>,
}

impl Lattice {
    /// Replicate `cell` for periods 0..=num_repeats and close with a drift cell
    pub fn tile(cell: &Cell, config: &MagnetConfig) -> Self {
        let cells: Vec<Cell> = (0..=config.num_repeats)
            .map(|k| cell.translated(k as f64 * cell.pitch))
            .collect();

        // The drift cell starts flush with the end of the last period, so the
        // leading block is shifted back by the gap that precedes it.
        let end = cells.len() as f64 * cell.pitch;
        let drift = [Row::Top, Row::Bottom]
            .iter()
            .filter_map(|&row| cell.row(row).next())
            .map(|lead| lead.translated(end - config.inter_magnet))
            .collect();

        Self { cells, drift }
    }

    pub fn replica(&self, k: usize) -> Option<&Cell> {
        self.cells.get(k)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &MagnetBlock> {
        self.cells.iter().flat_map(|c| c.blocks.iter()).chain(self.drift.iter())
    }

    pub fn block_count(&self) -> usize {
        self.cells.iter().map(|c| c.blocks.len()).sum::<usize>() + self.drift.len()
    }
}

/// Top and bottom return yokes
#[derive(Debug, Clone, PartialEq)]
pub struct SteelYoke {
    pub top: Rect,
    pub bottom: Rect,
    pub material: String,
}

/// Outer rectangle carrying the asymptotic boundary condition
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryBox {
    pub rect: Rect,
    pub c0: f64,
}

/// Catch-all label for the open region inside the boundary
#[derive(Debug, Clone, PartialEq)]
pub struct AirRegion {
    pub label: Vector2<f64>,
    pub material: String,
}

/// Complete drawing description of one wiggler
#[derive(Debug, Clone)]
pub struct WigglerGeometry {
    pub config: MagnetConfig,
    pub scales: UnitScales,
    pub cell: Cell,
    pub lattice: Lattice,
    pub yoke: Option<SteelYoke>,
    pub boundary: BoundaryBox,
    pub air: AirRegion,
    pub lattice_length: f64,
}

impl WigglerGeometry {
    pub fn build(config: &MagnetConfig) -> WigglerResult<Self> {
        config.validate()?;

        let scales = config.scales();
        let cell = Cell::layout(config);
        let lattice = Lattice::tile(&cell, config);
        let lattice_length = config.lattice_length();

        if config.num_repeats == 0 {
            warn!("num_repeats = 0: single-period device");
        }

        let yoke = steel_yoke(config, lattice_length);
        if yoke.is_none() {
            warn!("steel_thick = 0: no return yoke");
        }

        let boundary = boundary_box(config, &scales, lattice_length);
        let air = AirRegion {
            label: Vector2::new(-config.bound_horiz / 2.0, 0.0),
            material: config.air_material.clone(),
        };

        info!(
            "Odd magnet length {:.6} {}, cell pitch {:.6} {}, total length {:.4} m, {} blocks, c0 = {:.6e}",
            config.odd_magnet_length(),
            config.length_unit,
            cell.pitch,
            config.length_unit,
            config.length_unit.to_meters(lattice_length),
            lattice.block_count(),
            boundary.c0,
        );

        Ok(Self {
            config: config.clone(),
            scales,
            cell,
            lattice,
            yoke,
            boundary,
            air,
            lattice_length,
        })
    }

    /// Start and end of the on-axis probe line
    pub fn axis(&self) -> (Vector2<f64>, Vector2<f64>) {
        (Vector2::new(0.0, 0.0), Vector2::new(self.lattice_length, 0.0))
    }
}

fn steel_yoke(config: &MagnetConfig, lattice_length: f64) -> Option<SteelYoke> {
    if config.steel_thick <= 0.0 {
        return None;
    }
    let inner = config.magnet_sep + config.magnet_width;
    let outer = inner + config.steel_thick;
    Some(SteelYoke {
        top: Rect::from_corners(
            Vector2::new(config.margin, inner),
            Vector2::new(lattice_length, outer),
        ),
        bottom: Rect::from_corners(
            Vector2::new(config.margin, -outer),
            Vector2::new(lattice_length, -inner),
        ),
        material: config.steel_material.clone(),
    })
}

fn boundary_box(config: &MagnetConfig, scales: &UnitScales, lattice_length: f64) -> BoundaryBox {
    let half_height = 4.0 * config.magnet_width;
    BoundaryBox {
        rect: Rect::from_corners(
            Vector2::new(-config.bound_horiz, -half_height),
            Vector2::new(lattice_length + config.bound_horiz, half_height),
        ),
        c0: scales.asymptotic_c0(config.magnet_length),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gapped_config() -> MagnetConfig {
        MagnetConfig {
            magnet_width: 50.0,
            magnet_sep: 20.0,
            steel_thick: 30.0,
            inter_magnet: 5.0,
            num_repeats: 5,
            margin: 4.0,
            bound_horiz: 100.0,
            ..MagnetConfig::default()
        }
    }

    fn angles(cell: &Cell, row: Row) -> Vec<f64> {
        cell.row(row).map(|b| b.magnetization_deg).collect()
    }

    #[test]
    fn test_cell_blocks_disjoint() {
        for config in [MagnetConfig::default(), gapped_config()] {
            let cell = Cell::layout(&config);
            assert_eq!(cell.blocks.len(), 8);
            for (i, a) in cell.blocks.iter().enumerate() {
                for b in &cell.blocks[i + 1..] {
                    assert!(!a.rect.overlaps(&b.rect), "{a:?} overlaps {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_row_angle_sequences() {
        let cell = Cell::layout(&MagnetConfig::default());
        assert_eq!(angles(&cell, Row::Top), vec![0.0, -90.0, 180.0, 90.0]);
        assert_eq!(angles(&cell, Row::Bottom), vec![180.0, 0.0, -90.0, 90.0]);
    }

    #[test]
    fn test_rows_are_x_ordered_and_mirrored() {
        let config = gapped_config();
        let cell = Cell::layout(&config);
        let top: Vec<_> = cell.row(Row::Top).collect();
        let bottom: Vec<_> = cell.row(Row::Bottom).collect();

        for pair in top.windows(2) {
            assert!(pair[0].rect.center.x < pair[1].rect.center.x);
        }
        for (t, b) in top.iter().zip(&bottom) {
            assert_eq!(t.rect.center.x, b.rect.center.x);
            assert_eq!(t.rect.center.y, -b.rect.center.y);
            assert_eq!(t.rect.width, b.rect.width);
            assert_eq!(t.rect.height, b.rect.height);
            assert_eq!(t.kind, b.kind);
        }
    }

    #[test]
    fn test_cell_positions() {
        let config = gapped_config();
        let (l, odd, g, m) = (config.magnet_length, config.odd_magnet_length(), 5.0, 4.0);
        let cell = Cell::layout(&config);
        let xs: Vec<f64> = cell.row(Row::Top).map(|b| b.rect.center.x).collect();
        let expected = [
            odd / 2.0 + g + m,
            l / 2.0 + odd + 2.0 * g + m,
            odd / 2.0 + l + odd + 3.0 * g + m,
            l / 2.0 + odd + l + odd + 4.0 * g + m,
        ];
        for (x, e) in xs.iter().zip(expected) {
            assert!((x - e).abs() < 1e-9, "{x} vs {e}");
        }

        let y = cell.blocks[0].rect.center.y;
        assert_eq!(y, config.magnet_sep + config.magnet_width / 2.0);

        // Last block ends exactly one pitch after the margin
        let last = cell.row(Row::Top).last().unwrap();
        assert!((last.rect.max().x - (m + cell.pitch)).abs() < 1e-9);
    }

    #[test]
    fn test_tiling_is_rigid_translation() {
        let config = gapped_config();
        let cell = Cell::layout(&config);
        let lattice = Lattice::tile(&cell, &config);
        assert_eq!(lattice.cells.len(), config.num_repeats as usize + 1);

        for k in 0..=config.num_repeats as usize {
            let replica = lattice.replica(k).unwrap();
            let shift = k as f64 * cell.pitch;
            for (base, copy) in cell.blocks.iter().zip(&replica.blocks) {
                assert_eq!(copy.rect.center.x, base.rect.center.x + shift);
                assert_eq!(copy.rect.center.y, base.rect.center.y);
                assert_eq!(copy.rect.width, base.rect.width);
                assert_eq!(copy.magnetization_deg, base.magnetization_deg);
            }
        }
    }

    #[test]
    fn test_trailing_drift_cell() {
        let config = gapped_config();
        let cell = Cell::layout(&config);
        let lattice = Lattice::tile(&cell, &config);
        assert_eq!(lattice.drift.len(), 2);

        let start = (config.num_repeats as f64 + 1.0) * cell.pitch + config.margin;
        for block in &lattice.drift {
            assert_eq!(block.kind, BlockKind::Odd);
            assert!((block.rect.min().x - start).abs() < 1e-9);
            assert_eq!(block.rect.width, config.odd_magnet_length());
        }
        assert_eq!(lattice.drift[0].magnetization_deg, 0.0);
        assert_eq!(lattice.drift[1].magnetization_deg, 180.0);

        let all: Vec<_> = lattice.blocks().collect();
        assert_eq!(all.len(), lattice.block_count());
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(!a.rect.overlaps(&b.rect));
            }
        }
    }

    #[test]
    fn test_single_period_device() {
        let config = MagnetConfig {
            num_repeats: 0,
            ..MagnetConfig::default()
        };
        let geometry = WigglerGeometry::build(&config).unwrap();
        assert_eq!(geometry.lattice.cells.len(), 1);
        assert_eq!(geometry.lattice.cells[0], geometry.cell);
        assert_eq!(geometry.lattice.block_count(), 10);
    }

    #[test]
    fn test_enclosure() {
        for config in [MagnetConfig::default(), gapped_config()] {
            let geometry = WigglerGeometry::build(&config).unwrap();
            let bounds = &geometry.boundary.rect;
            assert_eq!(bounds.height / 2.0, 4.0 * config.magnet_width);
            assert!((bounds.min().x + config.bound_horiz).abs() < 1e-9);
            assert!((bounds.max().x - (geometry.lattice_length + config.bound_horiz)).abs() < 1e-9);

            let yoke = geometry.yoke.as_ref().unwrap();
            assert!((yoke.top.min().y - (config.magnet_sep + config.magnet_width)).abs() < 1e-9);
            assert!((yoke.top.height - config.steel_thick).abs() < 1e-9);
            assert!((yoke.bottom.max().y + yoke.top.min().y).abs() < 1e-9);
            assert!((yoke.top.min().x - config.margin).abs() < 1e-9);
            assert!((yoke.top.max().x - geometry.lattice_length).abs() < 1e-9);

            for block in geometry.lattice.blocks() {
                assert!(!block.rect.overlaps(&yoke.top));
                assert!(!block.rect.overlaps(&yoke.bottom));
                assert!(bounds.contains(&block.rect.min()) && bounds.contains(&block.rect.max()));
            }
            assert!(bounds.contains(&geometry.air.label));
        }
    }

    #[test]
    fn test_no_yoke_without_steel() {
        let config = MagnetConfig {
            steel_thick: 0.0,
            ..MagnetConfig::default()
        };
        let geometry = WigglerGeometry::build(&config).unwrap();
        assert!(geometry.yoke.is_none());
    }

    #[test]
    fn test_build_rejects_overlapping_drift() {
        let config = MagnetConfig {
            drift_length: 4.0,
            inter_magnet: 2.0,
            ..MagnetConfig::default()
        };
        assert!(WigglerGeometry::build(&config).is_err());
    }
}
