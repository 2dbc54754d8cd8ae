use std::f64::consts::PI;

use nalgebra::{matrix, DMatrix, Matrix3};

use crate::error::{BaselineError, Result};

/// Square index space for the line load problem
///
/// Index `(i, j)` maps to `x = i` and `y = start + j`. The x axis starts at
/// the surface while the y axis is centered on the load line; this matches
/// the layout the published baselines were generated with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub start: i64,
    pub stop: i64,
}

impl Grid {
    pub fn new(start: i64, stop: i64) -> Result<Grid> {
        if stop <= start {
            return Err(BaselineError::Input(format!(
                "Grid stop ({stop}) must be greater than start ({start})"
            )));
        }

        // every field of the grid must be addressable as one f64 buffer
        let fits = stop
            .checked_sub(start)
            .and_then(|side| usize::try_from(side).ok())
            .and_then(|side| side.checked_mul(side))
            .and_then(|n| n.checked_mul(std::mem::size_of::<f64>()))
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(BaselineError::Input(format!(
                "Grid from {start} to {stop} is too large"
            )));
        }

        Ok(Grid { start, stop })
    }

    pub fn side_length(&self) -> usize {
        self.stop.abs_diff(self.start) as usize
    }

    pub fn n_points(&self) -> usize {
        self.side_length() * self.side_length()
    }

    /// Physical coordinates of the grid index `(i, j)`
    pub fn coordinates(&self, i: usize, j: usize) -> (f64, f64) {
        (i as f64, (self.start + j as i64) as f64)
    }

    /// Index of the load application point, if it lies on the grid
    pub fn load_point(&self) -> Option<(usize, usize)> {
        if self.start <= 0 && self.stop > 0 {
            Some((0, (-self.start) as usize))
        } else {
            None
        }
    }

    /// Geometry written into the VTK baselines. The y origin is `-start`,
    /// which is what the reference files have always carried.
    pub fn vtk_geometry(&self) -> ImageGeometry {
        ImageGeometry {
            size: [self.side_length(), self.side_length()],
            origin: [0.0, -(self.start as f64)],
            spacing: [1.0, 1.0],
        }
    }

    /// Geometry written into the MetaImage baselines
    pub fn meta_geometry(&self) -> ImageGeometry {
        ImageGeometry {
            size: [self.side_length(), self.side_length()],
            origin: [0.0, 0.0],
            spacing: [1.0, 1.0],
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Grid {
            start: -50,
            stop: 51,
        }
    }
}

/// Material model and integration constants of one generation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadCase {
    /// Poisson's ratio, dimensionless. Physically |ν| < 0.5
    pub poisson_ratio: f64,
    /// Load over stiffness scaling, `2P / (πE)`
    pub pe_term: f64,
    /// Integration constant added to `ux`
    pub c1: f64,
    /// Integration constant added to `uy`
    pub c2: f64,
}

impl LoadCase {
    /// Computes the scaling term from a line force and a Young's modulus
    pub fn pe_term_from(force: f64, youngs_modulus: f64) -> f64 {
        2.0 * force / (PI * youngs_modulus)
    }
}

impl Default for LoadCase {
    fn default() -> Self {
        LoadCase {
            poisson_ratio: 0.495,
            pe_term: 2.0 * 1.0 / 5.0 / PI,
            c1: 1.0,
            c2: 0.0,
        }
    }
}

/// Spatial metadata of a serialized 2D image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry {
    pub size: [usize; 2],
    pub origin: [f64; 2],
    pub spacing: [f64; 2],
}

impl ImageGeometry {
    pub fn n_points(&self) -> usize {
        self.size[0] * self.size[1]
    }

    /// Number of points, or `None` when it does not fit in a usize
    pub fn checked_n_points(&self) -> Option<usize> {
        self.size[0].checked_mul(self.size[1])
    }

    /// Grid index of the `p`-th serialized point. x varies fastest.
    pub fn index_of(&self, p: usize) -> (usize, usize) {
        (p % self.size[0], p / self.size[0])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    pub ux: DMatrix<f64>,
    pub uy: DMatrix<f64>,
}

/// Independent components of the symmetric plane-strain tensor
#[derive(Debug, Clone, PartialEq)]
pub struct StrainField {
    pub exx: DMatrix<f64>,
    pub eyy: DMatrix<f64>,
    pub exy: DMatrix<f64>,
}

impl StrainField {
    /// Full 3x3 tensor at `(i, j)`; the out of plane row and column are zero
    pub fn tensor(&self, i: usize, j: usize) -> Matrix3<f64> {
        let (xx, xy, yy) = (self.exx[(i, j)], self.exy[(i, j)], self.eyy[(i, j)]);
        matrix![
            xx, xy, 0.0;
            xy, yy, 0.0;
            0.0, 0.0, 0.0;
        ]
    }

    /// Components in the order of the `LineLoadStrainComponent` files
    pub fn components(&self) -> [&DMatrix<f64>; 3] {
        [&self.exx, &self.exy, &self.eyy]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_matches_reference_layout() {
        let grid = Grid::default();
        assert_eq!(grid.side_length(), 101);
        assert_eq!(grid.n_points(), 10201);
        assert_eq!(grid.load_point(), Some((0, 50)));
        assert_eq!(grid.coordinates(0, 0), (0.0, -50.0));
        assert_eq!(grid.coordinates(100, 100), (100.0, 50.0));
    }

    #[test]
    fn grid_rejects_empty_range() {
        assert!(matches!(Grid::new(5, 5), Err(BaselineError::Input(_))));
        assert!(matches!(Grid::new(5, -5), Err(BaselineError::Input(_))));
    }

    #[test]
    fn grid_rejects_ranges_that_overflow() {
        assert!(matches!(Grid::new(i64::MIN, i64::MAX), Err(BaselineError::Input(_))));
        assert!(matches!(Grid::new(-1, i64::MAX), Err(BaselineError::Input(_))));
        assert!(matches!(Grid::new(0, 1 << 40), Err(BaselineError::Input(_))));
        assert_eq!(Grid::new(i64::MAX - 3, i64::MAX).unwrap().side_length(), 3);

        let lowest = Grid::new(i64::MIN, i64::MIN + 2).unwrap();
        assert_eq!(lowest.side_length(), 2);
        assert_eq!(lowest.load_point(), None);
        assert_eq!(lowest.vtk_geometry().origin[1], -(i64::MIN as f64));
    }

    #[test]
    fn checked_point_count() {
        let geometry = ImageGeometry {
            size: [usize::MAX / 2, 3],
            origin: [0.0, 0.0],
            spacing: [1.0, 1.0],
        };
        assert_eq!(geometry.checked_n_points(), None);
        assert_eq!(Grid::default().vtk_geometry().checked_n_points(), Some(10201));
    }

    #[test]
    fn load_point_absent_when_grid_misses_it() {
        let grid = Grid::new(1, 10).unwrap();
        assert_eq!(grid.load_point(), None);
    }

    #[test]
    fn geometry_point_order_is_x_fastest() {
        let geometry = Grid::new(-2, 2).unwrap().vtk_geometry();
        assert_eq!(geometry.origin, [0.0, 2.0]);
        assert_eq!(geometry.index_of(0), (0, 0));
        assert_eq!(geometry.index_of(1), (1, 0));
        assert_eq!(geometry.index_of(4), (0, 1));
    }

    #[test]
    fn pe_term_from_force_and_modulus() {
        let pe = LoadCase::pe_term_from(1.0, 5.0);
        assert!((pe - LoadCase::default().pe_term).abs() < 1e-15);
    }

    #[test]
    fn tensor_is_symmetric() {
        let strain = StrainField {
            exx: DMatrix::from_element(2, 2, 1.0),
            eyy: DMatrix::from_element(2, 2, 2.0),
            exy: DMatrix::from_element(2, 2, 3.0),
        };
        let t = strain.tensor(1, 1);
        assert_eq!(t, t.transpose());
        assert_eq!(t[(0, 1)], 3.0);
        assert_eq!(t[(2, 2)], 0.0);
    }
}
