use std::f64::consts::FRAC_PI_2;

use nalgebra::DMatrix;

use crate::{
    datatypes::{DisplacementField, Grid, LoadCase, StrainField},
    error::Result,
};

/// Calculates the strain tensor components at a point
///
/// # Arguments
/// * `x` - Depth below the surface
/// * `y` - Offset from the load line
/// * `load_case` - The material model
///
/// # Returns
/// The `(exx, eyy, exy)` components. All zero at the load point.
pub fn compute_strain(x: f64, y: f64, load_case: &LoadCase) -> (f64, f64, f64) {
    let nu = load_case.poisson_ratio;
    let r = f64::sqrt(x * x + y * y);

    // load point
    let pe_r_term = if r == 0.0 {
        0.0
    } else {
        load_case.pe_term / f64::powi(r, 4)
    };

    let exx = pe_r_term
        * (nu * (1.0 + nu) * x * f64::powi(y, 2) - (1.0 - f64::powi(nu, 2)) * f64::powi(x, 3));
    let eyy = pe_r_term
        * (nu * (1.0 + nu) * f64::powi(x, 3) - (1.0 - f64::powi(nu, 2)) * x * f64::powi(y, 2));
    let exy = pe_r_term * f64::powi(x, 2) * y * (nu + 1.0);

    (exx, eyy, exy)
}

/// Calculates the displacement at a point
///
/// The closed form is singular at the load point, where both components are
/// zero. On the surface (`x = 0`) the inverse tangent takes its limit.
///
/// # Arguments
/// * `x` - Depth below the surface
/// * `y` - Offset from the load line
/// * `load_case` - The material model and integration constants
///
/// # Returns
/// The `(ux, uy)` components
pub fn compute_displacement(x: f64, y: f64, load_case: &LoadCase) -> (f64, f64) {
    let nu = load_case.poisson_ratio;
    let r_squared = x * x + y * y;

    if r_squared == 0.0 {
        return (0.0, 0.0);
    }

    // NOTE: this is the formula the reference baselines were built with. It
    // has not been checked against an independent derivation.
    let ux = load_case.pe_term / -2.0
        * ((nu + 1.0) * f64::powi(y, 2) / r_squared + (1.0 + f64::powi(nu, 2)) * r_squared.ln())
        + load_case.c1;

    let theta = if x == 0.0 {
        y.signum() * FRAC_PI_2
    } else {
        (y / x).atan()
    };
    let uy = load_case.pe_term
        * ((2.0 * f64::powi(nu, 2) + nu - 1.0) * 0.5 * theta + (nu + 1.0) * x * y / 2.0 / r_squared)
        + load_case.c2;

    (ux, uy)
}

/// Evaluates the closed form solution over the whole grid
///
/// # Arguments
/// * `grid` - The index space to evaluate on
/// * `load_case` - The material model and integration constants
///
/// # Returns
/// The displacement and strain fields, both indexed `(i, j)`
pub fn generate_fields(grid: &Grid, load_case: &LoadCase) -> (DisplacementField, StrainField) {
    let n = grid.side_length();
    log::debug!(
        "evaluating line load on {n}x{n} grid (nu = {}, pe_term = {})",
        load_case.poisson_ratio,
        load_case.pe_term
    );

    let mut ux: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut uy: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut exx: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut eyy: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut exy: DMatrix<f64> = DMatrix::zeros(n, n);

    for j in 0..n {
        for i in 0..n {
            let (x, y) = grid.coordinates(i, j);

            let (u, v) = compute_displacement(x, y, load_case);
            ux[(i, j)] = u;
            uy[(i, j)] = v;

            let (xx, yy, xy) = compute_strain(x, y, load_case);
            exx[(i, j)] = xx;
            eyy[(i, j)] = yy;
            exy[(i, j)] = xy;
        }
    }

    log::info!("generated displacement and strain fields for {} points", grid.n_points());

    (DisplacementField { ux, uy }, StrainField { exx, eyy, exy })
}

/// Array form of [`generate_fields`] using the default integration constants
///
/// # Arguments
/// * `start` - First `y` coordinate of the grid
/// * `stop` - One past the last `y` coordinate; also the x extent
/// * `nu` - Poisson's ratio
/// * `pe_term` - Load over stiffness scaling, `2P / (πE)`
///
/// # Returns
/// `(ux, uy, exx, eyy, exy)`, each of shape `(stop - start, stop - start)`
pub fn generate_fields_raw(
    start: i64,
    stop: i64,
    nu: f64,
    pe_term: f64,
) -> Result<(DMatrix<f64>, DMatrix<f64>, DMatrix<f64>, DMatrix<f64>, DMatrix<f64>)> {
    let grid = Grid::new(start, stop)?;
    let load_case = LoadCase {
        poisson_ratio: nu,
        pe_term,
        ..LoadCase::default()
    };
    let (displacement, strain) = generate_fields(&grid, &load_case);

    Ok((
        displacement.ux,
        displacement.uy,
        strain.exx,
        strain.eyy,
        strain.exy,
    ))
}
