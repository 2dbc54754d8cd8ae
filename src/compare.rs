use crate::{
    error::{BaselineError, Result},
    reader::Component,
};

/// Largest deviation found between two fields
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub points: usize,
    pub max_abs_diff: f64,
    /// Component name and grid index of the largest deviation
    pub worst: Option<(&'static str, (usize, usize))>,
    pub tolerance: f64,
}

impl ComparisonReport {
    pub fn within_tolerance(&self) -> bool {
        self.max_abs_diff <= self.tolerance
    }
}

/// Compares two sets of field components point by point
///
/// # Arguments
/// * `expected` - Components of the baseline
/// * `actual` - Components of the candidate, same names and order
/// * `tolerance` - Largest accepted absolute difference
///
/// # Returns
/// A report of the largest absolute difference. Non finite candidate values
/// count as an infinite difference.
pub fn compare_components(
    expected: &[Component],
    actual: &[Component],
    tolerance: f64,
) -> Result<ComparisonReport> {
    if expected.len() != actual.len() {
        return Err(BaselineError::Comparison(format!(
            "Baseline has {} components, candidate has {}",
            expected.len(),
            actual.len()
        )));
    }

    let mut report = ComparisonReport {
        points: 0,
        max_abs_diff: 0.0,
        worst: None,
        tolerance,
    };

    for (e, a) in std::iter::zip(expected, actual) {
        if e.values.shape() != a.values.shape() {
            return Err(BaselineError::Comparison(format!(
                "Component {} has shape {:?} in baseline but {:?} in candidate",
                e.name,
                e.values.shape(),
                a.values.shape()
            )));
        }
        if e.name != a.name {
            log::warn!("comparing baseline {} against candidate {}", e.name, a.name);
        }

        report.points = e.values.len();
        for j in 0..e.values.ncols() {
            for i in 0..e.values.nrows() {
                let diff = (e.values[(i, j)] - a.values[(i, j)]).abs();
                let diff = if diff.is_nan() { f64::INFINITY } else { diff };
                if report.worst.is_none() || diff > report.max_abs_diff {
                    report.max_abs_diff = diff;
                    report.worst = Some((e.name, (i, j)));
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn component(name: &'static str, values: DMatrix<f64>) -> Component {
        Component { name, values }
    }

    #[test]
    fn identical_fields_have_zero_difference() {
        let field = vec![component("xx", DMatrix::from_fn(3, 3, |i, j| (i * j) as f64))];
        let report = compare_components(&field, &field, 0.0).unwrap();
        assert_eq!(report.max_abs_diff, 0.0);
        assert_eq!(report.points, 9);
        assert!(report.within_tolerance());
    }

    #[test]
    fn reports_worst_point() {
        let expected = vec![
            component("xx", DMatrix::zeros(2, 2)),
            component("xy", DMatrix::zeros(2, 2)),
        ];
        let mut shifted: DMatrix<f64> = DMatrix::zeros(2, 2);
        shifted[(1, 0)] = 0.5;
        let actual = vec![component("xx", DMatrix::zeros(2, 2)), component("xy", shifted)];

        let report = compare_components(&expected, &actual, 0.1).unwrap();
        assert_eq!(report.max_abs_diff, 0.5);
        assert_eq!(report.worst, Some(("xy", (1, 0))));
        assert!(!report.within_tolerance());
    }

    #[test]
    fn nan_is_never_within_tolerance() {
        let expected = vec![component("value", DMatrix::zeros(1, 2))];
        let actual = vec![component("value", DMatrix::from_element(1, 2, f64::NAN))];
        let report = compare_components(&expected, &actual, 1e9).unwrap();
        assert!(!report.within_tolerance());
    }

    #[test]
    fn mismatched_shapes_are_errors() {
        let expected = vec![component("value", DMatrix::zeros(2, 2))];
        let actual = vec![component("value", DMatrix::zeros(3, 2))];
        assert!(matches!(
            compare_components(&expected, &actual, 1.0),
            Err(BaselineError::Comparison(_))
        ));
        assert!(matches!(
            compare_components(&expected, &[], 1.0),
            Err(BaselineError::Comparison(_))
        ));
    }
}
