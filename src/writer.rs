use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use nalgebra::DMatrix;

use crate::{
    datatypes::{DisplacementField, Grid, ImageGeometry, StrainField},
    error::{BaselineError, Result},
};

pub const DISPLACEMENT_VTK: &str = "LineLoadDisplacement.vtk";
pub const STRAIN_VTK: &str = "LineLoadStrain.vtk";
pub const STRAIN_MHD: &str = "LineLoadStrain.mhd";
pub const STRAIN_COMPONENT_PREFIX: &str = "LineLoadStrainComponent";

/// Point attribute stored in a legacy VTK file
#[derive(Debug, Clone, Copy)]
pub enum VtkAttribute<'a> {
    /// One `x y z` line per point
    Vectors(&'a str),
    /// Three rows of a 3x3 tensor per point, followed by a blank line
    Tensors(&'a str),
}

impl VtkAttribute<'_> {
    fn keyword(&self) -> &'static str {
        match self {
            VtkAttribute::Vectors(_) => "VECTORS",
            VtkAttribute::Tensors(_) => "TENSORS",
        }
    }

    fn name(&self) -> &str {
        match self {
            VtkAttribute::Vectors(name) | VtkAttribute::Tensors(name) => name,
        }
    }

    fn channels(&self) -> usize {
        match self {
            VtkAttribute::Vectors(_) => 3,
            VtkAttribute::Tensors(_) => 9,
        }
    }

    fn write_point(&self, out: &mut impl Write, values: &[f64]) -> std::io::Result<()> {
        match self {
            VtkAttribute::Vectors(_) => writeln!(
                out,
                "{} {} {:?}",
                format_significant(values[0], 20),
                format_significant(values[1], 20),
                values[2]
            ),
            VtkAttribute::Tensors(_) => {
                for row in values.chunks(3) {
                    writeln!(out, "{:?} {:?} {:?}", row[0], row[1], row[2])?;
                }
                writeln!(out)
            }
        }
    }
}

/// Formats a float like C's `%.<digits>g`
///
/// # Arguments
/// * `value` - The value to format
/// * `digits` - Number of significant digits
pub fn format_significant(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    let digits = digits.max(1);
    let scientific = format!("{:.*e}", digits - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= digits as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let precision = (digits as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", precision, value)).to_owned()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    match File::create(path) {
        Ok(f) => Ok(BufWriter::new(f)),
        Err(err) => Err(BaselineError::io(path, err)),
    }
}

/// Writes a point attribute as a legacy VTK structured points file
///
/// # Arguments
/// * `path` - The output file
/// * `title` - Free text second header line
/// * `geometry` - Grid size, origin and spacing
/// * `attribute` - Attribute kind and name
/// * `point` - Returns the values of the point at grid index `(i, j)`
pub fn write_vtk<const C: usize>(
    path: &Path,
    title: &str,
    geometry: &ImageGeometry,
    attribute: VtkAttribute,
    point: impl Fn(usize, usize) -> [f64; C],
) -> Result<()> {
    if attribute.channels() != C {
        return Err(BaselineError::Serializer(format!(
            "{} attribute needs {} values per point, got {}",
            attribute.keyword(),
            attribute.channels(),
            C
        )));
    }

    let mut out = create_file(path)?;
    let write = |out: &mut BufWriter<File>| -> std::io::Result<()> {
        writeln!(out, "# vtk DataFile Version 2.0")?;
        writeln!(out, "{title}")?;
        writeln!(out, "ASCII")?;
        writeln!(out, "DATASET STRUCTURED_POINTS")?;
        writeln!(out, "DIMENSIONS {} {} 1", geometry.size[0], geometry.size[1])?;
        writeln!(
            out,
            "ORIGIN {:?} {} 0.0",
            geometry.origin[0], geometry.origin[1]
        )?;
        writeln!(
            out,
            "SPACING {:?} {:?} 1.0",
            geometry.spacing[0], geometry.spacing[1]
        )?;
        writeln!(out)?;
        writeln!(out, "POINT_DATA {}", geometry.n_points())?;
        writeln!(out, "{} {} double", attribute.keyword(), attribute.name())?;

        for p in 0..geometry.n_points() {
            let (i, j) = geometry.index_of(p);
            attribute.write_point(out, &point(i, j))?;
        }
        out.flush()
    };
    write(&mut out).map_err(|err| BaselineError::io(path, err))?;

    log::debug!("wrote {}", path.display());
    Ok(())
}

/// Writes a MetaImage header and its sibling `.raw` data file
///
/// The raw file holds little endian doubles, point by point, with the `C`
/// channels of a point stored consecutively.
///
/// # Arguments
/// * `header_path` - The `.mhd` output file
/// * `geometry` - Grid size, offset and spacing
/// * `point` - Returns the channels of the point at grid index `(i, j)`
///
/// # Returns
/// The path of the raw data file
pub fn write_metaimage<const C: usize>(
    header_path: &Path,
    geometry: &ImageGeometry,
    point: impl Fn(usize, usize) -> [f64; C],
) -> Result<PathBuf> {
    let raw_path = header_path.with_extension("raw");
    let raw_name = match raw_path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            return Err(BaselineError::Serializer(format!(
                "Invalid MetaImage header path {}",
                header_path.display()
            )))
        }
    };

    let mut header = create_file(header_path)?;
    let write_header = |out: &mut BufWriter<File>| -> std::io::Result<()> {
        writeln!(out, "ObjectType = Image")?;
        writeln!(out, "NDims = 2")?;
        writeln!(out, "BinaryData = True")?;
        writeln!(out, "BinaryDataByteOrderMSB = False")?;
        writeln!(out, "CompressedData = False")?;
        writeln!(out, "TransformMatrix = 1 0 0 1")?;
        writeln!(out, "Offset = {} {}", geometry.origin[0], geometry.origin[1])?;
        if C > 1 {
            writeln!(out, "ElementNumberOfChannels = {}", C)?;
        }
        writeln!(
            out,
            "ElementSpacing = {:?} {:?}",
            geometry.spacing[0], geometry.spacing[1]
        )?;
        writeln!(out, "DimSize = {} {}", geometry.size[0], geometry.size[1])?;
        writeln!(out, "ElementType = MET_DOUBLE")?;
        writeln!(out, "ElementDataFile = {raw_name}")?;
        out.flush()
    };
    write_header(&mut header).map_err(|err| BaselineError::io(header_path, err))?;
    drop(header);

    let mut raw = create_file(&raw_path)?;
    let write_raw = |out: &mut BufWriter<File>| -> std::io::Result<()> {
        for p in 0..geometry.n_points() {
            let (i, j) = geometry.index_of(p);
            for value in point(i, j) {
                out.write_all(&value.to_le_bytes())?;
            }
        }
        out.flush()
    };
    write_raw(&mut raw).map_err(|err| BaselineError::io(&raw_path, err))?;

    log::debug!(
        "wrote {} and {}",
        header_path.display(),
        raw_path.display()
    );
    Ok(raw_path)
}

fn check_shape(name: &str, field: &DMatrix<f64>, grid: &Grid) -> Result<()> {
    let n = grid.side_length();
    if field.shape() != (n, n) {
        return Err(BaselineError::Serializer(format!(
            "{name} has shape {:?}, grid is {n}x{n}",
            field.shape()
        )));
    }
    Ok(())
}

/// Writes the full baseline file set for a line load
///
/// # Arguments
/// * `output_dir` - Directory receiving the files, created if missing
/// * `grid` - The grid the fields were evaluated on
/// * `displacement` - The displacement field
/// * `strain` - The strain field
/// * `quiet` - Hide the progress bar
///
/// # Returns
/// Every file written, in order
pub fn write_baseline(
    output_dir: &Path,
    grid: &Grid,
    displacement: &DisplacementField,
    strain: &StrainField,
    quiet: bool,
) -> Result<Vec<PathBuf>> {
    check_shape("ux", &displacement.ux, grid)?;
    check_shape("uy", &displacement.uy, grid)?;
    for (name, field) in ["exx", "exy", "eyy"].iter().zip(strain.components()) {
        check_shape(name, field, grid)?;
    }

    std::fs::create_dir_all(output_dir).map_err(|err| BaselineError::io(output_dir, err))?;

    let vtk_geometry = grid.vtk_geometry();
    let meta_geometry = grid.meta_geometry();
    let mut written: Vec<PathBuf> = Vec::new();

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(6)
    };

    let path = output_dir.join(DISPLACEMENT_VTK);
    write_vtk(
        &path,
        "Displacements for a line load.",
        &vtk_geometry,
        VtkAttribute::Vectors("displacement"),
        |i, j| [displacement.ux[(i, j)], displacement.uy[(i, j)], 0.0],
    )?;
    written.push(path);
    bar.inc(1);

    for (c, component) in strain.components().into_iter().enumerate() {
        let path = output_dir.join(format!("{STRAIN_COMPONENT_PREFIX}{c}.mhd"));
        let raw = write_metaimage(&path, &meta_geometry, |i, j| [component[(i, j)]])?;
        written.push(path);
        written.push(raw);
        bar.inc(1);
    }

    let path = output_dir.join(STRAIN_VTK);
    write_vtk(
        &path,
        "Strains for a line load.",
        &vtk_geometry,
        VtkAttribute::Tensors("strain"),
        |i, j| {
            // row major, nalgebra stores columns
            let mut values = [0.0; 9];
            values.copy_from_slice(strain.tensor(i, j).transpose().as_slice());
            values
        },
    )?;
    written.push(path);
    bar.inc(1);

    let path = output_dir.join(STRAIN_MHD);
    let raw = write_metaimage(&path, &meta_geometry, |i, j| {
        [strain.exx[(i, j)], strain.exy[(i, j)], strain.eyy[(i, j)]]
    })?;
    written.push(path);
    written.push(raw);
    bar.inc(1);

    bar.finish();
    log::info!(
        "wrote {} baseline files to {}",
        written.len(),
        output_dir.display()
    );

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datatypes::LoadCase, generator::generate_fields};

    fn small_case() -> (Grid, DisplacementField, StrainField) {
        let grid = Grid::new(-3, 4).unwrap();
        let (displacement, strain) = generate_fields(&grid, &LoadCase::default());
        (grid, displacement, strain)
    }

    fn read_f64s(path: &Path) -> Vec<f64> {
        std::fs::read(path)
            .unwrap()
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes(b.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn significant_digits_match_printf() {
        assert_eq!(format_significant(0.683957697813948, 20), "0.68395769781394799569");
        assert_eq!(format_significant(0.1, 20), "0.10000000000000000555");
        assert_eq!(format_significant(1e-7, 20), "9.9999999999999995475e-08");
        assert_eq!(format_significant(123456.0, 20), "123456");
        assert_eq!(format_significant(-2.5e-5, 20), "-2.5000000000000001198e-05");
        assert_eq!(format_significant(1e25, 20), "1.0000000000000000906e+25");
        assert_eq!(format_significant(0.0, 20), "0");
        assert_eq!(
            format_significant(2.0 / 5.0 / std::f64::consts::PI, 20),
            "0.12732395447351627094"
        );
    }

    #[test]
    fn writes_every_baseline_file() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, displacement, strain) = small_case();
        let written = write_baseline(dir.path(), &grid, &displacement, &strain, true).unwrap();

        assert_eq!(written.len(), 10);
        for name in [
            "LineLoadDisplacement.vtk",
            "LineLoadStrain.vtk",
            "LineLoadStrain.mhd",
            "LineLoadStrain.raw",
            "LineLoadStrainComponent0.mhd",
            "LineLoadStrainComponent0.raw",
            "LineLoadStrainComponent1.raw",
            "LineLoadStrainComponent2.raw",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
    }

    #[test]
    fn component_raw_matches_memory_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, displacement, strain) = small_case();
        write_baseline(dir.path(), &grid, &displacement, &strain, true).unwrap();

        for (c, component) in strain.components().into_iter().enumerate() {
            let values = read_f64s(&dir.path().join(format!("LineLoadStrainComponent{c}.raw")));
            assert_eq!(values.len(), grid.n_points());
            // column-major storage is the serialized point order
            assert_eq!(values.as_slice(), component.as_slice());
        }
    }

    #[test]
    fn packed_raw_deinterleaves_to_components() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, displacement, strain) = small_case();
        write_baseline(dir.path(), &grid, &displacement, &strain, true).unwrap();

        let packed = read_f64s(&dir.path().join("LineLoadStrain.raw"));
        assert_eq!(packed.len(), 3 * grid.n_points());
        for c in 0..3 {
            let raw = dir.path().join(format!("LineLoadStrainComponent{c}.raw"));
            let component = read_f64s(&raw);
            let channel: Vec<f64> = packed.iter().skip(c).step_by(3).copied().collect();
            assert_eq!(channel, component);
        }
    }

    #[test]
    fn headers_describe_the_grid() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, displacement, strain) = small_case();
        write_baseline(dir.path(), &grid, &displacement, &strain, true).unwrap();

        let packed = std::fs::read_to_string(dir.path().join("LineLoadStrain.mhd")).unwrap();
        assert!(packed.contains("DimSize = 7 7\n"));
        assert!(packed.contains("ElementNumberOfChannels = 3\n"));
        assert!(packed.contains("ElementType = MET_DOUBLE\n"));
        assert!(packed.ends_with("ElementDataFile = LineLoadStrain.raw\n"));

        let component_path = dir.path().join("LineLoadStrainComponent1.mhd");
        let component = std::fs::read_to_string(component_path).unwrap();
        assert!(!component.contains("ElementNumberOfChannels"));

        let vtk = std::fs::read_to_string(dir.path().join("LineLoadDisplacement.vtk")).unwrap();
        let lines: Vec<&str> = vtk.lines().collect();
        assert_eq!(lines[0], "# vtk DataFile Version 2.0");
        assert_eq!(lines[4], "DIMENSIONS 7 7 1");
        assert_eq!(lines[5], "ORIGIN 0.0 3 0.0");
        assert_eq!(lines[8], "POINT_DATA 49");
        assert_eq!(lines[9], "VECTORS displacement double");
        assert_eq!(lines.len(), 10 + 49);
        assert!(lines[10].ends_with(" 0.0"));
        assert!(lines.iter().skip(10).all(|line| line.ends_with(" 0.0")));
    }

    #[test]
    fn tensor_off_diagonals_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, displacement, strain) = small_case();
        write_baseline(dir.path(), &grid, &displacement, &strain, true).unwrap();

        let vtk = std::fs::read_to_string(dir.path().join("LineLoadStrain.vtk")).unwrap();
        let body: Vec<&str> = vtk.lines().skip(10).collect();
        assert_eq!(body.len(), 4 * grid.n_points());
        for point in body.chunks(4) {
            let row0: Vec<&str> = point[0].split(' ').collect();
            let row1: Vec<&str> = point[1].split(' ').collect();
            assert_eq!(row0[1], row1[0]);
            assert_eq!(point[2], "0.0 0.0 0.0");
            assert_eq!(point[3], "");
        }
    }

    #[test]
    fn rewriting_is_byte_identical() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let (grid, displacement, strain) = small_case();
        write_baseline(first.path(), &grid, &displacement, &strain, true).unwrap();
        let (displacement, strain) = generate_fields(&grid, &LoadCase::default());
        write_baseline(second.path(), &grid, &displacement, &strain, true).unwrap();

        for name in ["LineLoadStrain.raw", "LineLoadStrainComponent0.raw", "LineLoadStrain.vtk"] {
            assert_eq!(
                std::fs::read(first.path().join(name)).unwrap(),
                std::fs::read(second.path().join(name)).unwrap()
            );
        }
    }

    #[test]
    fn rejects_mismatched_field_shape() {
        let dir = tempfile::tempdir().unwrap();
        let (_, displacement, strain) = small_case();
        let grid = Grid::new(-2, 2).unwrap();
        let result = write_baseline(dir.path(), &grid, &displacement, &strain, true);
        assert!(matches!(result, Err(BaselineError::Serializer(_))));
    }

    #[test]
    fn vtk_rejects_wrong_channel_count() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = Grid::new(0, 2).unwrap().vtk_geometry();
        let result = write_vtk(
            &dir.path().join("bad.vtk"),
            "bad",
            &geometry,
            VtkAttribute::Tensors("strain"),
            |_, _| [0.0; 3],
        );
        assert!(matches!(result, Err(BaselineError::Serializer(_))));
    }
}
