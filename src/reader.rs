use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use nalgebra::DMatrix;

use crate::{
    datatypes::ImageGeometry,
    error::{BaselineError, Result},
};

/// How the channels of a point should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Vector,
    /// Full 3x3 tensor, row major
    Tensor,
    /// Symmetric 2D tensor packed as `xx xy yy`
    PackedTensor,
}

/// A 2D image read back from disk
#[derive(Debug, Clone)]
pub struct ImageData {
    pub geometry: ImageGeometry,
    pub channels: usize,
    pub kind: FieldKind,
    /// Point then channel, x varies fastest
    pub data: Vec<f64>,
}

/// A named, de-interleaved component of an image
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: &'static str,
    pub values: DMatrix<f64>,
}

impl ImageData {
    /// De-interleaves one channel into an `(i, j)` indexed matrix
    pub fn channel(&self, c: usize) -> DMatrix<f64> {
        let [nx, ny] = self.geometry.size;
        DMatrix::from_iterator(
            nx,
            ny,
            self.data.iter().skip(c).step_by(self.channels).copied(),
        )
    }

    /// Splits the image into its independent logical components
    ///
    /// Tensors are reduced to `xx xy yy`, after checking their in-plane
    /// off-diagonal entries agree. Vectors keep their in-plane `x y`.
    pub fn components(&self) -> Result<Vec<Component>> {
        let named = |pairs: &[(&'static str, usize)]| {
            pairs
                .iter()
                .map(|&(name, c)| Component {
                    name,
                    values: self.channel(c),
                })
                .collect::<Vec<_>>()
        };

        let components = match (self.kind, self.channels) {
            (FieldKind::Scalar, 1) => named(&[("value", 0)]),
            (FieldKind::Vector, 2) | (FieldKind::Vector, 3) => named(&[("x", 0), ("y", 1)]),
            (FieldKind::PackedTensor, 3) => named(&[("xx", 0), ("xy", 1), ("yy", 2)]),
            (FieldKind::Tensor, 9) => {
                for (p, point) in self.data.chunks_exact(9).enumerate() {
                    if point[1] != point[3] {
                        return Err(BaselineError::Reader(format!(
                            "Tensor at point {p} is not symmetric ({} != {})",
                            point[1], point[3]
                        )));
                    }
                }
                named(&[("xx", 0), ("xy", 1), ("yy", 4)])
            }
            (kind, channels) => {
                return Err(BaselineError::Reader(format!(
                    "Cannot split a {kind:?} image with {channels} channels"
                )))
            }
        };

        Ok(components)
    }
}

/// Reads a `.mhd`, `.mha` or `.vtk` image, chosen by extension
pub fn read_image(path: &Path) -> Result<ImageData> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mhd") | Some("mha") => read_metaimage(path),
        Some("vtk") => read_vtk(path),
        _ => Err(BaselineError::Reader(format!(
            "Unrecognized image filetype {}",
            path.display()
        ))),
    }
}

fn parse_numbers<T: std::str::FromStr>(
    header: &HashMap<String, String>,
    key: &str,
    path: &Path,
) -> Result<Vec<T>> {
    let value = match header.get(key) {
        Some(v) => v,
        None => {
            return Err(BaselineError::Reader(format!(
                "{} missing {key} field",
                path.display()
            )))
        }
    };

    value
        .split_whitespace()
        .map(|token| {
            token.parse::<T>().map_err(|_| {
                BaselineError::Reader(format!(
                    "Invalid value {token:?} for {key} in {}",
                    path.display()
                ))
            })
        })
        .collect()
}

/// Reads a MetaImage header and its pixel data
///
/// # Arguments
/// * `path` - The `.mhd` or `.mha` header. Data is either a sibling file
///   named by `ElementDataFile` or follows the header when that is `LOCAL`
pub fn read_metaimage(path: &Path) -> Result<ImageData> {
    let bytes = std::fs::read(path).map_err(|err| BaselineError::io(path, err))?;

    // Parse `Key = Value` lines up to and including ElementDataFile
    let mut header: HashMap<String, String> = HashMap::new();
    let mut cursor = 0;
    while cursor < bytes.len() {
        let end = match bytes[cursor..].iter().position(|b| *b == b'\n') {
            Some(n) => cursor + n,
            None => bytes.len(),
        };
        let line = String::from_utf8_lossy(&bytes[cursor..end]);
        cursor = (end + 1).min(bytes.len());

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim().to_owned(), v.trim().to_owned()),
            None => {
                return Err(BaselineError::Reader(format!(
                    "Malformed header line {line:?} in {}",
                    path.display()
                )))
            }
        };
        let done = key == "ElementDataFile";
        header.insert(key, value);
        if done {
            break;
        }
    }

    let ndims: Vec<usize> = parse_numbers(&header, "NDims", path)?;
    if ndims != [2] {
        return Err(BaselineError::Reader(format!(
            "{} is not a 2D image",
            path.display()
        )));
    }
    if header
        .get("CompressedData")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Err(BaselineError::Reader(format!(
            "Compressed data in {} is not supported",
            path.display()
        )));
    }

    let size: Vec<usize> = parse_numbers(&header, "DimSize", path)?;
    let origin: Vec<f64> = if header.contains_key("Offset") {
        parse_numbers(&header, "Offset", path)?
    } else {
        vec![0.0, 0.0]
    };
    let spacing: Vec<f64> = if header.contains_key("ElementSpacing") {
        parse_numbers(&header, "ElementSpacing", path)?
    } else {
        vec![1.0, 1.0]
    };
    if size.len() != 2 || origin.len() != 2 || spacing.len() != 2 {
        return Err(BaselineError::Reader(format!(
            "Inconsistent dimensions in {}",
            path.display()
        )));
    }
    let geometry = ImageGeometry {
        size: [size[0], size[1]],
        origin: [origin[0], origin[1]],
        spacing: [spacing[0], spacing[1]],
    };

    let channels = if header.contains_key("ElementNumberOfChannels") {
        match parse_numbers::<usize>(&header, "ElementNumberOfChannels", path)?.first() {
            Some(&n) if n > 0 => n,
            _ => {
                return Err(BaselineError::Reader(format!(
                    "Invalid ElementNumberOfChannels in {}",
                    path.display()
                )))
            }
        }
    } else {
        1
    };
    let msb = header
        .get("BinaryDataByteOrderMSB")
        .or_else(|| header.get("ElementByteOrderMSB"))
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let element_size = match header.get("ElementType").map(String::as_str) {
        Some("MET_DOUBLE") => 8,
        Some("MET_FLOAT") => 4,
        other => {
            return Err(BaselineError::Reader(format!(
                "Unsupported ElementType {other:?} in {}",
                path.display()
            )))
        }
    };

    let data_file = match header.get("ElementDataFile") {
        Some(f) => f.clone(),
        None => {
            return Err(BaselineError::Reader(format!(
                "{} missing ElementDataFile field",
                path.display()
            )))
        }
    };
    let expected = match geometry
        .checked_n_points()
        .and_then(|n| n.checked_mul(channels))
        .and_then(|n| n.checked_mul(element_size))
    {
        Some(n) => n,
        None => {
            return Err(BaselineError::Reader(format!(
                "DimSize {} {} in {} is too large",
                geometry.size[0],
                geometry.size[1],
                path.display()
            )))
        }
    };
    let raw: Vec<u8> = if data_file == "LOCAL" {
        bytes[cursor..].to_vec()
    } else {
        let raw_path: PathBuf = match path.parent() {
            Some(dir) => dir.join(&data_file),
            None => PathBuf::from(&data_file),
        };
        std::fs::read(&raw_path).map_err(|err| BaselineError::io(&raw_path, err))?
    };

    if raw.len() != expected {
        return Err(BaselineError::Reader(format!(
            "{} holds {} bytes of pixel data, expected {expected}",
            path.display(),
            raw.len()
        )));
    }

    let data: Vec<f64> = if element_size == 8 {
        raw.chunks_exact(8)
            .map(|b| {
                let b: [u8; 8] = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
                if msb {
                    f64::from_be_bytes(b)
                } else {
                    f64::from_le_bytes(b)
                }
            })
            .collect()
    } else {
        raw.chunks_exact(4)
            .map(|b| {
                let b: [u8; 4] = [b[0], b[1], b[2], b[3]];
                if msb {
                    f32::from_be_bytes(b) as f64
                } else {
                    f32::from_le_bytes(b) as f64
                }
            })
            .collect()
    };

    let kind = match channels {
        1 => FieldKind::Scalar,
        3 => FieldKind::PackedTensor,
        _ => FieldKind::Vector,
    };

    log::debug!(
        "read {} ({}x{}, {channels} channels)",
        path.display(),
        geometry.size[0],
        geometry.size[1]
    );

    Ok(ImageData {
        geometry,
        channels,
        kind,
        data,
    })
}

/// Reads an ASCII legacy VTK structured points file
///
/// Supports a single `SCALARS`, `VECTORS` or `TENSORS` point attribute.
pub fn read_vtk(path: &Path) -> Result<ImageData> {
    let contents = std::fs::read_to_string(path).map_err(|err| BaselineError::io(path, err))?;
    let malformed = |what: &str| BaselineError::Reader(format!("{what} in {}", path.display()));

    let mut lines = contents.lines();
    match lines.next() {
        Some(l) if l.starts_with("# vtk DataFile") => {}
        _ => return Err(malformed("Missing VTK signature")),
    }
    let _title = lines.next();
    match lines.next().map(str::trim) {
        Some("ASCII") => {}
        _ => return Err(malformed("Only ASCII VTK files are supported")),
    }

    let mut size: Option<[usize; 2]> = None;
    let mut origin = [0.0, 0.0];
    let mut spacing = [1.0, 1.0];
    let mut attribute: Option<(FieldKind, usize)> = None;

    let parse = |tokens: &[&str]| -> Result<Vec<f64>> {
        tokens
            .iter()
            .map(|t| t.parse::<f64>().map_err(|_| malformed(&format!("Invalid number {t:?}"))))
            .collect()
    };

    for line in lines.by_ref() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first().copied() {
            None => continue,
            Some("DATASET") => {
                if tokens.get(1) != Some(&"STRUCTURED_POINTS") {
                    return Err(malformed("Only STRUCTURED_POINTS datasets are supported"));
                }
            }
            Some("DIMENSIONS") => {
                let dims: Vec<usize> = tokens[1..]
                    .iter()
                    .map(|t| {
                        t.parse::<usize>()
                            .map_err(|_| malformed(&format!("Invalid dimension {t:?}")))
                    })
                    .collect::<Result<_>>()?;
                if dims.len() != 3 || dims[2] != 1 {
                    return Err(malformed("Only 2D DIMENSIONS are supported"));
                }
                size = Some([dims[0], dims[1]]);
            }
            Some("ORIGIN") => {
                let values = parse(&tokens[1..])?;
                if values.len() < 2 {
                    return Err(malformed("Short ORIGIN"));
                }
                origin = [values[0], values[1]];
            }
            Some("SPACING") | Some("ASPECT_RATIO") => {
                let values = parse(&tokens[1..])?;
                if values.len() < 2 {
                    return Err(malformed("Short SPACING"));
                }
                spacing = [values[0], values[1]];
            }
            Some("POINT_DATA") => {}
            Some("SCALARS") => {
                let channels = match tokens.get(3) {
                    Some(n) => n
                        .parse::<usize>()
                        .map_err(|_| malformed("Invalid SCALARS component count"))?,
                    None => 1,
                };
                attribute = Some((FieldKind::Scalar, channels));
            }
            Some("LOOKUP_TABLE") => break,
            Some("VECTORS") => {
                attribute = Some((FieldKind::Vector, 3));
                break;
            }
            Some("TENSORS") => {
                attribute = Some((FieldKind::Tensor, 9));
                break;
            }
            Some(other) => return Err(malformed(&format!("Unexpected keyword {other:?}"))),
        }
    }

    let size = size.ok_or_else(|| malformed("Missing DIMENSIONS"))?;
    let (kind, channels) = attribute.ok_or_else(|| malformed("Missing point attribute"))?;
    let kind = match (kind, channels) {
        (FieldKind::Scalar, 1) => FieldKind::Scalar,
        (FieldKind::Scalar, _) => FieldKind::Vector,
        (kind, _) => kind,
    };

    let geometry = ImageGeometry {
        size,
        origin,
        spacing,
    };
    let expected = geometry
        .checked_n_points()
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            malformed(&format!(
                "DIMENSIONS {} {} 1 is too large",
                size[0], size[1]
            ))
        })?;

    let data: Vec<f64> = lines
        .flat_map(str::split_whitespace)
        .map(|t| t.parse::<f64>().map_err(|_| malformed(&format!("Invalid number {t:?}"))))
        .collect::<Result<_>>()?;

    if data.len() != expected {
        return Err(malformed(&format!(
            "Found {} values, expected {expected}",
            data.len()
        )));
    }

    log::debug!("read {} ({}x{}, {kind:?})", path.display(), size[0], size[1]);

    Ok(ImageData {
        geometry,
        channels,
        kind,
        data,
    })
}
