use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

use super::{check_extension, PcdError};
use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Storage of the point records after the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PcdData {
    Ascii,
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    offset: usize, // byte offset within a binary record
    column: usize, // token index within an ascii record
    size: usize,   // size of one element (bytes)
    kind: char,    // PCD type: 'F' = float, 'U' = unsigned int, 'I' = signed int
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize, // total bytes per point
    num_points: usize,
    data: PcdData,
}

impl PcdLayout {
    fn field(&self, name: &str) -> Result<&PcdField, PcdError> {
        self.fields
            .get(name)
            .ok_or_else(|| PcdError::UnsupportedProperty(format!("missing field {name}")))
    }

    fn normal_fields(&self) -> Option<[&PcdField; 3]> {
        let get = |a: &str, b: &str| self.fields.get(a).or_else(|| self.fields.get(b));
        Some([
            get("normal_x", "nx")?,
            get("normal_y", "ny")?,
            get("normal_z", "nz")?,
        ])
    }
}

fn parse_list<T: std::str::FromStr>(
    it: std::str::SplitWhitespace<'_>,
    key: &str,
) -> Result<Vec<T>, PcdError> {
    it.map(|v| {
        v.parse::<T>()
            .map_err(|_| PcdError::MalformedHeader(format!("bad {key} entry: {v}")))
    })
    .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut points = None;
    let mut width_height = (None, None);

    let data = loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader("missing DATA line".into()));
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("binary") => break PcdData::Binary,
                Some("ascii") => break PcdData::Ascii,
                other => {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "DATA {}",
                        other.unwrap_or_default()
                    )))
                }
            },
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            Some("SIZE") => sizes = parse_list(it, "SIZE")?,
            Some("COUNT") => counts = parse_list(it, "COUNT")?,
            Some("TYPE") => {
                types = it
                    .map(|v| {
                        v.chars()
                            .next()
                            .ok_or_else(|| PcdError::MalformedHeader("empty TYPE".into()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("POINTS") => points = parse_list::<usize>(it, "POINTS")?.first().copied(),
            Some("WIDTH") => width_height.0 = parse_list::<usize>(it, "WIDTH")?.first().copied(),
            Some("HEIGHT") => width_height.1 = parse_list::<usize>(it, "HEIGHT")?.first().copied(),
            _ => {}
        }
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::MalformedHeader(
            "FIELDS, SIZE, TYPE and COUNT lengths differ".into(),
        ));
    }

    // older files omit POINTS and only carry WIDTH * HEIGHT
    let num_points = match (points, width_height) {
        (Some(points), _) => points,
        (None, (Some(w), Some(h))) => w * h,
        _ => return Err(PcdError::MalformedHeader("missing POINTS".into())),
    };

    let mut offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        // If COUNT is omitted, PCD spec defines default count as 1
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];
        let kind = types[i];

        match name.as_str() {
            "x" | "y" | "z" | "normal_x" | "normal_y" | "normal_z" | "nx" | "ny" | "nz" => {
                if !((size == 4 || size == 8) && count == 1 && kind == 'F') {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "field {name} must be a float scalar"
                    )));
                }
            }
            "rgb" | "rgba" => {
                if !(size == 4 && count == 1 && matches!(kind, 'U' | 'I' | 'F')) {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "field {name} must be a packed 4 byte value"
                    )));
                }
            }
            _ => {}
        }

        let field = PcdField {
            offset,
            column,
            size,
            kind,
        };

        offset = size
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or_else(|| PcdError::MalformedHeader("point step overflow".into()))?;
        column += count;

        if offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader(format!(
                "point step {offset} exceeds {MAX_POINT_STEP}"
            )));
        }

        if fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::MalformedHeader(format!("duplicated field {name}")));
        }
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points,
        data,
    })
}

/// Read a little-endian float of 4 or 8 bytes from a byte buffer
#[inline]
fn read_float(buf: &[u8], field: &PcdField) -> Result<f64, PcdError> {
    let slice = buf
        .get(field.offset..field.offset + field.size)
        .ok_or_else(|| PcdError::MalformedHeader("field out of record".into()))?;
    Ok(match field.size {
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(slice);
            f64::from_le_bytes(bytes)
        }
        _ => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(slice);
            f32::from_le_bytes(bytes) as f64
        }
    })
}

/// Read a little-endian u32 from a byte buffer
#[inline]
fn read_u32(buf: &[u8], offset: usize) -> Result<u32, PcdError> {
    let slice = buf
        .get(offset..offset + 4)
        .ok_or_else(|| PcdError::MalformedHeader("field out of record".into()))?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(slice);
    Ok(u32::from_le_bytes(bytes))
}

#[inline]
fn unpack_rgb(rgb: u32) -> [u8; 3] {
    [
        ((rgb >> 16) & 0xFF) as u8,
        ((rgb >> 8) & 0xFF) as u8,
        (rgb & 0xFF) as u8,
    ]
}

fn parse_token(tokens: &[&str], field: &PcdField, line: usize) -> Result<f64, PcdError> {
    tokens
        .get(field.column)
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or(PcdError::MalformedRecord(line))
}

fn parse_rgb_token(tokens: &[&str], field: &PcdField, line: usize) -> Result<u32, PcdError> {
    let token = tokens
        .get(field.column)
        .ok_or(PcdError::MalformedRecord(line))?;
    match field.kind {
        // PCL stores packed colors as the bit pattern of a float
        'F' => token
            .parse::<f32>()
            .map(f32::to_bits)
            .map_err(|_| PcdError::MalformedRecord(line)),
        _ => token
            .parse::<u32>()
            .map_err(|_| PcdError::MalformedRecord(line)),
    }
}

/// Read a PCD file stored either as `DATA binary` or `DATA ascii`.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] containing:
/// - 3D points (always)
/// - RGB colors (if present)
/// - Normals (if present)
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let path = path.as_ref();
    check_extension(path)?;

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let layout = parse_pcd_layout(&mut reader)?;

    if layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader(format!(
            "{} points exceeds {MAX_POINTS}",
            layout.num_points
        )));
    }

    // Required fields
    let fx = layout.field("x")?;
    let fy = layout.field("y")?;
    let fz = layout.field("z")?;

    // Optional fields
    let frgb = layout
        .fields
        .get("rgb")
        .or_else(|| layout.fields.get("rgba"));
    let fnormals = layout.normal_fields();

    let mut points = Vec::with_capacity(layout.num_points);
    let mut colors = Vec::new();
    let mut normals = Vec::new();

    match layout.data {
        PcdData::Binary => {
            let mut buffer = vec![0u8; layout.point_step];
            for _ in 0..layout.num_points {
                reader.read_exact(&mut buffer)?;

                points.push([
                    read_float(&buffer, fx)?,
                    read_float(&buffer, fy)?,
                    read_float(&buffer, fz)?,
                ]);

                if let Some(f) = frgb {
                    colors.push(unpack_rgb(read_u32(&buffer, f.offset)?));
                }

                if let Some([nx, ny, nz]) = fnormals {
                    normals.push([
                        read_float(&buffer, nx)?,
                        read_float(&buffer, ny)?,
                        read_float(&buffer, nz)?,
                    ]);
                }
            }
        }
        PcdData::Ascii => {
            let mut line = String::new();
            let mut line_no = 0usize;
            while points.len() < layout.num_points {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PcdError::MalformedRecord(line_no));
                }
                line_no += 1;
                let tokens = line.split_whitespace().collect::<Vec<_>>();
                if tokens.is_empty() {
                    continue;
                }

                points.push([
                    parse_token(&tokens, fx, line_no)?,
                    parse_token(&tokens, fy, line_no)?,
                    parse_token(&tokens, fz, line_no)?,
                ]);

                if let Some(f) = frgb {
                    colors.push(unpack_rgb(parse_rgb_token(&tokens, f, line_no)?));
                }

                if let Some([nx, ny, nz]) = fnormals {
                    normals.push([
                        parse_token(&tokens, nx, line_no)?,
                        parse_token(&tokens, ny, line_no)?,
                        parse_token(&tokens, nz, line_no)?,
                    ]);
                }
            }
        }
    }

    log::debug!("read {} points from {}", points.len(), path.display());

    Ok(PointCloud::new(
        points,
        frgb.map(|_| colors),
        fnormals.map(|_| normals),
    ))
}
