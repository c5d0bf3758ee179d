//! Minimal NumPy `.npy` support for dense `float64` arrays.
//!
//! Only the subset needed to exchange numeric artifacts with Python tooling is
//! implemented: little-endian `<f8` (and `<f4` on read), C or Fortran order,
//! format versions 1.0, 2.0 and 3.0 on read, 1.0 on write.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::IoError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGNMENT: usize = 64;

/// A dense array read from a `.npy` file, always in C (row-major) order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    /// The array shape.
    pub shape: Vec<usize>,
    /// The values in row-major order.
    pub data: Vec<f64>,
}

/// Write a row-major `float64` array as a version 1.0 `.npy` file.
///
/// # Arguments
///
/// * `file_path` - Destination path, conventionally with a `.npy` extension.
/// * `data` - The values in row-major order.
/// * `shape` - The array shape; its product must equal `data.len()`.
pub fn write_npy_f64(
    file_path: impl AsRef<Path>,
    data: &[f64],
    shape: &[usize],
) -> Result<(), IoError> {
    let numel = num_elements(shape)?;
    if numel != data.len() {
        return Err(IoError::InvalidNpy(format!(
            "shape {shape:?} holds {numel} values but {} were given",
            data.len()
        )));
    }

    let shape_str = match shape {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape_str}, }}");

    // magic (6) + version (2) + header length (2) + header + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| IoError::InvalidNpy("header too long".into()))?;

    let mut writer = std::io::BufWriter::new(std::fs::File::create(file_path)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for v in data {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()?;

    Ok(())
}

/// Read a `float64` or `float32` array from a `.npy` file.
pub fn read_npy_f64(file_path: impl AsRef<Path>) -> Result<NpyArray, IoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let mut bytes = Vec::new();
    std::fs::File::open(file_path)?.read_to_end(&mut bytes)?;
    parse_npy(&bytes)
}

fn parse_npy(bytes: &[u8]) -> Result<NpyArray, IoError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(IoError::InvalidNpy("missing magic string".into()));
    }

    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            let len = bytes
                .get(8..12)
                .ok_or_else(|| IoError::InvalidNpy("truncated header".into()))?;
            (
                u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize,
                12,
            )
        }
        v => return Err(IoError::InvalidNpy(format!("unsupported version {v}"))),
    };

    let header = bytes
        .get(header_start..header_start + header_len)
        .ok_or_else(|| IoError::InvalidNpy("truncated header".into()))?;
    let header = std::str::from_utf8(header)
        .map_err(|_| IoError::InvalidNpy("header is not utf8".into()))?;

    let descr = header_value(header, "descr")?
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string();
    let fortran_order = match header_value(header, "fortran_order")? {
        "True" => true,
        "False" => false,
        other => return Err(IoError::InvalidNpy(format!("fortran_order {other}"))),
    };
    let shape = parse_shape(header_value(header, "shape")?)?;

    let payload = &bytes[header_start + header_len..];
    let numel = num_elements(&shape)?;

    let data = match descr.as_str() {
        "<f8" => decode(payload, numel, |c: [u8; 8]| f64::from_le_bytes(c))?,
        "<f4" => decode(payload, numel, |c: [u8; 4]| f32::from_le_bytes(c) as f64)?,
        other => return Err(IoError::InvalidNpy(format!("unsupported dtype {other}"))),
    };

    let data = if fortran_order && shape.len() == 2 {
        let (rows, cols) = (shape[0], shape[1]);
        (0..rows * cols)
            .map(|k| data[(k % cols) * rows + k / cols])
            .collect()
    } else if fortran_order && shape.len() > 2 {
        return Err(IoError::InvalidNpy(
            "fortran order is only supported for 2D arrays".into(),
        ));
    } else {
        data
    };

    Ok(NpyArray { shape, data })
}

fn decode<const N: usize>(
    payload: &[u8],
    numel: usize,
    f: impl Fn([u8; N]) -> f64,
) -> Result<Vec<f64>, IoError> {
    let expected = numel
        .checked_mul(N)
        .ok_or_else(|| IoError::InvalidNpy(format!("{numel} values overflow the payload size")))?;
    if payload.len() != expected {
        return Err(IoError::InvalidNpy(format!(
            "payload has {} bytes, expected {expected}",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(N)
        .map(|c| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(c);
            f(buf)
        })
        .collect())
}

fn num_elements(shape: &[usize]) -> Result<usize, IoError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| IoError::InvalidNpy(format!("shape {shape:?} is too large")))
}

// extract the raw value following `'key':` in the header dictionary
fn header_value<'a>(header: &'a str, key: &str) -> Result<&'a str, IoError> {
    let pattern = format!("'{key}':");
    let start = header
        .find(&pattern)
        .ok_or_else(|| IoError::InvalidNpy(format!("missing key {key}")))?
        + pattern.len();
    let rest = header[start..].trim_start();

    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(|| IoError::InvalidNpy(format!("unterminated value for {key}")))?;

    Ok(rest[..end].trim())
}

fn parse_shape(value: &str) -> Result<Vec<usize>, IoError> {
    value
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| IoError::InvalidNpy(format!("bad shape entry {s}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_matrix() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("transform.npy");

        let data = (0..16).map(|i| i as f64 * 0.5 - 1.0).collect::<Vec<_>>();
        write_npy_f64(&file_path, &data, &[4, 4])?;

        let bytes = std::fs::read(&file_path)?;
        // header is aligned so the payload starts on a 64 byte boundary
        assert_eq!((bytes.len() - 16 * 8) % ALIGNMENT, 0);
        assert_eq!(bytes[bytes.len() - 16 * 8 - 1], b'\n');

        let array = read_npy_f64(&file_path)?;
        assert_eq!(array.shape, vec![4, 4]);
        assert_eq!(array.data, data);
        Ok(())
    }

    #[test]
    fn write_read_vector() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("vector.npy");
        write_npy_f64(&file_path, &[1.0, 2.0, 3.0], &[3])?;
        let array = read_npy_f64(&file_path)?;
        assert_eq!(array.shape, vec![3]);
        assert_eq!(array.data, vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn parse_fortran_order_f4() -> Result<(), IoError> {
        let header = "{'descr': '<f4', 'fortran_order': True, 'shape': (2, 3), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        // column major [[1, 2, 3], [4, 5, 6]]
        for v in [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let array = parse_npy(&bytes)?;
        assert_eq!(array.shape, vec![2, 3]);
        assert_eq!(array.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        Ok(())
    }

    #[test]
    fn rejects_bad_input() -> Result<(), IoError> {
        assert!(matches!(parse_npy(b"not numpy"), Err(IoError::InvalidNpy(_))));

        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("bad.npy");
        assert!(matches!(
            write_npy_f64(&file_path, &[1.0; 3], &[2, 2]),
            Err(IoError::InvalidNpy(_))
        ));
        Ok(())
    }

    #[test]
    fn rejects_oversized_shape() {
        for shape in ["(18446744073709551615, 2)", "(4611686018427387904,)"] {
            let header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape}, }}\n");
            let mut bytes = MAGIC.to_vec();
            bytes.extend_from_slice(&[1, 0]);
            bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
            bytes.extend_from_slice(header.as_bytes());
            bytes.extend_from_slice(&[0u8; 8]);
            assert!(matches!(parse_npy(&bytes), Err(IoError::InvalidNpy(_))));
        }
    }
}
