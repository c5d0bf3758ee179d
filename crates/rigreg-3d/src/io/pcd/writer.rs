use std::io::Write;
use std::path::Path;

use super::{check_extension, PcdError};
use crate::pointcloud::PointCloud;

/// Write a point cloud as a binary PCD v0.7 file.
///
/// Points are stored as `float` x y z; colors, when present, as a packed
/// `uint32` rgb field readable by PCL and Open3D.
///
/// # Arguments
/// * `path` - Destination path with a `.pcd` extension.
/// * `pointcloud` - The point cloud to write.
pub fn write_pcd_binary(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), PcdError> {
    let path = path.as_ref();
    check_extension(path)?;

    let colors = pointcloud.colors();
    if let Some(colors) = colors {
        if colors.len() != pointcloud.len() {
            return Err(PcdError::MismatchedColors {
                points: pointcloud.len(),
                colors: colors.len(),
            });
        }
    }

    let (fields, sizes, types, counts) = match colors {
        Some(_) => ("x y z rgb", "4 4 4 4", "F F F U", "1 1 1 1"),
        None => ("x y z", "4 4 4", "F F F", "1 1 1"),
    };

    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    write!(
        writer,
        "# .PCD v0.7 - Point Cloud Data file format\n\
         VERSION 0.7\n\
         FIELDS {fields}\n\
         SIZE {sizes}\n\
         TYPE {types}\n\
         COUNT {counts}\n\
         WIDTH {n}\n\
         HEIGHT 1\n\
         VIEWPOINT 0 0 0 1 0 0 0\n\
         POINTS {n}\n\
         DATA binary\n",
        n = pointcloud.len()
    )?;

    for (i, p) in pointcloud.points().iter().enumerate() {
        for v in p {
            writer.write_all(&(*v as f32).to_le_bytes())?;
        }
        if let Some(colors) = colors {
            let [r, g, b] = colors[i];
            let packed = (r as u32) << 16 | (g as u32) << 8 | b as u32;
            writer.write_all(&packed.to_le_bytes())?;
        }
    }

    writer.flush()?;

    log::debug!("wrote {} points to {}", pointcloud.len(), path.display());

    Ok(())
}
