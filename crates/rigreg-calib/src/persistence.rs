use std::path::{Path, PathBuf};

use rigreg_3d::transforms::RigidTransform;
use rigreg_io::{
    npy::{read_npy_f64, write_npy_f64},
    IoError,
};

use crate::error::CalibrationError;

/// Write a transform as a 4x4 `float64` `.npy` matrix.
pub fn save_transform(path: impl AsRef<Path>, transform: &RigidTransform) -> Result<(), CalibrationError> {
    transform.validate()?;
    let data = transform
        .to_matrix4()
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>();
    write_npy_f64(path, &data, &[4, 4])?;
    Ok(())
}

/// Read a transform from a 4x4 `.npy` matrix, checking that it is rigid.
pub fn load_transform(path: impl AsRef<Path>) -> Result<RigidTransform, CalibrationError> {
    let path = path.as_ref();
    let array = read_npy_f64(path)?;
    if array.shape != [4, 4] {
        return Err(IoError::InvalidNpy(format!(
            "{}: expected shape (4, 4), got {:?}",
            path.display(),
            array.shape
        ))
        .into());
    }

    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row.copy_from_slice(&array.data[i * 4..(i + 1) * 4]);
    }

    Ok(RigidTransform::from_matrix4(&m)?)
}

/// The transforms of one rig, stored in the master device directory.
///
/// Sub device `k` maps to `<master_dir>/transformation_master_sub_<k>.npy`,
/// the matrix taking sub camera points into the master frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStore {
    master_dir: PathBuf,
}

impl TransformStore {
    /// Create a store rooted at the master device directory.
    pub fn new(master_dir: impl Into<PathBuf>) -> Self {
        Self {
            master_dir: master_dir.into(),
        }
    }

    /// The master device directory.
    pub fn master_dir(&self) -> &Path {
        &self.master_dir
    }

    /// File name of the transform for sub device `sub_index`.
    pub fn file_name(sub_index: usize) -> String {
        format!("transformation_master_sub_{sub_index}.npy")
    }

    /// Path of the transform for sub device `sub_index`.
    pub fn path_for(&self, sub_index: usize) -> PathBuf {
        self.master_dir.join(Self::file_name(sub_index))
    }

    /// Whether a transform was stored for `sub_index`.
    pub fn contains(&self, sub_index: usize) -> bool {
        self.path_for(sub_index).is_file()
    }

    /// Store the `master_from_sub` transform of sub device `sub_index`.
    pub fn save(&self, sub_index: usize, transform: &RigidTransform) -> Result<PathBuf, CalibrationError> {
        std::fs::create_dir_all(&self.master_dir)?;
        let path = self.path_for(sub_index);
        save_transform(&path, transform)?;
        log::info!("saved transform for sub {} to {}", sub_index, path.display());
        Ok(path)
    }

    /// Load the `master_from_sub` transform of sub device `sub_index`.
    pub fn load(&self, sub_index: usize) -> Result<RigidTransform, CalibrationError> {
        load_transform(self.path_for(sub_index))
    }

    /// Load the transforms of sub devices `1..=num_subs`, in order.
    pub fn load_all(&self, num_subs: usize) -> Result<Vec<RigidTransform>, CalibrationError> {
        (1..=num_subs).map(|k| self.load(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rigreg_3d::transforms::TransformError;

    #[test]
    fn test_save_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = TransformStore::new(dir.path().join("master_1"));

        let transform = RigidTransform::from_axis_angle(&[0.0, 0.0, 1.0], 0.5, [0.1, 0.2, -0.3])?;
        let path = store.save(2, &transform)?;

        assert_eq!(path, dir.path().join("master_1/transformation_master_sub_2.npy"));
        assert!(store.contains(2));
        assert!(!store.contains(1));

        let loaded = store.load(2)?;
        for i in 0..3 {
            assert_relative_eq!(loaded.translation[i], transform.translation[i]);
            for j in 0..3 {
                assert_relative_eq!(loaded.rotation[i][j], transform.rotation[i][j]);
            }
        }
        Ok(())
    }

    #[test]
    fn test_load_all_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = TransformStore::new(dir.path());
        store.save(1, &RigidTransform::identity())?;

        assert_eq!(store.load_all(1)?, vec![RigidTransform::identity()]);
        assert!(matches!(
            store.load_all(2),
            Err(CalibrationError::Io(IoError::FileDoesNotExist(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_load_rejects_non_rigid() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = TransformStore::new(dir.path());

        let mut scaled = RigidTransform::identity().to_matrix4();
        scaled[0][0] = 2.0;
        let data = scaled.iter().flatten().copied().collect::<Vec<_>>();
        write_npy_f64(store.path_for(1), &data, &[4, 4])?;

        assert!(matches!(
            store.load(1),
            Err(CalibrationError::Transform(TransformError::NotARotation { .. }))
        ));

        write_npy_f64(store.path_for(2), &[0.0; 9], &[3, 3])?;
        assert!(matches!(
            store.load(2),
            Err(CalibrationError::Io(IoError::InvalidNpy(_)))
        ));
        Ok(())
    }
}
