mod parser;
mod writer;

pub use parser::*;
pub use writer::*;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read or write the PCD file
    #[error("Failed to read or write PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header
    #[error("Unsupported PCD header: {0}")]
    UnsupportedProperty(String),

    /// Malformed PCD header
    #[error("Malformed PCD header: {0}")]
    MalformedHeader(String),

    /// Malformed ascii point record
    #[error("Malformed PCD point record at line {0}")]
    MalformedRecord(usize),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),

    /// Colors do not match the number of points
    #[error("Point cloud has {points} points but {colors} colors")]
    MismatchedColors {
        /// Number of points.
        points: usize,
        /// Number of colors.
        colors: usize,
    },
}

/// Check that a path has the `.pcd` extension.
pub(crate) fn check_extension(path: &std::path::Path) -> Result<(), PcdError> {
    let Some(file_ext) = path.extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}
