/// An error type for the io module.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    /// Error when the file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(std::path::PathBuf),

    /// Invalid file extension.
    #[error("File does not have a valid extension: {0}")]
    InvalidFileExtension(std::path::PathBuf),

    /// Error to open the file.
    #[error("Failed to manipulate the file. {0}")]
    FileError(#[from] std::io::Error),

    /// Error to encode the PNG image.
    #[error("Failed to encode the png image. {0}")]
    PngEncodingError(String),

    /// Error to decode the PNG image.
    #[error("Failed to decode the png image. {0}")]
    PngDecodeError(String),

    /// The PNG color type or bit depth is not supported by the reader.
    #[error("Unsupported png format: {0}")]
    UnsupportedPngFormat(String),

    /// The depth buffer does not match the expected image size.
    #[error("Depth buffer has {got} bytes, expected {expected}")]
    InvalidDepthSize {
        /// Number of bytes found.
        got: usize,
        /// Number of bytes expected.
        expected: usize,
    },

    /// Malformed or unsupported `.npy` content.
    #[error("Invalid npy file: {0}")]
    InvalidNpy(String),
}
