use thiserror::Error;

pub type Result<T> = std::result::Result<T, SerializationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    #[error("incompatible snapshot signature {found:02x?}")]
    IncompatibleSignature { found: [u8; 4] },

    #[error("unsupported snapshot version {found:?} (this build reads {expected:?})")]
    UnsupportedVersion { found: String, expected: String },

    #[error("corrupt snapshot at byte {offset}: {reason}")]
    CorruptState { offset: usize, reason: &'static str },

    #[error("serialized size mismatch (measured {measured} bytes, write pass produced {written} bytes)")]
    SizeMismatch { measured: usize, written: usize },

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },
}
