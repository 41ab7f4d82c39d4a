//! Deterministic, positional state serialization.
//!
//! Components describe their state once, as a [`Serializable::serialize`] routine that walks
//! every field in a fixed order. The same routine measures, verifies, reads and writes a
//! snapshot. A snapshot is laid out as
//!
//! ```text
//! [magic "LKST"][16-byte layout version][fields, in walk order]
//! ```
//!
//! and carries no schema: a layout change requires a new [`Version`], which makes older
//! snapshots fail with `UnsupportedVersion` instead of being misread.

mod error;
mod format;
mod serializer;
mod snapshot;

pub use crate::error::{Result, SerializationError};
pub use crate::format::{Version, MAX_FIELD_LEN, SNAPSHOT_MAGIC, VERSION_LEN};
pub use crate::serializer::{Field, Mode, Serializable, Serializer};
pub use crate::snapshot::{load, save, verify};
