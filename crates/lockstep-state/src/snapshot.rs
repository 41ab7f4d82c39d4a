use tracing::{debug, warn};

use crate::error::{Result, SerializationError};
use crate::format::Version;
use crate::serializer::{Serializable, Serializer};

/// Captures `root` as a versioned snapshot.
///
/// A measure pass sizes the buffer exactly before the write pass runs, so a routine that fails
/// does so before any buffer is allocated. A write pass whose length differs from the measure
/// pass fails with [`SerializationError::SizeMismatch`].
pub fn save<T: Serializable + ?Sized>(root: &mut T, version: &Version) -> Result<Vec<u8>> {
    let mut measure = Serializer::measure();
    measure.signature(version)?;
    root.serialize(&mut measure)?;
    let len = measure.finish()?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| SerializationError::OutOfMemory { len })?;
    buf.resize(len, 0);

    let mut writer = Serializer::writer(&mut buf);
    writer.signature(version)?;
    root.serialize(&mut writer)?;
    writer.finish()?;

    debug!(bytes = len, %version, "snapshot saved");
    Ok(buf)
}

/// Replaces the state of `root` with the snapshot in `data`.
///
/// The stream is fully validated by a verify pass before the read pass assigns anything: on
/// error `root` is exactly as it was.
pub fn load<T: Serializable + ?Sized>(root: &mut T, data: &[u8], version: &Version) -> Result<()> {
    verify(root, data, version).map_err(|err| {
        warn!(%err, "snapshot rejected");
        err
    })?;

    let mut reader = Serializer::reader(data);
    reader.signature(version)?;
    root.serialize(&mut reader)?;
    reader.finish()?;

    debug!(bytes = data.len(), %version, "snapshot loaded");
    Ok(())
}

/// Checks that `data` is a complete snapshot `root` could load, without modifying `root`.
pub fn verify<T: Serializable + ?Sized>(root: &mut T, data: &[u8], version: &Version) -> Result<()> {
    let mut verifier = Serializer::verifier(data);
    verifier.signature(version)?;
    root.serialize(&mut verifier)?;
    verifier.finish()?;
    Ok(())
}
