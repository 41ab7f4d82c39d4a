pub const SNAPSHOT_MAGIC: [u8; 4] = *b"LKST";
pub const VERSION_LEN: usize = 16;

/// Upper bound for a single length-prefixed field. Anything larger is treated as a corrupt
/// length prefix rather than an allocation request.
pub const MAX_FIELD_LEN: usize = 256 * 1024 * 1024;

/// Layout version of a snapshot, chosen by the host.
///
/// Fields are positional, so any change to what a serialize routine walks must come with a new
/// version. Stored as a zero-padded 16-byte identifier right after [`SNAPSHOT_MAGIC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version([u8; VERSION_LEN]);

impl Version {
    /// Returns `None` if `id` is empty, longer than [`VERSION_LEN`] bytes or contains NUL.
    pub fn new(id: &str) -> Option<Self> {
        let bytes = id.as_bytes();
        if bytes.is_empty() || bytes.len() > VERSION_LEN || bytes.contains(&0) {
            return None;
        }
        let mut raw = [0u8; VERSION_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Some(Self(raw))
    }

    pub const fn from_raw(raw: [u8; VERSION_LEN]) -> Self {
        Self(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; VERSION_LEN] {
        &self.0
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(VERSION_LEN);
        write!(f, "{}", String::from_utf8_lossy(&self.0[..end]))
    }
}
