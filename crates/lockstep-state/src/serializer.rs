use std::ops::Range;

use tracing::warn;

use crate::error::{Result, SerializationError};
use crate::format::{Version, MAX_FIELD_LEN, SNAPSHOT_MAGIC};

/// Direction of a serializer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Walk the fields and count bytes; nothing is read or written.
    Measure,
    /// Consume and validate a stream without assigning anything.
    Verify,
    /// Consume a stream and assign every field.
    Read,
    /// Store every field into a buffer sized by a preceding `Measure` pass.
    Write,
}

enum Cursor<'a> {
    Measure,
    Read(&'a [u8]),
    Write(&'a mut [u8]),
}

/// Positional, bidirectional walker over component state.
///
/// The same serialize routine runs in every [`Mode`]; fields carry no names or tags, so save and
/// load must walk the identical sequence. Integers and floats are little-endian, booleans are one
/// byte, variable-length fields carry a `u32` length prefix.
pub struct Serializer<'a> {
    mode: Mode,
    cursor: Cursor<'a>,
    pos: usize,
}

impl<'a> Serializer<'a> {
    pub fn measure() -> Self {
        Self {
            mode: Mode::Measure,
            cursor: Cursor::Measure,
            pos: 0,
        }
    }

    pub fn verifier(data: &'a [u8]) -> Self {
        Self {
            mode: Mode::Verify,
            cursor: Cursor::Read(data),
            pos: 0,
        }
    }

    pub fn reader(data: &'a [u8]) -> Self {
        Self {
            mode: Mode::Read,
            cursor: Cursor::Read(data),
            pos: 0,
        }
    }

    /// A write pass into a buffer whose length is the exact size reported by a measure pass.
    pub fn writer(buf: &'a mut [u8]) -> Self {
        Self {
            mode: Mode::Write,
            cursor: Cursor::Write(buf),
            pos: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn measuring(&self) -> bool {
        self.mode == Mode::Measure
    }

    pub fn verifying(&self) -> bool {
        self.mode == Mode::Verify
    }

    /// True only when fields are being assigned from a stream.
    pub fn reading(&self) -> bool {
        self.mode == Mode::Read
    }

    pub fn writing(&self) -> bool {
        self.mode == Mode::Write
    }

    /// True in `Verify` and `Read`, the passes that consume a stream.
    pub fn loading(&self) -> bool {
        matches!(self.mode, Mode::Verify | Mode::Read)
    }

    /// Bytes walked so far. After a measure pass this is the snapshot size.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Ends the pass, checking that the whole stream or buffer was walked.
    pub fn finish(self) -> Result<usize> {
        match self.cursor {
            Cursor::Measure => Ok(self.pos),
            Cursor::Read(data) if self.pos != data.len() => Err(SerializationError::CorruptState {
                offset: self.pos,
                reason: "trailing bytes after last field",
            }),
            Cursor::Write(buf) if self.pos != buf.len() => Err(SerializationError::SizeMismatch {
                measured: buf.len(),
                written: self.pos,
            }),
            _ => Ok(self.pos),
        }
    }

    /// Walks the snapshot signature: the fixed magic followed by the host's layout version.
    ///
    /// When loading, a foreign magic fails with `IncompatibleSignature` and a different version
    /// with `UnsupportedVersion`, before any component field is touched.
    pub fn signature(&mut self, version: &Version) -> Result<()> {
        let magic = self.exchange(SNAPSHOT_MAGIC)?;
        if magic != SNAPSHOT_MAGIC {
            warn!(found = ?magic, "snapshot signature rejected");
            return Err(SerializationError::IncompatibleSignature { found: magic });
        }

        let found = Version::from_raw(self.exchange(*version.as_bytes())?);
        if found != *version {
            warn!(%found, expected = %version, "snapshot version rejected");
            return Err(SerializationError::UnsupportedVersion {
                found: found.to_string(),
                expected: version.to_string(),
            });
        }
        Ok(())
    }

    /// Walks one fixed-width value (integer, float, boolean or a fixed-size array of those).
    pub fn field<T: Field + ?Sized>(&mut self, value: &mut T) -> Result<()> {
        value.walk(self)
    }

    /// Walks `value` and returns the stream's copy when loading, including in the verify pass,
    /// and `value` itself otherwise. Routines use this for fields they must check (counts,
    /// ranges) before anything is assigned.
    pub fn value<T: Field>(&mut self, value: T) -> Result<T> {
        let mode = self.mode;
        if mode == Mode::Verify {
            self.mode = Mode::Read;
        }
        let mut value = value;
        let walked = value.walk(self);
        self.mode = mode;
        walked.map(|()| value)
    }

    /// Walks a slice whose length is fixed by the component layout.
    pub fn array<T: Field>(&mut self, values: &mut [T]) -> Result<()> {
        values.iter_mut().try_for_each(|value| value.walk(self))
    }

    /// Walks a nested object through its own serialize routine.
    pub fn object<T: Serializable + ?Sized>(&mut self, object: &mut T) -> Result<()> {
        object.serialize(self)
    }

    pub fn objects<T: Serializable>(&mut self, objects: &mut [T]) -> Result<()> {
        objects.iter_mut().try_for_each(|object| object.serialize(self))
    }

    /// Walks an opaque blob whose size is fixed by the component layout (RAM, register files).
    pub fn bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        let range = self.advance(bytes.len())?;
        match &mut self.cursor {
            Cursor::Measure => {}
            Cursor::Read(data) => {
                if self.mode == Mode::Read {
                    bytes.copy_from_slice(&data[range]);
                }
            }
            Cursor::Write(buf) => buf[range].copy_from_slice(bytes),
        }
        Ok(())
    }

    /// Walks a length-prefixed byte vector.
    pub fn blob(&mut self, value: &mut Vec<u8>) -> Result<()> {
        if let Some(payload) = self.prefixed(value)? {
            if self.reading() {
                value.clear();
                value
                    .try_reserve_exact(payload.len())
                    .map_err(|_| SerializationError::OutOfMemory { len: payload.len() })?;
                value.extend_from_slice(payload);
            }
        }
        Ok(())
    }

    /// Walks a length-prefixed UTF-8 string.
    pub fn string(&mut self, value: &mut String) -> Result<()> {
        let offset = self.pos;
        if let Some(payload) = self.prefixed(value.as_bytes())? {
            let text = std::str::from_utf8(payload).map_err(|_| {
                SerializationError::CorruptState {
                    offset,
                    reason: "string is not valid utf-8",
                }
            })?;
            if self.reading() {
                value.clear();
                value.push_str(text);
            }
        }
        Ok(())
    }

    /// Transfers a fixed-size chunk. Returns the bytes from the stream when loading and
    /// `outgoing` otherwise.
    pub(crate) fn exchange<const N: usize>(&mut self, outgoing: [u8; N]) -> Result<[u8; N]> {
        let mut bytes = outgoing;
        let range = self.advance(N)?;
        match &mut self.cursor {
            Cursor::Measure => {}
            Cursor::Read(data) => bytes.copy_from_slice(&data[range]),
            Cursor::Write(buf) => buf[range].copy_from_slice(&bytes),
        }
        Ok(bytes)
    }

    pub(crate) fn corrupt(&self, offset: usize, reason: &'static str) -> SerializationError {
        SerializationError::CorruptState { offset, reason }
    }

    fn prefixed(&mut self, outgoing: &[u8]) -> Result<Option<&'a [u8]>> {
        let offset = self.pos;
        let len = if self.loading() {
            0
        } else {
            u32::try_from(outgoing.len())
                .map_err(|_| self.corrupt(offset, "field length exceeds limit"))?
        };
        let len = u32::from_le_bytes(self.exchange(len.to_le_bytes())?) as usize;
        if len > MAX_FIELD_LEN {
            return Err(self.corrupt(offset, "field length exceeds limit"));
        }

        let range = self.advance(len)?;
        match self.cursor {
            Cursor::Measure => Ok(None),
            Cursor::Read(data) => Ok(Some(&data[range])),
            Cursor::Write(ref mut buf) => {
                buf[range].copy_from_slice(outgoing);
                Ok(None)
            }
        }
    }

    fn advance(&mut self, len: usize) -> Result<Range<usize>> {
        let start = self.pos;
        let end = start.checked_add(len);
        let limit = match &self.cursor {
            Cursor::Measure => None,
            Cursor::Read(data) => Some(data.len()),
            Cursor::Write(buf) => Some(buf.len()),
        };

        let end = match (end, limit) {
            (Some(end), None) => end,
            (Some(end), Some(limit)) if end <= limit => end,
            (_, limit) => {
                return Err(match self.cursor {
                    Cursor::Write(_) => SerializationError::SizeMismatch {
                        measured: limit.unwrap_or(0),
                        written: start.saturating_add(len),
                    },
                    _ => self.corrupt(start, "truncated input"),
                })
            }
        };
        self.pos = end;
        Ok(start..end)
    }
}

/// State that knows how to walk its own fields, in one fixed order, through a [`Serializer`].
pub trait Serializable {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> Result<()>;
}

/// A fixed-width value the serializer can walk directly.
pub trait Field {
    fn walk(&mut self, s: &mut Serializer<'_>) -> Result<()>;
}

macro_rules! impl_integer_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                fn walk(&mut self, s: &mut Serializer<'_>) -> Result<()> {
                    let bytes = s.exchange(self.to_le_bytes())?;
                    if s.reading() {
                        *self = <$ty>::from_le_bytes(bytes);
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_integer_field!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

macro_rules! impl_real_field {
    ($($ty:ty => $bits:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                fn walk(&mut self, s: &mut Serializer<'_>) -> Result<()> {
                    let bytes = s.exchange(self.to_bits().to_le_bytes())?;
                    if s.reading() {
                        *self = <$ty>::from_bits(<$bits>::from_le_bytes(bytes));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_real_field!(f32 => u32, f64 => u64);

impl Field for bool {
    fn walk(&mut self, s: &mut Serializer<'_>) -> Result<()> {
        let offset = s.position();
        let [byte] = s.exchange([u8::from(*self)])?;
        if byte > 1 {
            return Err(s.corrupt(offset, "invalid boolean"));
        }
        if s.reading() {
            *self = byte == 1;
        }
        Ok(())
    }
}

impl<T: Field, const N: usize> Field for [T; N] {
    fn walk(&mut self, s: &mut Serializer<'_>) -> Result<()> {
        s.array(self)
    }
}
