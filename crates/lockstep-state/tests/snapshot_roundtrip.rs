use lockstep_state::{
    load, save, Result, Serializable, SerializationError, Serializer, Version, SNAPSHOT_MAGIC,
    VERSION_LEN,
};

#[derive(Debug, Clone, Default, PartialEq)]
struct Cpu {
    a: u8,
    x: u8,
    pc: u16,
    irq_line: bool,
    ram: Vec<u8>,
}

impl Serializable for Cpu {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> Result<()> {
        s.field(&mut self.a)?;
        s.field(&mut self.x)?;
        s.field(&mut self.pc)?;
        s.field(&mut self.irq_line)?;
        s.bytes(&mut self.ram)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Apu {
    volume: f32,
    phase: [i16; 4],
    label: String,
    fifo: Vec<u8>,
}

impl Serializable for Apu {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> Result<()> {
        s.field(&mut self.volume)?;
        s.field(&mut self.phase)?;
        s.string(&mut self.label)?;
        s.blob(&mut self.fifo)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct System {
    cpu: Cpu,
    apu: Apu,
    frame: u64,
}

impl System {
    fn power_on() -> Self {
        Self {
            cpu: Cpu {
                ram: vec![0; 256],
                ..Cpu::default()
            },
            apu: Apu::default(),
            frame: 0,
        }
    }

    fn running() -> Self {
        let mut system = Self::power_on();
        system.cpu.a = 0x42;
        system.cpu.x = 0x07;
        system.cpu.pc = 0xc000;
        system.cpu.irq_line = true;
        for (i, b) in system.cpu.ram.iter_mut().enumerate() {
            *b = (i * 3) as u8;
        }
        system.apu.volume = 0.75;
        system.apu.phase = [-1, 2, -3, 4];
        system.apu.label = "pulse".to_string();
        system.apu.fifo = vec![0x10, 0x20, 0x30];
        system.frame = 600;
        system
    }
}

impl Serializable for System {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> Result<()> {
        s.object(&mut self.cpu)?;
        s.object(&mut self.apu)?;
        s.field(&mut self.frame)
    }
}

fn version() -> Version {
    Version::new("test-v1").unwrap()
}

#[test]
fn write_then_read_into_fresh_system_is_identical() {
    let mut live = System::running();
    let bytes = save(&mut live, &version()).unwrap();

    assert_eq!(&bytes[..4], &SNAPSHOT_MAGIC);
    assert_eq!(&bytes[4..4 + VERSION_LEN], version().as_bytes());

    let mut fresh = System::power_on();
    load(&mut fresh, &bytes, &version()).unwrap();
    assert_eq!(fresh, live);
}

#[test]
fn back_to_back_saves_are_byte_identical() {
    let mut live = System::running();
    let first = save(&mut live, &version()).unwrap();
    let second = save(&mut live, &version()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn altered_magic_is_rejected_without_touching_state() {
    let bytes = save(&mut System::running(), &version()).unwrap();
    let mut tampered = bytes.clone();
    tampered[0] ^= 0xff;

    let mut live = System::power_on();
    live.frame = 17;
    let before = live.clone();

    let err = load(&mut live, &tampered, &version()).unwrap_err();
    assert!(matches!(err, SerializationError::IncompatibleSignature { .. }));
    assert_eq!(live, before);
}

#[test]
fn other_version_is_rejected_without_touching_state() {
    let bytes = save(&mut System::running(), &Version::new("test-v0").unwrap()).unwrap();

    let mut live = System::power_on();
    let before = live.clone();
    let err = load(&mut live, &bytes, &version()).unwrap_err();
    assert_eq!(
        err,
        SerializationError::UnsupportedVersion {
            found: "test-v0".to_string(),
            expected: "test-v1".to_string(),
        }
    );
    assert_eq!(live, before);
}

#[test]
fn truncated_snapshot_never_partially_loads() {
    let bytes = save(&mut System::running(), &version()).unwrap();

    // Cut the stream at every point past the header, including inside the last field, so the
    // failure happens after earlier fields would already have been assigned by a naive reader.
    for len in 4 + VERSION_LEN..bytes.len() {
        let mut live = System::power_on();
        let before = live.clone();
        let err = load(&mut live, &bytes[..len], &version()).unwrap_err();
        assert!(
            matches!(err, SerializationError::CorruptState { .. }),
            "len {len}: {err:?}"
        );
        assert_eq!(live, before, "state changed after failed load of {len} bytes");
    }
}

#[test]
fn trailing_garbage_is_rejected() {
    let mut bytes = save(&mut System::running(), &version()).unwrap();
    bytes.push(0);
    let mut live = System::power_on();
    let err = load(&mut live, &bytes, &version()).unwrap_err();
    assert!(matches!(
        err,
        SerializationError::CorruptState {
            reason: "trailing bytes after last field",
            ..
        }
    ));
    assert_eq!(live, System::power_on());
}

/// A routine whose output depends on how often it ran, which a measure pass must expose.
struct Unstable {
    calls: u8,
}

impl Serializable for Unstable {
    fn serialize(&mut self, s: &mut Serializer<'_>) -> Result<()> {
        let mut payload = vec![0u8; usize::from(self.calls)];
        self.calls += 1;
        s.blob(&mut payload)
    }
}

#[test]
fn non_deterministic_routine_fails_with_size_mismatch() {
    let mut unstable = Unstable { calls: 0 };
    let err = save(&mut unstable, &version()).unwrap_err();
    assert!(matches!(err, SerializationError::SizeMismatch { .. }));
}
