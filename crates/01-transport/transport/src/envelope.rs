/// Header stored alongside every serialized payload.
///
/// The envelope lets consumers identify the serialized type (`tag`) and
/// enforce schema compatibility (`ver`) before touching the payload bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Application-defined discriminant used to select the rkyv schema.
    pub tag: u8,
    /// Schema epoch associated with this payload.
    pub ver: u8,
    /// Reserved bitflags that travel with the payload.
    pub flags: u16,
}

impl Envelope {
    /// Constructs an envelope with the given tag and schema version.
    pub const fn new(tag: u8, ver: u8) -> Self {
        Self { tag, ver, flags: 0 }
    }
}
