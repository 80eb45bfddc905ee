use std::fmt;
use std::marker::PhantomData;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident($repr:ty), $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl TryFrom<u64> for $name {
            type Error = std::num::TryFromIntError;

            fn try_from(raw: u64) -> Result<Self, Self::Error> {
                <$repr>::try_from(raw).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

opaque_id!(
    /// Registered network interface; stable for the registry's lifetime.
    InterfaceId(u32),
    "iface"
);
opaque_id!(
    /// Application socket, scoped to one channel instance.
    SocketId(u32),
    "socket"
);
opaque_id!(
    /// Stream binding, scoped to one socket.
    StreamId(u16),
    "stream"
);

/// Monotonic id source. The first id handed out is `1`; ids are never reused.
#[derive(Debug)]
pub struct IdGenerator<T> {
    next: u64,
    _id: PhantomData<fn() -> T>,
}

impl<T> Default for IdGenerator<T> {
    fn default() -> Self {
        Self {
            next: 1,
            _id: PhantomData,
        }
    }
}

impl<T: TryFrom<u64>> IdGenerator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused id, or `None` once the id space is exhausted.
    pub fn next_id(&mut self) -> Option<T> {
        let id = T::try_from(self.next).ok()?;
        self.next += 1;
        Some(id)
    }
}
