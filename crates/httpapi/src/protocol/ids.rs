//! Opaque identifiers and flag words shared by the queue and registration surfaces.

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};

// Every id kind draws from one counter so that no two live objects ever share a value.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The zero value, never assigned to a live object.
            pub const NULL: $name = $name(0);

            pub(crate) fn next() -> Self {
                Self(next_id())
            }

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

opaque_id! {
    /// Stable for the lifetime of one TCP connection.
    ConnectionId
}

opaque_id! {
    /// Unique per parsed request. [`RequestId::NULL`] asks a receive for the
    /// oldest unclaimed request.
    RequestId
}

opaque_id! {
    ServerSessionId
}

opaque_id! {
    UrlGroupId
}

/// Opaque value registered with a URL and returned with every request routed through it.
pub type UrlContext = u64;

macro_rules! flag_word {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $value:expr;)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$fmeta])* pub const $flag: $name = $name($value);)+

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn bits(self) -> u32 {
                self.0
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

flag_word! {
    ReceiveFlags {
        /// Copy the entity body that has already arrived into the receive buffer.
        COPY_BODY = 0x1;
    }
}

flag_word! {
    SendFlags {
        /// Close the connection once the response has been written.
        DISCONNECT = 0x1;
    }
}

flag_word! {
    /// Flags stored in the request record.
    RequestFlags {
        /// Part of the entity body has not been delivered yet.
        MORE_ENTITY_BODY_EXISTS = 0x1;
    }
}
