#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod error;
pub use error::DpskError;
pub(crate) use error::DpskError as Error;

mod types;
pub use types::{MessageType, ServerName};

mod identity;
pub use identity::{PskIdentity, MAX_PSK_IDENTITY_LEN};

mod reassembly;
pub use reassembly::{Fragment, ReassemblingMessage};

mod store;
pub use store::{BytesPskStore, InMemoryPskStore, MappedPskStore, SecretKey, StringPskStore};
