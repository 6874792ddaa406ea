//! Hosted backend seams (document store, auth) and an in-process stand-in.

pub mod traits;
pub mod memory;

pub use memory::{InMemoryRemote, StaticAuth, WriteEvent};
pub use traits::{AuthProvider, DocumentWrite, RemoteError, RemoteStore};
