//! Connection string codec.
//!
//! [`parse`] turns a `mongodb://` or `mongodb+srv://` string into a validated
//! [`ConnectionDescriptor`](crate::model::ConnectionDescriptor);
//! [`serialize`] produces the canonical string back. For every descriptor
//! built by `parse`, `parse(serialize(d)) == d`.

mod encoding;
mod parse;
mod serialize;
pub mod srv;

pub use parse::parse;
pub use serialize::serialize;
pub use srv::{NoResolver, SrvResolver};

#[cfg(feature = "dns")]
pub use srv::SystemResolver;

/// Scheme for explicit host lists.
pub const SCHEME: &str = "mongodb://";

/// Scheme for DNS seed lists.
pub const SRV_SCHEME: &str = "mongodb+srv://";

/// Whether `s` looks like a connection string rather than a bare host.
pub fn is_uri(s: &str) -> bool {
    s.starts_with(SCHEME) || s.starts_with(SRV_SCHEME)
}
