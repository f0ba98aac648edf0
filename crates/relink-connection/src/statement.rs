//! Prepared statement cache
//!
//! Statements are cached per connection by a fingerprint of their SQL text
//! and options. The cached object is a [`StatementProxy`] whose identity is
//! stable for as long as it stays cached, even when the connection underneath
//! is replaced and the statement has to be prepared again.

mod cache;
mod fingerprint;
mod proxy;


pub use cache::StatementCache;
pub use fingerprint::Fingerprint;
pub use proxy::StatementProxy;
