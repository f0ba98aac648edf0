use std::fmt;

use relink_core::{Result, StatementOptions};
use ring::digest::{Context, SHA256};

/// Cache key for a prepared statement: hex SHA-256 of the SQL text, a NUL
/// separator and the JSON-serialized options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(sql: &str, options: &StatementOptions) -> Result<Self> {
        let options = serde_json::to_vec(options)?;

        let mut context = Context::new(&SHA256);
        context.update(sql.as_bytes());
        context.update(&[0]);
        context.update(&options);

        Ok(Self(hex::encode(context.finish().as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
