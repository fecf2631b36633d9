use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

const MAX_IDENT_LEN: usize = 63;

/// A table, column or dictionary name that is safe to interpolate into SQL.
///
/// Identifiers cannot be bound as parameters, so every name that reaches a
/// statement passes through here first. Names are folded to lowercase so both
/// backends resolve them the same way.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    pub fn new(raw: &str) -> StoreResult<Self> {
        let mut chars = raw.chars();
        let first_ok = chars
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
        let rest_ok = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !first_ok || !rest_ok || raw.len() > MAX_IDENT_LEN {
            return Err(StoreError::invalid(format!("invalid identifier '{raw}'")));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derived name for a secondary index on `column` of this table.
    pub fn index_name(&self, column: &str) -> String {
        format!("{column}_{}", self.0)
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl TryFrom<String> for Ident {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ident::new(&value)
    }
}

impl From<Ident> for String {
    fn from(value: Ident) -> Self {
        value.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
