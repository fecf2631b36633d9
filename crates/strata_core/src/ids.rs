use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a persisted object, assigned by the id allocator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub i64);

impl ObjectId {
    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<i64> for ObjectId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ObjectId> for i64 {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectId;

    #[test]
    fn serializes_as_plain_integer() {
        let encoded = serde_json::to_string(&ObjectId(42)).expect("encode");
        assert_eq!(encoded, "42");
        let decoded: ObjectId = serde_json::from_str("43").expect("decode");
        assert_eq!(decoded, ObjectId(43));
        assert_eq!(decoded.next(), ObjectId(44));
    }
}
