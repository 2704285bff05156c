//! Object identity issued by a context.

use parking_lot::RwLock;
use std::fmt;

/// Unique id plus a mutable debug name.
pub struct IdData {
    id: i64,
    name: RwLock<String>,
}

impl IdData {
    pub(crate) fn new(id: i64) -> Self {
        Self {
            id: id.max(0),
            name: RwLock::new(String::new()),
        }
    }

    /// The numeric id, unique within the issuing context.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name<S: Into<String>>(&self, name: S) {
        *self.name.write() = name.into();
    }
}

impl fmt::Debug for IdData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdData")
            .field("id", &self.id)
            .field("name", &*self.name.read())
            .finish()
    }
}

impl PartialEq for IdData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IdData {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_ids_clamp_to_zero() {
        assert_eq!(IdData::new(-5).id(), 0);
        assert_eq!(IdData::new(7).id(), 7);
    }

    #[test]
    fn test_name() {
        let id = IdData::new(1);
        assert_eq!(id.name(), "");
        id.set_name("buffer0");
        assert_eq!(id.name(), "buffer0");
    }
}
