use crate::errors::StateConflictError;
use serde::{Serialize, Serializer};

/// A named value that can be written at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot<T> {
    field: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    /// Creates an empty slot for the named field.
    #[must_use]
    pub const fn new(field: &'static str) -> Self {
        Self { field, value: None }
    }

    /// Returns the field name.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        self.field
    }

    /// Writes the value.
    ///
    /// # Errors
    ///
    /// Returns `StateConflictError` if the slot was already written.
    pub fn set(&mut self, value: T) -> Result<(), StateConflictError> {
        if self.value.is_some() {
            return Err(StateConflictError::new(self.field));
        }
        self.value = Some(value);
        Ok(())
    }

    /// Returns the value if written.
    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Returns true once the slot has been written.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Consumes the slot, returning its value.
    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

impl<T: Serialize> Serialize for Slot<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_once() {
        let mut slot = Slot::new("answer");
        assert!(!slot.is_set());
        assert_eq!(slot.get(), None);

        slot.set("first".to_string()).unwrap();
        let err = slot.set("second".to_string()).unwrap_err();

        assert_eq!(err.field, "answer");
        assert_eq!(slot.get().map(String::as_str), Some("first"));
    }

    #[test]
    fn test_serializes_as_option() {
        let mut slot = Slot::new("count");
        assert_eq!(serde_json::to_string(&slot).unwrap(), "null");

        slot.set(3).unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "3");
        assert_eq!(slot.into_inner(), Some(3));
    }
}
