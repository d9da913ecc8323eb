// ABOUTME: Typed per-Task key/value store through which Steps pass results.
// ABOUTME: A Slot names a value and fixes its type; reads of unset slots are coded errors.

use crate::errno::{self, CodedError};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A typed key into a [`Blackboard`].
///
/// Slots are plain values: the Task constructor creates one and hands copies
/// to the Step that writes it and the Steps that read it.
pub struct Slot<T> {
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Slot<T> {
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.key)
    }
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Slot<T> {}

#[derive(Default)]
pub struct Blackboard {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Blackboard").field("keys", &keys).finish()
    }
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any earlier one under the same key.
    pub fn insert<T: Any + Send + Sync>(&mut self, slot: Slot<T>, value: T) {
        self.values.insert(slot.key, Box::new(value));
    }

    pub fn get<T: Any>(&self, slot: Slot<T>) -> Option<&T> {
        self.values.get(slot.key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn take<T: Any>(&mut self, slot: Slot<T>) -> Option<T> {
        let value = self.values.remove(slot.key)?;
        match value.downcast::<T>() {
            Ok(v) => Some(*v),
            Err(original) => {
                // Wrong type: leave the entry as it was.
                self.values.insert(slot.key, original);
                None
            }
        }
    }

    /// Like [`get`](Self::get) but a missing value is a coded error naming the slot.
    pub fn require<T: Any>(&self, slot: Slot<T>) -> Result<&T, CodedError> {
        match self.values.get(slot.key) {
            None => Err(errno::MISSING_STEP_INPUT.clue(slot.key)),
            Some(v) => v.downcast_ref::<T>().ok_or_else(|| {
                errno::MISSING_STEP_INPUT.clue(format!("{} holds a value of another type", slot.key))
            }),
        }
    }

    pub fn contains<T>(&self, slot: Slot<T>) -> bool {
        self.values.contains_key(slot.key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A Step argument known either up front or produced by an earlier Step.
#[derive(Debug, Clone)]
pub enum Input<T> {
    Value(T),
    Slot(Slot<T>),
}

impl<T: Any + Clone> Input<T> {
    pub fn resolve(&self, board: &Blackboard) -> Result<T, CodedError> {
        match self {
            Input::Value(v) => Ok(v.clone()),
            Input::Slot(slot) => board.require(*slot).cloned(),
        }
    }
}

impl<T> From<Slot<T>> for Input<T> {
    fn from(slot: Slot<T>) -> Self {
        Input::Slot(slot)
    }
}

impl From<&str> for Input<String> {
    fn from(value: &str) -> Self {
        Input::Value(value.to_string())
    }
}

impl From<String> for Input<String> {
    fn from(value: String) -> Self {
        Input::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: Slot<String> = Slot::new("name");
    const COUNT: Slot<u32> = Slot::new("count");

    #[test]
    fn insert_then_get() {
        let mut board = Blackboard::new();
        board.insert(NAME, "etcd0".to_string());
        assert_eq!(board.get(NAME).map(String::as_str), Some("etcd0"));
        assert!(board.contains(NAME));
        assert!(!board.contains(COUNT));
    }

    #[test]
    fn missing_slot_is_coded_error_with_key() {
        let board = Blackboard::new();
        let err = board.require(NAME).unwrap_err();
        assert_eq!(err.code, errno::MISSING_STEP_INPUT);
        assert_eq!(err.clue.as_deref(), Some("name"));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut board = Blackboard::new();
        board.insert(Slot::<u32>::new("name"), 3);
        assert!(board.get(NAME).is_none());
        assert!(board.require(NAME).is_err());
        assert!(board.take(NAME).is_none());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn take_removes_value() {
        let mut board = Blackboard::new();
        board.insert(COUNT, 7);
        assert_eq!(board.take(COUNT), Some(7));
        assert!(board.is_empty());
    }

    #[test]
    fn input_resolves_value_or_slot() {
        let mut board = Blackboard::new();
        board.insert(NAME, "from-slot".to_string());
        assert_eq!(Input::from("literal").resolve(&board).unwrap(), "literal");
        assert_eq!(Input::from(NAME).resolve(&board).unwrap(), "from-slot");
    }
}
