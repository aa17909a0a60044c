use crate::error::StoreError;
use std::any::{Any, type_name};
use std::collections::BTreeMap;

/// Named, typed state slices owned by a store.
///
/// Outside a processing pass callers only get shared access through
/// [`Store::state`](crate::Store::state); mutable access is handed to
/// receptors through their context.
#[derive(Default)]
pub struct StateSlices {
    slices: BTreeMap<String, Box<dyn Any>>,
}

impl StateSlices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: 'static>(
        &mut self,
        name: impl Into<String>,
        value: S,
    ) -> Result<(), StoreError> {
        let name = name.into();
        if self.slices.contains_key(&name) {
            return Err(StoreError::DuplicateSlice(name));
        }
        self.slices.insert(name, Box::new(value));
        Ok(())
    }

    pub fn get<S: 'static>(&self, name: &str) -> Result<&S, StoreError> {
        self.slices
            .get(name)
            .ok_or_else(|| StoreError::UnknownSlice(name.to_owned()))?
            .downcast_ref::<S>()
            .ok_or_else(|| StoreError::SliceTypeMismatch {
                name: name.to_owned(),
                expected: type_name::<S>(),
            })
    }

    pub fn get_mut<S: 'static>(&mut self, name: &str) -> Result<&mut S, StoreError> {
        self.slices
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownSlice(name.to_owned()))?
            .downcast_mut::<S>()
            .ok_or_else(|| StoreError::SliceTypeMismatch {
                name: name.to_owned(),
                expected: type_name::<S>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slices.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl std::fmt::Debug for StateSlices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.slices.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_read_back() {
        let mut slices = StateSlices::new();
        slices.insert("counter", 3u32).unwrap();
        assert_eq!(*slices.get::<u32>("counter").unwrap(), 3);
        *slices.get_mut::<u32>("counter").unwrap() += 1;
        assert_eq!(*slices.get::<u32>("counter").unwrap(), 4);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut slices = StateSlices::new();
        slices.insert("a", 1u8).unwrap();
        assert_eq!(
            slices.insert("a", 2u8),
            Err(StoreError::DuplicateSlice("a".into()))
        );
    }

    #[test]
    fn wrong_type_and_missing_name() {
        let mut slices = StateSlices::new();
        slices.insert("a", 1u8).unwrap();
        assert!(matches!(
            slices.get::<String>("a"),
            Err(StoreError::SliceTypeMismatch { .. })
        ));
        assert!(matches!(
            slices.get::<u8>("b"),
            Err(StoreError::UnknownSlice(_))
        ));
    }
}
