use super::PersonStore;
use crate::{NewPerson, Person, PersonId, StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory [`PersonStore`].
///
/// Rows live in a `BTreeMap` keyed by id, so listing is naturally ordered.
/// Each call takes the write lock once, which makes `create_many` atomic with
/// respect to concurrent readers.
///
/// An optional row limit turns the store into a bounded one: any write that
/// would exceed it is rejected as a whole.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Rows>,
    max_rows: Option<usize>,
}

#[derive(Debug, Default)]
struct Rows {
    last_id: PersonId,
    by_id: BTreeMap<PersonId, Person>,
}

impl Rows {
    fn insert(&mut self, person: NewPerson) -> Person {
        self.last_id += 1;
        let person = Person::from_new(self.last_id, person);
        self.by_id.insert(person.id, person.clone());
        person
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes once it holds `max_rows` persons.
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            inner: RwLock::default(),
            max_rows: Some(max_rows),
        }
    }

    fn check_capacity(&self, held: usize, incoming: usize) -> StoreResult<()> {
        match self.max_rows {
            Some(max) if held + incoming > max => Err(StoreError::Rejected {
                reason: format!("writing {incoming} rows would exceed the limit of {max} (holding {held})"),
            }),
            _ => Ok(()),
        }
    }
}

impl PersonStore for MemoryStore {
    fn create(&self, person: NewPerson) -> StoreResult<Person> {
        let mut rows = self.inner.write();
        self.check_capacity(rows.by_id.len(), 1)?;
        Ok(rows.insert(person))
    }

    fn create_many(&self, persons: Vec<NewPerson>) -> StoreResult<usize> {
        let mut rows = self.inner.write();
        self.check_capacity(rows.by_id.len(), persons.len())?;
        let written = persons.len();
        for person in persons {
            rows.insert(person);
        }
        Ok(written)
    }

    fn get(&self, id: PersonId) -> StoreResult<Option<Person>> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<Person>> {
        Ok(self.inner.read().by_id.values().cloned().collect())
    }

    fn update(&self, id: PersonId, person: NewPerson) -> StoreResult<Option<Person>> {
        let mut rows = self.inner.write();
        Ok(rows.by_id.get_mut(&id).map(|row| {
            row.name = person.name;
            row.age = person.age;
            row.clone()
        }))
    }

    fn delete(&self, id: PersonId) -> StoreResult<bool> {
        Ok(self.inner.write().by_id.remove(&id).is_some())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.read().by_id.len())
    }
}
