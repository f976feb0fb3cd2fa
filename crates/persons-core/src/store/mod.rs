//! Persistence collaborator for persons.
//!
//! [`PersonStore`] is the only shared mutable resource in the service. The
//! engines never lock anything themselves: every store call is expected to
//! be atomic on its own, which for [`PersonStore::create_many`] means a batch
//! is either fully visible or not visible at all.
//!
//! ## Implementations
//!
//! - [`MemoryStore`] - process-local, `parking_lot` guarded map.
//! - `SqliteStore` - single-file SQLite database (feature `sqlite`).

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::{NewPerson, Person, PersonId, StoreResult};
use std::sync::Arc;

/// Store handle shared between the request façade and the engines.
pub type SharedStore = Arc<dyn PersonStore>;

/// Synchronous CRUD interface over persisted persons.
///
/// Calls may block on I/O, which is why the bulk engine routes them through an
/// [`Execute`](crate::strategy::Execute) strategy.
pub trait PersonStore: Send + Sync {
    /// Persists one person and returns it with its assigned id.
    fn create(&self, person: NewPerson) -> StoreResult<Person>;

    /// Persists every person in `persons` atomically and returns how many were
    /// written.
    ///
    /// # Errors
    ///
    /// On error nothing from this call is persisted.
    fn create_many(&self, persons: Vec<NewPerson>) -> StoreResult<usize>;

    fn get(&self, id: PersonId) -> StoreResult<Option<Person>>;

    /// Returns every person ordered by ascending id.
    fn list(&self) -> StoreResult<Vec<Person>>;

    /// Replaces the name and age of an existing person. Returns `None` if `id`
    /// is unknown.
    fn update(&self, id: PersonId, person: NewPerson) -> StoreResult<Option<Person>>;

    /// Removes a person. Returns `false` if `id` is unknown.
    fn delete(&self, id: PersonId) -> StoreResult<bool>;

    fn count(&self) -> StoreResult<usize> {
        Ok(self.list()?.len())
    }
}
