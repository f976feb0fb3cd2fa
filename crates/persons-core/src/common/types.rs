use crate::{Error, Result};
use core::{fmt, time::Duration};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the store when a person is created.
pub type PersonId = u64;

/// Longest accepted person name, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Upper bound on the number of persons a single bulk request may create.
pub const MAX_BULK_COUNT: usize = 10_000;

/// Number of persons written per `create_many` call during bulk creation.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Per-target timeout applied by the fan-out fetch engine.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A persisted person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn from_new(id: PersonId, person: NewPerson) -> Self {
        Self {
            id,
            name: person.name,
            age: person.age,
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.age)
    }
}

/// A person that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    pub age: u32,
}

impl NewPerson {
    pub fn new(name: impl Into<String>, age: u32) -> Self {
        Self {
            name: name.into(),
            age,
        }
    }

    /// Checks the column constraints of a person row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the name is blank or longer than
    /// [`MAX_NAME_LEN`] characters.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name must not be blank"));
        }
        let len = self.name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "name is {len} characters long, maximum is {MAX_NAME_LEN}"
            )));
        }
        Ok(())
    }
}
