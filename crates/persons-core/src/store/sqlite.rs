use super::PersonStore;
use crate::{NewPerson, Person, PersonId, StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS persons (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT    NOT NULL,
    age  INTEGER NOT NULL CHECK (age >= 0)
);
";

const INSERT: &str = "INSERT INTO persons (name, age) VALUES (?1, ?2)";

/// SQLite-backed [`PersonStore`].
///
/// A single connection is shared behind a mutex. `create_many` runs inside one
/// transaction, so a failing row rolls back the whole batch.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn row_to_person(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get::<_, i64>(0)? as PersonId,
        name: row.get(1)?,
        age: row.get(2)?,
    })
}

fn to_key(id: PersonId) -> StoreResult<i64> {
    i64::try_from(id).map_err(|_| StoreError::Rejected {
        reason: format!("id {id} is out of range"),
    })
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Rejected {
                reason: err.to_string(),
            },
            _ => Self::Backend {
                reason: err.to_string(),
            },
        }
    }
}

impl PersonStore for SqliteStore {
    fn create(&self, person: NewPerson) -> StoreResult<Person> {
        let conn = self.conn.lock();
        conn.execute(INSERT, params![person.name, person.age])?;
        let id = conn.last_insert_rowid() as PersonId;
        Ok(Person::from_new(id, person))
    }

    fn create_many(&self, persons: Vec<NewPerson>) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT)?;
            for person in &persons {
                stmt.execute(params![person.name, person.age])?;
            }
        }
        tx.commit()?;
        Ok(persons.len())
    }

    fn get(&self, id: PersonId) -> StoreResult<Option<Person>> {
        let key = to_key(id)?;
        let conn = self.conn.lock();
        let person = conn
            .query_row(
                "SELECT id, name, age FROM persons WHERE id = ?1",
                params![key],
                row_to_person,
            )
            .optional()?;
        Ok(person)
    }

    fn list(&self) -> StoreResult<Vec<Person>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, name, age FROM persons ORDER BY id")?;
        let persons = stmt
            .query_map([], row_to_person)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(persons)
    }

    fn update(&self, id: PersonId, person: NewPerson) -> StoreResult<Option<Person>> {
        let key = to_key(id)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE persons SET name = ?1, age = ?2 WHERE id = ?3",
            params![person.name, person.age, key],
        )?;
        Ok((changed > 0).then(|| Person::from_new(id, person)))
    }

    fn delete(&self, id: PersonId) -> StoreResult<bool> {
        let key = to_key(id)?;
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM persons WHERE id = ?1", params![key])?;
        Ok(changed > 0)
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
