//! The employee table behind the database agent.
//!
//! Every operation opens its own connection on a blocking thread, so the
//! store itself is just a path and can be cloned freely.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tokio::task;

/// Errors raised by [`EmployeeStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected the statement or could not be opened.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// The blocking task panicked or was cancelled.
    #[error("database task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// One row of the `employees` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Assigned by the database.
    pub id: i64,
    /// Full name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Department name.
    pub department: String,
    /// Current salary.
    pub salary: f64,
}

impl Employee {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            age: row.get("age")?,
            department: row.get("department")?,
            salary: row.get("salary")?,
        })
    }
}

/// The fields of an employee that is not stored yet.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NewEmployee {
    /// Full name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Department name.
    pub department: String,
    /// Starting salary.
    pub salary: f64,
}

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    department TEXT NOT NULL,
    salary REAL NOT NULL
)";

/// SQLite-backed employee records.
#[derive(Clone, Debug)]
pub struct EmployeeStore {
    db_path: PathBuf,
}

impl EmployeeStore {
    /// Opens the database file, creating it and the table if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.execute(CREATE_TABLE, [])?;
        debug!("employee table ready at {}", db_path.display());
        Ok(Self { db_path })
    }

    /// Returns the database file path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Inserts a row and returns it with its new id.
    pub async fn add(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        self.with_connection(move |conn| {
            conn.query_row(
                "INSERT INTO employees (name, age, department, salary)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING *",
                params![new.name, new.age, new.department, new.salary],
                Employee::from_row,
            )
        })
        .await
    }

    /// Returns every row ordered by id.
    pub async fn list(&self) -> Result<Vec<Employee>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM employees ORDER BY id")?;
            let rows = stmt.query_map([], Employee::from_row)?;
            rows.collect()
        })
        .await
    }

    /// Returns the row with the id, if any.
    pub async fn get(&self, id: i64) -> Result<Option<Employee>, StoreError> {
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT * FROM employees WHERE id = ?1",
                params![id],
                Employee::from_row,
            )
            .optional()
        })
        .await
    }

    /// Sets the salary of a row and returns the updated row, if any.
    pub async fn update_salary(
        &self,
        id: i64,
        salary: f64,
    ) -> Result<Option<Employee>, StoreError> {
        self.with_connection(move |conn| {
            conn.query_row(
                "UPDATE employees SET salary = ?1 WHERE id = ?2 RETURNING *",
                params![salary, id],
                Employee::from_row,
            )
            .optional()
        })
        .await
    }

    /// Deletes a row. Returns `false` if there was no such row.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM employees WHERE id = ?1", params![id])
                .map(|count| count > 0)
        })
        .await
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        let result = task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            f(&conn)
        })
        .await?;
        Ok(result?)
    }
}
