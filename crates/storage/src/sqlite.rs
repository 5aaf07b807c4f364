use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::debug;

use todosync_core::{
    BackendError, BatchAction, BatchRequest, BatchResponse, Clock, DeleteResponse, ListQuery,
    Millis, NewTodo, Priority, SortBy, StatusFilter, SystemClock, Todo, TodoBackend, TodoId, TodoPage,
    TodoPatch, validation::validate_title,
};

use crate::error::StorageError;

const TODO_COLUMNS: &str = "todo_id, title, completed, priority, created_at, updated_at";

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

/// Simulated server: a SQLite-backed implementation of [`TodoBackend`].
pub struct SqliteBackend {
    conn: Connection,
    clock: Box<dyn Clock>,
}

impl SqliteBackend {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            clock: Box::new(SystemClock),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            clock: Box::new(SystemClock),
        })
    }

    /// Replace the clock used to stamp `created_at` / `updated_at`.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Load the two starter records the demo app ships with.
    pub fn seed_demo(&mut self) -> Result<Vec<Todo>, StorageError> {
        let seeds = [
            ("Learn React", false, Priority::Low, 1_707_472_800_000, 1_707_472_800_000),
            ("Build a todo app", true, Priority::Medium, 1_707_476_400_000, 1_707_490_800_000),
        ];
        let tx = self.conn.transaction()?;
        let mut todos = Vec::with_capacity(seeds.len());
        for (title, completed, priority, created_at, updated_at) in seeds {
            let todo = Todo {
                id: TodoId::new(),
                title: title.to_string(),
                completed,
                priority,
                created_at,
                updated_at,
            };
            insert_todo(&tx, &todo)?;
            todos.push(todo);
        }
        tx.commit()?;
        Ok(todos)
    }

    /// Insert a fully-formed record, bypassing id and timestamp generation.
    pub fn insert(&mut self, todo: &Todo) -> Result<(), StorageError> {
        validate_title(&todo.title)?;
        insert_todo(&self.conn, todo)
    }

    pub fn get_todo(&self, id: TodoId) -> Result<Option<Todo>, StorageError> {
        get_todo(&self.conn, id)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM todos", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    fn now(&self) -> Millis {
        self.clock.now()
    }

    fn query_todos(&self, query: &ListQuery) -> Result<Vec<Todo>, StorageError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(term) = query.search_term() {
            clauses.push("instr(lower(title), lower(?)) > 0");
            values.push(Value::Text(term.to_string()));
        }
        if let Some(status) = query.status {
            clauses.push("completed = ?");
            let completed = match status {
                StatusFilter::Completed => 1,
                StatusFilter::Active => 0,
            };
            values.push(Value::Integer(completed));
        }
        if let Some(priority) = query.priority {
            clauses.push("priority = ?");
            values.push(Value::Text(priority.as_str().to_string()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let order_sql = match query.sort_by.unwrap_or_default() {
            SortBy::CreatedAt => "ORDER BY created_at DESC, rowid DESC",
            SortBy::Priority => {
                "ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, \
                 created_at DESC, rowid DESC"
            }
        };

        let sql = format!("SELECT {TODO_COLUMNS} FROM todos {where_sql} {order_sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), read_raw)?;
        let mut todos = Vec::new();
        for row in rows {
            todos.push(row?.into_todo()?);
        }
        Ok(todos)
    }
}

/// Column values as read from SQLite, before id and enum decoding.
struct RawTodo {
    id: Vec<u8>,
    title: String,
    completed: bool,
    priority: String,
    created_at: i64,
    updated_at: i64,
}

impl RawTodo {
    fn into_todo(self) -> Result<Todo, StorageError> {
        let id = TodoId::from_bytes(to_array::<16>(self.id, "todo_id")?);
        let priority: Priority = self
            .priority
            .parse()
            .map_err(|_| StorageError::Serialization(format!("unknown priority {:?}", self.priority)))?;
        Ok(Todo {
            id,
            title: self.title,
            completed: self.completed,
            priority,
            created_at: self.created_at as Millis,
            updated_at: self.updated_at as Millis,
        })
    }
}

fn read_raw(row: &Row) -> rusqlite::Result<RawTodo> {
    Ok(RawTodo {
        id: row.get(0)?,
        title: row.get(1)?,
        completed: row.get(2)?,
        priority: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn get_todo(conn: &Connection, id: TodoId) -> Result<Option<Todo>, StorageError> {
    let raw = conn
        .query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE todo_id = ?1"),
            params![id.as_bytes().as_slice()],
            read_raw,
        )
        .optional()?;
    raw.map(RawTodo::into_todo).transpose()
}

fn insert_todo(conn: &Connection, todo: &Todo) -> Result<(), StorageError> {
    conn.execute(
        &format!("INSERT INTO todos ({TODO_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            todo.id.as_bytes().as_slice(),
            todo.title,
            todo.completed,
            todo.priority.as_str(),
            todo.created_at as i64,
            todo.updated_at as i64,
        ],
    )?;
    Ok(())
}

fn write_todo(conn: &Connection, todo: &Todo) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE todos SET title = ?1, completed = ?2, priority = ?3, updated_at = ?4 WHERE todo_id = ?5",
        params![
            todo.title,
            todo.completed,
            todo.priority.as_str(),
            todo.updated_at as i64,
            todo.id.as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

/// Validate and apply `patch` to the stored record. `Ok(None)` when the id is absent.
fn patch_todo(
    tx: &Transaction,
    id: TodoId,
    patch: &TodoPatch,
    now: Millis,
) -> Result<Option<Todo>, StorageError> {
    let patch = patch.clone().validated()?;
    let Some(mut todo) = get_todo(tx, id)? else {
        return Ok(None);
    };
    patch.apply_to(&mut todo);
    todo.updated_at = now;
    write_todo(tx, &todo)?;
    Ok(Some(todo))
}

impl TodoBackend for SqliteBackend {
    fn list_todos(&mut self, query: &ListQuery) -> Result<TodoPage, BackendError> {
        let todos = self.query_todos(query)?;
        let total = todos.len();
        Ok(TodoPage { todos, total })
    }

    fn create_todo(&mut self, new: &NewTodo) -> Result<Todo, BackendError> {
        let title = validate_title(&new.title)?;
        let now = self.now();
        let todo = Todo {
            id: TodoId::new(),
            title,
            completed: false,
            priority: new.priority,
            created_at: now,
            updated_at: now,
        };
        insert_todo(&self.conn, &todo)?;
        debug!(id = %todo.id, "created todo");
        Ok(todo)
    }

    fn update_todo(&mut self, id: TodoId, patch: &TodoPatch) -> Result<Todo, BackendError> {
        let now = self.now();
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let todo = patch_todo(&tx, id, patch, now)?.ok_or(BackendError::NotFound(id))?;
        tx.commit().map_err(StorageError::from)?;
        Ok(todo)
    }

    fn delete_todo(&mut self, id: TodoId) -> Result<DeleteResponse, BackendError> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM todos WHERE todo_id = ?1",
                params![id.as_bytes().as_slice()],
            )
            .map_err(StorageError::from)?;
        if changed == 0 {
            return Err(BackendError::NotFound(id));
        }
        Ok(DeleteResponse { success: true })
    }

    fn batch_update(&mut self, request: &BatchRequest) -> Result<BatchResponse, BackendError> {
        let now = self.now();
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let mut updated = Vec::new();

        match request.action {
            BatchAction::Complete => {
                for &id in &request.ids {
                    let Some(mut todo) = get_todo(&tx, id)? else {
                        continue;
                    };
                    if todo.completed {
                        continue;
                    }
                    todo.completed = true;
                    todo.updated_at = now;
                    write_todo(&tx, &todo)?;
                    updated.push(todo);
                }
            }
            BatchAction::Delete => {
                for id in &request.ids {
                    tx.execute(
                        "DELETE FROM todos WHERE todo_id = ?1",
                        params![id.as_bytes().as_slice()],
                    )
                    .map_err(StorageError::from)?;
                }
            }
            BatchAction::Update => {
                for (id, patch) in request.entries()? {
                    if let Some(todo) = patch_todo(&tx, id, patch, now)? {
                        updated.push(todo);
                    }
                }
            }
        }

        tx.commit().map_err(StorageError::from)?;
        debug!(
            action = request.action.as_str(),
            requested = request.ids.len(),
            updated = updated.len(),
            "batch applied"
        );
        Ok(BatchResponse {
            success: true,
            updated,
        })
    }
}
