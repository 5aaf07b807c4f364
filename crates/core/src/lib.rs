pub mod backend;
pub mod clock;
pub mod error;
pub mod ids;
pub mod query;
pub mod todo;
pub mod validation;

pub use backend::{BatchAction, BatchRequest, BatchResponse, DeleteResponse, TodoBackend};
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use error::{BackendError, CoreError};
pub use ids::*;
pub use query::{ListQuery, SortBy, StatusFilter, TodoPage};
pub use todo::{NewTodo, Priority, Todo, TodoPatch};
