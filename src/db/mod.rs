//! # Database Module
//!
//! A lazy, immutable query builder over any [`Connection`].
//!
//! ```rust
//! # use routescope::db::{BackendError, Connection, DatabaseService, Row};
//! # use serde_json::{json, Value};
//! # struct Fake;
//! # impl Connection for Fake {
//! #     fn query(&self, _: &str, _: &[Value]) -> Result<Vec<Row>, BackendError> {
//! #         Ok(json!({"id": 7}).as_object().into_iter().cloned().collect())
//! #     }
//! #     fn execute(&self, _: &str, _: &[Value]) -> Result<u64, BackendError> { Ok(1) }
//! # }
//! let db = DatabaseService::new(Fake);
//! let users = db.table("users")?;
//!
//! // Building runs nothing.
//! let sixth = users.order_by("id")?.at(5)?;
//! assert_eq!(db.stats().total(), 0);
//!
//! // The first read runs one SELECT ... LIMIT 1 OFFSET 5 and caches it.
//! assert_eq!(sixth.get("id")?, Some(json!(7)));
//! assert_eq!(sixth.field("id")?.value()?, Some(json!(7)));
//! assert_eq!(db.stats().queries(), 2);
//!
//! users.insert([("name", "ann")])?;
//! assert_eq!(db.stats().statements(), 1);
//! # Ok::<(), routescope::db::DbError>(())
//! ```
//!
//! `field` returns a handle on a fresh builder, so its read is a second
//! query. Builders hold an `Rc` and stay on the thread that made them.

mod error;
mod service;
mod table;

pub use error::{BackendError, DbError};
pub use service::{Connection, DatabaseService, QueryStats, Row};
pub use table::{Field, Rows, Table};
