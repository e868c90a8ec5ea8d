//! # dbdeck
//!
//! One admin surface over MySQL, PostgreSQL, SQLite, MS SQL, Oracle,
//! MongoDB and Elasticsearch.
//!
//! A [`Session`] wraps one live connection. It reads the catalog into
//! backend-neutral [`model`] types, generates dialect-correct SQL for the
//! select and edit screens, and runs SQL scripts statement by statement.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use dbdeck::prelude::*;
//!
//! let mut session = Session::connect(&ConnectOptions::from_url("sqlite::memory:")?)?;
//! session.run_script("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);", &ScriptOptions::default(), &mut ())?;
//! session.insert("t", &[("name".into(), "a".into())])?;
//!
//! let mut rows = session.select(&SelectQuery::new("t").limit(10))?;
//! while let Some(row) = rows.fetch_assoc()? {
//!     println!("{:?}", row.get("name"));
//! }
//! ```
//!
//! ## Backends
//!
//! | Backend       | Client crate | Feature         |
//! |---------------|--------------|-----------------|
//! | MySQL         | `sqlx`       | always          |
//! | PostgreSQL    | `sqlx`       | always          |
//! | SQLite        | `sqlx`       | always          |
//! | MS SQL        | `tiberius`   | `mssql`         |
//! | Oracle        | `oracle`     | `oracle`        |
//! | MongoDB       | `mongodb`    | `mongodb`       |
//! | Elasticsearch | `reqwest`    | `elasticsearch` |

pub mod catalog;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod model;
pub mod query;
pub mod script;
pub mod session;
pub mod value;

pub use error::{Error, Result};
pub use session::{ConnectionState, DatabaseCache, Session};

pub mod prelude {
    pub use crate::codec::Codec;
    pub use crate::config::{ConnectOptions, SslMode, SslOptions};
    pub use crate::cursor::{ColumnMeta, ResultCursor, Row};
    pub use crate::dialect::{Backend, Operator};
    pub use crate::error::*;
    pub use crate::model::*;
    pub use crate::query::{Assignment, Order, Predicate, SelectItem, SelectQuery};
    pub use crate::script::{Report, ScriptObserver, ScriptOptions, StatementOutcome};
    pub use crate::session::{ConnectionState, DatabaseCache, Session};
    pub use crate::value::Value;
}
