//! dotdb-kernel: the in-memory half of dotdb.
//!
//! A dynamically typed JSON value tree addressed by dot paths, with
//! copy-on-write mutation, deep equality, and prefix-keyed schema
//! validation. Everything here is pure: no files, no locks, no logging.

pub mod error;
pub mod path;
pub mod schema;
pub mod tree;
pub mod value;

pub use error::{KernelError, Result};
pub use path::DotPath;
pub use schema::Schema;
pub use value::{Map, Value};
