// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! dotdb: an embedded, single-file JSON document store.
//!
//! The on-disk representation is a JSON snapshot plus a binary
//! write-ahead log; the in-memory representation is a copy-on-write tree
//! of dynamically typed values addressed by dot paths
//! (`users.alice.email`). Writes serialize through a single lock and
//! journal before they publish; readers load an immutable view without
//! ever blocking on writers. Collections scan, aggregate, and hash-join
//! in parallel via rayon.
//!
//! ```no_run
//! use dotdb::{Database, OpenOptions, Value};
//!
//! # fn main() -> dotdb::Result<()> {
//! let db = Database::open("app.db", OpenOptions::new().wal(true))?;
//! db.set("users.alice.email", "a@x")?;
//! assert_eq!(db.get("users.alice.email"), Some(Value::from("a@x")));
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod index;
mod ops;
pub mod subscribe;
pub mod tx;

pub use config::{Durability, IndexSpec, LockMode, OpenOptions};
pub use engine::{BatchOp, Database, WalStatus};
pub use error::{DbError, Result};
pub use exec::{AggregateOp, Filter, FilterOp};
pub use subscribe::Method;
pub use tx::Transaction;

pub use dotdb_kernel::{DotPath, KernelError, Map, Schema, Value};
