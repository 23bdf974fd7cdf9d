//! Invitation and workflow engine for quizflow.
//!
//! Services here are written against the storage traits in
//! [`quizflow_db::store`] and the [`MailDispatch`] seam, so the same engine
//! runs on `PostgreSQL` or fully in memory.

pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use services::*;
