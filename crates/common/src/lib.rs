//! Common utilities and shared types for quizflow.
//!
//! This crate provides foundational components used across all quizflow crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Tokens**: Unguessable invitation tokens via [`TokenIssuer`]
//! - **Identity**: The authenticated admin performing an operation
//!
//! # Example
//!
//! ```no_run
//! use quizflow_common::{Config, IdGenerator, TokenIssuer, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id = IdGenerator::new().generate();
//!     let token = TokenIssuer::new().issue();
//!     println!("{id} -> {}", config.frontend.quiz_link(&token));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod identity;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, TokenIssuer};
pub use identity::AdminIdentity;
