//! prepcache Core - Shared abstractions for the statement cache
//!
//! This crate provides the fundamental traits and types that the cache
//! and its collaborators depend on. It defines:
//!
//! - `Statement` - Trait for prepared/callable statement objects
//! - `StatementHandle` - Identity-compared shared handle to a statement
//! - `ConnectionRef` - Identity-compared reference to a physical connection
//! - `TaskRunner` - Trait for executing blocking work off the caller thread
//! - `CacheError` - The error taxonomy shared by every crate

mod connection;
mod error;
pub mod runner;
mod statement;

pub use connection::*;
pub use error::*;
pub use runner::{Task, TaskRunner};
pub use statement::*;
