//! Tessera Core - Entity Model
//!
//! Values and their casting rules, attribute and schema declarations, the
//! `Entity` model with sparse-retrieval bookkeeping, configuration, and the
//! error taxonomy shared by every other crate.

mod config;
mod entity;
mod error;
mod row;
mod schema;
mod value;

pub use config::*;
pub use entity::*;
pub use error::*;
pub use row::*;
pub use schema::*;
pub use value::*;
