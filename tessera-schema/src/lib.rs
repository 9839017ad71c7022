//! Tessera Schema - Declared Schema Synchronization
//!
//! Compares an [`EntitySchema`](tessera_core::EntitySchema) against the live
//! table reported by a [`RelationalExecutor`](tessera_storage::RelationalExecutor)
//! and produces an ordered plan of structural operations: renames, adds,
//! alters, drops. This is structural reconciliation, not data migration.

pub mod operation;
pub mod synchronizer;

pub use operation::{AlterFacet, SchemaOperation, SyncPlan};
pub use synchronizer::{changed_facets, diff, SchemaSynchronizer};
