//! Schema introspection, normalization, diffing, and DDL generation for
//! PostgreSQL and MariaDB.
//!
//! The pipeline is four independent stages, each a plain function:
//!
//! ```text
//! (ConnectionRef, Engine) -> SchemaModel -> SchemaModel (normalized)
//!   -> DiffResult -> String (dialect SQL script)
//! ```
//!
//! Nothing here parses a CLI, touches a filesystem, or renders anything —
//! those are the caller's job.

pub mod connection;
pub mod differ;
pub mod error;
pub mod generator;
pub mod loader;
pub mod model;
pub mod normalize;

pub use connection::ConnectionRef;
pub use differ::{compute_diff, DiffResult};
pub use error::{EngineError, EngineResult};
pub use generator::{to_mariadb, to_postgres, Direction, GenOptions};
pub use loader::{load_mariadb, load_postgres};
pub use model::{Engine, SchemaModel};
pub use normalize::{normalize_schema_model, NormalizeOptions};
