//! Error taxonomy for the schema engine.
//!
//! Each pipeline stage gets its own variant family, all unified under one
//! top-level enum so callers can match on a single `Result` type.

use thiserror::Error;

/// Errors raised before any network I/O is attempted — a malformed
/// connection string, a missing `schema` parameter, or a request to
/// introspect a system schema.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("unsupported protocol scheme '{0}', expected 'postgres' or 'mariadb'")]
    UnsupportedScheme(String),

    #[error("connection url is missing the required 'schema' parameter")]
    MissingSchema,

    #[error("refusing to introspect system schema '{schema}' for {engine}")]
    SystemSchema { engine: &'static str, schema: String },
}

/// Errors raised while establishing or losing the database connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not reach {engine} at {host}:{port}: {source}")]
    Unreachable {
        engine: &'static str,
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    #[error("authentication failed for {engine} at {host}:{port}")]
    AuthFailed { engine: &'static str, host: String, port: u16 },

    #[error("TLS handshake failed for {engine} at {host}:{port}: {source}")]
    TlsFailed {
        engine: &'static str,
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },
}

/// Errors raised while shaping catalog rows into the Schema Model — a
/// missing column, an unparseable index definition, a null where the
/// catalog guarantees non-null.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed catalog row for {entity}: {message}")]
    MalformedRow { entity: String, message: String },

    #[error("foreign key {table}.{constraint}: {message}")]
    ForeignKey {
        table: String,
        constraint: String,
        message: String,
    },

    #[error("index {table}.{index}: could not parse index definition: {message}")]
    IndexDefinition {
        table: String,
        index: String,
        message: String,
    },
}

/// Defensive: raised only for a direction/diff combination the generator
/// cannot render. Not expected on any normal path; defensive only.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("cannot render {what} for {entity}: {message}")]
    Unsatisfiable {
        what: &'static str,
        entity: String,
        message: String,
    },
}

/// The engine's single error type. Every public function in this crate
/// returns `Result<T, EngineError>`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type EngineResult<T> = Result<T, EngineError>;
