//! Data-access layer for the ticket gateway.
//!
//! Every call opens its own connection with the sqlx driver named by the URL
//! scheme (sqlite, mysql or postgres), runs exactly one statement and closes
//! the connection again, on success and on failure alike. Rows come back as JSON-ready
//! [`DecodedRecord`]s produced by the [`codec`] module.

pub mod codec;
pub mod error;
pub mod executor;

pub use codec::{DecodedRecord, RawValue, RowSet, SIGNATURE_COLUMN};
pub use error::DataAccessError;
pub use executor::{QueryExecutor, SqlExecutor, SqlParam};
