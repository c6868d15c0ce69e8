// Narrow query-execution interface over the database transport.
pub mod backend;
pub mod mysql;

pub use backend::{BackendRow, Backends, CellValue, QueryBackend, QueryOutput, TabularResult};
pub use mysql::MySqlBackend;
