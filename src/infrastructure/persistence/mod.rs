mod mysql_call_repository;
mod mysql_pool;

pub use mysql_call_repository::MySqlCallRepository;
pub use mysql_pool::{create_pool, DatabaseConfig};
