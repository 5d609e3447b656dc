pub mod config;
pub mod ledger;
pub mod migrations;

pub use config::DbConfig;
pub use ledger::{PgLedger, PgSession};
pub use migrations::run_migrations;
