pub mod record;
pub mod reports;
pub mod requests;

pub use record::*;
pub use reports::*;
pub use requests::*;
