//! Prescription lifecycle rules over a versioned key/value ledger.
//!
//! Patient records are stored one per ledger key. [`PrescriptionContract`]
//! exposes the operations; everything it writes goes through a
//! [`LedgerGateway`] session opened by the caller.

pub mod auth;
pub mod clock;
pub mod codec;
pub mod contract;
pub mod error;
pub mod ids;
pub mod interactions;
pub mod ledger;
pub mod lifecycle;
pub mod merger;
pub mod models;
pub mod projections;

pub use auth::{AuthorizationGuard, CallerIdentity, IdentityContext, Role};
pub use clock::{Clock, FixedClock, SystemClock};
pub use contract::PrescriptionContract;
pub use error::{Conflict, EngineError};
pub use ids::{IdSource, SequentialIds, UuidSource};
pub use interactions::InteractionTable;
pub use ledger::{LedgerError, LedgerGateway, LedgerStore, MemoryLedger};
