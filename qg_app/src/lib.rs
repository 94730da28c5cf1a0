//! # qg_app
//!
//! Wiring for applications that call rate-limited model providers

pub mod cli;
pub mod clock;
pub mod config_loader;
pub mod error;
pub mod guard;
pub mod tracing_setup;

pub use clock::TokioClock;
pub use error::AppError;
pub use error::Result;
pub use guard::GuardError;
pub use guard::GuardStats;
pub use guard::ProviderGuard;
pub use guard::ProviderOutcome;
