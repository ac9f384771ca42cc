//! Pushrelay Hook Orchestration
//!
//! Runs one push transaction end to end:
//! - `ChangesetReader`: extraction seam, keyed by repository model; the
//!   provided implementation shells out to Mercurial
//! - `HookDriver`: the per-push state machine - extract every changeset,
//!   build every message, publish them over one broker session, report an
//!   explicit `HookOutcome`
//! - `fakes`: in-memory reader for driver tests
//!
//! Failure semantics are fail-fast: a push either fully notifies or is
//! reported as failed; messages already delivered are never recalled.

pub mod driver;
pub mod error;
pub mod fakes;
pub mod hg;
pub mod reader;

pub use driver::{DriverConfig, HookDriver, HookOutcome, HookStage};
pub use error::{ExtractError, HookError};
pub use hg::HgChangesetReader;
pub use reader::ChangesetReader;

/// Pushrelay hook layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
