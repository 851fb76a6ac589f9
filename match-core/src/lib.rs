pub mod side;
pub mod error;
pub mod retry;
pub mod repository;
pub mod build;
pub mod compat;
pub mod search;
pub mod store;
pub mod config;
pub mod coverage;

pub use side::{Side, SidePair};
pub use error::{BuildError, ConfigError, RepositoryError, SearchError, StoreError};
pub use repository::{Commit, GitWalker, RevisionWalker};
pub use build::{BuildGate, BuildOptions, BuildOutcome, BuildRequest, Diagnostics, MavenGate};
pub use compat::{CompatibilityMap, MapEntry};
pub use search::{CompatibilitySearch, Phase, SearchContext, Termination, DEFAULT_MAX_FAILURES};
pub use store::{ResultStore, RunId, UNMATCHED};
pub use config::Config;
pub use coverage::{CoverageInput, CoverageReport, Thresholds, Verdict};
