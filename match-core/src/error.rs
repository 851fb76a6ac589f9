use std::path::PathBuf;
use thiserror::Error;

/// Failures of the version-control accessor. Always fatal for a search.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("cannot open repository at {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("cannot resolve '{rev}'")]
    Resolve {
        rev: String,
        #[source]
        source: git2::Error,
    },

    #[error("checkout of {commit} on branch '{branch}' failed")]
    Checkout {
        branch: String,
        commit: String,
        #[source]
        source: git2::Error,
    },

    #[error("cannot create branch '{name}'")]
    Branch {
        name: String,
        #[source]
        source: git2::Error,
    },

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// The build program itself could not be run. A build that runs and fails is
/// not an error, see [`crate::build::BuildOutcome`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot launch '{program}' in {workdir}")]
    Invocation {
        program: String,
        workdir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o failure on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: malformed record '{record}'")]
    Malformed {
        path: PathBuf,
        line: usize,
        record: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fatal errors of a compatibility search, tagged with the side and commit
/// that was being worked on.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("[{side}] repository failure at {commit}")]
    Repository {
        side: String,
        commit: String,
        #[source]
        source: RepositoryError,
    },

    #[error("[{side}] build could not run at {commit}")]
    Build {
        side: String,
        commit: String,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
