use crate::error::RepositoryError;
use crate::retry;
use git2::{build::CheckoutBuilder, BranchType, ErrorCode, Oid, Repository as Git2Repository, Sort};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A commit as read from history. Immutable; the search only passes these
/// around and compares ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub summary: String,
    pub author: String,
    pub timestamp: i64,
}

impl Commit {
    /// Abbreviated id for logs and file names
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Commit date formatted for humans, empty when the timestamp is invalid
    pub fn date(&self) -> String {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    }
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Linear, first-parent view of one repository plus the few working tree
/// operations the compatibility search needs.
pub trait RevisionWalker {
    /// Working tree the build runs in
    fn workdir(&self) -> &Path;

    /// Commit at the tip of the currently checked out branch
    fn head_commit(&self) -> Result<Commit, RepositoryError>;

    /// Resolve any revision expression (id, branch, tag) to a commit
    fn resolve(&self, rev: &str) -> Result<Commit, RepositoryError>;

    /// Mainline parent, `None` for a root commit
    fn first_parent(&self, commit: &Commit) -> Result<Option<Commit>, RepositoryError>;

    /// Force the working tree to `commit` and point `branch` at it
    fn checkout(&self, branch: &str, commit: &Commit) -> Result<(), RepositoryError>;

    /// Delete `branch` if it exists, recreate it at `commit` and check it out
    fn create_branch(&self, branch: &str, commit: &Commit) -> Result<(), RepositoryError>;

    /// First-parent history starting at `start`, newest first. `max == 0`
    /// walks to the root.
    fn commits(&self, start: &Commit, max: usize) -> Result<Vec<Commit>, RepositoryError> {
        let mut commits = vec![start.clone()];
        while max == 0 || commits.len() < max {
            let last = &commits[commits.len() - 1];
            match self.first_parent(last)? {
                Some(parent) => commits.push(parent),
                None => break,
            }
        }
        Ok(commits)
    }
}

const CHECKOUT_ATTEMPTS: u32 = 3;
const CHECKOUT_BACKOFF: Duration = Duration::from_millis(250);

/// [`RevisionWalker`] over an on-disk git repository
pub struct GitWalker {
    path: PathBuf,
    git_repo: Git2Repository,
}

impl GitWalker {
    /// Open an existing repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let git_repo = Git2Repository::open(&path).map_err(|source| RepositoryError::Open {
            path: path.clone(),
            source,
        })?;

        // Builds run in the working tree, not in .git
        let path = git_repo.workdir().map(Path::to_path_buf).unwrap_or(path);

        Ok(GitWalker { path, git_repo })
    }

    fn find_commit(&self, id: &str) -> Result<git2::Commit<'_>, RepositoryError> {
        let resolve = |source| RepositoryError::Resolve { rev: id.to_string(), source };
        let oid = Oid::from_str(id).map_err(resolve)?;
        self.git_repo.find_commit(oid).map_err(resolve)
    }

    fn to_commit(commit: &git2::Commit) -> Commit {
        Commit {
            id: commit.id().to_string(),
            summary: commit.summary().unwrap_or("").to_string(),
            author: commit.author().name().unwrap_or("").to_string(),
            timestamp: commit.time().seconds(),
        }
    }

    /// Force checkout of `oid` and move `refs/heads/<branch>` there. The
    /// reference is written directly because libgit2 refuses to force-update
    /// the branch HEAD points at through the branch API.
    fn force_checkout(&self, branch: &str, oid: Oid) -> Result<(), git2::Error> {
        let object = self.git_repo.find_object(oid, Some(git2::ObjectType::Commit))?;
        self.git_repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;

        let refname = format!("refs/heads/{}", branch);
        self.git_repo.reference(&refname, oid, true, "qa-match: checkout")?;
        self.git_repo.set_head(&refname)?;
        Ok(())
    }
}

impl RevisionWalker for GitWalker {
    fn workdir(&self) -> &Path {
        &self.path
    }

    fn head_commit(&self) -> Result<Commit, RepositoryError> {
        let head = self
            .git_repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|source| RepositoryError::Resolve { rev: "HEAD".to_string(), source })?;
        Ok(Self::to_commit(&head))
    }

    fn resolve(&self, rev: &str) -> Result<Commit, RepositoryError> {
        let commit = self
            .git_repo
            .revparse_single(rev)
            .and_then(|object| object.peel_to_commit())
            .map_err(|source| RepositoryError::Resolve { rev: rev.to_string(), source })?;
        Ok(Self::to_commit(&commit))
    }

    fn first_parent(&self, commit: &Commit) -> Result<Option<Commit>, RepositoryError> {
        let commit = self.find_commit(&commit.id)?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        let parent = commit.parent(0)?;
        Ok(Some(Self::to_commit(&parent)))
    }

    fn checkout(&self, branch: &str, commit: &Commit) -> Result<(), RepositoryError> {
        let oid = self.find_commit(&commit.id)?.id();
        debug!("checkout {} -> {} in {}", branch, commit.short_id(), self.path.display());

        retry::with_backoff(
            CHECKOUT_ATTEMPTS,
            CHECKOUT_BACKOFF,
            || self.force_checkout(branch, oid),
            |err| err.code() == ErrorCode::Locked,
        )
        .map_err(|source| RepositoryError::Checkout {
            branch: branch.to_string(),
            commit: commit.id.clone(),
            source,
        })
    }

    fn create_branch(&self, branch: &str, commit: &Commit) -> Result<(), RepositoryError> {
        let target = self.find_commit(&commit.id)?;
        let branch_error = |source| RepositoryError::Branch { name: branch.to_string(), source };

        if let Ok(mut existing) = self.git_repo.find_branch(branch, BranchType::Local) {
            // A checked out branch cannot be deleted, step off it first
            if existing.is_head() {
                self.git_repo.set_head_detached(target.id()).map_err(branch_error)?;
            }
            existing.delete().map_err(branch_error)?;
            debug!("deleted existing branch {}", branch);
        }

        self.git_repo.branch(branch, &target, false).map_err(branch_error)?;
        self.checkout(branch, commit)
    }

    fn commits(&self, start: &Commit, max: usize) -> Result<Vec<Commit>, RepositoryError> {
        let start = self.find_commit(&start.id)?;

        let mut revwalk = self.git_repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL)?;
        revwalk.simplify_first_parent()?;
        revwalk.push(start.id())?;

        let mut commits = Vec::new();
        for oid in revwalk {
            if max > 0 && commits.len() >= max {
                break;
            }
            let commit = self.git_repo.find_commit(oid?)?;
            commits.push(Self::to_commit(&commit));
        }

        Ok(commits)
    }
}
