use crate::build::{BuildGate, BuildRequest};
use crate::compat::CompatibilityMap;
use crate::error::{RepositoryError, SearchError};
use crate::repository::{Commit, RevisionWalker};
use crate::side::{Side, SidePair};
use crate::store::{ResultStore, RunId};
use std::mem;
use tracing::{debug, error, info, warn};

/// Consecutive side B failures tolerated while looking for a partner of one
/// side A commit
pub const DEFAULT_MAX_FAILURES: usize = 10;

/// Per-run settings and counters, threaded through the search instead of
/// living in globals
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub labels: SidePair<String>,
    pub branches: SidePair<String>,
    /// Target number of pairs, 0 for "until history runs out"
    pub limit: usize,
    pub max_failures: usize,
    pub verbose: bool,
    pub builds: SidePair<usize>,
}

impl SearchContext {
    pub fn new(labels: SidePair<String>, branches: SidePair<String>) -> Self {
        SearchContext {
            labels,
            branches,
            limit: 0,
            max_failures: DEFAULT_MAX_FAILURES,
            verbose: false,
            builds: SidePair::default(),
        }
    }

    /// Any value below 1 means unbounded
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = usize::try_from(limit).unwrap_or(0);
        self
    }

    pub fn with_max_failures(mut self, max_failures: usize) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Why a search run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    LimitReached,
    HistoryExhausted(Side),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ForwardA,
    ForwardB,
    BackwardB,
    Done,
}

/// Walks the first-parent histories of two repositories in lockstep and
/// records which commit pairs build together.
pub struct CompatibilitySearch<W, G> {
    walkers: SidePair<W>,
    gate: G,
    ctx: SearchContext,
    cursors: SidePair<Commit>,
    /// Last side A commit that built in ForwardA, the partner BackwardB
    /// retries against
    last_built_a: Option<Commit>,
    start: SidePair<String>,
    forward: CompatibilityMap,
    reverse: CompatibilityMap,
    failures: Vec<Commit>,
    pairs: usize,
    phase: Phase,
}

fn repository_error(label: &str, commit: &Commit) -> impl FnOnce(RepositoryError) -> SearchError {
    let side = label.to_string();
    let commit = commit.id.clone();
    move |source| SearchError::Repository { side, commit, source }
}

impl<W: RevisionWalker, G: BuildGate> CompatibilitySearch<W, G> {
    /// Position both cursors at their branch heads (or `start_a` for side
    /// A) and create the working branches there.
    pub fn init(
        walkers: SidePair<W>,
        gate: G,
        ctx: SearchContext,
        start_a: Option<&str>,
    ) -> Result<Self, SearchError> {
        let head_a = Self::prepare_side(&walkers, &ctx, Side::A, start_a)?;
        let head_b = Self::prepare_side(&walkers, &ctx, Side::B, None)?;

        let start = SidePair::new(head_a.id.clone(), head_b.id.clone());
        let cursors = SidePair::new(head_a, head_b);

        Ok(CompatibilitySearch {
            walkers,
            gate,
            ctx,
            cursors,
            last_built_a: None,
            start,
            forward: CompatibilityMap::new(),
            reverse: CompatibilityMap::new(),
            failures: Vec::new(),
            pairs: 0,
            phase: Phase::ForwardA,
        })
    }

    fn prepare_side(
        walkers: &SidePair<W>,
        ctx: &SearchContext,
        side: Side,
        start: Option<&str>,
    ) -> Result<Commit, SearchError> {
        let label = &ctx.labels[side];
        let walker = &walkers[side];
        let head = match start {
            Some(rev) => walker.resolve(rev),
            None => walker.head_commit(),
        }
        .map_err(|source| SearchError::Repository {
            side: label.clone(),
            commit: start.unwrap_or("HEAD").to_string(),
            source,
        })?;

        walker
            .create_branch(&ctx.branches[side], &head)
            .map_err(repository_error(label, &head))?;
        info!("[{}] starting at {} {}", label, head.short_id(), head.summary);
        Ok(head)
    }

    /// Search until `limit` pairs are recorded or a side runs out of
    /// history. On error the maps keep whatever was found so far.
    pub fn run(&mut self) -> Result<Termination, SearchError> {
        let termination = loop {
            if self.limit_reached() {
                break Termination::LimitReached;
            }
            if let Some(termination) = self.forward_a()? {
                break termination;
            }
        };

        self.phase = Phase::Done;
        info!(
            "search finished ({:?}): {} pairs, {} {} builds, {} {} builds",
            termination,
            self.pairs,
            self.ctx.builds.a,
            self.ctx.labels.a,
            self.ctx.builds.b,
            self.ctx.labels.b,
        );
        Ok(termination)
    }

    /// [`run`](Self::run), then write both maps to `store` whether the search
    /// finished or failed. A search error is returned in preference to a
    /// store error.
    pub fn run_and_persist(&mut self, store: &ResultStore) -> Result<Termination, SearchError> {
        let outcome = self.run();

        let run = self.run_id();
        let forward = store.persist(&self.forward, &run, false);
        let reverse = store.persist(&self.reverse, &run, true);
        let persisted = forward.and(reverse);

        match (outcome, persisted) {
            (Ok(termination), Ok(_)) => Ok(termination),
            (Ok(_), Err(store_err)) => Err(store_err.into()),
            (Err(err), Ok(_)) => {
                warn!("search aborted after {} pairs, partial results saved", self.pairs);
                Err(err)
            }
            (Err(err), Err(store_err)) => {
                error!(error = ?store_err, "partial results were not saved");
                Err(err)
            }
        }
    }

    /// Map keyed by side A commits
    pub fn forward_map(&self) -> &CompatibilityMap {
        &self.forward
    }

    /// Map keyed by side B commits
    pub fn reverse_map(&self) -> &CompatibilityMap {
        &self.reverse
    }

    pub fn pairs_found(&self) -> usize {
        self.pairs
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    pub fn walker(&self, side: Side) -> &W {
        &self.walkers[side]
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn run_id(&self) -> RunId {
        RunId { labels: self.ctx.labels.clone(), start: self.start.clone() }
    }

    fn limit_reached(&self) -> bool {
        self.ctx.limit > 0 && self.pairs >= self.ctx.limit
    }

    /// One step on side A: skip it if it does not build, pair it with the
    /// current side B commit if that builds, otherwise look for a partner
    /// further down side B.
    fn forward_a(&mut self) -> Result<Option<Termination>, SearchError> {
        self.phase = Phase::ForwardA;
        let anchor = self.cursors.a.clone();

        if !self.build(Side::A)? {
            return self.advance_or_stop(Side::A);
        }

        if self.build(Side::B)? {
            let partner = self.cursors.b.clone();
            self.record_pair(&anchor, &partner);
        } else if let Some(termination) = self.forward_b(&anchor)? {
            return Ok(Some(termination));
        }

        self.last_built_a = Some(anchor);
        if self.limit_reached() {
            return Ok(Some(Termination::LimitReached));
        }
        self.advance_or_stop(Side::A)
    }

    /// Walk side B back from its cursor until a commit builds against
    /// `anchor`. Too many failures in a row leave `anchor` unmatched and put
    /// the side B cursor back where it was.
    fn forward_b(&mut self, anchor: &Commit) -> Result<Option<Termination>, SearchError> {
        self.phase = Phase::ForwardB;
        let last_b = self.cursors.b.clone();
        self.failures.clear();
        debug!("[{}] looking for a partner of {}", self.ctx.labels.b, anchor.short_id());

        let termination = loop {
            if self.limit_reached() {
                break Termination::LimitReached;
            }
            if !self.advance(Side::B)? {
                break Termination::HistoryExhausted(Side::B);
            }

            let candidate = self.cursors.b.clone();
            if self.build(Side::B)? {
                self.record_pair(anchor, &candidate);
                self.failures.clear();
                return Ok(None);
            }

            self.failures.push(candidate);
            if self.failures.len() >= self.ctx.max_failures {
                warn!(
                    "[{}] {} consecutive failures, no partner for {} {}",
                    self.ctx.labels.b,
                    self.failures.len(),
                    self.ctx.labels.a,
                    anchor.short_id(),
                );
                self.forward.mark_unmatched(&anchor.id);
                self.reset_cursor(Side::B, last_b)?;
                self.failures.clear();
                return Ok(None);
            }
        };

        // Running out of side B history counts as hitting the threshold
        if matches!(termination, Termination::HistoryExhausted(_)) {
            self.forward.mark_unmatched(&anchor.id);
        }
        if !self.failures.is_empty() {
            self.backward_b()?;
        }
        Ok(Some(termination))
    }

    /// Retry the buffered side B failures against the last side A commit that
    /// built, whether or not it found a partner. The first failure marks it
    /// and everything after it as unmatched.
    fn backward_b(&mut self) -> Result<(), SearchError> {
        self.phase = Phase::BackwardB;
        let current_a = self.cursors.a.clone();
        let last_a = self.last_built_a.clone().unwrap_or_else(|| current_a.clone());
        let buffered = mem::take(&mut self.failures);
        info!(
            "[{}] retrying {} failed commits against {} {}",
            self.ctx.labels.b,
            buffered.len(),
            self.ctx.labels.a,
            last_a.short_id(),
        );

        // Rebuild side A so side B builds against it
        self.checkout(Side::A, &last_a)?;
        let a_builds = self.build_commit(Side::A, &last_a)?;

        let mut remaining = buffered.into_iter();
        while let Some(candidate) = remaining.next() {
            if self.limit_reached() {
                break;
            }
            self.checkout(Side::B, &candidate)?;
            if a_builds && self.build_commit(Side::B, &candidate)? {
                self.record_pair(&last_a, &candidate);
                continue;
            }

            self.reverse.mark_unmatched(&candidate.id);
            for rest in remaining.by_ref() {
                self.reverse.mark_unmatched(&rest.id);
            }
            break;
        }

        self.checkout(Side::A, &current_a)?;
        let current_b = self.cursors.b.clone();
        self.checkout(Side::B, &current_b)
    }

    fn record_pair(&mut self, a: &Commit, b: &Commit) {
        let forward = self.forward.insert(&a.id, Some(&b.id));
        let reverse = self.reverse.insert(&b.id, Some(&a.id));
        if forward || reverse {
            self.pairs += 1;
            info!(
                "pair #{}: {} {} <-> {} {}",
                self.pairs,
                self.ctx.labels.a,
                a.short_id(),
                self.ctx.labels.b,
                b.short_id(),
            );
        } else {
            debug!("pair {} <-> {} already known", a.short_id(), b.short_id());
        }
    }

    fn build(&mut self, side: Side) -> Result<bool, SearchError> {
        let commit = self.cursors[side].clone();
        self.build_commit(side, &commit)
    }

    fn build_commit(&mut self, side: Side, commit: &Commit) -> Result<bool, SearchError> {
        self.ctx.builds[side] += 1;
        let label = &self.ctx.labels[side];

        let outcome = self
            .gate
            .build(BuildRequest { side, workdir: self.walkers[side].workdir(), commit })
            .map_err(|source| SearchError::Build { side: label.clone(), commit: commit.id.clone(), source })?;

        info!(
            "[{}] build #{} {} {}: {}",
            label,
            self.ctx.builds[side],
            commit.short_id(),
            commit.summary,
            if outcome.success { "ok" } else { "FAILED" },
        );
        if !outcome.success {
            let diagnostics = outcome.diagnostics();
            if self.ctx.verbose {
                warn!("[{}] {}: {}", label, commit.short_id(), diagnostics.report());
            } else {
                debug!("[{}] {}: {}", label, commit.short_id(), diagnostics.summary());
            }
        }
        Ok(outcome.success)
    }

    /// Move `side` one commit back in history. Returns false at a root.
    fn advance(&mut self, side: Side) -> Result<bool, SearchError> {
        let current = &self.cursors[side];
        let parent = self.walkers[side]
            .first_parent(current)
            .map_err(repository_error(&self.ctx.labels[side], current))?;

        match parent {
            Some(parent) => {
                self.checkout(side, &parent)?;
                self.cursors[side] = parent;
                Ok(true)
            }
            None => {
                info!("[{}] history exhausted at {}", self.ctx.labels[side], current.short_id());
                Ok(false)
            }
        }
    }

    fn advance_or_stop(&mut self, side: Side) -> Result<Option<Termination>, SearchError> {
        if self.advance(side)? {
            Ok(None)
        } else {
            Ok(Some(Termination::HistoryExhausted(side)))
        }
    }

    fn reset_cursor(&mut self, side: Side, commit: Commit) -> Result<(), SearchError> {
        self.checkout(side, &commit)?;
        self.cursors[side] = commit;
        Ok(())
    }

    fn checkout(&self, side: Side, commit: &Commit) -> Result<(), SearchError> {
        self.walkers[side]
            .checkout(&self.ctx.branches[side], commit)
            .map_err(repository_error(&self.ctx.labels[side], commit))
    }
}
