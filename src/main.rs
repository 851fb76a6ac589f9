use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use match_core::{
    store, BuildGate, BuildOptions, BuildRequest, CompatibilityMap, CompatibilitySearch, Config,
    CoverageInput, CoverageReport, GitWalker, MavenGate, ResultStore, RevisionWalker, SearchContext, Side,
    SidePair, Termination, Thresholds,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "qa-match")]
#[command(about = "QA tools for the open-source / enterprise repository pair", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./qa-match.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Show build diagnostics and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find commit pairs of both repositories that build together
    Match {
        /// Number of pairs to find, below 1 searches the whole history
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        limit: i64,
        /// Start side A here instead of at its branch head
        #[arg(long = "startCommit")]
        start_commit: Option<String>,
        /// Consecutive side B failures before a side A commit is given up
        #[arg(long = "maxFailures")]
        max_failures: Option<usize>,
        /// Directory for the result files
        #[arg(long = "outputDir")]
        output_dir: Option<PathBuf>,
        /// Only print the commits that would be visited
        #[arg(long)]
        dry: bool,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Build the current HEAD of one side
    Build {
        /// Build the enterprise (side B) repository
        #[arg(long)]
        ee: bool,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Reconcile result files of several runs into one
    Merge {
        /// Result files of the same direction
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Where to write the merged records
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Report coverage verdicts for the files of a pull request
    Coverage {
        /// JSON file with the changed files and their metrics
        #[arg(short, long)]
        input: PathBuf,
        /// Minimum coverage in percent
        #[arg(long = "minCoverage")]
        min_coverage: Option<f64>,
    },
}

/// Options handed to the build program
#[derive(Args)]
struct BuildArgs {
    #[arg(long = "mavenProfile")]
    maven_profile: Option<String>,
    #[arg(long = "testModule")]
    test_module: Option<String>,
    #[arg(long = "testClass")]
    test_class: Option<String>,
    #[arg(long = "testMethod")]
    test_method: Option<String>,
}

impl BuildArgs {
    fn apply(self, mut options: BuildOptions) -> BuildOptions {
        options.profile = self.maven_profile.or(options.profile);
        options.test_module = self.test_module.or(options.test_module);
        options.test_class = self.test_class.or(options.test_class);
        options.test_method = self.test_method.or(options.test_method);
        options
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Match { limit, start_commit, max_failures, output_dir, dry, build } => {
            let options = build.apply(config.build.options.clone());
            let walkers = SidePair::new(
                GitWalker::open(&config.side_a.path)?,
                GitWalker::open(&config.side_b.path)?,
            );

            if dry {
                print_plan(&config, &walkers, start_commit.as_deref(), limit)?;
                return Ok(ExitCode::SUCCESS);
            }

            let ctx = SearchContext::new(
                SidePair::new(config.side_a.label.clone(), config.side_b.label.clone()),
                SidePair::new(config.side_a.branch.clone(), config.side_b.branch.clone()),
            )
            .with_limit(limit)
            .with_max_failures(max_failures.unwrap_or(config.search.max_failures))
            .with_verbose(cli.verbose);

            let gate = maven_gate(&config, options);
            let mut search = CompatibilitySearch::init(walkers, gate, ctx, start_commit.as_deref())?;

            let store = ResultStore::new(output_dir.unwrap_or_else(|| config.search.output_dir.clone()));
            let termination = search
                .run_and_persist(&store)
                .with_context(|| format!("search stopped after {} pairs", search.pairs_found()))?;
            print_summary(&search, termination);
        }
        Commands::Build { ee, build } => {
            let side = if ee { Side::B } else { Side::A };
            let side_config = config.side(side);
            let walker = GitWalker::open(&side_config.path)?;
            let head = walker.head_commit()?;

            let mut gate = maven_gate(&config, build.apply(config.build.options.clone()));
            info!("[{}] building {} {}", side_config.label, head.short_id(), head.summary);
            let outcome = gate
                .build(BuildRequest { side, workdir: walker.workdir(), commit: &head })
                .with_context(|| format!("[{}] build could not run", side_config.label))?;

            let diagnostics = outcome.diagnostics();
            if outcome.success {
                println!("[{}] {}: build ok", side_config.label, head.short_id());
            } else {
                println!("[{}] {}: build FAILED ({})", side_config.label, head.short_id(), diagnostics.report());
                if cli.verbose {
                    for line in &outcome.output {
                        println!("{}", line);
                    }
                }
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Merge { files, output } => {
            let maps = files
                .iter()
                .map(|path| store::load(path))
                .collect::<Result<Vec<CompatibilityMap>, _>>()?;
            let merged = CompatibilityMap::reconcile(&maps);
            store::write_map(&merged, &output)?;
            println!(
                "Merged {} files into {}: {} records, {} matched",
                files.len(),
                output.display(),
                merged.len(),
                merged.matched_count()
            );
        }
        Commands::Coverage { input, min_coverage } => {
            let input = CoverageInput::load(&input)?;
            let mut thresholds = Thresholds::default();
            if let Some(min) = min_coverage {
                thresholds.min_coverage = min;
            }

            let report = CoverageReport::build(&input, &thresholds);
            print!("{}", report.render());
            if !report.passed() {
                return Ok(ExitCode::FAILURE);
            }
            info!("{} files checked against {:.1}%", report.files.len(), thresholds.min_coverage);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn maven_gate(config: &Config, options: BuildOptions) -> MavenGate {
    MavenGate::new(config.build.program.clone(), options)
        .with_side_profile(Side::A, config.side_a.profile.clone())
        .with_side_profile(Side::B, config.side_b.profile.clone())
}

/// Print the first-parent sequence each side would walk
fn print_plan(config: &Config, walkers: &SidePair<GitWalker>, start: Option<&str>, limit: i64) -> Result<()> {
    let max = usize::try_from(limit).unwrap_or(0);

    for side in [Side::A, Side::B] {
        let walker = &walkers[side];
        let label = &config.side(side).label;
        let first = match (side, start) {
            (Side::A, Some(rev)) => walker.resolve(rev)?,
            _ => walker.head_commit()?,
        };

        let commits = walker.commits(&first, max)?;
        println!("{} ({}): {} commits", label, walker.workdir().display(), commits.len());
        for commit in commits {
            println!("  {} {} {:<20} {}", commit.short_id(), commit.date(), commit.author, commit.summary);
        }
    }
    Ok(())
}

fn print_summary<W: RevisionWalker, G: BuildGate>(search: &CompatibilitySearch<W, G>, termination: Termination) {
    let ctx = search.context();
    let reason = match termination {
        Termination::LimitReached => "limit reached".to_string(),
        Termination::HistoryExhausted(side) => format!("{} history exhausted", ctx.labels[side]),
    };

    println!("Search finished: {}", reason);
    println!("  pairs found: {}", search.pairs_found());
    println!(
        "  builds: {} {}, {} {}",
        ctx.builds.a, ctx.labels.a, ctx.builds.b, ctx.labels.b
    );
    println!(
        "  {} commits without partner: {}",
        ctx.labels.a,
        search.forward_map().len() - search.forward_map().matched_count()
    );
}
