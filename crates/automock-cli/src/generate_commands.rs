//! The `generate` command: parse, execute, detect, build, persist

use crate::progress::Progress;
use crate::prompts::TerminalPrompter;
use crate::store::DirStore;
use anyhow::{bail, Context};
use automock_core::expectation::{self, BuildOptions, MatchType};
use automock_core::import::{
    detect_dialect, environment::import_environment, parse_collection, Dialect,
};
use automock_core::run::CollectionRunner;
use automock_core::storage::ConfigStore;
use automock_core::{config, scenario};
use clap::Args;
use std::path::PathBuf;

/// CLI arguments for the generate command
#[derive(Args)]
pub struct GenerateArgs {
    /// Collection file to ingest
    #[arg(short, long)]
    pub input: PathBuf,

    /// Collection dialect (postman, bruno, insomnia); detected from the
    /// file when omitted
    #[arg(short, long)]
    pub format: Option<String>,

    /// Project identifier the configuration is stored under
    #[arg(short, long)]
    pub project: String,

    /// Directory the configuration store writes to
    #[arg(short, long, default_value = "./automock-data")]
    pub output: PathBuf,

    /// Seed variables as KEY=VALUE (repeatable, highest precedence)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Postman environment file seeding the run scope
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Never prompt: skip failing nodes and keep going
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Convert identifier-looking path segments to regexes
    #[arg(long)]
    pub regex_paths: bool,

    /// Match GraphQL bodies exactly instead of by matching fields
    #[arg(long)]
    pub graphql_strict: bool,

    /// Attach recorded response times as mock delays
    #[arg(long)]
    pub include_delay: bool,

    /// Limit how often each expectation matches
    #[arg(long)]
    pub times: Option<i64>,

    /// Configuration description (defaults to the collection name)
    #[arg(long)]
    pub description: Option<String>,
}

/// Run the generate pipeline end to end.
pub async fn run(args: GenerateArgs) -> anyhow::Result<()> {
    let progress = Progress::new(5);

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let dialect = match &args.format {
        Some(tag) => tag.parse::<Dialect>()?,
        None => match detect_dialect(&content, Some(&args.input)) {
            Some(dialect) => dialect,
            None => bail!(
                "could not detect the collection dialect of {}; pass --format",
                args.input.display()
            ),
        },
    };

    progress.step(1, &format!("Parsing {} collection", dialect));
    let collection = parse_collection(&content, dialect)?;
    for warning in &collection.warnings {
        progress.warn(warning);
    }
    println!(
        "    {} request(s) in '{}'",
        collection.requests.len(),
        collection.name
    );

    let mut seed = collection.seed_variables.clone();
    if let Some(path) = &args.env_file {
        let env_content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let imported = import_environment(&env_content)?;
        println!(
            "    seeded {} variable(s) from environment '{}'",
            imported.variables.len(),
            imported.name
        );
        seed.extend(imported.variables);
    }
    for pair in &args.env {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--env takes KEY=VALUE, got '{pair}'");
        };
        seed.insert(key.to_string(), value.to_string());
    }

    progress.step(2, "Executing requests against the real endpoints");
    let runner = CollectionRunner::new(TerminalPrompter::new(args.yes))?;
    let mut report = runner.run(collection.requests, seed).await?;
    if report.aborted {
        bail!("run abandoned by operator; no configuration was serialised");
    }
    println!(
        "    {} executed, {} skipped",
        report.executed, report.skipped
    );

    progress.step(3, "Detecting behavioural scenarios");
    let analysis = scenario::detect(&mut report.nodes);
    println!(
        "    {} scenario group(s) across {} endpoint(s)",
        analysis.scenario_count(),
        analysis.endpoint_count()
    );

    progress.step(4, "Building expectations");
    let options = BuildOptions {
        regex_paths: args.regex_paths,
        graphql_match: if args.graphql_strict {
            MatchType::Strict
        } else {
            MatchType::OnlyMatchingFields
        },
        include_delay: args.include_delay,
        times: args.times,
    };
    let stamp = config::next_version_stamp();
    let expectations = expectation::build(&report.nodes, &analysis, &options, dialect, stamp);
    let description = args
        .description
        .clone()
        .unwrap_or_else(|| collection.name.clone());
    let configuration = config::build_configuration(
        &args.project,
        &description,
        dialect,
        &analysis,
        expectations,
        stamp,
    );

    progress.step(5, "Saving configuration");
    let store = DirStore::new(&args.output);
    store.save_config(&args.project, &configuration).await?;

    progress.done(&format!(
        "{} expectation(s) saved for project '{}' as {} under {}",
        configuration.expectations.len(),
        args.project,
        configuration.metadata.version,
        args.output.display()
    ));
    Ok(())
}
