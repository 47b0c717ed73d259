//! The `inspect` command: parse and plan, no execution

use anyhow::bail;
use automock_core::import::{detect_dialect, parse_collection, Dialect};
use automock_core::run::plan;
use clap::Args;
use console::style;
use std::path::PathBuf;

/// CLI arguments for the inspect command
#[derive(Args)]
pub struct InspectArgs {
    /// Collection file to inspect
    #[arg(short, long)]
    pub input: PathBuf,

    /// Collection dialect (postman, bruno, insomnia); detected from the
    /// file when omitted
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Print the execution plan for a collection.
pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&args.input)?;
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

    let collection = parse_collection(&content, dialect)?;
    for warning in &collection.warnings {
        eprintln!("{} {warning}", style("!").yellow().bold());
    }

    println!(
        "{} ({} dialect, {} request(s))",
        style(&collection.name).bold(),
        dialect,
        collection.requests.len()
    );
    if !collection.seed_variables.is_empty() {
        let names: Vec<&str> = collection
            .seed_variables
            .keys()
            .map(String::as_str)
            .collect();
        println!("seed variables: {}", names.join(", "));
    }

    for (index, node) in plan(collection.requests).iter().enumerate() {
        println!(
            "{:>3}. {} {} {}",
            index + 1,
            style(&node.request.method).cyan(),
            node.request.url,
            style(&node.request.name).dim()
        );
        if !node.referenced.is_empty() {
            let names: Vec<&str> = node.referenced.iter().map(String::as_str).collect();
            println!("     needs: {}", names.join(", "));
        }
        if !node.pre_assigned.is_empty() {
            let names: Vec<&str> = node.pre_assigned.iter().map(String::as_str).collect();
            println!("     pre-script assigns: {}", names.join(", "));
        }
        let mut scripts = Vec::new();
        if node.request.pre_script.is_some() {
            scripts.push("pre");
        }
        if node.request.post_script.is_some() {
            scripts.push("post");
        }
        if !scripts.is_empty() {
            println!("     scripts: {}", scripts.join(", "));
        }
    }
    Ok(())
}
