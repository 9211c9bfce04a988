//! `confgraph`: import, export and inspect configuration graphs.

use clap::{Parser, Subcommand};
use confgraph_core::model::section::SectionConfiguration;
use confgraph_core::tree::AssetMode;
use confgraph_core::{init_logging, init_stderr_logging, ConfigGraph, EngineSettings, ProjectConfiguration};
use log::error;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "confgraph", version, about = "Configuration graph engine")]
struct Cli {
    /// TOML settings file; relative paths inside it resolve against its directory.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Overrides the configured log level.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a root document (and the tree beside it) into a project.
    Import {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        document: PathBuf,
        /// Assign fresh identifiers instead of reconciling with the stored graph.
        #[arg(long)]
        migration: bool,
    },
    /// Render a project's mirror layout into a directory.
    Export {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        out: PathBuf,
        /// Leave the asset subtree of `out` as it is.
        #[arg(long)]
        keep_assets: bool,
    },
    /// Print a project's section tree.
    Tree {
        #[arg(long)]
        project: Uuid,
    },
    /// Import a document into a throwaway graph and print its diagnostics.
    Check {
        #[arg(long)]
        document: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("event=cli module=cli status=error error={err}");
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let settings = load_settings(cli.settings.as_deref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    match &settings.logging.dir {
        Some(dir) => init_logging(&level, &dir.to_string_lossy())?,
        None => init_stderr_logging(&level)?,
    }

    match cli.command {
        Commands::Import {
            project,
            document,
            migration,
        } => {
            let graph = ConfigGraph::open(&settings)?;
            let imports = graph.imports()?;
            let report = imports.import_document(project, &document, imports.options(migration))?;
            println!(
                "imported project {project}: {} sections, {} processes, {} compounds",
                report.configuration.all_sections().len(),
                report.configuration.processes.len(),
                report.configuration.compounds.len()
            );
            print_diagnostics(&report.diagnostics);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export {
            project,
            out,
            keep_assets,
        } => {
            let graph = ConfigGraph::open(&settings)?;
            let assets = if keep_assets { AssetMode::Keep } else { AssetMode::Render };
            let summary = graph.projects()?.export_to(project, &out, assets)?;
            println!(
                "exported project {project} to {}: {} process files, {} assets",
                out.display(),
                summary.process_files,
                summary.asset_files
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tree { project } => {
            let graph = ConfigGraph::open(&settings)?;
            let config = graph.projects()?.configuration(project)?;
            print_tree(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { document } => {
            let graph = ConfigGraph::in_memory()?;
            let imports = graph.imports()?;
            let report = imports.import_document(Uuid::new_v4(), &document, imports.options(false))?;
            print_diagnostics(&report.diagnostics);
            if report.diagnostics.is_empty() {
                println!("ok");
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(EngineSettings::default());
    };
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(EngineSettings::load(path)?.resolved_against(base))
}

fn print_diagnostics(diagnostics: &[String]) {
    for line in diagnostics {
        println!("warning: {line}");
    }
}

fn print_tree(config: &ProjectConfiguration) {
    for section in &config.sections {
        print_section(section, 0);
    }
    let unlinked = config
        .processes
        .iter()
        .filter(|process| process.sections.is_empty() && process.compounds.is_empty())
        .count();
    if unlinked > 0 {
        println!("({unlinked} processes not linked to any section)");
    }
}

fn print_section(section: &SectionConfiguration, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}{} [{}]", section.name, section.place);
    for process in &section.process_refs {
        println!("{indent}  - {}", process.name);
    }
    for compound in &section.compound_refs {
        println!("{indent}  * {}", compound.name);
    }
    for child in &section.sections {
        print_section(child, depth + 1);
    }
}
