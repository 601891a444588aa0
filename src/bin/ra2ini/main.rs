//! ra2ini CLI tool
//!
//! Command-line interface over ra2-ini-core.
//!
//! ## Commands
//!
//! - `index <dir>`: index a mod directory and print a summary
//! - `check <file>`: diagnostics for one file, with cross-file checks against its directory
//! - `infer <dir> <section>...`: inferred type of each section
//! - `refs <dir> <section>`: definitions of and references to a section
//! - `register <file>`: sections not listed in any registration section, with suggestions
//! - `format <file>`: section-header repairs, applied in place with `--write`
//! - `watch <dir>`: keep the index current and print each change (feature `service`)
//!
//! `--json` switches every command to machine-readable output.

use clap::{Parser, Subcommand};
use ra2_ini_core::{
    config::{
        current_config, get_content, set_content, ConfigProvider, TomlConfigProvider,
        CONFIG_PROVIDER,
    },
    diagnostics::DiagnosticsChecker,
    dictionary::Dictionary,
    format::{analyze_format, apply_fixes},
    inference::TypeInference,
    register::RegisterHelper,
    stats::{collect_file_statistics, collect_workspace_statistics},
    workspace::IndexManager,
    IniError,
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

#[derive(Parser)]
#[command(name = "ra2ini")]
#[command(author, version, about = "Index, check and infer types across RA2 INI files", long_about = None)]
struct Cli {
    /// Index configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Type dictionary (JSON). Defaults to `dictionary.json` in the workspace root
    #[arg(short, long, global = true)]
    dictionary: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory and print a summary
    Index {
        /// Workspace root
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Report diagnostics for one file
    Check {
        file: PathBuf,

        /// Workspace root used for cross-file checks (default: the file's directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Infer the type of one or more sections
    Infer {
        path: PathBuf,

        #[arg(required = true)]
        sections: Vec<String>,
    },

    /// List definitions of and references to a section
    Refs { path: PathBuf, section: String },

    /// List sections missing from every registration section
    Register {
        file: PathBuf,

        /// Workspace root (default: the file's directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Repair broken section headers
    Format {
        file: PathBuf,

        /// Write the repaired text back to the file (default: only list the fixes)
        #[arg(short, long)]
        write: bool,
    },

    /// Watch a directory and keep its index current
    #[cfg(feature = "service")]
    Watch {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Debounce window in milliseconds
        #[arg(long, default_value = "500")]
        debounce_ms: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        let provider: Arc<dyn ConfigProvider> = Arc::new(TomlConfigProvider::new(path.clone()));
        if CONFIG_PROVIDER.set(Mutex::new(provider)).is_err() {
            tracing::warn!("config provider already installed, ignoring {}", path.display());
        }
    }

    match &cli.command {
        Commands::Index { path } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let index = open_workspace(path).await?;
                let inference = TypeInference::new(load_dictionary(&cli, path)?, index.clone());
                let statistics = collect_workspace_statistics(&index, &inference);
                if cli.json {
                    return print_json(&statistics);
                }
                println!("\n=== Index Results ===");
                println!("Files: {}", statistics.total_files);
                println!("Sections: {}", statistics.total_sections);
                println!("References: {}", statistics.total_references);
                println!("Global version: {}", statistics.global_version);
                println!("\n=== Sections by Type ===");
                for (type_name, count) in &statistics.sections_by_type {
                    println!("{type_name:>16}: {count}");
                }
                Ok(())
            })?;
            Ok(())
        }

        Commands::Check { file, root } => {
            let root = root.clone().unwrap_or_else(|| parent_dir(file));
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let error_count = runtime.block_on(async {
                let index = open_workspace(&root).await?;
                let dictionary = load_dictionary(&cli, &root)?;
                let file = std::fs::canonicalize(file)?;
                let text = get_content(&file)?;
                index.open_document(&file, &text);

                let diagnostics = DiagnosticsChecker::new(&index, &dictionary).check(&text);
                let errors = diagnostics.iter().filter(|d| d.is_error()).count();
                if cli.json {
                    print_json(&diagnostics)?;
                    return Ok::<usize, IniError>(errors);
                }
                for diagnostic in &diagnostics {
                    println!("{}:{diagnostic}", file.display());
                }
                let statistics = collect_file_statistics(index.scanner(), &text);
                println!(
                    "\n{} diagnostics ({} errors) in {} sections, {} keys",
                    diagnostics.len(),
                    errors,
                    statistics.total_sections,
                    statistics.total_keys
                );
                Ok(errors)
            })?;
            if error_count > 0 {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Infer { path, sections } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let index = open_workspace(path).await?;
                let inference = TypeInference::new(load_dictionary(&cli, path)?, index.clone());
                let inferred: Vec<InferredSection> = sections
                    .iter()
                    .map(|section| InferredSection {
                        section: section.clone(),
                        type_name: inference.infer_section_type(section),
                        description: inference
                            .dictionary()
                            .section_description(section)
                            .map(str::to_string),
                        definitions: index.find_section_definitions(section).len(),
                    })
                    .collect();
                if cli.json {
                    return print_json(&inferred);
                }
                for item in &inferred {
                    println!(
                        "[{}] {} ({} definitions)",
                        item.section,
                        item.type_name.as_deref().unwrap_or("unknown"),
                        item.definitions
                    );
                    if let Some(description) = &item.description {
                        println!("    {description}");
                    }
                }
                Ok(())
            })?;
            Ok(())
        }

        Commands::Refs { path, section } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let index = open_workspace(path).await?;
                let definitions = index.find_section_definitions(section);
                let references = index.find_section_references(section);
                if cli.json {
                    return print_json(&serde_json::json!({
                        "definitions": definitions,
                        "references": references,
                    }));
                }
                println!("=== Definitions of [{section}] ===");
                for definition in &definitions {
                    println!("{}:{}", definition.file.display(), definition.line + 1);
                }
                println!("\n=== References to [{section}] ===");
                for reference in &references {
                    println!(
                        "{}:{}: [{}] {}={}",
                        reference.file.display(),
                        reference.line + 1,
                        reference.section,
                        reference.key,
                        reference.value
                    );
                }
                Ok(())
            })?;
            Ok(())
        }

        Commands::Register { file, root } => {
            let root = root.clone().unwrap_or_else(|| parent_dir(file));
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let index = open_workspace(&root).await?;
                let inference = TypeInference::new(load_dictionary(&cli, &root)?, index.clone());
                let file = std::fs::canonicalize(file)?;
                let text = get_content(&file)?;
                index.open_document(&file, &text);

                let helper = RegisterHelper::new(&inference);
                let missing: Vec<MissingRegistration> = helper
                    .unregistered_sections_global(&text)
                    .into_iter()
                    .map(|section| MissingRegistration {
                        suggested: helper.suggested_registers(&text, &section.name),
                        line: section.line,
                        comment: section.comment,
                        section: section.name,
                    })
                    .collect();
                if cli.json {
                    return print_json(&missing);
                }
                for item in &missing {
                    let targets: Vec<String> = item
                        .suggested
                        .iter()
                        .map(|register| match helper.register_label(register) {
                            Some(label) => format!("{register} ({label})"),
                            None => register.clone(),
                        })
                        .collect();
                    println!(
                        "{}:{}: [{}] -> {}",
                        file.display(),
                        item.line + 1,
                        item.section,
                        targets.join(", ")
                    );
                }
                Ok(())
            })?;
            Ok(())
        }

        Commands::Format { file, write } => {
            let text = get_content(file)?;
            let fixes = analyze_format(&text);
            if cli.json {
                print_json(&fixes)?;
            } else {
                for fix in &fixes {
                    println!("{}:{}: {}", file.display(), fix.line + 1, fix.description());
                }
            }
            if *write && !fixes.is_empty() {
                set_content(file, &apply_fixes(&text, &fixes))?;
                tracing::info!("applied {} fixes to {}", fixes.len(), file.display());
            }
            Ok(())
        }

        #[cfg(feature = "service")]
        Commands::Watch { path, debounce_ms } => {
            use ra2_ini_core::watch::WatchService;
            use std::time::Duration;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let index = runtime.block_on(open_workspace(path))?;
            let service = WatchService::new(
                index.clone(),
                runtime.handle().clone(),
                Duration::from_millis(*debounce_ms),
            )?;
            let mut events = index.subscribe();
            let json = cli.json;
            runtime.block_on(async move {
                println!("Watching {} (Ctrl+C to stop)", path.display());
                loop {
                    tokio::select! {
                        Some(event) = events.recv() => {
                            if json {
                                print_json(&event)?;
                            } else {
                                println!("[Event] {event}");
                            }
                        }
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
                Ok::<(), IniError>(())
            })?;
            service.stop()?;
            Ok(())
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InferredSection {
    section: String,
    type_name: Option<String>,
    description: Option<String>,
    definitions: usize,
}

#[derive(Serialize)]
struct MissingRegistration {
    section: String,
    line: usize,
    comment: Option<String>,
    suggested: Vec<String>,
}

async fn open_workspace(root: &Path) -> Result<Arc<IndexManager>, IniError> {
    let root = std::fs::canonicalize(root)?;
    let index = Arc::new(IndexManager::new(root, current_config()?)?);
    index.index_workspace().await;
    Ok(index)
}

fn load_dictionary(cli: &Cli, root: &Path) -> Result<Arc<Dictionary>, IniError> {
    let dictionary = match &cli.dictionary {
        Some(path) => Dictionary::load(path)?,
        None => Dictionary::load_or_empty(&[
            root.join("dictionary.json"),
            root.join(".ra2ini").join("dictionary.json"),
        ]),
    };
    Ok(Arc::new(dictionary))
}

fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), IniError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
