//! Binary entry point for the index inspection CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use pdom::pdom::file::FileSummary;
use pdom::pdom::node::BindingKind;
use pdom::pdom::options::PdomOptions;
use pdom::pdom::Pdom;
use pdom::query::{find_bindings, BindingCollector, MacroContainerCollector};
use pdom::storage::DatabaseStatsSnapshot;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pdom",
    version,
    about = "Inspect a persisted C/C++ symbol index",
    disable_help_subcommand = true
)]
struct Cli {
    /// Index file to open.
    #[arg(long, short = 'd', env = "PDOM_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Options file; defaults to `pdom/pdom.toml` in the user configuration directory.
    #[arg(long, env = "PDOM_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the fragment id, linkages and allocator counters.
    Info,
    /// List every committed file.
    Files,
    /// Find bindings (or macros) by name.
    #[command(group(ArgGroup::new("mode").args(["prefix", "content_assist"])))]
    Find {
        /// Name, prefix or completion pattern.
        pattern: String,
        /// Match names starting with the pattern.
        #[arg(long)]
        prefix: bool,
        /// Match camel-case abbreviations such as `gFB` for `getFooBar`.
        #[arg(long)]
        content_assist: bool,
        /// Ignore case.
        #[arg(long, short = 'i')]
        ignore_case: bool,
        /// Keep only bindings of this kind; repeatable.
        #[arg(long = "kind", value_parser = parse_kind)]
        kinds: Vec<BindingKind>,
        /// Search macro names instead of bindings.
        #[arg(long, conflicts_with = "kinds")]
        macros: bool,
    },
    /// Check every tree and every file list; exits with status 2 on problems.
    Verify,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_kind(raw: &str) -> Result<BindingKind, String> {
    BindingKind::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = BindingKind::ALL.iter().map(|kind| kind.name()).collect();
        format!("unknown kind `{raw}`, expected one of {}", known.join(", "))
    })
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("pdom").join("pdom.toml"))
}

fn load_options(explicit: Option<PathBuf>) -> Result<PdomOptions, Box<dyn Error>> {
    if let Some(path) = explicit {
        return Ok(PdomOptions::load(path)?);
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "cli.config.default");
            Ok(PdomOptions::load(path)?)
        }
        _ => Ok(PdomOptions::default()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = load_options(cli.config)?;
    let path = cli
        .database
        .ok_or("no index given; pass --database or set PDOM_DATABASE")?;
    let pdom = Pdom::open(&path, options)?;

    match cli.command {
        Command::Info => {
            let report = info(&pdom)?;
            emit(cli.format, &report, || print_info_text(&report))?;
        }
        Command::Files => {
            let files = pdom
                .files()?
                .into_iter()
                .map(|file| file.summary(pdom.db()))
                .collect::<Result<Vec<_>, _>>()?;
            emit(cli.format, &files, || print_files_text(&files))?;
        }
        Command::Find {
            pattern,
            prefix,
            content_assist,
            ignore_case,
            kinds,
            macros,
        } => {
            let mode = match (prefix, content_assist) {
                (true, _) => Mode::Prefix,
                (_, true) => Mode::ContentAssist,
                _ => Mode::Exact,
            };
            let hits = if macros {
                find_macros(&pdom, &pattern, mode, !ignore_case)?
            } else {
                find(&pdom, &pattern, mode, !ignore_case, &kinds)?
            };
            emit(cli.format, &hits, || print_hits_text(&hits))?;
        }
        Command::Verify => {
            let report = pdom.verify()?;
            emit(cli.format, &report, || {
                for tree in &report.trees {
                    println!("{:<32} records={} depth={}", tree.name, tree.records, tree.depth);
                }
                println!(
                    "bindings={} files={} names={} violations={}",
                    report.bindings,
                    report.files,
                    report.names,
                    report.violations.len()
                );
                for violation in &report.violations {
                    println!("- {violation}");
                }
            })?;
            if !report.is_ok() {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

#[derive(Serialize)]
struct LinkageInfo {
    name: String,
    global_bindings: usize,
    nested_bindings: usize,
    macro_names: usize,
}

#[derive(Serialize)]
struct InfoReport {
    fragment_id: String,
    chunks: usize,
    files: usize,
    linkages: Vec<LinkageInfo>,
    allocator: DatabaseStatsSnapshot,
}

fn info(pdom: &Pdom) -> Result<InfoReport, Box<dyn Error>> {
    let db = pdom.db();
    let mut linkages = Vec::new();
    for linkage in pdom.linkages()? {
        linkages.push(LinkageInfo {
            name: linkage.name(db)?,
            global_bindings: linkage.index(pdom).records(db)?.len(),
            nested_bindings: linkage.nested_index(pdom).records(db)?.len(),
            macro_names: linkage.macro_index(pdom).records(db)?.len(),
        });
    }
    Ok(InfoReport {
        fragment_id: hex::encode(pdom.fragment_id()?.0.to_be_bytes()),
        chunks: db.chunk_count(),
        files: pdom.files()?.len(),
        linkages,
        allocator: db.stats(),
    })
}

fn print_info_text(report: &InfoReport) {
    println!("fragment {}", report.fragment_id);
    println!("chunks={} files={}", report.chunks, report.files);
    for linkage in &report.linkages {
        println!(
            "  {:<4} global={} nested={} macros={}",
            linkage.name, linkage.global_bindings, linkage.nested_bindings, linkage.macro_names
        );
    }
    let alloc = &report.allocator;
    println!(
        "allocator: mallocs={} frees={} chunks_added={} bytes_in_use={}",
        alloc.mallocs, alloc.frees, alloc.chunks_added, alloc.bytes_in_use
    );
}

fn print_files_text(files: &[FileSummary]) {
    for file in files {
        let variant = if file.significant_macros.is_empty() {
            String::new()
        } else {
            format!(" [{}]", file.significant_macros)
        };
        println!(
            "{}{} ({}) names={} macros={} includes={}",
            file.location, variant, file.linkage, file.names, file.macros, file.includes
        );
    }
}

#[derive(Copy, Clone, Debug)]
enum Mode {
    Exact,
    Prefix,
    ContentAssist,
}

#[derive(Serialize)]
struct Hit {
    linkage: String,
    kind: String,
    name: String,
    record: u64,
    file_local: bool,
}

#[derive(Serialize)]
struct Hits {
    hits: Vec<Hit>,
    cancelled: bool,
}

fn find(
    pdom: &Pdom,
    pattern: &str,
    mode: Mode,
    case_sensitive: bool,
    kinds: &[BindingKind],
) -> Result<Hits, Box<dyn Error>> {
    let matches = find_bindings(pdom, || {
        let collector = match mode {
            Mode::Exact => BindingCollector::exact(pattern),
            Mode::Prefix => BindingCollector::prefix(pattern),
            Mode::ContentAssist => BindingCollector::content_assist(pattern),
        };
        collector.case_sensitive(case_sensitive).kinds(kinds)
    })?;
    let db = pdom.db();
    let mut hits = Vec::with_capacity(matches.bindings.len());
    for binding in &matches.bindings {
        hits.push(Hit {
            linkage: binding.linkage().name().to_owned(),
            kind: binding.kind().name().to_owned(),
            name: binding.qualified_name(db)?.join("::"),
            record: binding.record().0,
            file_local: binding.is_file_local(db)?,
        });
    }
    Ok(Hits {
        hits,
        cancelled: matches.cancelled,
    })
}

fn find_macros(
    pdom: &Pdom,
    pattern: &str,
    mode: Mode,
    case_sensitive: bool,
) -> Result<Hits, Box<dyn Error>> {
    let db = pdom.db();
    let mut hits = Vec::new();
    for linkage in pdom.linkages()? {
        let mut collector = match mode {
            Mode::Exact => MacroContainerCollector::exact(pattern),
            Mode::Prefix => MacroContainerCollector::prefix(pattern),
            Mode::ContentAssist => MacroContainerCollector::content_assist(pattern),
        }
        .case_sensitive(case_sensitive);
        collector.search(pdom, &linkage)?;
        for container in collector.containers(linkage.id()) {
            hits.push(Hit {
                linkage: linkage.id().name().to_owned(),
                kind: "macro".to_owned(),
                name: container.name(db)?,
                record: container.record().0,
                file_local: false,
            });
        }
    }
    Ok(Hits {
        hits,
        cancelled: false,
    })
}

fn print_hits_text(hits: &Hits) {
    for hit in &hits.hits {
        let local = if hit.file_local { " (file-local)" } else { "" };
        println!("{:<4} {:<12} {}{}", hit.linkage, hit.kind, hit.name, local);
    }
    if hits.cancelled {
        println!("(search cancelled, results are partial)");
    }
}
