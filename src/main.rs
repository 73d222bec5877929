use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use mdhop::{
    AddOptions, LinkFormat, RewriteEntry, SkippedLink, TransformReport, Vault, add, build,
    convert, delete, live_stats, move_note, repair, simplify, update,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Wikilink,
    Markdown,
}

impl From<FormatArg> for LinkFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Wikilink => Self::Wikilink,
            FormatArg::Markdown => Self::Markdown,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "mdhop",
    version,
    about = "Markdown vault link graph indexing + maintenance CLI"
)]
struct Cli {
    /// Path to the vault root (defaults to the current directory).
    #[arg(long, env = "MDHOP_VAULT", global = true)]
    vault: Option<PathBuf>,

    /// Emit results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the index from a full vault scan.
    Build,
    /// Register new note files and resolve their links.
    Add {
        /// Files to register (vault-relative or absolute).
        #[arg(required = true)]
        files: Vec<String>,

        /// Rewrite links the addition would make ambiguous instead of
        /// aborting.
        #[arg(long)]
        auto_disambiguate: bool,
    },
    /// Reconcile registered files with their on-disk content.
    Update {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Deregister files; referenced notes become phantoms.
    Delete {
        #[arg(required = true)]
        files: Vec<String>,

        /// Unlink the files from disk as part of the deletion.
        #[arg(long)]
        remove_files: bool,
    },
    /// Rename a registered note, rewriting incoming and outgoing links.
    Move { from: String, to: String },
    /// Rewrite path links with unique targets into basename links.
    Simplify {
        /// Plan only; leave files untouched.
        #[arg(long)]
        dry_run: bool,

        /// Restrict to these notes (default: whole vault).
        files: Vec<String>,
    },
    /// Convert internal links between wikilink and markdown forms.
    Convert {
        /// Output link form.
        #[arg(long, value_enum)]
        to: FormatArg,

        /// Plan only; leave files untouched.
        #[arg(long)]
        dry_run: bool,

        /// Restrict to these notes (default: whole vault).
        files: Vec<String>,
    },
    /// Rewrite broken or vault-escaping links to basename form.
    Repair {
        /// Plan only; leave files untouched.
        #[arg(long)]
        dry_run: bool,
    },
    /// Node and edge counts from the live index.
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = match &cli.vault {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let vault = Vault::open(root)?;

    match cli.command {
        Command::Build => {
            let report = build(&vault)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("notes: {}", report.notes);
                println!("assets: {}", report.assets);
                println!("edges: {}", report.edges);
                println!("tags: {}", report.tags);
                println!("phantoms: {}", report.phantoms);
            }
        }
        Command::Add {
            files,
            auto_disambiguate,
        } => {
            let report = add(
                &vault,
                &AddOptions {
                    files,
                    auto_disambiguate,
                },
            )?;
            if cli.json {
                print_json(&report)?;
            } else {
                for path in &report.added {
                    println!("added\t{path}");
                }
                for path in &report.promoted {
                    println!("promoted\t{path}");
                }
                print_rewrites(&report.rewritten);
            }
        }
        Command::Update { files } => {
            let report = update(&vault, &files)?;
            if cli.json {
                print_json(&report)?;
            } else {
                for path in &report.updated {
                    println!("updated\t{path}");
                }
                for path in &report.phantomized {
                    println!("phantomized\t{path}");
                }
                for path in &report.removed {
                    println!("removed\t{path}");
                }
            }
        }
        Command::Delete {
            files,
            remove_files,
        } => {
            let report = delete(&vault, &files, remove_files)?;
            if cli.json {
                print_json(&report)?;
            } else {
                for path in &report.phantomized {
                    println!("phantomized\t{path}");
                }
                for path in &report.removed {
                    println!("removed\t{path}");
                }
            }
        }
        Command::Move { from, to } => {
            let report = move_note(&vault, &from, &to)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "moved\t{} -> {}{}",
                    report.from,
                    report.to,
                    if report.disk_renamed { "" } else { " (index only)" }
                );
                print_rewrites(&report.rewritten);
            }
        }
        Command::Simplify { dry_run, files } => {
            let report = simplify(&vault, dry_run, &files)?;
            print_transform(cli.json, &report)?;
        }
        Command::Convert { to, dry_run, files } => {
            let report = convert(&vault, to.into(), dry_run, &files)?;
            print_transform(cli.json, &report)?;
        }
        Command::Repair { dry_run } => {
            let report = repair(&vault, dry_run)?;
            print_transform(cli.json, &report)?;
        }
        Command::Stats => {
            let stats = live_stats(&vault)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("nodes");
                println!("  notes: {}", stats.notes);
                println!("  assets: {}", stats.assets);
                println!("  tags: {}", stats.tags);
                println!("  phantoms: {}", stats.phantoms);
                println!("edges");
                println!("  total: {}", stats.edges);
                println!("  wikilink: {}", stats.wikilink_edges);
                println!("  markdown: {}", stats.markdown_edges);
                println!("  tag: {}", stats.tag_edges);
                println!("  frontmatter: {}", stats.frontmatter_edges);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_rewrites(entries: &[RewriteEntry]) {
    for entry in entries {
        println!(
            "rewrote\t{}:{}\t{} -> {}",
            entry.path, entry.line, entry.old, entry.new
        );
    }
}

fn print_skipped(entries: &[SkippedLink]) {
    for skip in entries {
        println!(
            "skipped\t{}:{}\t{} (candidates: {})",
            skip.path,
            skip.line,
            skip.raw,
            skip.candidates.join(", ")
        );
    }
}

fn print_transform(json: bool, report: &TransformReport) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    if report.dry_run {
        for entry in &report.rewritten {
            println!(
                "would rewrite\t{}:{}\t{} -> {}",
                entry.path, entry.line, entry.old, entry.new
            );
        }
    } else {
        print_rewrites(&report.rewritten);
    }
    print_skipped(&report.skipped);
    Ok(())
}
