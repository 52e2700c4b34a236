use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wizmem::{CLIENT_MODULE, ClassDump, HookRegistry, ProcessHandle, builtin_descriptors};

#[derive(Parser)]
#[command(name = "wizmem")]
#[command(about = "Wizard101 client memory toolkit")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the client's type tree and dump every class to JSON.
    DumpTypes {
        /// Title of the client window to attach to.
        #[arg(short, long, default_value = "Wizard101")]
        window: String,

        /// Output path for the dump.
        #[arg(short, long, default_value = "classes.json")]
        out: PathBuf,
    },
    /// Print the built-in hook descriptor set.
    Descriptors,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wizmem=info".parse()?))
        .init();

    let args = Args::parse();

    match args.command {
        Command::DumpTypes { window, out } => dump_types(&window, &out),
        Command::Descriptors => {
            let set = builtin_descriptors();
            println!("{}", serde_json::to_string_pretty(&set)?);
            Ok(())
        }
    }
}

fn dump_types(window: &str, out: &std::path::Path) -> Result<()> {
    let process = ProcessHandle::from_window_title(window)
        .with_context(|| format!("no running client with window title {window:?}"))?;

    info!("attached to client, walking type tree...");

    let registry = HookRegistry::new(&process);
    let dump = ClassDump::generate(&registry, CLIENT_MODULE)
        .context("failed to walk the client type tree")?;

    dump.save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "{} {} classes -> {}",
        "dumped".green(),
        dump.classes.len(),
        out.display()
    );
    Ok(())
}
