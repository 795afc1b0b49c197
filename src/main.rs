//! got CLI - inspect and maintain repositories served by the hosting core

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use got::{object, ops, refs, Hash, Repo};

#[derive(Parser)]
#[command(name = "got")]
#[command(about = "content-addressed bare-repository store")]
#[command(version)]
struct Cli {
    /// repository path
    #[arg(short, long, default_value = ".", env = "GOT_REPO")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new repository
    Init {
        /// path to create repository at
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// list refs, optionally under a prefix
    Refs {
        /// prefix such as "heads" or "tags"
        #[arg(default_value = "")]
        prefix: String,
    },

    /// print an object's payload to stdout
    CatObject {
        /// native address (64 hex chars)
        hash: String,

        /// print the object kind instead of the payload
        #[arg(short = 't', long)]
        kind: bool,
    },

    /// verify repository integrity
    Fsck,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> got::Result<()> {
    match cli.command {
        Commands::Init { path } => {
            Repo::init(&path)?;
            println!("initialized repository at {}", path.display());
            Ok(())
        }

        Commands::Refs { prefix } => {
            let repo = Repo::open(&cli.repo)?;
            for (name, hash) in refs::list(&repo, &prefix)? {
                println!("{} {}", hash, name);
            }
            Ok(())
        }

        Commands::CatObject { hash, kind } => {
            let repo = Repo::open(&cli.repo)?;
            let address = Hash::from_hex(&hash)?;
            let (object_kind, payload) = object::read(&repo, &address)?;
            if kind {
                println!("{}", object_kind);
            } else {
                std::io::stdout()
                    .write_all(&payload)
                    .map_err(|e| got::Error::Io {
                        path: "stdout".into(),
                        source: e,
                    })?;
            }
            Ok(())
        }

        Commands::Fsck => {
            let repo = Repo::open(&cli.repo)?;
            let report = ops::fsck(&repo)?;

            println!(
                "checked {} refs, {} objects",
                report.refs_checked, report.objects_checked
            );
            for corrupt in &report.corrupt_objects {
                println!("corrupt: {}", corrupt);
            }
            for missing in &report.missing_objects {
                println!("missing: {}", missing);
            }
            for broken in &report.broken_mappings {
                println!("broken mapping: {}", broken);
            }
            if !report.dangling_objects.is_empty() {
                println!("{} dangling objects", report.dangling_objects.len());
            }

            if report.is_ok() {
                println!("ok");
                Ok(())
            } else {
                Err(got::Error::CorruptObjectMessage(
                    "repository has integrity errors".to_string(),
                ))
            }
        }
    }
}
