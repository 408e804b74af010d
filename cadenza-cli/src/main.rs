// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

mod commands;
mod error;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use cadenza_store_db::StoreConfig;
use log::error;

use crate::error::{CliError, Result};

const USAGE: &str = "\
Usage: cadenza <command> [arguments]

Commands:
  info <file>                 Show what a project file stores
  orphans <file> [--delete]   List blocks no document references
  compact <file>              Drop unused blocks when enough space is wasted
  copy <src> <dest>           Write a pruned copy of the last save
  import <dest> <src>         Append the tracks of <src> to <dest> and save

The CADENZA_CONFIG environment variable may name a TOML configuration file.";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Info(PathBuf),
    Orphans { file: PathBuf, delete: bool },
    Compact(PathBuf),
    Copy { src: PathBuf, dest: PathBuf },
    Import { dest: PathBuf, src: PathBuf },
    Help,
}

fn parse(args: &[String]) -> Result<Command> {
    let mut args = args.iter().map(String::as_str);
    let command = args
        .next()
        .ok_or_else(|| CliError::usage("missing command"))?;

    let mut positional = Vec::new();
    let mut delete = false;
    for arg in args {
        match arg {
            "--delete" if command == "orphans" => delete = true,
            flag if flag.starts_with("--") => {
                return Err(CliError::usage(format!("unknown option '{flag}'")));
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    match (command, positional.as_slice()) {
        ("info", [file]) => Ok(Command::Info(file.clone())),
        ("orphans", [file]) => Ok(Command::Orphans {
            file: file.clone(),
            delete,
        }),
        ("compact", [file]) => Ok(Command::Compact(file.clone())),
        ("copy", [src, dest]) => Ok(Command::Copy {
            src: src.clone(),
            dest: dest.clone(),
        }),
        ("import", [dest, src]) => Ok(Command::Import {
            dest: dest.clone(),
            src: src.clone(),
        }),
        ("help" | "-h" | "--help", []) => Ok(Command::Help),
        ("info" | "orphans" | "compact" | "copy" | "import", _) => Err(CliError::usage(
            format!("wrong number of arguments for '{command}'"),
        )),
        _ => Err(CliError::usage(format!("unknown command '{command}'"))),
    }
}

fn load_config() -> Result<StoreConfig> {
    match env::var("CADENZA_CONFIG") {
        Ok(path) => Ok(StoreConfig::from_file(&PathBuf::from(path))?),
        Err(_) => Ok(StoreConfig::default()),
    }
}

fn run(command: Command, config: &StoreConfig) -> Result<()> {
    match command {
        Command::Info(file) => {
            println!("{}", file.display());
            println!("{}", commands::info(&file, config)?);
        }
        Command::Orphans { file, delete } => {
            let orphans = commands::orphans(&file, delete, config)?;
            for id in &orphans {
                println!("{id}");
            }
            if delete {
                println!("deleted {} orphan blocks", orphans.len());
            }
        }
        Command::Compact(file) => {
            if commands::compact(&file, config)? {
                println!("compacted {}", file.display());
            } else {
                println!("{} does not need compacting", file.display());
            }
        }
        Command::Copy { src, dest } => commands::copy(&src, &dest, config)?,
        Command::Import { dest, src } => {
            let count = commands::import(&dest, &src, config)?;
            println!("imported {count} blocks into {}", dest.display());
        }
        Command::Help => println!("{USAGE}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match load_config().and_then(|config| run(command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
