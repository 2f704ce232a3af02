//! Build script for generating the `simulator` man pages.
//!
//! The packaging pipeline expects the man pages in the build output
//! directory: `simulator.1` for the top-level command plus one
//! `simulator-<group>.1` page per command group.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: clap::Command, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    File::create(path)?.write_all(&buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    for group in command.get_subcommands() {
        let path = out_dir.join(format!("simulator-{}.1", group.get_name()));
        render(group.clone(), &path)?;
    }
    render(command, &out_dir.join("simulator.1"))?;

    Ok(())
}
