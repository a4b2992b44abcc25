// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface.

use clap::{ArgAction, Parser};

use std::path::{Path, PathBuf};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Two-pass cross-assembler for the Motorola 6809 and Hitachi 6309.

The source is assembled into a 64K image; binary output files are produced
only for address ranges requested with the STORE directive, as raw binaries
or Motorola S-records. A listing with a symbol cross-reference is written
next to the source. The process exit code equals the error count.";

#[derive(Parser, Debug)]
#[command(
    name = "bs9",
    version = VERSION,
    about = "6809/6309 cross-assembler",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        short = 'd',
        long = "debug",
        action = ArgAction::SetTrue,
        long_help = "Write internal trace output and diagnostics to Debug.lst."
    )]
    pub debug: bool,
    #[arg(
        short = 'D',
        long = "define",
        value_name = "NAME=EXPR",
        action = ArgAction::Append,
        long_help = "Define a locked symbol before assembly (repeatable). Source definitions of the same name are ignored."
    )]
    pub defines: Vec<String>,
    #[arg(
        short = 'i',
        long = "ignore-case",
        action = ArgAction::SetTrue,
        long_help = "Fold symbol names case-insensitively. The CASE directive can override this per section."
    )]
    pub ignore_case: bool,
    #[arg(
        short = 'l',
        long = "preset",
        value_name = "N",
        long_help = "Preset every byte of the 64K image to N (0-255) before assembly."
    )]
    pub preset: Option<u8>,
    #[arg(
        short = 'm',
        long = "motorola",
        action = ArgAction::SetTrue,
        long_help = "Motorola code style: a blank terminates the operand field, so expressions must not contain spaces."
    )]
    pub motorola: bool,
    #[arg(
        short = 'n',
        long = "line-numbers",
        action = ArgAction::SetTrue,
        long_help = "Prefix listing lines with source line numbers."
    )]
    pub line_numbers: bool,
    #[arg(
        short = 'o',
        long = "optimize",
        action = ArgAction::SetTrue,
        long_help = "Enable the peephole branch/jump optimizer and write optimization hints to <base>.opt."
    )]
    pub optimize: bool,
    #[arg(
        short = 'p',
        long = "preprocess",
        action = ArgAction::SetTrue,
        long_help = "Write the preprocessed source (macros expanded, comments preserved) to <base>.pp."
    )]
    pub preprocess: bool,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress the banner and the summary."
    )]
    pub quiet: bool,
    #[arg(
        short = 'x',
        long = "strip-hex",
        action = ArgAction::SetTrue,
        long_help = "Strip leading hex-dump columns from the source, so a previous listing can be re-assembled."
    )]
    pub strip_hex: bool,
    #[arg(
        long = "labels",
        value_name = "FILE",
        long_help = "Write the symbol table as JSON to FILE."
    )]
    pub labels: Option<PathBuf>,
    #[arg(value_name = "SOURCE", long_help = "Assembler source file; .as9 is appended when no .xxx extension is present.")]
    pub source: PathBuf,
}

/// Derived file names: source (with default extension), listing,
/// preprocessor output and optimizer hints.
pub struct SourcePaths {
    pub source: PathBuf,
    pub list: PathBuf,
    pub pre: PathBuf,
    pub opt: PathBuf,
}

/// A name ending in a four-character `.xxx` extension is taken as-is,
/// anything else gets `.as9` appended.
pub fn resolve_paths(input: &Path) -> SourcePaths {
    let name = input.to_string_lossy().to_string();
    let bytes = name.as_bytes();
    let (source, base) = if bytes.len() > 4 && bytes[bytes.len() - 4] == b'.' {
        (name.clone(), name[..name.len() - 4].to_string())
    } else {
        (format!("{name}.as9"), name)
    };
    SourcePaths {
        source: PathBuf::from(source),
        list: PathBuf::from(format!("{base}.lst")),
        pre: PathBuf::from(format!("{base}.pp")),
        opt: PathBuf::from(format!("{base}.opt")),
    }
}
