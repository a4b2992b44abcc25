// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for bs9.

use clap::Parser;

use bs9::assembler::cli::Cli;
use bs9::assembler::passes::run_with_cli;

fn main() {
    let cli = Cli::parse();
    let errors = run_with_cli(&cli);
    std::process::exit(errors.min(255) as i32);
}
