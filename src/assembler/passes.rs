// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Two-pass orchestration and the top-level run flow.

use super::cli::{resolve_paths, Cli};
use super::{io_error, output, Assembler, Config, Pass, DEFAULT_ERROR_LIMIT};
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic};
use crate::core::listing::ListingWriter;
use crate::core::source::{SourceEvent, SourceStream};
use crate::m6809::Cpu;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::time::{SystemTime, UNIX_EPOCH};

impl Assembler {
    fn run_pass<W: Write>(
        &mut self,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        loop {
            // Macro expansion feeds lines without advancing the source.
            let line = match self.macros.next_line(&mut self.frames) {
                Some(line) => line,
                None => match stream.next_event() {
                    Some(SourceEvent::Line(line)) => {
                        self.line_no = stream.line_no();
                        line
                    }
                    Some(SourceEvent::EndInclude(name)) => {
                        self.line_no = stream.line_no();
                        listing
                            .include_closed(self.line_no, &name)
                            .map_err(io_error)?;
                        continue;
                    }
                    None => break,
                },
            };
            if let Err(err) = self.process_line(&line, stream, listing) {
                let fatal = err.is_fatal();
                let file = stream.file_name().to_string();
                self.report(err, &file, listing);
                if fatal {
                    self.aborted = true;
                    break;
                }
            }
            if self.forced_end {
                // END inside an include only ends that file.
                if stream.include_depth() > 0 {
                    if let Some(name) = stream.close_include() {
                        listing
                            .include_closed(stream.line_no(), &name)
                            .map_err(io_error)?;
                    }
                    self.forced_end = false;
                } else {
                    break;
                }
            }
            if self.pass2() && self.err_count >= self.cfg.error_limit {
                println!("\n*** Error count reached maximum of {} ***", self.err_count);
                println!("Assembly stopped");
                self.aborted = true;
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn report<W: Write>(
        &mut self,
        err: AsmError,
        file: &str,
        listing: &mut ListingWriter<W>,
    ) {
        let diag = Diagnostic::new(file, self.line_no, &self.line, err);
        let text = diag.render();
        print!("{text}");
        let _ = listing.diagnostic(&text);
        if let Some(out) = &mut self.debug_out {
            let _ = write!(out, "{text}");
        }
        self.diagnostics.push(diag);
        self.err_count += 1;
    }

    pub fn first_pass<W: Write>(
        &mut self,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        self.pass = Pass::One;
        self.forced_end = false;
        self.locals.reset_backward();
        self.run_pass(stream, listing)
    }

    pub fn second_pass<W: Write>(
        &mut self,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        if !self.cond.is_empty() {
            let depth = self.cond.depth();
            let message = if depth == 1 {
                "an #endif statement is missing".to_string()
            } else {
                format!("{depth} #endif statements are missing")
            };
            return Err(AsmError::new(AsmErrorKind::Structural, &message, None));
        }
        self.pass = Pass::Two;
        self.pc = -1;
        self.enum_value = -1;
        self.forced_end = false;
        self.cpu = Cpu::H6309;
        self.scope.clear();
        self.module_start = 0;
        self.frames.clear();
        self.locals.reset_backward();
        listing.pass2 = true;
        listing.enabled = true;
        stream.rewind();
        self.run_pass(stream, listing)
    }

    /// Post-pass work: storage requests, undefined symbols, cross-reference.
    pub fn finish<W: Write>(&mut self, listing: &mut ListingWriter<W>) -> Result<(), AsmError> {
        if !self.aborted {
            let mut stores = std::mem::take(&mut self.stores);
            if let Err(err) = output::write_stores(&self.rom, &mut stores) {
                let file = self.file_name.clone();
                self.report(err, &file, listing);
            }
            self.stores = stores;
        }

        let undefined: Vec<String> = self
            .symbols
            .undefined()
            .map(|symbol| symbol.name.clone())
            .collect();
        for name in &undefined {
            println!("* Undefined   : {:<25} *", name);
        }
        self.err_count += undefined.len() as u32;

        listing
            .symbol_table_header(self.symbols.len())
            .map_err(io_error)?;
        let by_addr = self.symbols.sorted_by_address();
        listing.symbols(&by_addr, 0, 0xffff).map_err(io_error)?;
        let by_refs = self.symbols.sorted_by_refs();
        listing.symbols(&by_refs, 0, 0xff).map_err(io_error)?;
        Ok(())
    }
}

/// Assemble one source file per the command line; returns the error count,
/// which is also the process exit code.
pub fn run_with_cli(cli: &Cli) -> u32 {
    let paths = resolve_paths(&cli.source);
    let cfg = Config {
        debug: cli.debug,
        ignore_case: cli.ignore_case,
        motorola: cli.motorola,
        line_numbers: cli.line_numbers,
        optimize: cli.optimize,
        preprocess: cli.preprocess,
        quiet: cli.quiet,
        strip_hex: cli.strip_hex,
        preset: cli.preset.unwrap_or(0),
        error_limit: DEFAULT_ERROR_LIMIT,
        date: current_date_string(),
    };

    if !cfg.quiet {
        println!();
        println!("*******************************************");
        println!("* Bit Shift Assembler bs9 v{:<14} *", super::cli::VERSION);
        println!("* Today is            {:<19} *", cfg.date);
        println!("* --------------------------------------- *");
        println!("* Source: {:<31} *", paths.source.display());
        println!("* List  : {:<31} *", paths.list.display());
    }

    let quiet = cfg.quiet;
    let mut asm = Assembler::new(cfg);
    asm.file_name = paths.source.display().to_string();
    if cli.debug {
        match File::create("Debug.lst") {
            Ok(file) => asm.debug_out = Some(BufWriter::new(file)),
            Err(err) => {
                eprintln!("Could not open Debug.lst: {err}");
                return 1;
            }
        }
    }
    if cli.preprocess {
        match File::create(&paths.pre) {
            Ok(file) => asm.pp_out = Some(BufWriter::new(file)),
            Err(err) => {
                eprintln!("Could not open {}: {err}", paths.pre.display());
                return 1;
            }
        }
    }
    if cli.optimize {
        match File::create(&paths.opt) {
            Ok(file) => asm.opt_out = Some(BufWriter::new(file)),
            Err(err) => {
                eprintln!("Could not open {}: {err}", paths.opt.display());
                return 1;
            }
        }
    }

    for define in &cli.defines {
        if let Err(err) = asm.define_cli_symbol(define) {
            eprintln!("Bad -D {define}: {}", err.message());
            return 1;
        }
    }

    let mut stream = match SourceStream::from_file(&paths.source) {
        Ok(stream) => stream,
        Err(_) => {
            println!("Could not open <{}>", paths.source.display());
            return 1;
        }
    };
    let list_file = match File::create(&paths.list) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Could not open {}: {err}", paths.list.display());
            return 1;
        }
    };
    let mut listing = ListingWriter::new(BufWriter::new(list_file), cli.line_numbers);

    if asm.first_pass(&mut stream, &mut listing).is_err() {
        asm.aborted = true;
        asm.err_count = asm.err_count.max(1);
    }
    if asm.err_count > 0 {
        // A broken pass 1 leaves the symbol table untrustworthy.
        asm.aborted = true;
    } else {
        match asm.second_pass(&mut stream, &mut listing) {
            Ok(()) => {}
            Err(err) => {
                let file = asm.file_name.clone();
                asm.report(err, &file, &mut listing);
                asm.aborted = true;
            }
        }
    }
    let _ = asm.finish(&mut listing);

    if let Some(path) = &cli.labels {
        if let Err(err) = output::write_labels_file(path, &asm.symbols) {
            eprintln!("Could not write {}: {err}", path.display());
            asm.err_count += 1;
        }
    }

    if cli.optimize {
        asm.opt_out = None;
        if asm.opt_hints == 0 {
            let _ = fs::remove_file(&paths.opt);
        } else if !quiet {
            println!("* Opt   : {:<31} *", paths.opt.display());
        }
    }

    if !quiet {
        println!("*******************************************");
        println!("* Source Lines: {:6}                    *", stream.total_lines);
        println!("* Symbols     : {:6}                    *", asm.symbols.len());
        println!("* Macros      : {:6}                    *", asm.macros.len());
        if asm.opt_hints > 0 {
            println!("* Hints       : {:6} for optimization   *", asm.opt_hints);
        }
        if asm.err_count > 0 {
            println!("* {:3} ERRORS occured                      *", asm.err_count);
        } else {
            println!("* OK, no errors                           *");
        }
        println!("*******************************************");
        println!();
    }
    asm.err_count
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn current_date_string() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let (year, month, day) = civil_from_days((secs / 86400) as i64);
    format!("{}-{}-{}", day, MONTHS[month as usize - 1], year)
}

/// Days-since-epoch to calendar date (proleptic Gregorian).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::civil_from_days;

    #[test]
    fn civil_date_conversion() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
    }
}
