// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler driver: per-line classification, label definition, macro
//! recording/expansion and the shared assembler state.

pub mod cli;
mod directives;
pub mod output;
pub mod passes;
#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::core::conditional::ConditionalStack;
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic};
use crate::core::expr::{Evaluator, Forced, UNDEF};
use crate::core::listing::ListingWriter;
use crate::core::macros::{
    encode_body_line, scan_call_args, scan_def_params, MacroDef, MacroFrame, MacroStyle,
    MacroTable,
};
use crate::core::rom::RomImage;
use crate::core::source::{SourceEvent, SourceStream};
use crate::core::symbol_table::{expand_local, LocalLabels, SymbolTable};
use crate::core::text::{find_ci, find_word_ci, is_space, is_sym_char, starts_with_word};
use crate::m6809::table::{find_mnemonic, OPCODES};
use crate::m6809::Cpu;

pub use output::{StoreFormat, StoreRequest};

pub const DEFAULT_ERROR_LIMIT: u32 = 10;
const MAX_MACRO_DEPTH: usize = 32;

/// Which pass is running. Pass 1 sizes instructions and collects symbols,
/// pass 2 emits bytes and the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    One,
    Two,
}

/// Assembly-wide options, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub ignore_case: bool,
    pub motorola: bool,
    pub line_numbers: bool,
    pub optimize: bool,
    pub preprocess: bool,
    pub quiet: bool,
    pub strip_hex: bool,
    pub preset: u8,
    pub error_limit: u32,
    /// Substituted for `$DATE` in BYTE data.
    pub date: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            ignore_case: false,
            motorola: false,
            line_numbers: false,
            optimize: false,
            preprocess: false,
            quiet: false,
            strip_hex: false,
            preset: 0,
            error_limit: DEFAULT_ERROR_LIMIT,
            date: String::new(),
        }
    }
}

/// All mutable assembler state, threaded through the pass driver and the
/// per-line handlers.
pub struct Assembler {
    pub cfg: Config,
    pub cpu: Cpu,
    pub pass: Pass,
    pub pc: i32,
    pub bss: i32,
    pub dp: i32,
    pub enum_value: i32,
    pub rom: RomImage,
    pub symbols: SymbolTable,
    pub locals: LocalLabels,
    pub macros: MacroTable,
    pub frames: Vec<MacroFrame>,
    pub cond: ConditionalStack,
    pub stores: Vec<StoreRequest>,
    pub scope: String,
    pub module_start: i32,
    pub forced_end: bool,
    pub motorola: bool,
    pub form_ln: i32,
    pub err_count: u32,
    pub diagnostics: Vec<Diagnostic>,
    pub opt_hints: u32,
    pub aborted: bool,
    pub debug_out: Option<BufWriter<File>>,
    pub pp_out: Option<BufWriter<File>>,
    pub opt_out: Option<BufWriter<File>>,
    /// Per-instruction forced addressing mode from `<` / `>` prefixes.
    pub forced: Forced,
    /// Optimizer note appended to the current listing line.
    pub hint: String,
    /// Current raw source line and location, for diagnostics and listing.
    pub line: String,
    pub line_no: u32,
    pub file_name: String,
    /// Name parsed by the most recent label definition.
    last_label: String,
}

/// Keywords of the pseudo-op table, checked case-insensitively.
pub const DIRECTIVES: &[&str] = &[
    "ALIGN", "BITS", "BSS", "BYTE", "C5TO3", "CASE", "CMAP", "CPU", "END", "ENDMOD", "ENDSUB",
    "EXTERN", "FCB", "FCC", "FDB", "FILL", "FORMLN", "INCLUDE", "INTERN", "LIST", "LOAD", "LONG",
    "MODULE", "ORG", "RMB", "REAL", "SECT", "SETDP", "SIZE", "STORE", "SUBROUTINE", "TTL", "WORD",
];

fn reserved_names() -> HashSet<String> {
    let mut reserved: HashSet<String> =
        OPCODES.iter().map(|row| row.mnemonic.to_string()).collect();
    reserved.extend(DIRECTIVES.iter().map(|kw| kw.to_string()));
    reserved
}

impl Assembler {
    pub fn new(cfg: Config) -> Self {
        let mut symbols = SymbolTable::new(reserved_names());
        symbols.ignore_case = cfg.ignore_case;
        let preset = cfg.preset;
        let motorola = cfg.motorola;
        Self {
            cfg,
            cpu: Cpu::H6309,
            pass: Pass::One,
            pc: -1,
            bss: 0,
            dp: 0,
            enum_value: -1,
            rom: RomImage::new(preset),
            symbols,
            locals: LocalLabels::new(),
            macros: MacroTable::new(),
            frames: Vec::new(),
            cond: ConditionalStack::new(),
            stores: Vec::new(),
            scope: String::new(),
            module_start: 0,
            forced_end: false,
            motorola,
            form_ln: 0,
            err_count: 0,
            diagnostics: Vec::new(),
            opt_hints: 0,
            aborted: false,
            debug_out: None,
            pp_out: None,
            opt_out: None,
            forced: Forced::None,
            hint: String::new(),
            line: String::new(),
            line_no: 0,
            file_name: String::new(),
            last_label: String::new(),
        }
    }

    pub fn pass2(&self) -> bool {
        self.pass == Pass::Two
    }

    fn err(&self, kind: AsmErrorKind, msg: &str) -> AsmError {
        AsmError::new(kind, msg, None)
    }

    /// Evaluate a complete operand string.
    pub(crate) fn eval_all(&mut self, text: &str) -> Result<i32, AsmError> {
        let record = self.pass2();
        let mut ev = Evaluator::new(
            &mut self.symbols,
            &self.scope,
            self.pc,
            self.line_no,
            record,
            self.motorola,
        );
        let result = ev.eval_all(text);
        let forced = ev.forced;
        if forced != Forced::None {
            self.forced = forced;
        }
        result.map_err(|e| e.into_asm_error(0))
    }

    /// Evaluate a leading expression; returns the value and consumed length.
    pub(crate) fn eval_prefix(&mut self, text: &str) -> Result<(i32, usize), AsmError> {
        let record = self.pass2();
        let mut ev = Evaluator::new(
            &mut self.symbols,
            &self.scope,
            self.pc,
            self.line_no,
            record,
            self.motorola,
        );
        let result = ev.eval(text);
        let forced = ev.forced;
        if forced != Forced::None {
            self.forced = forced;
        }
        result.map_err(|e| e.into_asm_error(0))
    }

    /// Separate the operand from the trailing comment and capture a leading
    /// `<` or `>` forced-mode prefix.
    pub(crate) fn extract_op_text(&mut self, text: &str) -> String {
        self.forced = Forced::None;
        let mut t = text.trim_start();
        if let Some(first) = t.as_bytes().first() {
            if *first == b'<' {
                self.forced = Forced::Direct;
                t = &t[1..];
            } else if *first == b'>' {
                self.forced = Forced::Extended;
                t = &t[1..];
            }
        }
        if self.motorola {
            let end = t.find(' ').unwrap_or(t.len());
            return t[..end].to_string();
        }
        let bytes = t.as_bytes();
        let mut in_quote = false;
        let mut in_apo = false;
        let mut end = bytes.len();
        for (idx, &c) in bytes.iter().enumerate() {
            if c == b'"' && !in_apo {
                in_quote = !in_quote;
            }
            if c == b'\'' && !in_quote {
                in_apo = !in_apo;
            }
            if c == b';' && !in_quote && !in_apo {
                end = idx;
                break;
            }
        }
        t[..end].trim_end().to_string()
    }

    /// Operand that must evaluate completely (ORG, ALIGN, SETDP, ...).
    pub(crate) fn extract_value(&mut self, text: &str) -> Result<i32, AsmError> {
        let op = self.extract_op_text(text);
        if op.is_empty() {
            return Err(self.err(AsmErrorKind::Syntax, "Empty operand"));
        }
        self.eval_all(&op)
    }

    fn debug_line(&mut self, text: &str) {
        if let Some(out) = &mut self.debug_out {
            let _ = writeln!(out, "{text}");
        }
    }

    /// Strip the address/code columns of a previously generated listing so
    /// its source can be re-assembled. The detection always skips the
    /// columns for parsing; `-x` additionally rewrites the echoed line.
    fn skip_hex_code(&self, line: &str) -> usize {
        let bytes = line.as_bytes();
        if bytes.len() > 20
            && bytes[0] != b';'
            && bytes[4].is_ascii_digit()
            && is_space(bytes[5])
            && bytes[6].is_ascii_hexdigit()
            && bytes[7].is_ascii_hexdigit()
            && bytes[8].is_ascii_hexdigit()
            && bytes[9].is_ascii_hexdigit()
        {
            20
        } else {
            0
        }
    }

    // ------------------------------------------------------------------
    // Label definition
    // ------------------------------------------------------------------

    /// Parse a leading symbol, expanding a `.`-local with the active scope.
    fn take_symbol<'s>(&self, text: &'s str) -> (String, &'s str) {
        let bytes = text.as_bytes();
        let mut pos = 0usize;
        if bytes.first() == Some(&b'.') {
            pos = 1;
        }
        while pos < bytes.len() && is_sym_char(bytes[pos]) {
            pos += 1;
        }
        (expand_local(&text[..pos], &self.scope), &text[pos..])
    }

    /// Define a label: positional, `=`/`EQU`, `SET`, `ENUM` or `name BSS n`.
    /// Returns the bound value and the unparsed remainder of the line.
    pub(crate) fn define_label<'s>(
        &mut self,
        text: &'s str,
        cli_locked: bool,
    ) -> Result<(i32, &'s str), AsmError> {
        let (name, rest) = self.take_symbol(text);
        if name.is_empty() {
            return Err(self.err(AsmErrorKind::Syntax, "Missing label name"));
        }
        self.last_label = name.clone();
        let mut rest = rest;
        if rest.starts_with(':') {
            rest = &rest[1..];
        }
        let rest = rest.trim_start();

        // = / EQU define constants, SET a reassignable variable, ENUM an
        // auto-incrementing constant.
        let def = if rest.starts_with('=') {
            Some((1usize, DefKind::Equ))
        } else if starts_with_word(rest, "EQU") {
            Some((3, DefKind::Equ))
        } else if starts_with_word(rest, "SET") {
            Some((3, DefKind::Set))
        } else if starts_with_word(rest, "ENUM") {
            Some((4, DefKind::Enum))
        } else {
            None
        };

        if let Some((len, kind)) = def {
            let after = &rest[len..];
            let op = self.extract_op_text(after);
            let index = self.symbols.index_for_define(&name, self.line_no)?;
            let value = if !op.is_empty() {
                let value = self.eval_all(&op)?;
                if kind == DefKind::Enum {
                    self.enum_value = value;
                }
                value
            } else if kind == DefKind::Enum {
                self.enum_value += 1;
                self.enum_value
            } else {
                return Err(self.err(AsmErrorKind::Syntax, "Missing operand"));
            };
            let entry = self.symbols.get_mut(index);
            if entry.locked {
                // Command-line definitions win silently.
            } else if entry.value == UNDEF || kind == DefKind::Set || entry.value == value {
                entry.value = value;
            } else {
                let message = match kind {
                    DefKind::Enum => "ENUM phase error".to_string(),
                    _ => format!(
                        "Multiple assignments for label [{}]: ${:04x} and ${:04x}",
                        name,
                        entry.value & 0xffff,
                        value & 0xffff
                    ),
                };
                return Err(self.err(AsmErrorKind::Duplicate, &message));
            }
            if cli_locked {
                self.symbols.get_mut(index).locked = true;
            }
            return Ok((value, ""));
        }

        if starts_with_word(rest, "BSS") {
            let size = self.extract_value(&rest[3..])?;
            let index = self.symbols.index_for_define(&name, self.line_no)?;
            let entry = self.symbols.get_mut(index);
            if entry.value == UNDEF {
                entry.value = self.bss;
            } else if entry.value != self.bss {
                return Err(self.err(
                    AsmErrorKind::Duplicate,
                    &format!("Multiple assignments for BSS label [{name}]"),
                ));
            }
            let value = self.bss;
            self.bss += size;
            return Ok((value, ""));
        }

        // Positional label bound to the current PC.
        let index = self.symbols.index_for_define(&name, self.line_no)?;
        let is_pass2 = self.pass2();
        let entry = self.symbols.get_mut(index);
        if entry.value == UNDEF {
            entry.value = self.pc;
        } else if entry.value != self.pc && !entry.locked {
            let err = if is_pass2 {
                AsmError::new(
                    AsmErrorKind::Phase,
                    &format!(
                        "Phase error label [{}]: pass 1 ${:04x}, pass 2 ${:04x}",
                        name,
                        entry.value & 0xffff,
                        self.pc & 0xffff
                    ),
                    None,
                )
            } else {
                AsmError::new(
                    AsmErrorKind::Duplicate,
                    &format!("Multiple label definition [{name}]"),
                    None,
                )
            };
            return Err(err);
        }
        let value = if entry.locked { entry.value } else { self.pc };
        if cli_locked {
            self.symbols.get_mut(index).locked = true;
        }
        Ok((value, rest))
    }

    /// Define a locked symbol from a command-line `-D name=expr`.
    pub fn define_cli_symbol(&mut self, text: &str) -> Result<(), AsmError> {
        self.define_label(text, true).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Conditional assembly
    // ------------------------------------------------------------------

    /// Handle if/ifdef/ifndef/else/endif and `#error`. Returns true when the
    /// line was consumed.
    fn check_condition<W: Write>(
        &mut self,
        text: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<bool, AsmError> {
        let t = text.strip_prefix('#').unwrap_or(text);

        if starts_with_word(t, "error") {
            if self.pass == Pass::One && !self.cond.skipping() {
                let message = t[5..].trim();
                return Err(AsmError::new(AsmErrorKind::Structural, message, None));
            }
            return Ok(false);
        }

        let cond = if starts_with_word(t, "ifdef") {
            Some((5usize, CondKind::IfDef))
        } else if starts_with_word(t, "ifndef") {
            Some((6, CondKind::IfNDef))
        } else if starts_with_word(t, "if") {
            Some((2, CondKind::If))
        } else {
            None
        };

        if let Some((len, kind)) = cond {
            let (value, _) = self.eval_prefix(&t[len..])?;
            let skip = match kind {
                CondKind::IfDef => value == UNDEF,
                CondKind::IfNDef => value != UNDEF,
                CondKind::If => value == UNDEF || value == 0,
            };
            self.cond.push(skip)?;
            listing
                .cond_line(self.line_no, self.cond.top_skipping(), &self.line)
                .map_err(io_error)?;
            return Ok(true);
        }

        if starts_with_word(t, "else") {
            self.cond.flip();
            listing
                .value_less_line(self.line_no, &self.line)
                .map_err(io_error)?;
            return Ok(true);
        }

        if starts_with_word(t, "endif") {
            self.cond.pop()?;
            listing
                .value_less_line(self.line_no, &self.line)
                .map_err(io_error)?;
            return Ok(true);
        }

        Ok(false)
    }

    // ------------------------------------------------------------------
    // Macros
    // ------------------------------------------------------------------

    /// Record a macro definition, consuming body lines up to `ENDM`.
    /// Pass 2 re-encounters the definition and only reproduces it in the
    /// listing.
    fn record_macro<W: Write>(
        &mut self,
        text: &str,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let suffix_style = !starts_with_word(text, "MACRO");
        let mut t = if suffix_style { text } else { &text[5..] };
        t = t.trim_start();
        let (name, after_name) = self.take_symbol(t);
        if name.is_empty() {
            return Err(self.err(AsmErrorKind::Macro, "Missing macro name"));
        }
        let mut t = after_name;
        if suffix_style {
            let at = find_ci(t, "MACRO")
                .ok_or_else(|| self.err(AsmErrorKind::Macro, "Missing MACRO keyword"))?;
            t = &t[at + 5..];
        }
        t = t.trim_start();
        if let Some(stripped) = t.strip_prefix('(') {
            t = stripped;
        }
        let params = scan_def_params(t);

        let ignore_case = self.symbols.ignore_case;
        if self.macros.match_at(&name, ignore_case).is_some() {
            if self.pass == Pass::One {
                // Consume the stale body so it is not assembled.
                while let Some(SourceEvent::Line(line)) = stream.next_event() {
                    if find_ci(&line, "ENDM").is_some() {
                        break;
                    }
                }
                return Err(self.err(
                    AsmErrorKind::Duplicate,
                    &format!("Duplicate macro [{name}]"),
                ));
            }
            // Pass 2: reproduce the definition in the listing only.
            listing
                .macro_line(self.line_no, &self.line)
                .map_err(io_error)?;
            while let Some(SourceEvent::Line(line)) = stream.next_event() {
                listing
                    .macro_line(stream.line_no(), &line)
                    .map_err(io_error)?;
                if let Some(out) = &mut self.pp_out {
                    let _ = writeln!(out, "{line}");
                }
                if find_ci(&line, "ENDM").is_some() {
                    break;
                }
            }
            return Ok(());
        }

        let style = if suffix_style {
            MacroStyle::Suffix
        } else {
            MacroStyle::Prefix
        };
        let mut body = Vec::new();
        loop {
            match stream.next_event() {
                Some(SourceEvent::Line(line)) => {
                    if find_ci(&line, "ENDM").is_some() {
                        break;
                    }
                    body.push(encode_body_line(&line, &params, ignore_case));
                }
                _ => {
                    return Err(self.err(
                        AsmErrorKind::Macro,
                        &format!("ENDM missing for macro [{name}]"),
                    ))
                }
            }
        }
        let index = self.macros.add(MacroDef {
            name,
            body,
            narg: params.len(),
            style,
            column: 0,
        })?;
        let def = self.macros.get(index);
        let info = format!(
            "Macro [{}] args {} style {:?}",
            def.name, def.narg, def.style
        );
        self.debug_line(&info);
        Ok(())
    }

    /// Expand a macro call if the text names one. Returns true on expansion.
    fn expand_macro<W: Write>(
        &mut self,
        text: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<bool, AsmError> {
        let ignore_case = self.symbols.ignore_case;
        let Some(index) = self.macros.match_at(text, ignore_case) else {
            return Ok(false);
        };
        if self.frames.len() >= MAX_MACRO_DEPTH {
            return Err(self.err(AsmErrorKind::Structural, "Macro expansion too deep"));
        }
        let name_len = self.macros.get(index).name.len();
        let mut rest = text[name_len..].trim_start();
        if let Some(stripped) = rest.strip_prefix('(') {
            rest = stripped;
        }
        let op = self.extract_op_text(rest);
        let narg = self.macros.get(index).narg;
        let args = scan_call_args(&op, narg);
        if args.len() != narg {
            return Err(self.err(
                AsmErrorKind::Macro,
                &format!(
                    "Wrong # of arguments in [{}]: called ({}) defined ({})",
                    self.macros.get(index).name,
                    args.len(),
                    narg
                ),
            ));
        }
        self.frames.push(MacroFrame {
            def: index,
            line: 0,
            args,
        });
        if self.pass2() {
            let column = self.line.len() - text.len();
            self.macros.get_mut(index).column = column;
            let def = self.macros.get(index);
            let info = format!("Expanding [{}] at column {}", def.name, def.column);
            self.debug_line(&info);
            listing.plain(self.line_no, &self.line).map_err(io_error)?;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Line classification
    // ------------------------------------------------------------------

    /// Process one source line in the current pass.
    pub fn process_line<W: Write>(
        &mut self,
        raw: &str,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        self.line = raw.to_string();
        let skip = self.skip_hex_code(raw);
        if skip > 0 && self.cfg.strip_hex {
            self.line = raw[skip..].to_string();
        }
        let work = self.line.clone();
        let text = if skip > 0 && !self.cfg.strip_hex {
            &work[skip..]
        } else {
            &work[..]
        };
        let text = text.trim_start();

        if self.check_condition(text, listing)? {
            return Ok(());
        }
        if self.cond.skipping() {
            listing.skip_line(self.line_no, &self.line).map_err(io_error)?;
            return Ok(());
        }
        if self.pass2() && self.frames.is_empty() {
            if let Some(out) = &mut self.pp_out {
                let _ = writeln!(out, "{}", self.line);
            }
        }

        if text.starts_with("/*") || text.starts_with("\\*") {
            self.motorola = true;
            listing.plain(self.line_no, &self.line).map_err(io_error)?;
            return Ok(());
        }
        if text.is_empty() {
            listing.empty(self.line_no).map_err(io_error)?;
            return Ok(());
        }
        if text.starts_with(';') {
            listing.plain(self.line_no, &self.line).map_err(io_error)?;
            return Ok(());
        }
        if text.starts_with('*') && !text[1..].trim_start().starts_with('=') {
            listing.plain(self.line_no, &self.line).map_err(io_error)?;
            return Ok(());
        }

        // Anonymous local labels.
        let mut rest = text;
        let mut line_head = true;
        if rest.starts_with('-') {
            let depth = rest.bytes().take_while(|&c| c == b'-').count();
            if depth <= 10 {
                self.locals.define_backward(depth, self.pc);
                rest = rest[depth..].trim_start();
                line_head = false;
            }
        } else if rest.starts_with('+') {
            let depth = rest.bytes().take_while(|&c| c == b'+').count();
            if depth <= 10 {
                if self.pass == Pass::One {
                    self.locals.record_forward(depth, self.pc)?;
                }
                rest = rest[depth..].trim_start();
                line_head = false;
            }
        }

        if self.check_pseudo(rest, stream, listing)? {
            return Ok(());
        }

        let mut mne = None;
        let first = rest.as_bytes().first().copied().unwrap_or(0);
        if first == b'.' || first == b'_' || first.is_ascii_alphabetic() {
            if find_word_ci(rest, "MACRO").is_some() {
                return self.record_macro(rest, stream, listing);
            }
            mne = find_mnemonic(rest, self.cpu);
            if mne.is_none() {
                if self.expand_macro(rest, listing)? {
                    return Ok(());
                }
                let should_define = line_head
                    || find_word_ci(rest, "SET").is_some()
                    || find_word_ci(rest, "ENUM").is_some()
                    || find_word_ci(rest, "EQU").is_some()
                    || rest.contains('=');
                let mut value = UNDEF;
                if should_define {
                    let (v, after) = self.define_label(rest, false)?;
                    value = v;
                    rest = after.trim_start();
                }
                if !rest.is_empty() && self.expand_macro(rest, listing)? {
                    return Ok(());
                }
                if rest.is_empty() || rest.starts_with(';') {
                    listing
                        .value_line(self.line_no, value, &self.line)
                        .map_err(io_error)?;
                    return Ok(());
                }
            }
        }

        if self.forced_end {
            return Ok(());
        }
        if rest.is_empty() || rest.starts_with(';') {
            return Ok(());
        }
        if let Some(after) = rest.strip_prefix('&') {
            return self.set_bss(after, listing);
        }
        if let Some(after) = rest.strip_prefix('*') {
            return self.set_pc(after, listing);
        }
        if self.check_pseudo(rest, stream, listing)? {
            return Ok(());
        }
        if mne.is_none() {
            mne = find_mnemonic(rest, self.cpu);
        }
        if let Some(index) = mne {
            let mnemonic_len = OPCODES[index].mnemonic.len();
            let op = self.extract_op_text(&rest[mnemonic_len..]);
            self.debug_line(&format!("OpText = [{op}]"));
            return self.encode_instruction(index, &op, listing);
        }

        Err(self.err(AsmErrorKind::Syntax, "Syntax error"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefKind {
    Equ,
    Set,
    Enum,
}

#[derive(Debug, Clone, Copy)]
enum CondKind {
    If,
    IfDef,
    IfNDef,
}

/// Listing output failures become I/O errors at the assembler level.
pub(crate) fn io_error(err: std::io::Error) -> AsmError {
    AsmError::new(AsmErrorKind::Io, &err.to_string(), None)
}
