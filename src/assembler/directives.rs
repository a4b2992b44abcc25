// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pseudo-op handlers.

use super::{io_error, Assembler, Pass, StoreFormat, StoreRequest};
use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::expr::UNDEF;
use crate::core::listing::ListingWriter;
use crate::core::source::SourceStream;
use crate::core::text::{find_ci, is_space, skip_space, starts_with_word};
use crate::m6809::Cpu;

use std::fs;
use std::io::Write;

pub const MAX_STORES: usize = 20;

impl Assembler {
    /// Dispatch a pseudo-op if the text starts with one. Returns true when
    /// the line was consumed.
    pub(crate) fn check_pseudo<W: Write>(
        &mut self,
        text: &str,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<bool, AsmError> {
        let t = text.trim_start();
        let Some(keyword) = super::DIRECTIVES
            .iter()
            .find(|kw| starts_with_word(t, kw))
        else {
            return Ok(false);
        };
        let rest = &t[keyword.len()..];
        match *keyword {
            "ALIGN" => self.dir_align(rest, listing)?,
            "BITS" => self.dir_bits(rest, listing)?,
            "BSS" => self.dir_bss(rest, listing)?,
            "BYTE" | "FCB" | "FCC" => self.dir_byte(rest, listing)?,
            "C5TO3" => self.dir_c5to3(rest, listing)?,
            "CASE" => self.dir_case(rest, listing)?,
            "CMAP" => self.dir_cmap(rest, listing)?,
            "CPU" => self.dir_cpu(rest, listing)?,
            "END" => {
                self.forced_end = true;
                listing.plain(self.line_no, &self.line).map_err(io_error)?;
            }
            "ENDMOD" | "ENDSUB" => self.dir_endsub(listing)?,
            "EXTERN" | "INTERN" | "TTL" => {
                listing.plain(self.line_no, &self.line).map_err(io_error)?;
            }
            "FDB" | "WORD" => self.dir_word(rest, listing)?,
            "FILL" => self.dir_fill(rest, listing)?,
            "FORMLN" => self.dir_formln(rest, listing)?,
            "INCLUDE" => self.dir_include(rest, stream, listing)?,
            "LIST" => self.dir_list(rest, listing)?,
            "LOAD" => self.dir_load(rest, listing)?,
            "LONG" => self.dir_long(rest, listing)?,
            "MODULE" | "SUBROUTINE" => self.dir_module(rest, listing)?,
            "ORG" => self.dir_org(rest, listing)?,
            "RMB" => self.dir_rmb(rest, listing)?,
            "REAL" => self.dir_real(rest, listing)?,
            "SECT" => self.dir_sect(rest, listing)?,
            "SETDP" => self.dir_setdp(rest, listing)?,
            "SIZE" => self.size_info(listing)?,
            "STORE" => self.dir_store(rest, listing)?,
            _ => unreachable!("unhandled directive {keyword}"),
        }
        if self.pc > 0x10000 {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "Program counter overflow",
                None,
            ));
        }
        Ok(true)
    }

    fn dir_org<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        self.pc = self.extract_value(rest)?;
        listing
            .value_line(self.line_no, self.pc, &self.line)
            .map_err(io_error)
    }

    /// `* = expr` sets the program counter.
    pub(crate) fn set_pc<W: Write>(
        &mut self,
        after_star: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = after_star.trim_start();
        let Some(rest) = t.strip_prefix('=') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Setting PC with \"* = address\" syntax error",
                None,
            ));
        };
        self.dir_org(rest, listing)
    }

    /// `& = expr` sets the BSS counter.
    pub(crate) fn set_bss<W: Write>(
        &mut self,
        after_amp: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = after_amp.trim_start();
        let Some(rest) = t.strip_prefix('=') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing '=' in set BSS & instruction",
                None,
            ));
        };
        self.bss = self.extract_value(rest)?;
        listing
            .value_line(self.line_no, self.bss, &self.line)
            .map_err(io_error)
    }

    fn dir_align<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let align = self.extract_value(rest)?;
        if align > 0 && align <= 0x1000 {
            self.pc += (align - self.pc % align) % align;
        }
        listing
            .value_line(self.line_no, self.pc, &self.line)
            .map_err(io_error)
    }

    fn dir_rmb<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let size = self.extract_value(rest)?;
        if size < 0 {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "Negative RMB size",
                Some(&size.to_string()),
            ));
        }
        listing
            .value_line(self.line_no, self.pc, &self.line)
            .map_err(io_error)?;
        self.pc += size;
        Ok(())
    }

    fn dir_bss<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let size = self.extract_value(rest)?;
        if !(1..=32767).contains(&size) {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "Illegal BSS size",
                Some(&size.to_string()),
            ));
        }
        listing
            .bss_line(self.line_no, self.bss, &self.line)
            .map_err(io_error)?;
        self.bss += size;
        Ok(())
    }

    fn dir_sect<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        if let Some(at) = find_ci(rest, "LOC=") {
            let (value, _) = self.eval_prefix(&rest[at + 4..])?;
            self.pc = value;
        }
        listing
            .value_line(self.line_no, self.pc, &self.line)
            .map_err(io_error)
    }

    fn dir_setdp<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let mut dp = self.extract_value(rest)?;
        if dp > 255 {
            // A full address selects the page via its high byte.
            dp >>= 8;
        }
        self.dp = dp;
        listing
            .byte_value_line(self.line_no, self.dp, &self.line)
            .map_err(io_error)
    }

    fn dir_cpu<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let mut t = rest.trim_start();
        if let Some(stripped) = t.strip_prefix('=') {
            t = stripped;
        }
        let (value, _) = self.eval_prefix(t)?;
        self.cpu = match value {
            6809 => Cpu::M6809,
            6309 => Cpu::H6309,
            _ => {
                return Err(AsmError::new(
                    AsmErrorKind::Directive,
                    "Unknown CPU - use 6809 or 6309",
                    Some(&value.to_string()),
                ))
            }
        };
        listing
            .cpu_line(self.line_no, self.cpu.number(), &self.line)
            .map_err(io_error)
    }

    fn dir_case<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        match rest.trim_start().as_bytes().first() {
            Some(b'+') => self.symbols.ignore_case = false,
            Some(b'-') => self.symbols.ignore_case = true,
            _ => {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Missing '+' or '-' after CASE",
                    None,
                ))
            }
        }
        listing.plain(self.line_no, &self.line).map_err(io_error)
    }

    fn dir_list<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        match rest.trim_start().as_bytes().first() {
            Some(b'+') => listing.enabled = true,
            Some(b'-') => listing.enabled = false,
            _ => {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Missing '+' or '-' after LIST",
                    None,
                ))
            }
        }
        listing.plain(self.line_no, &self.line).map_err(io_error)
    }

    fn dir_formln<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = rest.trim_start();
        let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
        self.form_ln = digits.parse().unwrap_or(0);
        listing
            .byte_value_line(self.line_no, self.form_ln, &self.line)
            .map_err(io_error)
    }

    fn dir_module<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = rest.trim_start();
        let (value, _) = self.define_label(t, false)?;
        self.module_start = value;
        self.scope = self.last_label.clone();
        listing
            .value_line(self.line_no, self.pc, &self.line)
            .map_err(io_error)
    }

    fn dir_endsub<W: Write>(&mut self, listing: &mut ListingWriter<W>) -> Result<(), AsmError> {
        self.size_info(listing)?;
        self.scope.clear();
        self.module_start = 0;
        Ok(())
    }

    /// Print the byte size of the enclosing module.
    pub(crate) fn size_info<W: Write>(
        &mut self,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        if self.module_start == 0 {
            return Ok(());
        }
        let name = self
            .symbols
            .iter()
            .find(|symbol| symbol.value == self.module_start)
            .map(|symbol| symbol.name.clone());
        if let Some(name) = name {
            listing
                .size_line(
                    self.line_no,
                    self.pc,
                    &self.line,
                    Some((self.pc - self.module_start, &name)),
                )
                .map_err(io_error)?;
            self.module_start = 0;
        } else {
            listing
                .size_line(self.line_no, self.pc, &self.line, None)
                .map_err(io_error)?;
        }
        Ok(())
    }

    fn dir_include<W: Write>(
        &mut self,
        rest: &str,
        stream: &mut SourceStream,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = rest.trim_start();
        let Some(inner) = t.strip_prefix('"') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing quoted filename after INCLUDE",
                None,
            ));
        };
        let end = inner.find('"').unwrap_or(inner.len());
        let name = &inner[..end];
        listing.plain(self.line_no, &self.line).map_err(io_error)?;
        stream.push_include(name)
    }

    // --------------------------------------------------------------
    // Data-emitting directives
    // --------------------------------------------------------------

    fn dir_byte<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let bytes = self.parse_byte_data(rest)?;
        if bytes.is_empty() {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing byte data",
                None,
            ));
        }
        self.symbols.set_bytes_at(self.pc, bytes.len() as i32);
        if self.pass2() {
            for (offset, byte) in bytes.iter().enumerate() {
                self.rom.put(self.pc + offset as i32, *byte as i32)?;
            }
            listing
                .byte_data(self.line_no, self.pc, &bytes, &self.line)
                .map_err(io_error)?;
        }
        self.pc += bytes.len() as i32;
        Ok(())
    }

    fn parse_byte_data(&mut self, rest: &str) -> Result<Vec<u8>, AsmError> {
        let bytes_in = rest.as_bytes();
        let mut out = Vec::new();
        let mut pos = skip_space(rest, 0);
        while pos < bytes_in.len() && bytes_in[pos] != b';' {
            if self.motorola && bytes_in[pos] == b' ' {
                break;
            }
            pos = skip_space(rest, pos);
            if pos >= bytes_in.len() || bytes_in[pos] == b';' {
                break;
            }
            let delim = bytes_in[pos];
            if rest[pos..].starts_with("$DATE") {
                out.extend_from_slice(self.cfg.date.as_bytes());
                pos += 5;
            } else if delim == b'"' || delim == b'\'' {
                pos += parse_ascii(&rest[pos..], &mut out);
            } else {
                let (value, used) = self.eval_prefix(&rest[pos..])?;
                if value == UNDEF && self.pass2() {
                    return Err(AsmError::new(
                        AsmErrorKind::Symbol,
                        "Undefined symbol in BYTE data",
                        None,
                    )
                    .with_column(Some(pos)));
                }
                if value > 255 || value < -127 {
                    out.push((value >> 8) as u8);
                }
                out.push(value as u8);
                pos += used;
            }
            if self.motorola && bytes_in.get(pos) == Some(&b' ') {
                break;
            }
            while pos < bytes_in.len() && bytes_in[pos] != b',' && bytes_in[pos] != b';' {
                pos += 1;
            }
            if bytes_in.get(pos) == Some(&b',') {
                pos += 1;
            }
        }
        Ok(out)
    }

    fn dir_word<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let bytes_in = rest.as_bytes();
        let mut out: Vec<u8> = Vec::new();
        let mut pos = skip_space(rest, 0);
        while pos < bytes_in.len() && bytes_in[pos] != b';' {
            let (value, used) = self.eval_prefix(&rest[pos..])?;
            out.push((value >> 8) as u8);
            out.push(value as u8);
            pos += used;
            while pos < bytes_in.len() && bytes_in[pos] != b',' && bytes_in[pos] != b';' {
                pos += 1;
            }
            if bytes_in.get(pos) == Some(&b',') {
                pos += 1;
            }
        }
        if out.is_empty() {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing WORD data",
                None,
            ));
        }
        self.symbols.set_bytes_at(self.pc, out.len() as i32);
        if self.pass2() {
            for (offset, byte) in out.iter().enumerate() {
                self.rom.put(self.pc + offset as i32, *byte as i32)?;
            }
            listing
                .word_data(self.line_no, self.pc, &out, &self.line)
                .map_err(io_error)?;
        }
        self.pc += out.len() as i32;
        Ok(())
    }

    fn dir_long<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let bytes_in = rest.as_bytes();
        let mut out: Vec<u8> = Vec::new();
        let mut pos = skip_space(rest, 0);
        while pos < bytes_in.len() && bytes_in[pos] != b';' {
            let (value, used) = self.eval_prefix(&rest[pos..])?;
            out.extend_from_slice(&[
                (value >> 24) as u8,
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ]);
            pos += used;
            while pos < bytes_in.len() && bytes_in[pos] != b',' && bytes_in[pos] != b';' {
                pos += 1;
            }
            if bytes_in.get(pos) == Some(&b',') {
                pos += 1;
            }
        }
        if out.len() < 4 {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing LONG data",
                None,
            ));
        }
        self.symbols.set_bytes_at(self.pc, out.len() as i32);
        if self.pass2() {
            for (offset, byte) in out.iter().enumerate() {
                self.rom.put(self.pc + offset as i32, *byte as i32)?;
            }
            listing
                .long_data(self.line_no, self.pc, &out, &self.line)
                .map_err(io_error)?;
        }
        self.pc += out.len() as i32;
        Ok(())
    }

    fn dir_fill<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let (count, used) = self.eval_prefix(rest)?;
        if !(0..=0xffff).contains(&count) {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "Illegal FILL multiplier",
                Some(&count.to_string()),
            ));
        }
        let after = rest[used..].trim_start();
        let Some(inner) = after.strip_prefix('(') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing '(' before FILL value",
                None,
            ));
        };
        let (value, _) = self.eval_prefix(inner)?;
        let value = (value & 0xff) as u8;
        if self.pass2() {
            for offset in 0..count {
                self.rom.put(self.pc + offset, value as i32)?;
            }
            listing
                .fill_line(self.line_no, self.pc, count, value, &self.line)
                .map_err(io_error)?;
        }
        self.pc += count;
        Ok(())
    }

    fn dir_bits<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let value = parse_bitmap(rest)?;
        if self.pass2() {
            self.rom.put(self.pc, value as i32)?;
            listing
                .bits_line(self.line_no, self.pc, value, &self.line)
                .map_err(io_error)?;
        }
        self.pc += 1;
        Ok(())
    }

    fn dir_cmap<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let scanline = match rest.as_bytes().first().copied() {
            Some(c @ b'0'..=b'7') => (c - b'0') as i32,
            _ => -1,
        };
        let value = parse_bitmap(rest)?;
        if self.pass2() {
            let addr = if scanline < 0 {
                self.pc
            } else {
                self.pc + 2 * scanline - 7
            };
            self.rom.put(addr, value as i32)?;
            listing
                .cmap_line(self.line_no, self.pc, value, &self.line)
                .map_err(io_error)?;
        }
        self.pc += 1;
        Ok(())
    }

    fn dir_c5to3<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = rest.trim_start();
        let b = t.as_bytes();
        if b.len() < 7 || b[0] != b'"' || b[6] != b'"' {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Need 5 character string",
                None,
            ));
        }
        // Pack four characters into 20 bits; the fifth selects a type tag.
        let mut value: i32 = 0;
        for index in (1..=4).rev() {
            let mut c = b[index] as i32;
            if c == b' ' as i32 {
                c = 0x40;
            }
            if c == b'2' as i32 {
                c = b'Z' as i32 + 1;
            }
            if c == b'3' as i32 {
                c = b'Z' as i32 + 2;
            }
            if !(b'?' as i32..=b'Z' as i32 + 2).contains(&c) {
                return Err(AsmError::new(
                    AsmErrorKind::Lexical,
                    "Illegal character in C5TO3 string",
                    None,
                ));
            }
            value = (value << 5) | (c - b'?' as i32);
        }
        match b[5] {
            b'C' => value |= 1 << 20,
            b'D' => value |= 2 << 20,
            b'R' => value |= 3 << 20,
            b'W' => value |= 4 << 20,
            _ => {}
        }
        if self.pass2() {
            listing
                .c5to3_line(self.line_no, self.pc, value, &self.line)
                .map_err(io_error)?;
            let mut v = value;
            for offset in (0..3).rev() {
                self.rom.put(self.pc + offset, v & 0xff)?;
                v >>= 8;
            }
        }
        self.pc += 3;
        Ok(())
    }

    fn dir_real<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        const MANSIZE: usize = 3;
        let t = rest.trim_start();
        let mut operand = [0u8; 6];
        if let Some(hex) = t.strip_prefix('$') {
            let b = hex.as_bytes();
            for index in 0..=MANSIZE {
                let hi = b.get(index * 2).and_then(|c| (*c as char).to_digit(16));
                let lo = b.get(index * 2 + 1).and_then(|c| (*c as char).to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => operand[index] = ((hi << 4) | lo) as u8,
                    _ => break,
                }
            }
        } else {
            let token: String = t
                .chars()
                .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
                .collect();
            let mut d: f64 = token.parse().unwrap_or(0.0);
            if d != 0.0 {
                let mut sign = 0u8;
                if d < 0.0 {
                    sign = 0x80;
                    d = -d;
                }
                let (mut mantissa, exponent) = frexp(d);
                let exponent = exponent + 0x80;
                if !(1..=255).contains(&exponent) {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        "Exponent out of range",
                        Some(&exponent.to_string()),
                    ));
                }
                operand[0] = exponent as u8;
                mantissa *= 256.0;
                let mut v = mantissa as i32;
                operand[1] = ((v & 127) as u8) | sign;
                mantissa -= v as f64;
                for slot in operand.iter_mut().skip(2) {
                    mantissa *= 256.0;
                    v = mantissa as i32;
                    *slot = v as u8;
                    mantissa -= v as f64;
                }
            }
        }

        // Round to the stored mantissa width.
        if operand[MANSIZE + 1] & 0x80 != 0 {
            let mut carry = true;
            for index in (2..=MANSIZE).rev() {
                operand[index] = operand[index].wrapping_add(1);
                if operand[index] != 0 {
                    carry = false;
                    break;
                }
            }
            if carry {
                if operand[1] == 0x7f {
                    operand[0] = operand[0].wrapping_add(1);
                    operand[1] = 0;
                } else if operand[1] == 0xff {
                    operand[0] = operand[0].wrapping_add(1);
                    operand[1] = 0x80;
                } else {
                    operand[1] = operand[1].wrapping_add(1);
                }
            }
        }

        if self.pass2() {
            for offset in 0..=MANSIZE {
                self.rom.put(self.pc + offset as i32, operand[offset] as i32)?;
            }
            listing
                .real_line(self.line_no, self.pc, &operand[..4], &self.line)
                .map_err(io_error)?;
        }
        self.pc += MANSIZE as i32 + 1;
        Ok(())
    }

    fn dir_load<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        let t = rest.trim_start();
        let (start, advance, quoted) = if t.starts_with('"') {
            (self.pc, true, t)
        } else {
            let (value, used) = self.eval_prefix(t)?;
            if !(0..=0xffff).contains(&value) {
                return Err(AsmError::new(
                    AsmErrorKind::Range,
                    "Illegal start address for LOAD",
                    Some(&value.to_string()),
                ));
            }
            let after = t[used..].trim_start();
            let Some(after) = after.strip_prefix(',') else {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Missing ',' after start address",
                    None,
                ));
            };
            let after = after.trim_start();
            if !after.starts_with('"') {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Missing quote for filename",
                    None,
                ));
            }
            (value, false, after)
        };
        let inner = &quoted[1..];
        let end = inner.find('"').unwrap_or(inner.len());
        let name = &inner[..end];
        listing.plain(self.line_no, &self.line).map_err(io_error)?;

        let data = fs::read(name)
            .map_err(|_| AsmError::new(AsmErrorKind::Io, "Could not LOAD", Some(name)))?;
        if start as usize + data.len() > 0x10000 {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "LOAD violates 64K address space",
                Some(name),
            ));
        }
        if self.pass2() {
            self.rom.lock_loaded(start as usize, data.len())?;
        }
        self.rom.write_loaded(start as usize, &data);
        if advance {
            self.pc += data.len() as i32;
        }
        Ok(())
    }

    fn dir_store<W: Write>(
        &mut self,
        rest: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        if self.pass == Pass::One {
            return Ok(());
        }
        let (start, used) = self.eval_prefix(rest)?;
        if !(0..=0xffff).contains(&start) {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "Illegal start address for STORE",
                Some(&start.to_string()),
            ));
        }
        let after = rest[used..].trim_start();
        let Some(after) = after.strip_prefix(',') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing ',' after start address",
                None,
            ));
        };
        let (length, used) = self.eval_prefix(after)?;
        if !(0..=0x10000).contains(&length) {
            return Err(AsmError::new(
                AsmErrorKind::Range,
                "Illegal length for STORE",
                Some(&length.to_string()),
            ));
        }
        let after = after[used..].trim_start();
        let Some(after) = after.strip_prefix(',') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing ',' after length",
                None,
            ));
        };
        let after = after.trim_start();
        let Some(inner) = after.strip_prefix('"') else {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Missing quote for filename",
                None,
            ));
        };
        let end = inner.find('"').ok_or_else(|| {
            AsmError::new(AsmErrorKind::Lexical, "Unterminated filename", None)
        })?;
        let path = inner[..end].to_string();

        let mut format = StoreFormat::Binary;
        let mut entry = -1;
        let tail = inner[end + 1..].trim_start();
        if let Some(tail) = tail.strip_prefix(',') {
            let (fmt_part, entry_part) = match tail.find(',') {
                Some(comma) => (&tail[..comma], Some(&tail[comma + 1..])),
                None => (tail, None),
            };
            if find_ci(fmt_part, "BIN").is_some() {
                format = StoreFormat::Binary;
            } else if find_ci(fmt_part, "SREC").is_some() || find_ci(fmt_part, "S19").is_some() {
                format = StoreFormat::SRecord;
            } else {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Unknown output file format",
                    None,
                ));
            }
            if let Some(entry_part) = entry_part {
                let (value, _) = self.eval_prefix(entry_part)?;
                if !(0..=0xffff).contains(&value) {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        "Illegal execution start address for STORE",
                        Some(&value.to_string()),
                    ));
                }
                entry = value;
            }
        }

        if self.stores.len() >= MAX_STORES {
            return Err(AsmError::new(
                AsmErrorKind::Structural,
                "Number of storage files exceeds limit",
                Some(&MAX_STORES.to_string()),
            ));
        }
        self.stores.push(StoreRequest {
            start,
            length,
            path,
            format,
            entry,
            records: 0,
        });
        listing.plain(self.line_no, &self.line).map_err(io_error)
    }
}

/// Parse the string bytes of a BYTE/FCB/FCC item, starting at the opening
/// delimiter. Returns the number of input bytes consumed.
fn parse_ascii(text: &str, out: &mut Vec<u8>) -> usize {
    let bytes = text.as_bytes();
    let delim = bytes[0];
    let mut pos = 1usize;
    while pos < bytes.len() && bytes[pos] != delim {
        if bytes[pos] == b'\\' && pos + 1 < bytes.len() {
            pos += 1;
            let value = match bytes[pos] {
                b'r' => 13,
                b'f' => 12,
                b'n' => 10,
                b't' => 9,
                b'a' => 7,
                b'0' => 0,
                b'b' => 29, // bold colour
                b's' => 28, // standard colour
                other => other,
            };
            out.push(value);
            pos += 1;
        } else {
            out.push(bytes[pos]);
            pos += 1;
        }
    }
    if bytes.get(pos) == Some(&delim) {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'^') {
        if let Some(last) = out.last_mut() {
            *last |= 0x80;
        }
        pos += 1;
    }
    pos
}

/// Parse eight `*`/`.` cells of a BITS or CMAP row into a byte.
fn parse_bitmap(rest: &str) -> Result<u8, AsmError> {
    let bytes = rest.as_bytes();
    let mut value = 0u8;
    let mut pos = 0usize;
    for _ in 0..8 {
        value <<= 1;
        pos += 1;
        while pos < bytes.len() && is_space(bytes[pos]) {
            pos += 1;
        }
        match bytes.get(pos) {
            Some(b'*') => value |= 1,
            Some(b'.') => {}
            _ => {
                return Err(AsmError::new(
                    AsmErrorKind::Lexical,
                    "use only '*' for 1 and '.' for 0 in bitmap data",
                    None,
                ))
            }
        }
    }
    Ok(value)
}

/// Split a float into mantissa in [0.5, 1) and a binary exponent.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i32;
    if raw_exp == 0 {
        let (mantissa, exponent) = frexp(x * 2f64.powi(64));
        return (mantissa, exponent - 64);
    }
    let exponent = raw_exp - 1022;
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (mantissa, exponent)
}

#[cfg(test)]
mod tests {
    use super::{frexp, parse_ascii, parse_bitmap};

    #[test]
    fn ascii_escapes_and_high_bit_terminator() {
        let mut out = Vec::new();
        let used = parse_ascii("\"AB\\r\\0\"", &mut out);
        assert_eq!(out, vec![b'A', b'B', 13, 0]);
        assert_eq!(used, 8);

        let mut out = Vec::new();
        parse_ascii("\"HI\"^", &mut out);
        assert_eq!(out, vec![b'H', b'I' | 0x80]);
    }

    #[test]
    fn bitmap_rows() {
        assert_eq!(parse_bitmap(" **..**..").unwrap(), 0b1100_1100);
        assert_eq!(parse_bitmap(" . . . . * * * *").unwrap(), 0x0f);
        assert!(parse_bitmap(" **..x...").is_err());
    }

    #[test]
    fn frexp_splits_mantissa_and_exponent() {
        let (m, e) = frexp(1.0);
        assert_eq!(m, 0.5);
        assert_eq!(e, 1);
        let (m, e) = frexp(6.0);
        assert_eq!(m, 0.75);
        assert_eq!(e, 3);
        let (m, e) = frexp(-0.25);
        assert_eq!(m, -0.5);
        assert_eq!(e, -1);
    }
}
