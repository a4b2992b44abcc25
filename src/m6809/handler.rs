// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoding: addressing-mode selection, post-byte construction,
//! phase-length locking and the peephole branch optimizer.

use super::registers::{is_8bit, scan_push_list, scan_register, tfm_register};
use super::table::{is_imm_to_memory, is_register_bit_op, register_size, AddrMode, OPCODES};
use crate::assembler::{io_error, Assembler, Pass};
use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::expr::{Forced, UNDEF};
use crate::core::listing::ListingWriter;

use std::io::Write;

fn operand_error() -> AsmError {
    AsmError::new(AsmErrorKind::Syntax, "Syntax error in operand", None)
}

/// Map an index-register character to its post-byte bits, or 0x0f for W.
fn post_index_w(c: Option<&u8>) -> Result<i32, AsmError> {
    match c.map(|c| c.to_ascii_uppercase()) {
        Some(b'X') => Ok(0x00),
        Some(b'Y') => Ok(0x20),
        Some(b'U') => Ok(0x40),
        Some(b'S') => Ok(0x60),
        Some(b'W') => Ok(0x0f),
        _ => Err(operand_error()),
    }
}

/// Index register for accumulator-offset forms: exactly one of X, Y, U, S.
fn post_index_reg(text: &str) -> Result<i32, AsmError> {
    if text.len() != 1 {
        return Err(operand_error());
    }
    let reg = post_index_w(text.as_bytes().first())?;
    if reg == 0x0f {
        return Err(operand_error());
    }
    Ok(reg)
}

impl Assembler {
    /// Decode an indexed operand into (post-byte, operand value, operand
    /// length). Handles indirection brackets, accumulator offsets,
    /// auto-increment/decrement, the W-register forms, PC-relative and
    /// constant offsets.
    fn set_post_byte(&mut self, text: &str) -> Result<(i32, i32, i32), AsmError> {
        let mut t = text.trim();
        let mut ind = 0i32;
        if t.len() >= 2 && t.starts_with('[') && t.ends_with(']') {
            ind = 0x10;
            t = &t[1..t.len() - 1];
        }
        let upper = t.to_ascii_uppercase();
        let bytes = upper.as_bytes();

        // Accumulator offset: A,R B,R D,R E,R F,R W,R
        if bytes.len() > 2 && bytes[1] == b',' {
            let suffix = match bytes[0] {
                b'A' => 0x06,
                b'B' => 0x05,
                b'D' => 0x0b,
                b'E' => 0x07,
                b'F' => 0x0a,
                b'W' => 0x0e,
                _ => -1,
            };
            if suffix >= 0 {
                let reg = post_index_reg(&t[2..])?;
                return Ok((0x80 | reg | ind | suffix, UNDEF, 0));
            }
        }

        // PC-relative: the displacement is taken from the address after the
        // instruction, assumed 3 bytes long for the 8-bit form.
        if upper.ends_with(",PCR") || upper.ends_with(",PC") {
            let cut = t.len() - if upper.ends_with(",PCR") { 4 } else { 3 };
            let (value, _) = self.eval_prefix(&t[..cut])?;
            let off = value.wrapping_sub(self.pc + 3);
            if self.forced == Forced::Direct
                || ((-128..128).contains(&off) && self.rom.read(self.pc) != 0x8d)
            {
                return Ok((0x8c | ind, off, 1));
            }
            return Ok((0x8d | ind, off - 1, 2));
        }

        let mut off = 0i32;
        let mut rest = t;
        if !t.starts_with(',') {
            let (value, used) = self.eval_prefix(t)?;
            off = value;
            rest = &t[used..];
        }

        if rest.starts_with(',') && off == 0 {
            // Zero offset with optional auto increment/decrement.
            let rb = rest.as_bytes();
            let mut pos = 1usize;
            let mut dec = 0;
            while rb.get(pos) == Some(&b'-') {
                dec += 1;
                pos += 1;
            }
            let reg = post_index_w(rb.get(pos))?;
            pos += 1;
            let mut inc = 0;
            while rb.get(pos) == Some(&b'+') {
                inc += 1;
                pos += 1;
            }
            let amo = match (inc, dec) {
                (1, 0) => 0x00,
                (2, 0) => 0x01,
                (0, 1) => 0x02,
                (0, 2) => 0x03,
                (0, 0) => 0x04,
                _ => return Err(operand_error()),
            };
            if reg == 0x0f {
                let code = match amo {
                    0x04 => 0x8f, // ,W
                    0x01 => 0xcf, // ,W++
                    0x03 => 0xef, // ,--W
                    _ => return Err(operand_error()),
                };
                let code = if ind != 0 { code + 1 } else { code };
                return Ok((code, UNDEF, 0));
            }
            return Ok((0x80 | reg | ind | amo, UNDEF, 0));
        }

        if rest.starts_with(',') {
            // Constant offset.
            let reg = post_index_w(rest.as_bytes().get(1))?;
            if reg == 0x0f {
                return Ok((if ind != 0 { 0xb0 } else { 0xaf }, off, 2));
            }
            if self.forced != Forced::Extended && (-16..16).contains(&off) && ind == 0 {
                return Ok((reg | (off & 0x1f), off, 0));
            }
            if self.forced == Forced::Direct || (-128..128).contains(&off) {
                return Ok((0x80 | reg | ind | 0x08, off, 1));
            }
            return Ok((0x80 | reg | ind | 0x09, off, 2));
        }

        Err(operand_error())
    }

    fn opt_note(&mut self, text: &str) {
        self.opt_hints += 1;
        if let Some(out) = &mut self.opt_out {
            let _ = writeln!(out, "{text}");
        }
    }

    /// Pass 1: store the opcode bytes and lock the instruction length.
    fn set_instruction_length(&mut self, oc: i32, il: i32) -> Result<(), AsmError> {
        if oc >= 0 {
            if oc < 256 {
                self.rom.put(self.pc, oc)?;
            } else {
                self.rom.put(self.pc, oc >> 8)?;
                self.rom.put(self.pc + 1, oc)?;
            }
        }
        self.rom.set_length(self.pc, il)
    }

    /// Encode one instruction and advance the program counter.
    pub(crate) fn encode_instruction<W: Write>(
        &mut self,
        mne: usize,
        op_text: &str,
        listing: &mut ListingWriter<W>,
    ) -> Result<(), AsmError> {
        if self.pc < 0 {
            return Err(AsmError::new(
                AsmErrorKind::Instruction,
                "Undefined program counter (PC)",
                None,
            ));
        }
        let row = &OPCODES[mne];
        let mnemonic = row.mnemonic;

        let mut v = UNDEF;
        let mut pb: i32 = -1;
        let mut ql: i32 = 0;
        let mut ol: i32;
        let mut il: i32;
        let mut oc: i32;
        let mut nops: i32 = 0;

        // Immediate-to-memory (OIM/AIM/EIM/TIM): the value is folded into a
        // pseudo 16-bit opcode, the rest selects direct/indexed/extended.
        let mut xim: i32 = 0;
        let mut rest: &str = op_text;
        if is_imm_to_memory(mne) {
            let t = rest.trim_start();
            let Some(after) = t.strip_prefix('#') else {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Immediate operand must start with '#'",
                    None,
                ));
            };
            let (value, used) = self.eval_prefix(after)?;
            xim = (row.opcode(AddrMode::Extended) << 8) | (value & 0xff);
            let after = after[used..].trim_start();
            let Some(addr) = after.strip_prefix(',') else {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Immediate value must be followed by comma",
                    None,
                ));
            };
            rest = addr;
        }

        if row.opcode(AddrMode::Inherent) >= 0 {
            oc = row.opcode(AddrMode::Inherent);
            ol = 1 + (oc > 255) as i32;
            il = ol;
        } else if op_text.is_empty() {
            return Err(AsmError::new(AsmErrorKind::Syntax, "Missing operand", None));
        } else if op_text.starts_with('\'') {
            return Err(AsmError::new(
                AsmErrorKind::Syntax,
                "Operand cannot start with apostrophe",
                None,
            ));
        } else if row.opcode(AddrMode::Register) >= 0 {
            oc = row.opcode(AddrMode::Register);
            ol = 1 + (oc > 255) as i32;
            il = ol + 1;
            if mnemonic.starts_with('P') {
                pb = scan_push_list(op_text)? as i32;
            } else if mnemonic == "TFM" {
                let (r1, q) = tfm_register(op_text)?;
                let (p1, q) = match q.as_bytes().first().copied() {
                    Some(c @ (b'+' | b'-')) => (c, &q[1..]),
                    _ => (0u8, q),
                };
                let Some(q) = q.strip_prefix(',') else {
                    return Err(AsmError::new(AsmErrorKind::Syntax, "Missing comma", None));
                };
                let (r2, q) = tfm_register(q)?;
                let p2 = match q.as_bytes().first().copied() {
                    Some(c @ (b'+' | b'-')) => c,
                    _ => 0u8,
                };
                pb = ((r1 as i32) << 4) | r2 as i32;
                oc = match (p1, p2) {
                    (b'+', b'+') => 0x1138,
                    (b'-', b'-') => 0x1139,
                    (b'+', 0) => 0x113a,
                    (0, b'+') => 0x113b,
                    _ => {
                        return Err(AsmError::new(
                            AsmErrorKind::Instruction,
                            "Illegal increment/decrement combination",
                            None,
                        ))
                    }
                };
                ol = 2;
                il = 3;
            } else {
                let (r1, q) = scan_register(op_text, self.cpu)?;
                let (r2, _) = scan_register(q, self.cpu)?;
                if r1 != 13 && r2 != 13 && is_8bit(r1) != is_8bit(r2) {
                    return Err(AsmError::new(
                        AsmErrorKind::Instruction,
                        "Mixing registers of different sizes",
                        None,
                    ));
                }
                pb = ((r1 as i32) << 4) | r2 as i32;
            }
        } else if row.opcode(AddrMode::Relative) >= 0 {
            oc = row.opcode(AddrMode::Relative);
            ol = 1 + (oc > 255) as i32;
            ql = 1 + mnemonic.starts_with('L') as i32;
            il = ol + ql;

            let t = op_text;
            if !t.is_empty() && t.bytes().all(|c| c == b'-') {
                v = self.locals.resolve_backward(t.len());
            } else if !t.is_empty() && t.bytes().all(|c| c == b'+') {
                v = self.locals.resolve_forward(t.len(), self.pc);
            } else {
                v = self.eval_all(t)?;
            }
            if v != UNDEF {
                v -= self.pc + il;
            }
            if self.pass2() && v == UNDEF {
                return Err(AsmError::new(
                    AsmErrorKind::Symbol,
                    "Branch to undefined label",
                    None,
                ));
            }

            if self.cfg.optimize {
                // Promote a short branch whose displacement is unknown or
                // out of range. UNDEF sits far outside the 8-bit window, so
                // forward references promote conservatively in pass 1 and
                // pass 2 may pad the slot back down with NOPs.
                if (0x20..0x30).contains(&oc)
                    && (v < -128 || v > 127)
                    && (self.pass == Pass::One || self.rom.length_at(self.pc) >= 3)
                {
                    let grow;
                    if oc == 0x20 {
                        oc = 0x16; // BRA -> LBRA
                        ol = 1;
                        grow = 1;
                    } else {
                        oc |= 0x1000;
                        ol = 2;
                        grow = 2;
                    }
                    ql = 2;
                    il = ol + ql;
                    if v != UNDEF {
                        v -= grow;
                    }
                }
                // Shrink a long conditional branch reaching backward within
                // 8 bits.
                if v != UNDEF
                    && (-128..0).contains(&v)
                    && oc > 0x1020
                    && oc < 0x1030
                    && (self.pass == Pass::One || self.rom.length_at(self.pc) == 2)
                {
                    oc &= 0xff;
                    ol = 1;
                    ql = 1;
                    il = 2;
                    v += 2;
                    if self.pass2() {
                        let line = self.line.clone();
                        self.opt_note(&format!(
                            "{:4} {:04x}   -->   {:3} {:02x}:{:5} {}",
                            mnemonic,
                            v & 0xffff,
                            &mnemonic[1..],
                            v & 0xff,
                            self.line_no,
                            line
                        ));
                        self.hint = format!(" ; {}", &mnemonic[1..]);
                    }
                }
                // LBRA reaching backward within 8 bits becomes BRA.
                if v != UNDEF
                    && (-128..0).contains(&v)
                    && oc == 0x16
                    && (self.pass == Pass::One || self.rom.length_at(self.pc) == 2)
                {
                    oc = 0x20;
                    ol = 1;
                    ql = 1;
                    il = 2;
                    v += 1;
                }
            }

            if self.pass2() && ql == 1 && v != UNDEF && (v < -128 || v > 127) {
                return Err(AsmError::new(
                    AsmErrorKind::Range,
                    &format!("Short Branch out of range ({v})"),
                    None,
                ));
            }
            if self.cfg.optimize && self.pass2() && ql == 2 && (-128..128).contains(&v) {
                let line = self.line.clone();
                self.opt_note(&format!(
                    "{:4} {:04x}   ***   {:3} {:02x}:{:5} {}",
                    mnemonic,
                    v & 0xffff,
                    mnemonic.strip_prefix('L').unwrap_or(mnemonic),
                    v & 0xff,
                    self.line_no,
                    line
                ));
            }
            if v != UNDEF {
                v &= 0xffff;
            }
        } else if rest.trim_start().starts_with('#') {
            oc = row.opcode(AddrMode::Immediate);
            if oc < 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    &format!("Illegal immediate instruction {mnemonic} {op_text}"),
                    None,
                ));
            }
            let after = &rest.trim_start()[1..];
            v = self.eval_all(after)?;
            ol = 1 + (oc > 255) as i32;
            ql = register_size(mne).ok_or_else(|| {
                AsmError::new(AsmErrorKind::Instruction, "Illegal register name", None)
            })?;
            if ql == 4 && oc != 0xcd {
                ql = 2;
            }
            il = ol + ql;
            if self.pass2() {
                if v == UNDEF {
                    return Err(AsmError::new(
                        AsmErrorKind::Symbol,
                        "Undefined immediate value",
                        None,
                    ));
                }
                if ql == 1 && (v < -128 || v > 255) {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        &format!("Immediate value out of range ({v})"),
                        None,
                    ));
                }
                if ql == 2 && (v < -32768 || v > 0xffff) {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        &format!("Immediate value out of range ({v})"),
                        None,
                    ));
                }
            }
        } else if op_text.starts_with('[') {
            if !op_text.ends_with(']') {
                return Err(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Missing closing bracket ]",
                    None,
                ));
            }
            oc = row.opcode(AddrMode::Indexed);
            if oc < 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    &format!("Illegal instruction {mnemonic} {op_text}"),
                    None,
                ));
            }
            ol = 1 + (oc > 255) as i32;
            if !op_text[1..].contains(',') {
                // Indirect extended.
                let (value, _) = self.eval_prefix(&op_text[1..])?;
                v = value;
                pb = 0x9f;
                ql = 2;
                il = ol + 3;
            } else {
                let (pbv, value, qlv) = self.set_post_byte(op_text)?;
                pb = pbv;
                v = value;
                ql = qlv;
                il = ol + 1 + ql;
            }
        } else if is_register_bit_op(mne) && rest.contains(',') && rest.contains('.') {
            oc = row.opcode(AddrMode::Direct);
            let t = rest.trim_start();
            let upper = t.to_ascii_uppercase();
            let (base, skip) = if upper.starts_with("CC.") {
                (0x00, 3)
            } else if upper.starts_with("A.") {
                (0x40, 2)
            } else if upper.starts_with("B.") {
                (0x80, 2)
            } else {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    &format!("Illegal register in bit operation {mnemonic} {op_text}"),
                    None,
                ));
            };
            let reg_bit = match t.as_bytes().get(skip).copied() {
                Some(c @ b'0'..=b'7') => (c - b'0') as i32,
                _ => {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        "Illegal bit number",
                        None,
                    ))
                }
            };
            pb = base | reg_bit;
            let comma = t.find(',').ok_or_else(operand_error)?;
            let dot = t[comma..]
                .rfind('.')
                .map(|d| comma + d)
                .ok_or_else(|| {
                    AsmError::new(AsmErrorKind::Syntax, "Illegal syntax in bit operand", None)
                })?;
            v = self.eval_all(t[comma + 1..dot].trim())?;
            if v != UNDEF && !(0..=255).contains(&v) {
                return Err(AsmError::new(
                    AsmErrorKind::Range,
                    &format!("Illegal address {v}"),
                    None,
                ));
            }
            let src_bit = match t.as_bytes().get(dot + 1).copied() {
                Some(c @ b'0'..=b'7') => (c - b'0') as i32,
                _ => {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        "Illegal bit number",
                        None,
                    ))
                }
            };
            pb |= src_bit << 3;
            ol = 2;
            ql = 1;
            il = 4;
        } else if rest.contains(',') {
            oc = if xim != 0 {
                xim & 0xefff // extended opcode page -> indexed page
            } else {
                row.opcode(AddrMode::Indexed)
            };
            if oc < 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    &format!("Illegal indexed instruction {mnemonic} {op_text}"),
                    None,
                ));
            }
            let (pbv, value, qlv) = self.set_post_byte(rest)?;
            pb = pbv;
            v = value;
            ql = qlv;
            ol = if xim != 0 {
                2
            } else {
                1 + (oc > 255) as i32
            };
            il = ol + 1 + ql;
        } else {
            // Direct or extended.
            let (value, _) = self.eval_prefix(rest)?;
            v = value;
            if self.pass2() {
                // The mode chosen in pass 1 is recovered from the stored
                // opcode and the recorded length.
                if xim != 0 {
                    oc = ((self.rom.read(self.pc) as i32) << 8) | self.rom.read(self.pc + 1) as i32;
                    ol = 2;
                    il = self.rom.length_at(self.pc);
                    ql = il - ol;
                } else {
                    let first = self.rom.read(self.pc) as i32;
                    ol = 1 + (first == 0x10 || first == 0x11) as i32;
                    oc = if ol == 2 {
                        (first << 8) | self.rom.read(self.pc + 1) as i32
                    } else {
                        first
                    };
                    il = self.rom.length_at(self.pc);
                    ql = il - ol;
                }
                let mut rewritten = false;
                if self.cfg.optimize && v != UNDEF {
                    let rd = v - self.pc - 3;
                    if oc == 0xbd && (-128..128).contains(&rd) {
                        let line = self.line.clone();
                        self.opt_note(&format!(
                            " JSR {:04x}   ***   BSR {:02x}:{:5} {}",
                            v & 0xffff,
                            rd & 0xff,
                            self.line_no,
                            line
                        ));
                    }
                    if oc == 0x20 && (-128..0).contains(&rd) {
                        let line = self.line.clone();
                        self.opt_note(&format!(
                            " JMP {:04x}   -->   BRA {:02x}:{:5} {}",
                            v & 0xffff,
                            rd & 0xff,
                            self.line_no,
                            line
                        ));
                        self.hint = " ; BRA".to_string();
                        ol = 1;
                        ql = 1;
                        il = 2;
                        v -= self.pc + 2;
                        rewritten = true;
                    }
                }
                if xim == 0 && !rewritten && (self.forced == Forced::Direct || ql == 1) && v != UNDEF
                {
                    v &= 0xff;
                }
            } else {
                if xim != 0 {
                    oc = xim;
                } else {
                    oc = row.opcode(AddrMode::Extended);
                }
                if oc < 0 {
                    return Err(AsmError::new(
                        AsmErrorKind::Instruction,
                        &format!("Illegal instruction {mnemonic} {op_text}"),
                        None,
                    ));
                }
                ol = if xim != 0 { 2 } else { 1 + (oc > 255) as i32 };
                ql = 2;
                il = ol + 2;
                if self.forced != Forced::Extended {
                    let qc = if xim != 0 {
                        oc & 0xfff // extended opcode page -> direct page
                    } else {
                        row.opcode(AddrMode::Direct)
                    };
                    if qc >= 0
                        && (self.forced == Forced::Direct
                            || (v != UNDEF && (v >> 8) == self.dp))
                    {
                        oc = qc;
                        if v != UNDEF {
                            v &= 0xff;
                        }
                        ql = 1;
                        il = ol + 1;
                    }
                }
                // JMP reaching backward within 8 bits becomes BRA; the
                // shorter length is locked here so pass 2 only confirms it.
                if self.cfg.optimize && v != UNDEF && oc == 0x7e {
                    let rd = v - self.pc - 3;
                    if (-128..0).contains(&rd) {
                        oc = 0x20;
                        ol = 1;
                        ql = 1;
                        il = 2;
                        v -= self.pc + 2;
                    }
                }
            }
        }

        if self.pass == Pass::One {
            self.set_instruction_length(oc, il)?;
        } else {
            // Synchronize with the pass-1 length; a shrunk instruction pads
            // its slot with NOPs so later addresses are preserved.
            let recorded = self.rom.length_at(self.pc);
            nops = recorded - il;
            if nops < 0 {
                return Err(AsmError::new(AsmErrorKind::Phase, "Phase error", None));
            }
            il = recorded;
            if nops > 0 {
                for addr in self.pc..self.pc + recorded {
                    self.rom.unlock(addr);
                }
            }
            if v == UNDEF && ql > 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Symbol,
                    "Use of an undefined label",
                    None,
                ));
            }

            let mut at = self.pc;
            if oc > 255 {
                self.rom.put(at, oc >> 8)?;
                self.rom.put(at + 1, oc)?;
                at += 2;
            } else {
                self.rom.put(at, oc)?;
                at += 1;
            }
            if pb >= 0 {
                self.rom.put(at, pb)?;
                at += 1;
            }
            if ql == 4 {
                self.rom.put(at, v >> 24)?;
                self.rom.put(at + 1, v >> 16)?;
                self.rom.put(at + 2, v >> 8)?;
                self.rom.put(at + 3, v)?;
                at += 4;
            }
            if ql == 2 {
                if v > 0xffff || v < -32768 {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        "16 bit address/value out of range",
                        None,
                    ));
                }
                self.rom.put(at, v >> 8)?;
                self.rom.put(at + 1, v)?;
                at += 2;
            }
            if ql == 1 {
                if (0xff00..=0xffff).contains(&v) {
                    v &= 0xff;
                }
                let dp_base = self.dp << 8;
                if v - dp_base < 256 && v - dp_base >= -128 {
                    v -= dp_base;
                }
                if v > 255 || v < -128 {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        "8 bit address/value out of range",
                        None,
                    ));
                }
                self.rom.put(at, v)?;
                at += 1;
            }
            for _ in 0..nops {
                self.rom.put(at, 0x12)?;
                at += 1;
            }

            let hint = self.hint.clone();
            listing
                .instruction(
                    self.line_no,
                    self.pc,
                    oc,
                    pb,
                    v,
                    ql,
                    nops,
                    &self.line,
                    &hint,
                )
                .map_err(io_error)?;
            self.hint.clear();
        }

        if !(1..=5).contains(&il) {
            return Err(AsmError::new(
                AsmErrorKind::Instruction,
                &format!("Wrong instruction length = {il}"),
                None,
            ));
        }

        if self.pc + il > 0xffff {
            if self.pass2() {
                return Err(AsmError::new(
                    AsmErrorKind::Range,
                    "Program counter exceeds 64 KB",
                    None,
                ));
            }
        } else {
            self.pc += il;
        }
        Ok(())
    }
}
