// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Listing file generation: per-line code echo and the symbol
//! cross-reference.

use crate::core::symbol_table::{RefKind, Symbol};

use std::io::{self, Write};

/// Writer for the listing file. Code lines are emitted during pass 2 only;
/// diagnostics always go through.
pub struct ListingWriter<W: Write> {
    out: W,
    pub with_line_numbers: bool,
    pub pass2: bool,
    /// Toggled by `LIST +` / `LIST -`.
    pub enabled: bool,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W, with_line_numbers: bool) -> Self {
        Self {
            out,
            with_line_numbers,
            pass2: false,
            enabled: true,
        }
    }

    fn gate(&self) -> bool {
        self.pass2 && self.enabled
    }

    fn prefix_ln(&self, line_no: u32) -> String {
        if self.with_line_numbers {
            format!("{:5} ", line_no)
        } else {
            String::new()
        }
    }

    fn prefix_pc(&self, line_no: u32, pc: i32) -> String {
        format!("{}{:04x}", self.prefix_ln(line_no), pc & 0xffff)
    }

    /// Source line with no generated code.
    pub fn plain(&mut self, line_no: u32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}                  {}",
            self.prefix_ln(line_no),
            source
        )
    }

    /// Source line prefixed with an address or a 16-bit value.
    pub fn value_line(&mut self, line_no: u32, value: i32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}              {}",
            self.prefix_pc(line_no, value),
            source
        )
    }

    /// BSS-advance line: the BSS counter before the step.
    pub fn bss_line(&mut self, line_no: u32, bss: i32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}             {}",
            self.prefix_pc(line_no, bss),
            source
        )
    }

    pub fn byte_value_line(&mut self, line_no: u32, value: i32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}       {:02x}         {}",
            self.prefix_ln(line_no),
            value & 0xff,
            source
        )
    }

    pub fn cpu_line(&mut self, line_no: u32, cpu: i32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}{:4}              {}",
            self.prefix_ln(line_no),
            cpu,
            source
        )
    }

    pub fn empty(&mut self, line_no: u32) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(self.out, "{}", self.prefix_ln(line_no))
    }

    pub fn skip_line(&mut self, line_no: u32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(self.out, "{}SKIP          {}", self.prefix_ln(line_no), source)
    }

    pub fn cond_line(&mut self, line_no: u32, skipping: bool, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        if skipping {
            writeln!(self.out, "{}0001 FALSE    {}", self.prefix_ln(line_no), source)
        } else {
            writeln!(self.out, "{}0000 TRUE     {}", self.prefix_ln(line_no), source)
        }
    }

    /// Conditional `else`/`endif` echo: no value column.
    pub fn value_less_line(&mut self, line_no: u32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{}              {}",
            self.prefix_ln(line_no),
            source
        )
    }

    /// Macro definition body echoed in pass 2.
    pub fn macro_line(&mut self, line_no: u32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(self.out, "{}            {}", self.prefix_ln(line_no), source)
    }

    pub fn include_closed(&mut self, line_no: u32, name: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{};                       closed INCLUDE file {}",
            self.prefix_ln(line_no),
            name
        )
    }

    /// Instruction line: address, opcode, post-byte, operand bytes, source.
    #[allow(clippy::too_many_arguments)]
    pub fn instruction(
        &mut self,
        line_no: u32,
        pc: i32,
        oc: i32,
        pb: i32,
        value: i32,
        ql: i32,
        nops: i32,
        source: &str,
        hint: &str,
    ) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        let mut line = self.prefix_pc(line_no, pc);
        if oc == 0xcd {
            // 32 bit load, special format
            line.push_str(&format!(
                " cd {:04x} {:04x}",
                (value >> 16) & 0xffff,
                value & 0xffff
            ));
        } else {
            if oc > 255 {
                line.push_str(&format!(" {:04x}", oc));
            } else {
                line.push_str(&format!("   {:02x}", oc));
            }
            if pb >= 0 {
                line.push_str(&format!(" {:02x}", pb & 0xff));
            } else {
                line.push_str("   ");
            }
            if nops == 2 && ql == 0 {
                line.push_str(" 1212");
            } else if nops == 1 && ql == 0 {
                line.push_str(" 12  ");
            } else if nops == 1 && ql == 1 {
                line.push_str(&format!(" {:02x}12", value & 0xff));
            } else if ql == 2 {
                line.push_str(&format!(" {:04x}", value & 0xffff));
            } else if ql == 1 {
                line.push_str(&format!("   {:02x}", value & 0xff));
            } else {
                line.push_str("     ");
            }
        }
        line.push(' ');
        line.push_str(source);
        if !hint.is_empty() {
            line.push_str(hint);
        }
        if nops > 1 {
            line.push_str(&format!(" ; added {} NOP's", nops));
        } else if nops == 1 {
            line.push_str(" ; added a NOP");
        }
        writeln!(self.out, "{line}")
    }

    pub fn byte_data(&mut self, line_no: u32, pc: i32, bytes: &[u8], source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        let mut line = self.prefix_pc(line_no, pc);
        for byte in bytes.iter().take(4) {
            line.push_str(&format!(" {:02x}", byte));
        }
        for _ in bytes.len()..4 {
            line.push_str("   ");
        }
        writeln!(self.out, "{line}  {source}")
    }

    pub fn word_data(&mut self, line_no: u32, pc: i32, bytes: &[u8], source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        let mut line = self.prefix_pc(line_no, pc);
        if bytes.len() >= 2 {
            line.push_str(&format!(" {:02x}{:02x}", bytes[0], bytes[1]));
        }
        if bytes.len() >= 4 {
            line.push_str(&format!(" {:02x}{:02x}", bytes[2], bytes[3]));
        }
        if bytes.len() == 2 {
            line.push_str("        ");
        } else {
            line.push_str("   ");
        }
        writeln!(self.out, "{line} {source}")
    }

    pub fn long_data(&mut self, line_no: u32, pc: i32, bytes: &[u8], source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        let mut line = self.prefix_pc(line_no, pc);
        if bytes.len() >= 4 {
            line.push_str(&format!(
                " {:02x}{:02x} {:02x}{:02x}",
                bytes[0], bytes[1], bytes[2], bytes[3]
            ));
        }
        writeln!(self.out, "{line}    {source}")
    }

    pub fn fill_line(
        &mut self,
        line_no: u32,
        pc: i32,
        count: i32,
        value: u8,
        source: &str,
    ) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        let mut line = self.prefix_pc(line_no, pc);
        for slot in 0..3 {
            if count > slot {
                line.push_str(&format!(" {:02x}", value));
            } else {
                line.push_str("   ");
            }
        }
        writeln!(self.out, "{line} {source} ; {count} bytes")
    }

    pub fn bits_line(&mut self, line_no: u32, pc: i32, value: u8, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{} {:02x}           {}",
            self.prefix_pc(line_no, pc),
            value,
            source
        )
    }

    pub fn cmap_line(&mut self, line_no: u32, pc: i32, value: u8, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{} {:02x}       {}",
            self.prefix_pc(line_no, pc),
            value,
            source
        )
    }

    pub fn c5to3_line(&mut self, line_no: u32, pc: i32, value: i32, source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{} {:06x}       {}",
            self.prefix_pc(line_no, pc),
            value & 0xff_ffff,
            source
        )
    }

    pub fn real_line(&mut self, line_no: u32, pc: i32, bytes: &[u8], source: &str) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{} {:02x} {:02x}{:02x}{:02x}   {}",
            self.prefix_pc(line_no, pc),
            bytes[0],
            bytes[1],
            bytes[2],
            bytes[3],
            source
        )
    }

    /// Module size note for `SIZE` / `ENDSUB`.
    pub fn size_line(
        &mut self,
        line_no: u32,
        pc: i32,
        source: &str,
        info: Option<(i32, &str)>,
    ) -> io::Result<()> {
        if !self.gate() {
            return Ok(());
        }
        let mut line = self.prefix_pc(line_no, pc);
        if let Some((size, name)) = info {
            line.push_str(&format!("              {} ;{:5} [{}]", source, size, name));
        }
        writeln!(self.out, "{line}")
    }

    /// Diagnostics bypass the pass and LIST gates.
    pub fn diagnostic(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")
    }

    pub fn symbol_table_header(&mut self, count: usize) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        writeln!(self.out, "\n\n{:5} Symbols", count)?;
        writeln!(self.out, "-------------")
    }

    /// Cross-reference section for symbols whose value lies in `lb..=ub`.
    /// Each reference prints its line number; the defining reference is
    /// tagged `D`.
    pub fn symbols(&mut self, entries: &[&Symbol], lb: i32, ub: i32) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        for symbol in entries {
            if symbol.value < lb || symbol.value > ub {
                continue;
            }
            let mut line = format!("{:<30.30} ${:04x}", symbol.name, symbol.value & 0xffff);
            let last = symbol.refs.len().saturating_sub(1);
            for (index, sref) in symbol.refs.iter().enumerate() {
                if index > 0 && index % 5 == 0 {
                    line.push_str("\n                                    ");
                }
                line.push_str(&format!("{:6}", sref.line));
                let attr = if sref.kind == RefKind::Define { 'D' } else { ' ' };
                if (attr != ' ' || index % 5 != 4) && index != last {
                    line.push(attr);
                }
            }
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::{RefKind, Symbol, SymbolRef};

    fn writer(buf: &mut Vec<u8>) -> ListingWriter<&mut Vec<u8>> {
        let mut w = ListingWriter::new(buf, false);
        w.pass2 = true;
        w
    }

    #[test]
    fn instruction_line_formats_prefixed_opcode() {
        let mut buf = Vec::new();
        let mut w = writer(&mut buf);
        w.instruction(1, 0x9ff9, 0x1034, 0x8e, 0, 0, 0, "        ANDR    A,E", "")
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("9ff9 1034 8e      "));
        assert!(text.contains("ANDR"));
    }

    #[test]
    fn instruction_line_formats_short_opcode_with_operand() {
        let mut buf = Vec::new();
        let mut w = writer(&mut buf);
        w.instruction(1, 0x1000, 0x8e, -1, 0x1234, 2, 0, "LDX #$1234", "")
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("1000   8e    1234 LDX"));
    }

    #[test]
    fn nop_padding_is_reported() {
        let mut buf = Vec::new();
        let mut w = writer(&mut buf);
        w.instruction(1, 0x1000, 0x26, -1, 0x05, 1, 1, "BNE skip", "")
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(" 0512 "));
        assert!(text.contains("; added a NOP"));
    }

    #[test]
    fn pass1_lines_are_suppressed() {
        let mut buf = Vec::new();
        {
            let mut w = ListingWriter::new(&mut buf, false);
            w.plain(1, "RTS").unwrap();
            w.diagnostic("oops\n").unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "oops\n");
    }

    #[test]
    fn line_numbers_are_optional() {
        let mut buf = Vec::new();
        {
            let mut w = ListingWriter::new(&mut buf, true);
            w.pass2 = true;
            w.plain(12, "; comment").unwrap();
        }
        assert!(String::from_utf8(buf).unwrap().starts_with("   12 "));
    }

    #[test]
    fn cross_reference_marks_defining_line() {
        let symbol = Symbol {
            name: "start".to_string(),
            value: 0x1000,
            bytes: 0,
            locked: false,
            refs: vec![
                SymbolRef { line: 4, kind: RefKind::Define },
                SymbolRef { line: 9, kind: RefKind::Use },
            ],
        };
        let mut buf = Vec::new();
        {
            let mut w = writer(&mut buf);
            let entries = vec![&symbol];
            w.symbols(&entries, 0, 0xffff).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("start"));
        assert!(text.contains("$1000"));
        assert!(text.contains("4D"));
    }
}
