// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Register tables for inter-register operations, push/pull lists and TFM.

use super::Cpu;
use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::text::{is_space, starts_with_word};

/// Nibble-indexed register names for EXG/TFR and the 6309 register-register
/// group. Index 13 is the zero pseudo-register, exempt from size checks.
/// Q never appears as an operand; it is only part of a mnemonic.
pub const REGISTERS_6309: [&str; 16] = [
    "D", "X", "Y", "U", "S", "PC", "W", "V", "A", "B", "CC", "DP", "*", "0", "E", "F",
];

/// 6809 view of the same table; the 6309-only slots are invalid.
pub const REGISTERS_6809: [&str; 16] = [
    "D", "X", "Y", "U", "S", "PC", "-", "-", "A", "B", "CC", "DP", "*", "*", "-", "-",
];

pub fn register_names(cpu: Cpu) -> &'static [&'static str; 16] {
    match cpu {
        Cpu::M6809 => &REGISTERS_6809,
        Cpu::H6309 => &REGISTERS_6309,
    }
}

/// Push/pull mask bits. DP is scanned before D so `DP` never parses as `D`.
/// S and U share bit 6: each stack instruction pushes the other pointer.
pub const PUSH_LIST: [(&str, u8); 10] = [
    ("CC", 0x01),
    ("A", 0x02),
    ("B", 0x04),
    ("D", 0x06),
    ("DP", 0x08),
    ("X", 0x10),
    ("Y", 0x20),
    ("S", 0x40),
    ("U", 0x40),
    ("PC", 0x80),
];

fn operand_error(pos: usize) -> AsmError {
    AsmError::new(AsmErrorKind::Syntax, "Syntax error in operand", None).with_column(Some(pos))
}

/// Scan one register name for EXG/TFR-style operands. Longer names are
/// matched first. Returns the nibble index and the text after an optional
/// comma separator.
pub fn scan_register<'s>(text: &'s str, cpu: Cpu) -> Result<(u8, &'s str), AsmError> {
    let names = register_names(cpu);
    let upper = text.to_ascii_uppercase();
    let index = (0..16usize)
        .rev()
        .find(|&i| names[i] != "-" && upper.starts_with(names[i]))
        .ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::Instruction,
                "Unknown register name or wrong CPU set",
                None,
            )
        })?;
    let mut rest = &text[names[index].len()..];
    rest = rest.trim_start();
    if let Some(stripped) = rest.strip_prefix(',') {
        rest = stripped;
    }
    Ok((index as u8, rest))
}

/// Scan a TFM register (D, X, Y, U or S), one character.
pub fn tfm_register(text: &str) -> Result<(u8, &str), AsmError> {
    let first = text
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(0)
        .to_ascii_uppercase();
    let index = (0..5usize)
        .rev()
        .find(|&i| REGISTERS_6309[i].as_bytes()[0] == first)
        .ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::Instruction,
                "Illegal register name for TFM or wrong CPU set",
                None,
            )
        })?;
    Ok((index as u8, &text[1..]))
}

/// 8-bit registers occupy the high half of the nibble table.
pub fn is_8bit(nibble: u8) -> bool {
    nibble >= 8
}

/// Parse a PSHS/PULS/PSHU/PULU register list into its mask.
pub fn scan_push_list(text: &str) -> Result<u8, AsmError> {
    let text = text.trim_end();
    if starts_with_word(text, "ALL") {
        return Ok(0xff);
    }
    let mut mask = 0u8;
    let mut pos = 0usize;
    let bytes = text.as_bytes();
    while pos < bytes.len() {
        let rest = &text[pos..];
        let Some(&(name, bit)) = PUSH_LIST
            .iter()
            .rev()
            .find(|(name, _)| starts_with_word(rest, name))
        else {
            return Err(operand_error(pos));
        };
        mask |= bit;
        pos += name.len();
        while pos < bytes.len() && is_space(bytes[pos]) {
            pos += 1;
        }
        match bytes.get(pos) {
            None => break,
            Some(b',') => pos += 1,
            Some(_) => return Err(operand_error(pos)),
        }
        while pos < bytes.len() && is_space(bytes[pos]) {
            pos += 1;
        }
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_list_masks() {
        assert_eq!(scan_push_list("CC,A,B,X").unwrap(), 0x01 | 0x02 | 0x04 | 0x10);
        assert_eq!(scan_push_list("D").unwrap(), 0x06);
        assert_eq!(scan_push_list("DP").unwrap(), 0x08);
        assert_eq!(scan_push_list("ALL").unwrap(), 0xff);
        assert_eq!(scan_push_list("U,PC").unwrap(), 0xc0);
        assert_eq!(scan_push_list("A, B , Y").unwrap(), 0x02 | 0x04 | 0x20);
        assert!(scan_push_list("A Q").is_err());
    }

    #[test]
    fn register_scan_prefers_longest_name() {
        let (r, rest) = scan_register("DP,X", Cpu::H6309).unwrap();
        assert_eq!(r, 11);
        assert_eq!(rest, "X");
        let (r, _) = scan_register("D,X", Cpu::H6309).unwrap();
        assert_eq!(r, 0);
        let (r, _) = scan_register("PC", Cpu::H6309).unwrap();
        assert_eq!(r, 5);
    }

    #[test]
    fn cpu_gates_6309_registers() {
        assert!(scan_register("W,X", Cpu::H6309).is_ok());
        assert!(scan_register("W,X", Cpu::M6809).is_err());
        assert!(scan_register("E,F", Cpu::M6809).is_err());
    }

    #[test]
    fn tfm_registers_are_single_letters() {
        assert_eq!(tfm_register("X+,Y+").unwrap().0, 1);
        assert_eq!(tfm_register("y").unwrap().0, 2);
        assert!(tfm_register("A").is_err());
    }

    #[test]
    fn size_halves() {
        assert!(!is_8bit(0)); // D
        assert!(!is_8bit(6)); // W
        assert!(is_8bit(8)); // A
        assert!(is_8bit(10)); // CC
    }
}
