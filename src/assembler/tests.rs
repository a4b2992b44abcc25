// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end assembly tests: run both passes over source text and inspect
//! the ROM image, the symbol table and the listing.

use super::{Assembler, Config};
use crate::core::expr::UNDEF;
use crate::core::listing::ListingWriter;
use crate::core::source::SourceStream;

fn assemble_cfg(cfg: Config, source: &str) -> (Assembler, String) {
    let mut asm = Assembler::new(cfg);
    let lines: Vec<String> = source.lines().map(String::from).collect();
    let mut stream = SourceStream::from_lines("test.as9", lines);
    let mut listing = ListingWriter::new(Vec::new(), false);
    asm.first_pass(&mut stream, &mut listing).expect("pass 1");
    assert_eq!(asm.err_count, 0, "unexpected pass 1 errors");
    asm.second_pass(&mut stream, &mut listing).expect("pass 2");
    assert_eq!(asm.err_count, 0, "unexpected pass 2 errors");
    asm.finish(&mut listing).expect("finish");
    let text = String::from_utf8(listing.into_inner()).expect("utf8 listing");
    (asm, text)
}

fn assemble(source: &str) -> (Assembler, String) {
    assemble_cfg(Config::default(), source)
}

/// Run both passes but tolerate errors; for diagnostics tests.
fn assemble_collect(source: &str) -> Assembler {
    let mut asm = Assembler::new(Config::default());
    let lines: Vec<String> = source.lines().map(String::from).collect();
    let mut stream = SourceStream::from_lines("test.as9", lines);
    let mut listing = ListingWriter::new(Vec::new(), false);
    let _ = asm.first_pass(&mut stream, &mut listing);
    if asm.err_count == 0 && !asm.aborted {
        let _ = asm.second_pass(&mut stream, &mut listing);
    }
    asm
}

fn rom(asm: &Assembler, addr: usize, len: usize) -> Vec<u8> {
    asm.rom.slice(addr, len).to_vec()
}

fn symbol_value(asm: &Assembler, name: &str) -> i32 {
    let index = asm.symbols.index_of(name).expect("symbol exists");
    asm.symbols.get(index).value
}

#[test]
fn inherent_instruction() {
    let (asm, _) = assemble(" ORG $1000\n RTS");
    assert_eq!(rom(&asm, 0x1000, 1), vec![0x39]);
    assert_eq!(asm.pc, 0x1001);
}

#[test]
fn immediate_to_16bit_register() {
    let (asm, _) = assemble(" ORG $1000\n LDX #$1234");
    assert_eq!(rom(&asm, 0x1000, 3), vec![0x8e, 0x12, 0x34]);
}

#[test]
fn immediate_widths_follow_register_half() {
    let (asm, _) = assemble(" ORG 0\n LDA #$41\n LDD #$1234\n ORCC #$50");
    assert_eq!(
        rom(&asm, 0, 7),
        vec![0x86, 0x41, 0xcc, 0x12, 0x34, 0x1a, 0x50]
    );
}

#[test]
fn short_branch_forward() {
    let source = "\
 ORG $1000
 BNE skip
 NOP
skip RTS";
    let (asm, listing) = assemble(source);
    assert_eq!(rom(&asm, 0x1000, 4), vec![0x26, 0x01, 0x12, 0x39]);
    assert_eq!(symbol_value(&asm, "skip"), 0x1003);
    assert!(listing.contains("BNE skip"));
}

#[test]
fn long_branch_auto_promotion() {
    let source = "\
 ORG $1000
 BRA far
 FILL 200 (0)
far RTS";
    let cfg = Config {
        optimize: true,
        ..Config::default()
    };
    let (asm, _) = assemble_cfg(cfg, source);
    // Pass 1 locks the 3-byte LBRA form; displacement is relative to pc+3.
    assert_eq!(symbol_value(&asm, "far"), 0x10cb);
    assert_eq!(rom(&asm, 0x1000, 3), vec![0x16, 0x00, 0xc8]);
    assert_eq!(asm.rom.length_at(0x1000), 3);
}

#[test]
fn long_conditional_shrinks_backward() {
    let source = "\
 ORG $1000
back NOP
 LBNE back";
    let cfg = Config {
        optimize: true,
        ..Config::default()
    };
    let (asm, _) = assemble_cfg(cfg, source);
    // LBNE back fits 8 bits: shrunk to BNE in pass 1 already. The short
    // displacement reaches back from pc+2.
    assert_eq!(rom(&asm, 0x1001, 2), vec![0x26, 0xfd]);
    assert!(asm.opt_hints > 0);
}

#[test]
fn five_bit_indexed_offset() {
    let (asm, _) = assemble(" ORG 0\n LDA 5,X\n LDA -5,X");
    assert_eq!(rom(&asm, 0, 4), vec![0xa6, 0x05, 0xa6, 0x1b]);
}

#[test]
fn eight_and_sixteen_bit_indexed_offsets() {
    let (asm, _) = assemble(" ORG 0\n LDA 100,X\n LDA $1234,Y");
    assert_eq!(
        rom(&asm, 0, 7),
        vec![0xa6, 0x88, 0x64, 0xa6, 0xa9, 0x12, 0x34]
    );
}

#[test]
fn accumulator_offsets() {
    let (asm, _) = assemble(" ORG 0\n LDA A,X\n LDA D,Y\n LDA B,U\n LDA W,S");
    assert_eq!(
        rom(&asm, 0, 8),
        vec![0xa6, 0x86, 0xa6, 0xab, 0xa6, 0xc5, 0xa6, 0xee]
    );
}

#[test]
fn auto_increment_decrement() {
    let (asm, _) = assemble(" ORG 0\n LDA ,X+\n LDA ,X++\n LDA ,--Y\n LDA ,S");
    assert_eq!(
        rom(&asm, 0, 8),
        vec![0xa6, 0x80, 0xa6, 0x81, 0xa6, 0xa3, 0xa6, 0xe4]
    );
}

#[test]
fn w_register_forms() {
    let (asm, _) = assemble(" ORG 0\n LDA ,W\n LDA [,W]\n LDA $10,W\n LDA ,W++\n LDA ,--W");
    assert_eq!(
        rom(&asm, 0, 12),
        vec![0xa6, 0x8f, 0xa6, 0x90, 0xa6, 0xaf, 0x00, 0x10, 0xa6, 0xcf, 0xa6, 0xef]
    );
}

#[test]
fn indirect_extended() {
    let (asm, _) = assemble(" ORG 0\n LDA [$2000]");
    assert_eq!(rom(&asm, 0, 4), vec![0xa6, 0x9f, 0x20, 0x00]);
}

#[test]
fn indirect_pc_relative_with_known_target() {
    let source = "\
 ORG $1000
tgt EQU $100a
 LDA [tgt,PCR]";
    let (asm, _) = assemble(source);
    // 8-bit PCR indirect: displacement from pc+3.
    assert_eq!(rom(&asm, 0x1000, 3), vec![0xa6, 0x9c, 0x07]);
    assert_eq!(asm.rom.length_at(0x1000), 3);
}

#[test]
fn forward_pc_relative_shrinks_with_nop_pad() {
    let source = "\
 ORG $1000
 LDA [tgt,PCR]
tgt RTS";
    let (asm, listing) = assemble(source);
    // Pass 1 could not size the displacement and locked the 16-bit form;
    // pass 2 emits the 8-bit form and pads the slot.
    assert_eq!(rom(&asm, 0x1000, 5), vec![0xa6, 0x9c, 0x01, 0x12, 0x39]);
    assert_eq!(symbol_value(&asm, "tgt"), 0x1004);
    assert!(listing.contains("added a NOP"));
}

#[test]
fn macro_expansion_with_argument() {
    let source = "\
MACRO INC2(x)
    INC x
    INC x
ENDM
    ORG $0
    INC2 ($20)";
    let (asm, _) = assemble(source);
    assert_eq!(rom(&asm, 0, 4), vec![0x0c, 0x20, 0x0c, 0x20]);
}

#[test]
fn macro_suffix_style_and_nesting() {
    let source = "\
LDI MACRO reg, val
 LDreg #val
ENDM
TWICE MACRO v
 LDI A, v
 LDI B, v
ENDM
 ORG 0
 TWICE $11";
    // Parameter substitution is positional, so `LDreg` pastes into LDA/LDB.
    let (asm, _) = assemble(source);
    assert_eq!(rom(&asm, 0, 4), vec![0x86, 0x11, 0xc6, 0x11]);
}

#[test]
fn duplicate_macro_is_an_error() {
    let source = "\
MACRO M1()
 NOP
ENDM
MACRO M1()
 NOP
ENDM";
    let asm = assemble_collect(source);
    assert_eq!(asm.err_count, 1);
}

#[test]
fn store_s_record_round_trip() {
    let path = std::env::temp_dir().join(format!(
        "bs9-test-{}-{:?}.s19",
        std::process::id(),
        std::thread::current().id()
    ));
    let source = format!(
        " ORG $0100\n BYTE $DE,$AD,$BE,$EF\n STORE $0100,4,\"{}\",S19",
        path.display()
    );
    let (_, _) = assemble(&source);
    let text = std::fs::read_to_string(&path).expect("s19 output");
    std::fs::remove_file(&path).ok();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("S0"));
    assert_eq!(lines[1], "S1070100DEADBEEFBF");
    assert_eq!(lines[2], "S5030001FB");
    assert!(!text.contains("\nS9"));
}

#[test]
fn store_binary_with_entry_prefixes_load_address() {
    let path = std::env::temp_dir().join(format!(
        "bs9-test-{}-{:?}.bin",
        std::process::id(),
        std::thread::current().id()
    ));
    let source = format!(
        " ORG $0200\n BYTE 1,2,3\n STORE $0200,3,\"{}\",BIN,$0200",
        path.display()
    );
    let (_, _) = assemble(&source);
    let data = std::fs::read(&path).expect("bin output");
    std::fs::remove_file(&path).ok();
    assert_eq!(data, vec![0x02, 0x00, 1, 2, 3]);
}

#[test]
fn equ_set_enum_definitions() {
    let source = "\
FOO EQU $1234
BAR SET 1
BAR SET 2
E0 ENUM
E1 ENUM
E2 ENUM 10
E3 ENUM";
    let (asm, _) = assemble(source);
    assert_eq!(symbol_value(&asm, "FOO"), 0x1234);
    assert_eq!(symbol_value(&asm, "BAR"), 2);
    assert_eq!(symbol_value(&asm, "E0"), 0);
    assert_eq!(symbol_value(&asm, "E1"), 1);
    assert_eq!(symbol_value(&asm, "E2"), 10);
    assert_eq!(symbol_value(&asm, "E3"), 11);
}

#[test]
fn equ_redefinition_is_an_error() {
    let asm = assemble_collect("X EQU 1\nX EQU 2");
    assert!(asm.err_count >= 1);
}

#[test]
fn bss_labels_advance_the_bss_counter() {
    let source = "\
 & = $2000
buf BSS 10
buf2 BSS 2";
    let (asm, _) = assemble(source);
    assert_eq!(symbol_value(&asm, "buf"), 0x2000);
    assert_eq!(symbol_value(&asm, "buf2"), 0x200a);
    assert_eq!(asm.bss, 0x200c);
}

#[test]
fn rmb_and_align_advance_pc_without_bytes() {
    let source = "\
 ORG $0005
 ALIGN 4
here RMB 3
there RTS";
    let (asm, _) = assemble(source);
    assert_eq!(symbol_value(&asm, "here"), 8);
    assert_eq!(symbol_value(&asm, "there"), 11);
    assert!(!asm.rom.is_locked(8));
    assert_eq!(rom(&asm, 11, 1), vec![0x39]);
}

#[test]
fn local_numeric_labels() {
    let source = "\
 ORG $0
- NOP
 BRA -
 BRA +
+ RTS";
    let (asm, _) = assemble(source);
    assert_eq!(
        rom(&asm, 0, 6),
        vec![0x12, 0x20, 0xfd, 0x20, 0x00, 0x39]
    );
}

#[test]
fn push_pull_register_lists() {
    let (asm, _) = assemble(" ORG 0\n PSHS A,B,X\n PULS ALL\n PSHU U,PC");
    assert_eq!(rom(&asm, 0, 6), vec![0x34, 0x16, 0x35, 0xff, 0x36, 0xc0]);
}

#[test]
fn transfer_and_exchange_registers() {
    let (asm, _) = assemble(" ORG 0\n EXG A,B\n TFR X,Y\n ADDR A,B");
    assert_eq!(
        rom(&asm, 0, 7),
        vec![0x1e, 0x89, 0x1f, 0x12, 0x10, 0x30, 0x89]
    );
}

#[test]
fn mixed_register_sizes_are_rejected() {
    let asm = assemble_collect(" ORG 0\n EXG A,X");
    assert_eq!(asm.err_count, 1);
}

#[test]
fn zero_register_is_exempt_from_size_check() {
    let (asm, _) = assemble(" ORG 0\n TFR 0,X");
    assert_eq!(rom(&asm, 0, 2), vec![0x1f, 0xd1]);
}

#[test]
fn tfm_forms() {
    let (asm, _) = assemble(" ORG 0\n TFM X+,Y+\n TFM X-,Y-\n TFM X+,Y\n TFM X,Y+");
    assert_eq!(
        rom(&asm, 0, 12),
        vec![
            0x11, 0x38, 0x12, 0x11, 0x39, 0x12, 0x11, 0x3a, 0x12, 0x11, 0x3b, 0x12
        ]
    );
}

#[test]
fn direct_and_extended_selection() {
    let source = "\
 ORG $0
 LDA $30
 LDA $1234
 SETDP $12
 LDA $1234
 LDA >$30
 LDA <$1234";
    let (asm, _) = assemble(source);
    assert_eq!(
        rom(&asm, 0, 12),
        vec![0x96, 0x30, 0xb6, 0x12, 0x34, 0x96, 0x34, 0xb6, 0x00, 0x30, 0x96, 0x34]
    );
}

#[test]
fn setdp_uses_high_byte_of_wide_values() {
    let (asm, _) = assemble(" SETDP $1200");
    assert_eq!(asm.dp, 0x12);
}

#[test]
fn immediate_to_memory_forms() {
    let source = "\
 ORG 0
 OIM #$55,$10
 AIM #$0F,2,X
 EIM #$AA,$2000";
    let (asm, _) = assemble(source);
    assert_eq!(rom(&asm, 0, 3), vec![0x01, 0x55, 0x10]);
    assert_eq!(rom(&asm, 3, 3), vec![0x62, 0x0f, 0x02]);
    assert_eq!(rom(&asm, 6, 4), vec![0x75, 0xaa, 0x20, 0x00]);
}

#[test]
fn register_bit_operation() {
    let (asm, _) = assemble(" ORG 0\n BAND A.1,$40.2");
    assert_eq!(rom(&asm, 0, 4), vec![0x11, 0x30, 0x51, 0x40]);
}

#[test]
fn ldq_32bit_immediate() {
    let (asm, _) = assemble(" ORG 0\n LDQ #$12345678");
    assert_eq!(rom(&asm, 0, 5), vec![0xcd, 0x12, 0x34, 0x56, 0x78]);
}

#[test]
fn cpu_6809_rejects_6309_mnemonics() {
    let asm = assemble_collect(" CPU = 6809\n LDW #1");
    assert!(asm.err_count >= 1);
}

#[test]
fn reserved_words_cannot_be_labels() {
    let asm = assemble_collect("value EQU ORG");
    assert!(asm.err_count >= 1);
}

#[test]
fn conditional_assembly() {
    let source = "\
MO5 EQU 1
 ORG 0
if MO5
 BYTE 1
else
 BYTE 2
endif
if MO5-1
 BYTE 3
else
 BYTE 4
endif
ifdef MO5
 BYTE 5
endif";
    let (asm, listing) = assemble(source);
    assert_eq!(rom(&asm, 0, 3), vec![1, 4, 5]);
    assert!(listing.contains("TRUE"));
    assert!(listing.contains("FALSE"));
    assert!(listing.contains("SKIP"));
}

#[test]
fn hash_error_aborts_in_taken_branch() {
    let source = "\
if 1
#error configuration is broken
endif";
    let asm = assemble_collect(source);
    assert!(asm.aborted);
    assert_eq!(asm.err_count, 1);
}

#[test]
fn unbalanced_conditional_fails_before_pass_2() {
    let mut asm = Assembler::new(Config::default());
    let lines = vec![" ORG 0".to_string(), "if 1".to_string(), " NOP".to_string()];
    let mut stream = SourceStream::from_lines("test.as9", lines);
    let mut listing = ListingWriter::new(Vec::new(), false);
    asm.first_pass(&mut stream, &mut listing).unwrap();
    assert!(asm.second_pass(&mut stream, &mut listing).is_err());
}

#[test]
fn module_scope_for_local_symbols() {
    let source = "\
 ORG $100
MODULE Funky
.loop NOP
 BRA .loop
ENDMOD";
    let (asm, _) = assemble(source);
    assert_eq!(rom(&asm, 0x100, 3), vec![0x12, 0x20, 0xfd]);
    assert_eq!(symbol_value(&asm, "Funky.loop"), 0x100);
}

#[test]
fn byte_data_strings_and_length_query() {
    let source = "\
 ORG 0
msg BYTE \"HI\\r\",0
 LDB #?msg";
    let (asm, _) = assemble(source);
    assert_eq!(rom(&asm, 0, 4), vec![0x48, 0x49, 0x0d, 0x00]);
    assert_eq!(rom(&asm, 4, 2), vec![0xc6, 0x04]);
}

#[test]
fn word_and_long_data() {
    let (asm, _) = assemble(" ORG 0\n WORD $1234,$5678\n LONG $DEADBEEF");
    assert_eq!(
        rom(&asm, 0, 8),
        vec![0x12, 0x34, 0x56, 0x78, 0xde, 0xad, 0xbe, 0xef]
    );
}

#[test]
fn fill_directive() {
    let (asm, _) = assemble(" ORG $10\n FILL 3 ($EA)\n RTS");
    assert_eq!(rom(&asm, 0x10, 4), vec![0xea, 0xea, 0xea, 0x39]);
}

#[test]
fn bits_and_c5to3_data() {
    let (asm, _) = assemble(" ORG 0\n BITS **..**..\n C5TO3 \"HELLO\"");
    assert_eq!(rom(&asm, 0, 1), vec![0xcc]);
    // H=9, E=6, L=13: value = 13<<15 | 13<<10 | 6<<5 | 9, tag O ignored.
    let value = (13 << 15) | (13 << 10) | (6 << 5) | 9;
    assert_eq!(
        rom(&asm, 1, 3),
        vec![(value >> 16) as u8, (value >> 8) as u8, value as u8]
    );
}

#[test]
fn real_directive_packs_floats() {
    let (asm, _) = assemble(" ORG 0\n REAL 1.0\n REAL 0.625\n REAL $81400000");
    // The mantissa's constant top bit is replaced by the sign flag.
    assert_eq!(rom(&asm, 0, 4), vec![0x81, 0x00, 0x00, 0x00]);
    assert_eq!(rom(&asm, 4, 4), vec![0x80, 0x20, 0x00, 0x00]);
    assert_eq!(rom(&asm, 8, 4), vec![0x81, 0x40, 0x00, 0x00]);
}

#[test]
fn overwrite_is_fatal() {
    let source = "\
 ORG 0
 BYTE 1
 ORG 0
 BYTE 2";
    let asm = assemble_collect(source);
    assert!(asm.aborted);
    assert!(asm.err_count >= 1);
}

#[test]
fn error_cap_stops_pass_2() {
    let mut source = String::from(" ORG 0\n");
    for index in 0..12 {
        source.push_str(&format!(" LDA ghost{index}\n"));
    }
    let asm = assemble_collect(&source);
    assert!(asm.aborted);
    assert_eq!(asm.err_count, super::DEFAULT_ERROR_LIMIT);
}

#[test]
fn undefined_symbols_are_reported_at_finish() {
    let mut asm = Assembler::new(Config::default());
    let lines = vec![" ORG 0".to_string(), " WORD nowhere".to_string()];
    let mut stream = SourceStream::from_lines("test.as9", lines);
    let mut listing = ListingWriter::new(Vec::new(), false);
    asm.first_pass(&mut stream, &mut listing).unwrap();
    asm.second_pass(&mut stream, &mut listing).unwrap();
    assert_eq!(asm.err_count, 0);
    asm.finish(&mut listing).unwrap();
    assert_eq!(asm.err_count, 1);
    assert_eq!(rom(&asm, 0, 2), vec![0, 0]);
}

#[test]
fn include_files_are_read_and_closed() {
    let path = std::env::temp_dir().join(format!(
        "bs9-test-inc-{}-{:?}.as9",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::write(&path, " RTS\n").unwrap();
    let source = format!(" ORG 0\n INCLUDE \"{}\"\n NOP", path.display());
    let (asm, listing) = assemble(&source);
    std::fs::remove_file(&path).ok();
    assert_eq!(rom(&asm, 0, 2), vec![0x39, 0x12]);
    assert!(listing.contains("closed INCLUDE file"));
}

#[test]
fn end_stops_assembly() {
    let (asm, _) = assemble(" ORG 0\n RTS\n END\n BYTE 1,2,3");
    assert_eq!(rom(&asm, 0, 1), vec![0x39]);
    assert!(!asm.rom.is_locked(1));
}

#[test]
fn motorola_style_terminates_operand_at_blank() {
    let cfg = Config {
        motorola: true,
        ..Config::default()
    };
    let (asm, _) = assemble_cfg(cfg, " ORG 0\n LDA #5 this is a comment");
    assert_eq!(rom(&asm, 0, 2), vec![0x86, 0x05]);
}

#[test]
fn hex_dump_columns_are_stripped() {
    let cfg = Config {
        strip_hex: true,
        ..Config::default()
    };
    let source = " ORG 0\n00001 1000 86 05    RTS";
    let (asm, _) = assemble_cfg(cfg, source);
    assert_eq!(rom(&asm, 0, 1), vec![0x39]);
}

#[test]
fn assembly_is_deterministic() {
    let source = "\
 ORG $1000
start LDX #msg
loop LDA ,X+
 BEQ done
 BRA loop
done RTS
msg BYTE \"OK\",0";
    let (first, _) = assemble(source);
    let (second, _) = assemble(source);
    assert_eq!(rom(&first, 0x1000, 16), rom(&second, 0x1000, 16));
    for symbol in first.symbols.iter() {
        assert_ne!(symbol.value, UNDEF, "{} must resolve", symbol.name);
    }
}

#[test]
fn labels_keep_their_pass_1_addresses() {
    let source = "\
 ORG $2000
one NOP
two LDX #$1234
three RTS";
    let (asm, _) = assemble(source);
    assert_eq!(symbol_value(&asm, "one"), 0x2000);
    assert_eq!(symbol_value(&asm, "two"), 0x2001);
    assert_eq!(symbol_value(&asm, "three"), 0x2004);
}

#[test]
fn cross_reference_lists_symbols() {
    let source = "\
 ORG $1000
 BNE skip
 NOP
skip RTS";
    let (_, listing) = assemble(source);
    assert!(listing.contains("Symbols"));
    assert!(listing.contains("skip"));
    assert!(listing.contains("$1003"));
}

#[test]
fn jmp_to_bra_optimization_backward_only() {
    let source = "\
 ORG $1000
back NOP
 JMP back
 JMP $4000";
    let cfg = Config {
        optimize: true,
        ..Config::default()
    };
    let (asm, _) = assemble_cfg(cfg, source);
    // Backward JMP becomes BRA; the forward/far one stays extended.
    assert_eq!(rom(&asm, 0x1001, 2), vec![0x20, 0xfd]);
    assert_eq!(rom(&asm, 0x1003, 3), vec![0x7e, 0x40, 0x00]);
}

#[test]
fn promoted_branch_still_reaches_its_target() {
    let source = "\
 ORG $1000
 BRA far
 FILL 300 (0)
far RTS";
    let cfg = Config {
        optimize: true,
        ..Config::default()
    };
    let (asm, _) = assemble_cfg(cfg, source);
    let far = symbol_value(&asm, "far");
    assert_eq!(rom(&asm, 0x1000, 1), vec![0x16]);
    let disp = ((asm.rom.read(0x1001) as i32) << 8) | asm.rom.read(0x1002) as i32;
    // LBRA displacement applies to the address after the instruction.
    assert_eq!(0x1003 + disp, far);
}
