// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Binary and Motorola S-record output, plus the JSON label dump.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::expr::UNDEF;
use crate::core::rom::RomImage;
use crate::core::symbol_table::{RefKind, SymbolTable};

use serde_json::json;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Binary,
    SRecord,
}

/// One `STORE start,len,"file"[,fmt[,entry]]` request, executed after a
/// clean pass 2.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub start: i32,
    pub length: i32,
    pub path: String,
    pub format: StoreFormat,
    /// Execution entry address, or -1 when absent.
    pub entry: i32,
    /// Number of S1 records written, for the S5 record.
    pub records: u32,
}

/// Execute the accumulated storage requests in order.
pub fn write_stores(rom: &RomImage, stores: &mut [StoreRequest]) -> Result<(), AsmError> {
    for request in stores {
        match request.format {
            StoreFormat::Binary => write_binary(rom, request)?,
            StoreFormat::SRecord => write_s_record_file(rom, request)?,
        }
    }
    Ok(())
}

fn open_error(path: &str) -> AsmError {
    AsmError::new(AsmErrorKind::Io, "Error opening file for write", Some(path))
}

fn write_binary(rom: &RomImage, request: &StoreRequest) -> Result<(), AsmError> {
    let file = File::create(&request.path).map_err(|_| open_error(&request.path))?;
    let mut out = BufWriter::new(file);
    write_binary_to(&mut out, rom, request).map_err(|err| {
        AsmError::new(AsmErrorKind::Io, &err.to_string(), Some(&request.path))
    })
}

fn write_binary_to<W: Write>(
    out: &mut W,
    rom: &RomImage,
    request: &StoreRequest,
) -> io::Result<()> {
    if request.entry > -1 {
        // Simple load-address header: high byte, low byte of the start.
        out.write_all(&[(request.start >> 8) as u8, request.start as u8])?;
    }
    out.write_all(rom.slice(request.start as usize, request.length as usize))
}

fn write_s_record_file(rom: &RomImage, request: &mut StoreRequest) -> Result<(), AsmError> {
    let mut path = request.path.clone();
    if !path.contains('.') {
        path.push_str(".S19");
    }
    let file = File::create(&path).map_err(|_| open_error(&path))?;
    let mut out = BufWriter::new(file);
    let data = rom.slice(request.start as usize, request.length as usize);
    request.records = write_s_records(&mut out, data, request.start as u16, request.entry)
        .map_err(|err| AsmError::new(AsmErrorKind::Io, &err.to_string(), Some(&path)))?;
    Ok(())
}

/// Emit a complete S-record stream: S0 header, 32-byte S1 data records, an
/// S5 record count, and an S9 termination record when an entry address was
/// given. Returns the number of S1 records.
pub fn write_s_records<W: Write>(
    out: &mut W,
    data: &[u8],
    start: u16,
    entry: i32,
) -> io::Result<u32> {
    write_s_record_line(out, "S0", 0, b"Bit Shift Assembler")?;
    let mut records = 0u32;
    let mut addr = start;
    for chunk in data.chunks(32) {
        write_s_record_line(out, "S1", addr, chunk)?;
        records += 1;
        addr = addr.wrapping_add(chunk.len() as u16);
    }
    write_s_record_line(out, "S5", records as u16, &[])?;
    if entry > -1 {
        write_s_record_line(out, "S9", entry as u16, &[])?;
    }
    Ok(records)
}

/// One record: type, count, address, data, one's-complement checksum, CRLF
/// line ending for ancient EPROM programmers.
fn write_s_record_line<W: Write>(
    out: &mut W,
    record_type: &str,
    addr: u16,
    data: &[u8],
) -> io::Result<()> {
    let count = data.len() as u32 + 3;
    let mut checksum = count + (addr as u32 & 0xff) + (addr as u32 >> 8);
    write!(out, "{record_type}{count:02X}{addr:04X}")?;
    for byte in data {
        write!(out, "{byte:02X}")?;
        checksum += *byte as u32;
    }
    write!(out, "{:02X}\r\n", !checksum & 0xff)
}

/// Machine-readable symbol dump for `--labels`.
pub fn write_labels_file(path: &Path, symbols: &SymbolTable) -> io::Result<()> {
    let labels: Vec<serde_json::Value> = symbols
        .iter()
        .map(|symbol| {
            let value = if symbol.value == UNDEF {
                serde_json::Value::Null
            } else {
                json!(symbol.value)
            };
            json!({
                "name": symbol.name,
                "value": value,
                "defined_at": symbol
                    .refs
                    .iter()
                    .find(|r| r.kind == RefKind::Define)
                    .map(|r| r.line),
                "references": symbol
                    .refs
                    .iter()
                    .filter(|r| r.kind == RefKind::Use)
                    .map(|r| r.line)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &json!({ "labels": labels }))?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verify_checksum(line: &str) {
        let bytes = &line[2..];
        let count = u8::from_str_radix(&bytes[0..2], 16).unwrap() as u32;
        let mut sum = count;
        for idx in (2..2 + (count as usize) * 2).step_by(2) {
            sum += u8::from_str_radix(&bytes[idx..idx + 2], 16).unwrap() as u32;
        }
        assert_eq!(sum % 256, 0xff, "checksum mismatch for {line}");
    }

    #[test]
    fn s_record_stream_shape() {
        let mut out = Vec::new();
        let records =
            write_s_records(&mut out, &[0xDE, 0xAD, 0xBE, 0xEF], 0x0100, -1).unwrap();
        assert_eq!(records, 1);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("S0"));
        assert_eq!(lines[1], "S1070100DEADBEEFBF");
        assert_eq!(lines[2], "S5030001FB");
        assert_eq!(lines.len(), 3);
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn s_record_checksums_close_to_ff() {
        let data: Vec<u8> = (0..100).collect();
        let mut out = Vec::new();
        write_s_records(&mut out, &data, 0x8000, 0x8000).unwrap();
        let text = String::from_utf8(out).unwrap();
        for line in text.lines() {
            verify_checksum(line);
        }
    }

    #[test]
    fn s_record_splits_at_32_bytes() {
        let data = vec![0u8; 70];
        let mut out = Vec::new();
        let records = write_s_records(&mut out, &data, 0x0000, -1).unwrap();
        assert_eq!(records, 3);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("S1230000"));
        assert!(text.contains("S1090040"));
    }

    #[test]
    fn s9_record_present_only_with_entry() {
        let mut out = Vec::new();
        write_s_records(&mut out, &[1], 0, 0x1234).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("S9031234B6"));

        let mut out = Vec::new();
        write_s_records(&mut out, &[1], 0, -1).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("S9"));
    }

    #[test]
    fn binary_store_prefixes_load_address_with_entry() {
        let mut rom = RomImage::new(0);
        for (offset, byte) in [0x11u8, 0x22, 0x33].iter().enumerate() {
            rom.put(0x2000 + offset as i32, *byte as i32).unwrap();
        }
        let request = StoreRequest {
            start: 0x2000,
            length: 3,
            path: String::new(),
            format: StoreFormat::Binary,
            entry: 0x2000,
            records: 0,
        };
        let mut out = Vec::new();
        write_binary_to(&mut out, &rom, &request).unwrap();
        assert_eq!(out, vec![0x20, 0x00, 0x11, 0x22, 0x33]);

        let plain = StoreRequest { entry: -1, ..request };
        let mut out = Vec::new();
        write_binary_to(&mut out, &rom, &plain).unwrap();
        assert_eq!(out, vec![0x11, 0x22, 0x33]);
    }
}
