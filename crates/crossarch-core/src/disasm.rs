//! Linear-sweep disassembly using each ISA's decoder and canonical text.

use std::fmt::{self, Write as _};

use crate::isa::{Arm, Mips32, PowerPc, X86};
use crate::machine::{raw_prefix, Isa, SliceSource};
use crate::Architecture;

/// One disassembled instruction (or undecodable chunk).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DisassemblyRow {
    /// Address of the first byte.
    pub address: u32,
    /// Bytes covered by this row.
    pub bytes: Vec<u8>,
    /// Canonical text, or a `.word`/`.byte` directive.
    pub text: String,
    /// Whether the bytes decoded.
    pub valid: bool,
}

impl fmt::Display for DisassemblyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = String::with_capacity(self.bytes.len() * 3);
        for byte in &self.bytes {
            if !hex.is_empty() {
                hex.push(' ');
            }
            let _ = write!(hex, "{byte:02x}");
        }
        write!(f, "{:#010x}:  {hex:<20}  {}", self.address, self.text)
    }
}

/// Disassembles `bytes` as if loaded at `base`.
///
/// Undecodable fixed-width words render as `.word`; an undecodable x86 byte
/// or a truncated tail renders as `.byte`, and the sweep resumes after it.
#[must_use]
pub fn disassemble(architecture: Architecture, bytes: &[u8], base: u32) -> Vec<DisassemblyRow> {
    match architecture {
        Architecture::Mips32 => sweep::<Mips32>(bytes, base),
        Architecture::Arm => sweep::<Arm>(bytes, base),
        Architecture::X86 => sweep::<X86>(bytes, base),
        Architecture::PowerPc => sweep::<PowerPc>(bytes, base),
    }
}

fn byte_directive(bytes: &[u8]) -> String {
    let list: Vec<String> = bytes.iter().map(|byte| format!("{byte:#04x}")).collect();
    format!(".byte {}", list.join(", "))
}

#[allow(clippy::cast_possible_truncation)]
fn sweep<I: Isa>(bytes: &[u8], base: u32) -> Vec<DisassemblyRow> {
    let width = I::ARCH.instruction_width().map_or(1, |width| width as usize);
    let mut rows = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        let address = base.wrapping_add(offset as u32);
        let row = match I::decode(&mut SliceSource::new(rest)) {
            Ok(decoded) => {
                let len = (decoded.len as usize).min(rest.len());
                DisassemblyRow {
                    address,
                    bytes: rest[..len].to_vec(),
                    text: decoded.instruction.to_string(),
                    valid: true,
                }
            }
            Err(_) => {
                let len = width.min(rest.len());
                let chunk = &rest[..len];
                let text = if len == 4 {
                    format!(".word {:#010x}", raw_prefix(chunk))
                } else {
                    byte_directive(chunk)
                };
                DisassemblyRow {
                    address,
                    bytes: chunk.to_vec(),
                    text,
                    valid: false,
                }
            }
        };
        offset += row.bytes.len().max(1);
        rows.push(row);
    }
    rows
}
