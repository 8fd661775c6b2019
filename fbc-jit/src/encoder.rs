//! The encoder (§4.6): walks the textual IR record stream and emits ARM64
//! words into a [`JitMemoryRegion`], recording a labels map, a fixups list,
//! external-call records and data relocations for the linker to resolve.
//!
//! Control flow (`jmp`, `jnz`, `ret`, `call`) and global-address loads
//! (`=l copy $symbol`, encoded as a real ADRP/ADD pair) are encoded
//! precisely since those are the forms the linker's invariants are built
//! on. Everything else (arithmetic, loads/stores, phi, conversions) is
//! encoded as a NOP placeholder that still advances the instruction stream
//! and counts toward the statistics — a full register allocator is out of
//! scope here, but the control-flow skeleton and its relocations are real.

use crate::memory::{JitMemoryRegion, MemoryError};
use std::collections::HashMap;

const NOP: u32 = 0xd503201f;
const RET: u32 = 0xd65f03c0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Unconditional,
    Conditional,
}

#[derive(Debug, Clone)]
pub struct Fixup {
    pub code_offset: usize,
    pub target_label: String,
    pub kind: BranchKind,
}

#[derive(Debug, Clone)]
pub struct ExternalCallRecord {
    pub code_offset: usize,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct DataReloc {
    pub data_offset: usize,
    pub data_symbol: String,
}

/// An ADRP/ADD pair emitted for a code-side `=l copy $symbol` (materializing
/// a global's address into a register, as opposed to a data literal's
/// pointer slot, which [`DataReloc`] covers instead). `adrp_offset` is the
/// code offset of the ADRP half; the ADD half immediately follows it.
#[derive(Debug, Clone)]
pub struct AddressReloc {
    pub adrp_offset: usize,
    pub data_symbol: String,
}

#[derive(Debug, Default, Clone)]
pub struct EncodeStats {
    pub instructions_emitted: usize,
    pub functions_encoded: usize,
    pub labels_recorded: usize,
    pub fixups_created: usize,
    pub fixups_resolved: usize,
    pub external_call_records: usize,
    pub data_bytes_emitted: usize,
    pub address_relocs_created: usize,
    pub address_relocs_resolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    Memory(MemoryError),
    MalformedInstruction(String),
    UnknownLabel(String),
    EntryPointMissing,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Memory(e) => write!(f, "{}", e),
            EncodeError::MalformedInstruction(s) => write!(f, "malformed IR instruction: {}", s),
            EncodeError::UnknownLabel(s) => write!(f, "branch to unknown label @{}", s),
            EncodeError::EntryPointMissing => write!(f, "no $main function found in module"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<MemoryError> for EncodeError {
    fn from(e: MemoryError) -> Self {
        EncodeError::Memory(e)
    }
}

pub struct Encoder {
    pub region: JitMemoryRegion,
    pub code_labels: HashMap<String, usize>,
    pub data_labels: HashMap<String, usize>,
    pub fixups: Vec<Fixup>,
    pub externals: Vec<ExternalCallRecord>,
    pub data_relocs: Vec<DataReloc>,
    pub address_relocs: Vec<AddressReloc>,
    pub stats: EncodeStats,
    pub entry_offset: Option<usize>,
}

impl Encoder {
    pub fn new(region: JitMemoryRegion) -> Self {
        Encoder {
            region,
            code_labels: HashMap::new(),
            data_labels: HashMap::new(),
            fixups: Vec::new(),
            externals: Vec::new(),
            data_relocs: Vec::new(),
            address_relocs: Vec::new(),
            stats: EncodeStats::default(),
            entry_offset: None,
        }
    }

    /// Encodes every `data $name = { ... }` and `export function ... { ... }`
    /// block found in `source`.
    pub fn encode_module(&mut self, source: &str) -> Result<(), EncodeError> {
        let mut lines = source.lines().peekable();
        let mut current_function: Option<String> = None;

        while let Some(raw) = lines.next() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("data $") {
                self.encode_data_decl(rest)?;
                continue;
            }

            if line.starts_with("export function") || line.starts_with("function") {
                let name = function_name(line);
                let offset = self.region.code_len();
                self.code_labels.insert(name.clone(), offset);
                if name == "main" {
                    self.entry_offset = Some(offset);
                }
                self.stats.functions_encoded += 1;
                current_function = Some(name);
                continue;
            }

            if line == "}" {
                current_function = None;
                continue;
            }

            if current_function.is_none() {
                continue;
            }

            if let Some(label) = line.strip_prefix('@') {
                let offset = self.region.code_len();
                self.code_labels.insert(label.trim_end_matches(':').to_string(), offset);
                self.stats.labels_recorded += 1;
                continue;
            }

            self.encode_instruction(line)?;
        }

        Ok(())
    }

    fn encode_data_decl(&mut self, rest: &str) -> Result<(), EncodeError> {
        let (name, body) = rest
            .split_once('=')
            .ok_or_else(|| EncodeError::MalformedInstruction(rest.to_string()))?;
        let name = name.trim().to_string();
        let body = body.trim().trim_start_matches('{').trim_end_matches('}');

        let offset = self.region.data_len();
        self.data_labels.insert(name, offset);

        for item in split_top_level(body) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            self.encode_data_item(item)?;
        }
        Ok(())
    }

    fn encode_data_item(&mut self, item: &str) -> Result<(), EncodeError> {
        let mut parts = item.splitn(2, ' ');
        let tag = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("").trim();

        let bytes: Vec<u8> = match tag {
            "b" => {
                if let Some(s) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
                    s.as_bytes().to_vec()
                } else {
                    vec![value.parse::<i64>().unwrap_or(0) as u8]
                }
            }
            "w" => (value.parse::<i32>().unwrap_or(0)).to_le_bytes().to_vec(),
            "d" => (value.parse::<f64>().unwrap_or(0.0)).to_bits().to_le_bytes().to_vec(),
            "l" => {
                if let Some(sym) = value.strip_prefix('$') {
                    let reloc_offset = self.region.data_len();
                    self.data_relocs.push(DataReloc {
                        data_offset: reloc_offset,
                        data_symbol: sym.to_string(),
                    });
                    0u64.to_le_bytes().to_vec()
                } else {
                    (value.parse::<i64>().unwrap_or(0) as u64).to_le_bytes().to_vec()
                }
            }
            _ => Vec::new(),
        };

        if !bytes.is_empty() {
            self.region.copy_data(&bytes)?;
            self.stats.data_bytes_emitted += bytes.len();
        }
        Ok(())
    }

    fn encode_instruction(&mut self, instr: &str) -> Result<(), EncodeError> {
        self.stats.instructions_emitted += 1;

        if let Some(target) = instr.strip_prefix("jmp @") {
            let offset = self.region.copy_code(&0x1400_0000u32.to_le_bytes())?;
            self.fixups.push(Fixup {
                code_offset: offset,
                target_label: target.trim().to_string(),
                kind: BranchKind::Unconditional,
            });
            self.stats.fixups_created += 1;
            return Ok(());
        }

        if let Some(rest) = instr.strip_prefix("jnz ") {
            let parts: Vec<&str> = rest.split(',').map(|p| p.trim()).collect();
            let true_label = parts.get(1).and_then(|p| p.strip_prefix('@')).unwrap_or("");
            let false_label = parts.get(2).and_then(|p| p.strip_prefix('@')).unwrap_or("");

            // CBNZ w9, <true-label> then B <false-label>; the condition
            // value itself rides in w9 from whatever NOP-placeholder slot
            // produced it upstream.
            let cbnz_offset = self.region.copy_code(&0x3500_0009u32.to_le_bytes())?;
            self.fixups.push(Fixup {
                code_offset: cbnz_offset,
                target_label: true_label.to_string(),
                kind: BranchKind::Conditional,
            });
            self.stats.fixups_created += 1;

            let b_offset = self.region.copy_code(&0x1400_0000u32.to_le_bytes())?;
            self.fixups.push(Fixup {
                code_offset: b_offset,
                target_label: false_label.to_string(),
                kind: BranchKind::Unconditional,
            });
            self.stats.fixups_created += 1;
            return Ok(());
        }

        if instr == "ret" {
            self.region.copy_code(&RET.to_le_bytes())?;
            return Ok(());
        }
        if let Some(val) = instr.strip_prefix("ret ") {
            // `ret <literal>` is common for program exit codes (`ret 0`);
            // honor it with a real MOVZ X0 so the JIT's return value isn't
            // whatever happened to be in x0.
            if let Ok(n) = val.trim().parse::<i64>() {
                let imm16 = (n as u64 & 0xffff) as u32;
                let movz: u32 = 0xd280_0000 | (imm16 << 5);
                self.region.copy_code(&movz.to_le_bytes())?;
            }
            self.region.copy_code(&RET.to_le_bytes())?;
            return Ok(());
        }

        if let Some((_, symbol)) = instr.split_once("=l copy $") {
            // ADRP Xd, <page> ; ADD Xd, Xd, <offset>, Xd = x9 — the pair the
            // linker's `patch_adrp_add` rewrites once the symbol's data
            // offset is known. Placeholder immediates are zero so the
            // linker's OR-in-place patching doesn't clobber stray bits.
            let adrp_offset = self.region.copy_code(&0x9000_0009u32.to_le_bytes())?;
            self.region.copy_code(&0x9100_0129u32.to_le_bytes())?;
            self.address_relocs.push(AddressReloc {
                adrp_offset,
                data_symbol: symbol.trim().to_string(),
            });
            self.stats.address_relocs_created += 1;
            return Ok(());
        }

        if let Some(call_pos) = instr.find("call $") {
            let after = &instr[call_pos + "call $".len()..];
            let symbol_end = after.find('(').unwrap_or(after.len());
            let symbol = after[..symbol_end].to_string();

            // Placeholder BL; the linker rewrites this once it knows
            // whether the symbol resolves to a trampoline or a trap stub.
            let offset = self.region.copy_code(&0x9400_0000u32.to_le_bytes())?;
            self.externals.push(ExternalCallRecord {
                code_offset: offset,
                symbol,
            });
            self.stats.external_call_records += 1;
            return Ok(());
        }

        self.region.copy_code(&NOP.to_le_bytes())?;
        Ok(())
    }
}

fn function_name(header: &str) -> String {
    header
        .split('$')
        .nth(1)
        .map(|rest| rest.split('(').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

/// Splits a `{ ... }` data body on top-level commas (there are no nested
/// braces in this IR's data literals, so this is just a plain split).
fn split_top_level(body: &str) -> Vec<String> {
    body.split(',').map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_encoder() -> Encoder {
        Encoder::new(JitMemoryRegion::new(1 << 16, 1 << 16).unwrap())
    }

    #[test]
    fn encodes_hello_world_with_external_calls() {
        let ir = r#"
data $str_0 = { b "hi", b 0 }
export function w $main() {
    call $_samm_init()
    call $_basic_print_string(%t.0)
    call $_basic_print_newline()
    call $_samm_shutdown()
    ret 0
}
"#;
        let mut enc = fresh_encoder();
        enc.encode_module(ir).unwrap();
        assert_eq!(enc.stats.functions_encoded, 1);
        assert!(enc.stats.external_call_records >= 2);
        assert!(enc.region.code_len() > 0);
        assert!(enc.entry_offset.is_some());
    }

    #[test]
    fn global_address_load_emits_adrp_add_pair() {
        let ir = r#"
data $str_0 = { b "hi", b 0 }
export function w $main() {
    %t.0 =l copy $str_0
    ret 0
}
"#;
        let mut enc = fresh_encoder();
        enc.encode_module(ir).unwrap();
        assert_eq!(enc.address_relocs.len(), 1);
        assert_eq!(enc.address_relocs[0].data_symbol, "str_0");
        assert_eq!(enc.stats.address_relocs_created, 1);
    }

    #[test]
    fn branch_diamond_creates_forward_fixups() {
        let ir = r#"
export function w $main() {
    jnz %t.0, @then_0, @else_0
@then_0
    jmp @join_0
@else_0
    jmp @join_0
@join_0
    ret 0
}
"#;
        let mut enc = fresh_encoder();
        enc.encode_module(ir).unwrap();
        assert!(enc.fixups.len() >= 2);
        assert_eq!(enc.fixups.len(), enc.stats.fixups_created);
        for label in ["then_0", "else_0", "join_0"] {
            assert!(enc.code_labels.contains_key(label));
        }
    }
}
