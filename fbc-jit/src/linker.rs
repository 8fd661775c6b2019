//! Linking (§4.6): resolves the encoder's fixups against the labels map,
//! resolves external-call records against the runtime jump table (§4.7),
//! allocating a trampoline or trap stub per symbol, and back-patches data
//! relocations. Also renders the pipeline report.

use crate::encoder::{BranchKind, Encoder};
use crate::memory::MemoryError;
use crate::runtime_table;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    UnresolvedLabel(String),
    UnresolvedDataSymbol(String),
    Memory(MemoryError),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::UnresolvedLabel(l) => write!(f, "branch to unresolved label @{}", l),
            LinkError::UnresolvedDataSymbol(s) => write!(f, "data relocation to unresolved symbol ${}", s),
            LinkError::Memory(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<MemoryError> for LinkError {
    fn from(e: MemoryError) -> Self {
        LinkError::Memory(e)
    }
}

/// Resolves every fixup, external call, and data relocation the encoder
/// recorded. After this returns, `fixups_created == fixups_resolved` and
/// every external-call record has either a trampoline or a trap stub
/// (§8 invariant #11).
pub fn link(enc: &mut Encoder) -> Result<(), LinkError> {
    resolve_fixups(enc)?;
    resolve_externals(enc)?;
    resolve_data_relocs(enc)?;
    resolve_address_relocs(enc)?;
    Ok(())
}

fn resolve_fixups(enc: &mut Encoder) -> Result<(), LinkError> {
    for fixup in &enc.fixups {
        let target = *enc
            .code_labels
            .get(&fixup.target_label)
            .ok_or_else(|| LinkError::UnresolvedLabel(fixup.target_label.clone()))?;
        let delta_words = (target as i64 - fixup.code_offset as i64) / 4;

        let instr: u32 = match fixup.kind {
            BranchKind::Unconditional => {
                let imm26 = (delta_words as u32) & 0x03ff_ffff;
                0x1400_0000 | imm26
            }
            BranchKind::Conditional => {
                let imm19 = (delta_words as u32) & 0x7_ffff;
                // CBNZ w9, #imm19
                0x3500_0009 | (imm19 << 5)
            }
        };
        enc.region.overwrite_code_word(fixup.code_offset, instr)?;
        enc.stats.fixups_resolved += 1;
    }
    Ok(())
}

fn resolve_externals(enc: &mut Encoder) -> Result<(), LinkError> {
    let mut stubs: HashMap<String, usize> = HashMap::new();

    let externals = enc.externals.clone();
    for call in &externals {
        let stub_offset = if let Some(&existing) = stubs.get(&call.symbol) {
            existing
        } else {
            let offset = match runtime_table::lookup(&call.symbol) {
                Some(addr) => enc.region.write_trampoline(addr)?,
                None => enc.region.write_trap_stub()?,
            };
            stubs.insert(call.symbol.clone(), offset);
            offset
        };
        enc.region.patch_bl_to_trampoline(call.code_offset, stub_offset)?;
    }
    Ok(())
}

fn resolve_data_relocs(enc: &mut Encoder) -> Result<(), LinkError> {
    let relocs = enc.data_relocs.clone();
    for reloc in &relocs {
        let target_addr = if let Some(&offset) = enc.data_labels.get(&reloc.data_symbol) {
            enc.region.data_base_addr() + offset as u64
        } else if let Some(&offset) = enc.code_labels.get(&reloc.data_symbol) {
            enc.region.code_base_addr() + offset as u64
        } else {
            return Err(LinkError::UnresolvedDataSymbol(reloc.data_symbol.clone()));
        };
        enc.region.patch_data_u64(reloc.data_offset, target_addr)?;
    }
    Ok(())
}

/// Resolves every code-side ADRP/ADD pair the encoder recorded for a
/// `=l copy $symbol` global-address load, patching each through
/// [`JitMemoryRegion::patch_adrp_add`] (§4.6, §8 invariant #10) rather than
/// the raw pointer write [`resolve_data_relocs`] uses for data-to-data
/// literal slots.
fn resolve_address_relocs(enc: &mut Encoder) -> Result<(), LinkError> {
    let relocs = enc.address_relocs.clone();
    for reloc in &relocs {
        let target_addr = if let Some(&offset) = enc.data_labels.get(&reloc.data_symbol) {
            enc.region.data_base_addr() + offset as u64
        } else if let Some(&offset) = enc.code_labels.get(&reloc.data_symbol) {
            enc.region.code_base_addr() + offset as u64
        } else {
            return Err(LinkError::UnresolvedDataSymbol(reloc.data_symbol.clone()));
        };
        enc.region.patch_adrp_add(reloc.adrp_offset, target_addr)?;
        enc.stats.address_relocs_resolved += 1;
    }
    Ok(())
}

/// A phase-by-phase human-readable summary over the lived IR stream before
/// it's discarded (§4.6 "pipeline report").
pub fn pipeline_report(enc: &Encoder) -> String {
    let s = &enc.stats;
    format!(
        "encode: {} instruction(s) across {} function(s)\n\
         labels: {} recorded\n\
         fixups: {} created, {} resolved\n\
         externals: {} call site(s)\n\
         address relocs: {} created, {} resolved\n\
         data: {} byte(s) emitted\n",
        s.instructions_emitted,
        s.functions_encoded,
        s.labels_recorded,
        s.fixups_created,
        s.fixups_resolved,
        s.external_call_records,
        s.address_relocs_created,
        s.address_relocs_resolved,
        s.data_bytes_emitted,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::JitMemoryRegion;

    fn linked(ir: &str) -> Encoder {
        let region = JitMemoryRegion::new(1 << 16, 1 << 16).unwrap();
        let mut enc = Encoder::new(region);
        enc.encode_module(ir).unwrap();
        link(&mut enc).unwrap();
        enc
    }

    #[test]
    fn branch_diamond_fixups_all_resolve() {
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
        let enc = linked(ir);
        assert_eq!(enc.stats.fixups_created, enc.stats.fixups_resolved);
        assert!(enc.stats.fixups_created >= 2);
    }

    #[test]
    fn external_calls_all_get_a_stub() {
        let ir = r#"
export function w $main() {
    call $_samm_init()
    call $_basic_print_newline()
    call $_not_a_real_runtime_symbol()
    ret 0
}
"#;
        let enc = linked(ir);
        assert_eq!(enc.stats.external_call_records, 3);
    }

    #[test]
    fn global_address_load_resolves_against_data_label() {
        let ir = r#"
data $str_0 = { b "hi", b 0 }
export function w $main() {
    %t.0 =l copy $str_0
    ret 0
}
"#;
        let enc = linked(ir);
        assert_eq!(enc.stats.address_relocs_created, 1);
        assert_eq!(enc.stats.address_relocs_resolved, 1);
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let ir = r#"
export function w $main() {
    jmp @nowhere
    ret 0
}
"#;
        let region = JitMemoryRegion::new(1 << 16, 1 << 16).unwrap();
        let mut enc = Encoder::new(region);
        enc.encode_module(ir).unwrap();
        assert!(matches!(link(&mut enc), Err(LinkError::UnresolvedLabel(_))));
    }
}
