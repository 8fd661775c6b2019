//! In-process JIT backend for FasterBASIC's textual IR: a W^X memory region
//! (§3.6/§4.5), an encoder/linker pair (§4.6) and a runtime jump table
//! (§4.7). [`run_module`] is the crate's single entry point, matching
//! `fbc::compile_and_run`'s call site.

pub mod encoder;
pub mod linker;
pub mod memory;
pub mod runtime_table;

use encoder::Encoder;
use memory::{JitMemoryRegion, MemoryError};

const DEFAULT_CODE_CAPACITY: usize = 1 << 20;
const DEFAULT_DATA_CAPACITY: usize = 1 << 20;

#[derive(Debug)]
pub enum JitError {
    Memory(MemoryError),
    Encode(encoder::EncodeError),
    Link(linker::LinkError),
    NoEntryPoint,
}

impl std::fmt::Display for JitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JitError::Memory(e) => write!(f, "{}", e),
            JitError::Encode(e) => write!(f, "{}", e),
            JitError::Link(e) => write!(f, "{}", e),
            JitError::NoEntryPoint => write!(f, "compiled module has no $main entry point"),
        }
    }
}

impl std::error::Error for JitError {}

impl From<MemoryError> for JitError {
    fn from(e: MemoryError) -> Self {
        JitError::Memory(e)
    }
}

impl From<encoder::EncodeError> for JitError {
    fn from(e: encoder::EncodeError) -> Self {
        JitError::Encode(e)
    }
}

impl From<linker::LinkError> for JitError {
    fn from(e: linker::LinkError) -> Self {
        JitError::Link(e)
    }
}

/// Encodes, links and runs `ir_text` (the textual IR produced by
/// `fbc::ir::emit`), returning the process-style exit code `main` returns.
pub fn run_module(ir_text: &str) -> Result<i64, JitError> {
    let region = JitMemoryRegion::new(DEFAULT_CODE_CAPACITY, DEFAULT_DATA_CAPACITY)?;
    let mut enc = Encoder::new(region);

    enc.encode_module(ir_text)?;
    linker::link(&mut enc)?;

    tracing::debug!(report = %linker::pipeline_report(&enc), "jit link complete");

    let entry = enc.entry_offset.ok_or(JitError::NoEntryPoint)?;
    enc.region.make_executable()?;

    let f = enc.region.function_ptr(entry)?;
    let f: extern "C" fn() -> i64 = unsafe { std::mem::transmute(f) };
    let code = f();

    enc.region.make_writable()?;
    Ok(code)
}

// Actually executing JIT-compiled code only makes sense on the host
// architecture the encoder targets.
#[cfg(all(test, target_arch = "aarch64"))]
mod tests {
    use super::*;

    #[test]
    fn runs_a_trivial_return() {
        let ir = "export function w $main() {\n    ret 42\n}\n";
        let code = run_module(ir).unwrap();
        assert_eq!(code, 42);
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let ir = "export function w $helper() {\n    ret 0\n}\n";
        assert!(matches!(run_module(ir), Err(JitError::NoEntryPoint)));
    }
}
