use fbc_jit::encoder::Encoder;
use fbc_jit::linker;
use fbc_jit::memory::JitMemoryRegion;

const HELLO_IR: &str = r#"
data $str_0 = { b "hi", b 0 }
export function w $main() {
    call $_samm_init()
    call $_basic_print_string(%t.0)
    call $_basic_print_newline()
    call $_samm_shutdown()
    ret 0
}
"#;

const BRANCH_DIAMOND_IR: &str = r#"
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

#[test]
fn hello_world_produces_code_and_external_calls() {
    let region = JitMemoryRegion::new(1 << 16, 1 << 16).unwrap();
    let mut enc = Encoder::new(region);
    enc.encode_module(HELLO_IR).unwrap();
    linker::link(&mut enc).unwrap();

    assert!(enc.region.code_len() > 0);
    assert!(enc.stats.functions_encoded >= 1);
    assert!(enc.stats.external_call_records >= 2);
}

#[test]
fn string_literal_address_load_resolves_via_adrp_add() {
    let ir = r#"
data $str_0 = { b "hi", b 0 }
export function w $main() {
    %t.0 =l copy $str_0
    call $_basic_print_string(%t.0)
    ret 0
}
"#;
    let region = JitMemoryRegion::new(1 << 16, 1 << 16).unwrap();
    let mut enc = Encoder::new(region);
    enc.encode_module(ir).unwrap();
    linker::link(&mut enc).unwrap();

    assert_eq!(enc.stats.address_relocs_created, 1);
    assert_eq!(enc.stats.address_relocs_resolved, 1);
}

#[test]
fn branch_diamond_resolves_at_least_two_forward_fixups() {
    let region = JitMemoryRegion::new(1 << 16, 1 << 16).unwrap();
    let mut enc = Encoder::new(region);
    enc.encode_module(BRANCH_DIAMOND_IR).unwrap();
    linker::link(&mut enc).unwrap();

    assert!(enc.stats.fixups_resolved >= 2);
    assert_eq!(enc.stats.fixups_created, enc.stats.fixups_resolved);
}

#[test]
fn pipeline_report_is_written_out_for_inspection() {
    use std::fs;
    use tempfile::tempdir;

    let region = JitMemoryRegion::new(1 << 16, 1 << 16).unwrap();
    let mut enc = Encoder::new(region);
    enc.encode_module(HELLO_IR).unwrap();
    linker::link(&mut enc).unwrap();

    let report = linker::pipeline_report(&enc);
    let dir = tempdir().unwrap();
    let path = dir.path().join("pipeline.txt");
    fs::write(&path, &report).unwrap();

    let read_back = fs::read_to_string(&path).unwrap();
    assert_eq!(read_back, report);
    assert!(read_back.contains("fixups:"));
}
