use fbc::config::CompilerConfig;
use fbc::lexer;

fn cfg() -> CompilerConfig {
    CompilerConfig::default()
}

#[test]
fn e1_empty_program_has_no_errors_and_a_trivial_main() {
    let stream = lexer::tokenize("");
    assert!(!stream.diagnostics.has_errors());

    let result = fbc::compile("", &cfg()).expect("empty program should compile");
    assert!(!result.diagnostics.has_errors());
    assert_eq!(result.cfgs.len(), 1);
    let main = &result.cfgs[0];
    assert_eq!(main.blocks.len(), 1);
}

#[test]
fn e2_hello_world_emits_print_calls_and_exit() {
    let result = fbc::compile("PRINT \"Hello\"\n", &cfg()).expect("should compile");
    let text = result.ir.text();

    assert!(text.contains("\"Hello\""));
    assert!(text.contains("_basic_print_string"));
    assert!(text.contains("_basic_print_newline"));
    assert!(text.contains("ret 0"));
    assert!(result.ir.function_count >= 1);
    assert!(result.ir.external_call_count >= 2);
}

#[test]
fn e3_branch_diamond_has_five_blocks_and_two_branch_edges() {
    let src = "IF X > 0 THEN\nPRINT \"yes\"\nELSE\nPRINT \"no\"\nEND IF\n";
    let result = fbc::compile(src, &cfg()).expect("should compile");
    let main = &result.cfgs[0];

    assert!(main.blocks.len() >= 4);
    let branch_edges = main
        .edges
        .iter()
        .filter(|e| matches!(e.kind, fbc::cfg::EdgeKind::True | fbc::cfg::EdgeKind::False))
        .count();
    assert_eq!(branch_edges, 2);
}

#[test]
fn e4_for_loop_has_exactly_one_back_edge_and_integer_index() {
    let src = "FOR I = 1 TO 10\nPRINT I\nNEXT I\n";
    let result = fbc::compile(src, &cfg()).expect("should compile");
    let main = &result.cfgs[0];

    assert_eq!(main.natural_loops().len(), 1);

    let i_var = result
        .symbols
        .lookup_variable(&fbc::symbol_table::Scope::Global, "I")
        .expect("loop index should be registered");
    assert!(i_var.ty.base_type.is_integer());
}

#[test]
fn e5_unreachable_code_after_goto_is_flagged() {
    let src = "10 GOTO 30\n20 PRINT \"dead\"\n30 END\n";
    let result = fbc::compile(src, &cfg()).expect("should compile");
    let main = &result.cfgs[0];

    assert_eq!(main.unreachable_blocks().len(), 1);
}

#[test]
fn e6_subclass_inherits_and_overrides_vtable_slot() {
    let src = "CLASS Animal\nMETHOD Speak()\nEND METHOD\nEND CLASS\nCLASS Dog EXTENDS Animal\nMETHOD Speak()\nEND METHOD\nEND CLASS\n";
    let result = fbc::compile(src, &cfg()).expect("should compile");

    let animal = result.symbols.lookup_class("Animal").expect("Animal should be declared");
    let animal_speak = animal.methods.iter().find(|m| m.name == "Speak").unwrap();

    let dog = result.symbols.lookup_class("Dog").expect("Dog should be declared");
    assert_eq!(dog.parent_id, Some(animal.id));
    let dog_speak = dog.methods.iter().find(|m| m.name == "Speak").unwrap();
    assert!(dog_speak.is_override);
    assert_eq!(dog_speak.vtable_slot, animal_speak.vtable_slot);
}
