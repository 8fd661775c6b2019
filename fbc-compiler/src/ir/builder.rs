//! The IR builder (§4.4 collaborator 1): raw text emission, the monotonic
//! temp/label counters, the string-constant pool, and the block-terminated
//! flag that suppresses instructions emitted past a terminator.

use super::IrModule;
use std::collections::{HashMap, HashSet};

pub struct IrBuilder {
    /// `sections[0]` is `main`'s body; every later entry is one out-of-line
    /// function/sub/method body (§4.4 "Output layout": main first, function
    /// definitions after). `current`/`section_stack` let emission nest
    /// (a function body can itself contain no further nesting in this
    /// language, but the stack keeps `begin_function`/`end_function`
    /// symmetric regardless).
    sections: Vec<String>,
    section_stack: Vec<usize>,
    current: usize,
    terminated: bool,

    temp_counter: usize,
    label_counter: usize,

    string_pool: Vec<(String, String)>,
    string_lookup: HashMap<String, String>,
    string_counter: usize,

    globals: Vec<String>,
    array_descs: Vec<String>,

    runtime_decls: Vec<String>,
    runtime_declared: HashSet<String>,

    external_call_count: usize,
    function_count: usize,
}

impl IrBuilder {
    pub fn new() -> Self {
        IrBuilder {
            sections: vec![String::new()],
            section_stack: Vec::new(),
            current: 0,
            terminated: false,
            temp_counter: 0,
            label_counter: 0,
            string_pool: Vec::new(),
            string_lookup: HashMap::new(),
            string_counter: 0,
            globals: Vec::new(),
            array_descs: Vec::new(),
            runtime_decls: Vec::new(),
            runtime_declared: HashSet::new(),
            external_call_count: 0,
            function_count: 1,
        }
    }

    pub fn new_temp(&mut self) -> String {
        let t = format!("%t.{}", self.temp_counter);
        self.temp_counter += 1;
        t
    }

    /// A fresh label id under `tag` (e.g. `for_header`), unique across the
    /// whole emission so nested constructs never collide (§4.4 "the
    /// label-id counter ensures unique jump targets across nested
    /// constructs").
    pub fn new_label(&mut self, tag: &str) -> String {
        let l = format!("{}_{}", tag, self.label_counter);
        self.label_counter += 1;
        l
    }

    /// Appends one instruction line, suppressed if the current block
    /// already ended with a terminator.
    pub fn emit(&mut self, line: impl AsRef<str>) {
        if self.terminated {
            return;
        }
        let section = &mut self.sections[self.current];
        section.push_str("    ");
        section.push_str(line.as_ref());
        section.push('\n');
    }

    /// Appends a terminator (`jmp`, `jnz`, `ret`) and sets the terminated
    /// flag so further `emit` calls are no-ops until the next label.
    pub fn emit_terminator(&mut self, line: impl AsRef<str>) {
        if self.terminated {
            return;
        }
        self.emit(line);
        self.terminated = true;
    }

    /// Starts a new basic block; clears the terminated flag.
    pub fn emit_label(&mut self, name: &str) {
        self.sections[self.current].push_str(&format!("@{}\n", name));
        self.terminated = false;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn begin_function(&mut self, header_line: impl AsRef<str>) {
        self.sections.push(String::new());
        let idx = self.sections.len() - 1;
        self.section_stack.push(self.current);
        self.current = idx;
        self.sections[self.current].push_str(header_line.as_ref());
        self.sections[self.current].push_str(" {\n");
        self.terminated = false;
        self.function_count += 1;
    }

    pub fn end_function(&mut self) {
        self.sections[self.current].push_str("}\n");
        self.current = self.section_stack.pop().unwrap_or(0);
    }

    /// Interns a string constant, returning its pool label. Repeated values
    /// reuse the same label (§4.4 "deduplicating via a map value → label").
    pub fn intern_string(&mut self, value: &str) -> String {
        if let Some(label) = self.string_lookup.get(value) {
            return label.clone();
        }
        let label = format!("str_{}", self.string_counter);
        self.string_counter += 1;
        self.string_pool.push((label.clone(), value.to_string()));
        self.string_lookup.insert(value.to_string(), label.clone());
        label
    }

    pub fn declare_global(&mut self, decl: String) {
        self.globals.push(decl);
    }

    pub fn declare_array_desc(&mut self, decl: String) {
        self.array_descs.push(decl);
    }

    /// Declares a runtime ABI symbol's IR-level comment/declaration exactly
    /// once, no matter how many call sites reference it (§4.4 "Runtime
    /// library declarer").
    pub fn declare_runtime(&mut self, symbol: &str, decl: String) {
        if self.runtime_declared.insert(symbol.to_string()) {
            self.runtime_decls.push(decl);
        }
    }

    pub fn note_external_call(&mut self) {
        self.external_call_count += 1;
    }

    pub fn into_module(self) -> IrModule {
        let mut text = String::new();
        text.push_str("# FasterBASIC generated IR\n");
        for (label, value) in &self.string_pool {
            text.push_str(&format!(
                "data ${} = {{ b \"{}\", b 0 }}\n",
                label,
                escape(value)
            ));
        }
        for g in &self.globals {
            text.push_str(g);
            text.push('\n');
        }
        for a in &self.array_descs {
            text.push_str(a);
            text.push('\n');
        }
        for r in &self.runtime_decls {
            text.push_str(r);
            text.push('\n');
        }
        text.push_str(&self.sections[0]);
        for s in &self.sections[1..] {
            text.push_str(s);
        }

        IrModule {
            text,
            function_count: self.function_count,
            string_count: self.string_pool.len(),
            external_call_count: self.external_call_count,
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
