//! The symbol mapper (§4.4 collaborator 3): deterministic mangled names for
//! globals, functions, arrays and class members.

use crate::types::suffix_base_type;

fn suffix_tag(suffix: char) -> &'static str {
    match suffix {
        '%' => "PCT",
        '!' => "SGL",
        '#' => "DBL",
        '&' => "LNG",
        '$' => "STR",
        '@' => "DBL",
        '^' => "PTR",
        _ => "",
    }
}

/// `var_<NAME>[_<typeSuffix>]` (§4.4). The suffix component only appears
/// when the raw source spelling actually carried a type-suffix character.
pub fn var_symbol(raw_name: &str) -> String {
    let upper = raw_name.to_ascii_uppercase();
    match upper.chars().last().and_then(suffix_base_type) {
        Some(_) => {
            let suffix = upper.chars().last().unwrap();
            let base = &upper[..upper.len() - suffix.len_utf8()];
            format!("var_{}_{}", base, suffix_tag(suffix))
        }
        None => format!("var_{}", upper),
    }
}

pub fn function_symbol(name: &str) -> String {
    format!("func_{}", name.to_ascii_uppercase())
}

pub fn sub_symbol(name: &str) -> String {
    format!("sub_{}", name.to_ascii_uppercase())
}

pub fn array_desc_symbol(name: &str) -> String {
    format!("arr_{}_desc", name.to_ascii_uppercase())
}

pub fn class_method_symbol(class: &str, method: &str) -> String {
    format!("{}__{}", class, method)
}

pub fn class_constructor_symbol(class: &str) -> String {
    format!("{}__CONSTRUCTOR", class)
}

pub fn class_destructor_symbol(class: &str) -> String {
    format!("{}__DESTRUCTOR", class)
}

pub fn vtable_symbol(class: &str) -> String {
    format!("vtable_{}", class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_symbol_keeps_suffix_tag() {
        assert_eq!(var_symbol("Count%"), "var_COUNT_PCT");
        assert_eq!(var_symbol("name$"), "var_NAME_STR");
        assert_eq!(var_symbol("total"), "var_TOTAL");
    }

    #[test]
    fn class_method_symbol_preserves_case() {
        assert_eq!(class_method_symbol("Dog", "Speak"), "Dog__Speak");
    }
}
