//! Function-attribute collector (spec §4.3).
//!
//! Captures a callable's parameters, annotations, default values, and
//! declared output schema — either from an explicit decorator-supplied
//! declaration, or from a `-> (a, b)` return annotation on the `def`
//! line. The compiler later asserts (P5) that every `return`'s value
//! count and order matches this schema.

use std::collections::BTreeMap;

use crate::ast::{DeclaredType, Literal, ParsedFunction};
use crate::error::{CompileError, CompileResult};
use crate::parser;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionAttributes {
    pub required_params: Vec<String>,
    pub optional_params: Vec<(String, Literal)>,
    pub outputs: Vec<String>,
    /// Parameter type annotations the condition builder narrows on
    /// (spec §4.2), carried from [`ParsedFunction::param_types`].
    pub param_types: BTreeMap<String, DeclaredType>,
}

/// Parses `source` and collects its attributes. `explicit_outputs`, if
/// given, overrides whatever the return annotation says (spec: "from an
/// explicit declaration supplied to the decorator, or the return
/// annotation"; the decorator always wins when both are present).
pub fn collect_attributes(
    source: &str,
    explicit_outputs: Option<Vec<String>>,
) -> CompileResult<(ParsedFunction, FunctionAttributes)> {
    let parsed = parser::parse_function(source)?;
    let outputs = explicit_outputs
        .or_else(|| parsed.declared_outputs.clone())
        .ok_or_else(|| {
            CompileError::Attributes(format!(
                "function `{}` has no declared output schema (neither `-> (...)` nor an explicit decorator declaration)",
                parsed.name
            ))
        })?;
    let attrs = FunctionAttributes {
        required_params: parsed.required_params.clone(),
        optional_params: parsed.optional_params.clone(),
        outputs,
        param_types: parsed.param_types.clone(),
    };
    Ok((parsed, attrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_params_and_explicit_outputs() {
        let src = "def step1(s, opt=False):\n    return (1, 2)\n";
        let (parsed, attrs) = collect_attributes(src, Some(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(parsed.name, "step1");
        assert_eq!(attrs.required_params, vec!["s".to_string()]);
        assert_eq!(attrs.outputs, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn falls_back_to_return_annotation() {
        let src = "def step1(s) -> (a, b):\n    return (1, 2)\n";
        let (_, attrs) = collect_attributes(src, None).unwrap();
        assert_eq!(attrs.outputs, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_output_schema_is_an_error() {
        let src = "def step1(s):\n    return (1, 2)\n";
        assert!(collect_attributes(src, None).is_err());
    }
}
