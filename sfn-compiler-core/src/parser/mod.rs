//! Parser for the host-language subset (spec §6, Design Notes "AST
//! parsing of the host language").
//!
//! Two passes, mirroring the teacher's single-pass-but-layered style
//! (`bpmn-lite-core`'s XML parser threads an explicit mutable context;
//! here the context is "current indentation block"):
//!
//! 1. [`block`] turns source text into a tree of indented logical lines
//!    (blank lines and `#`-comments dropped, continuation inside matching
//!    brackets joined onto one logical line).
//! 2. [`expr`]/statement parsing (this module) turns each logical line
//!    into a [`crate::ast::Stmt`] using `nom` combinators, recursing into
//!    nested blocks for compound statements.
//!
//! Only the statement shapes in spec §4.6.3 and expression shapes in
//! §4.6.8 are recognized; anything else is `CompileError::UnsupportedSyntax`.

mod block;
mod expr;

use crate::ast::{ExceptHandler, ParsedFunction, Stmt};
use crate::error::{CompileError, CompileResult};
use block::Block;

/// Parses a single function definition at module level (spec §4.3).
///
/// `source` must contain exactly one `def name(...):` followed by an
/// indented body; leading indentation shared by every line is stripped
/// first (spec §4.3 "with leading indentation normalized").
pub fn parse_function(source: &str) -> CompileResult<ParsedFunction> {
    let normalized = normalize_indentation(source);
    let blocks = block::parse_blocks(&normalized).map_err(CompileError::Parse)?;

    let mut top = blocks.into_iter();
    let def_block = top
        .next()
        .ok_or_else(|| CompileError::Attributes("empty source".into()))?;
    if top.next().is_some() {
        return Err(CompileError::Attributes(
            "source must contain exactly one module-level function definition".into(),
        ));
    }

    let (name, required_params, optional_params, declared_outputs, param_types) =
        expr::parse_def_header(&def_block.text)
            .map_err(|e| CompileError::Attributes(format!("bad `def` header: {e}")))?;

    let body = lower_block_list(&def_block.children)?;

    Ok(ParsedFunction {
        name,
        required_params,
        optional_params,
        body,
        declared_outputs,
        param_types,
    })
}

/// Strips the common leading-whitespace prefix shared by every non-blank
/// line, so a function pasted with extra enclosing indentation parses
/// the same as one at column zero.
fn normalize_indentation(source: &str) -> String {
    let min_indent = source
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);
    source
        .lines()
        .map(|l| {
            if l.len() >= min_indent {
                &l[min_indent..]
            } else {
                l.trim_start_matches(' ')
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn lower_block_list(blocks: &[Block]) -> CompileResult<Vec<Stmt>> {
    let mut out = Vec::with_capacity(blocks.len());
    let mut i = 0;
    while i < blocks.len() {
        let b = &blocks[i];
        let head = b.text.trim();
        if let Some(rest) = head.strip_prefix("if ").and_then(|s| s.strip_suffix(':')) {
            let test = expr::parse_expr(rest)
                .map_err(|e| CompileError::UnsupportedTest { repr: format!("{rest}: {e}") })?;
            let body = lower_block_list(&b.children)?;
            let mut orelse = Vec::new();
            if i + 1 < blocks.len() && blocks[i + 1].text.trim() == "else:" {
                orelse = lower_block_list(&blocks[i + 1].children)?;
                i += 1;
            }
            out.push(Stmt::If { test, body, orelse });
        } else if head == "else:" {
            return Err(CompileError::UnsupportedSyntax {
                repr: "`else:` without a preceding `if`".into(),
            });
        } else if let Some(rest) = head.strip_prefix("for ").and_then(|s| s.strip_suffix(':')) {
            let (target, iter) = expr::parse_for_header(rest)
                .map_err(|e| CompileError::UnsupportedSyntax { repr: format!("for {rest}: {e}") })?;
            let body = lower_block_list(&b.children)?;
            out.push(Stmt::For { target, iter, body });
        } else if let Some(rest) = head.strip_prefix("with ").and_then(|s| s.strip_suffix(':')) {
            let retry_call = expr::parse_expr(rest)
                .map_err(|e| CompileError::WithScopeMisuse { reason: format!("{rest}: {e}") })?;
            let body = lower_block_list(&b.children)?;
            out.push(Stmt::With { retry_call, body });
        } else if head == "try:" {
            let body = lower_block_list(&b.children)?;
            let mut handlers = Vec::new();
            let mut j = i + 1;
            while j < blocks.len() {
                let h = blocks[j].text.trim();
                if let Some(rest) = h.strip_prefix("except") {
                    let rest = rest.strip_suffix(':').unwrap_or(rest).trim();
                    let (type_name, bound_name) = expr::parse_except_header(rest)
                        .map_err(|e| CompileError::UnsupportedExceptionType { name: format!("{rest}: {e}") })?;
                    if let Some(t) = &type_name {
                        if t != "Exception" {
                            return Err(CompileError::UnsupportedExceptionType { name: t.clone() });
                        }
                    }
                    let handler_body = lower_block_list(&blocks[j].children)?;
                    handlers.push(ExceptHandler {
                        type_name,
                        bound_name,
                        body: handler_body,
                    });
                    j += 1;
                } else {
                    break;
                }
            }
            i = j - 1;
            out.push(Stmt::Try { body, handlers });
        } else if head == "pass" {
            out.push(Stmt::Pass);
        } else if head == "return" {
            out.push(Stmt::Return(Vec::new()));
        } else if let Some(rest) = head.strip_prefix("return ") {
            let values = expr::parse_return_values(rest)
                .map_err(|e| CompileError::UnsupportedSyntax { repr: format!("return {rest}: {e}") })?;
            out.push(Stmt::Return(values));
        } else {
            out.push(expr::parse_simple_stmt(head)
                .map_err(|e| CompileError::UnsupportedSyntax { repr: format!("{head}: {e}") })?);
        }
        i += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    #[test]
    fn parses_simple_conditional_function() {
        let src = r#"
def simple(s, opt=False):
    (a, mode, opt2, secs, code, ct) = step1(s, opt)
    if a:
        (a, lst, uri) = step2(s, lst)
    return (mode, code, secs, a, uri, None, opt2)
"#;
        let f = parse_function(src).unwrap();
        assert_eq!(f.name, "simple");
        assert_eq!(f.required_params, vec!["s".to_string()]);
        assert_eq!(f.optional_params, vec![("opt".to_string(), Literal::Bool(false))]);
        assert_eq!(f.body.len(), 3);
        assert!(matches!(f.body[0], Stmt::Assign { .. }));
        match &f.body[1] {
            Stmt::If { body, orelse, .. } => {
                assert_eq!(body.len(), 1);
                assert!(orelse.is_empty());
            }
            _ => panic!("expected if"),
        }
        match &f.body[2] {
            Stmt::Return(values) => assert_eq!(values.len(), 7),
            _ => panic!("expected return"),
        }
    }

    #[test]
    fn parses_try_except_and_retry() {
        let src = r#"
def go(uri):
    with Retry(['X'], interval_seconds=10, max_attempts=40, backoff_rate=1.2):
        (u, ok) = get_result(job, uri, true)
    try:
        u = step7(uri)
        v = step6(u)
    except Exception:
        pass
    return (u,)
"#;
        let f = parse_function(src).unwrap();
        assert_eq!(f.body.len(), 3);
        assert!(matches!(f.body[0], Stmt::With { .. }));
        match &f.body[1] {
            Stmt::Try { body, handlers } => {
                assert_eq!(body.len(), 2);
                assert_eq!(handlers.len(), 1);
                assert_eq!(handlers[0].type_name.as_deref(), Some("Exception"));
            }
            _ => panic!("expected try"),
        }
    }

    #[test]
    fn parses_for_loop_over_concurrent() {
        let src = r#"
def go(uri):
    for v in concurrent(step10(uri, n), 3):
        step11(v)
        results.append(step12(v))
    return (results,)
"#;
        let f = parse_function(src).unwrap();
        match &f.body[0] {
            Stmt::For { target, iter, body } => {
                assert_eq!(target, "v");
                assert!(matches!(iter, Expr::Call { .. }));
                assert_eq!(body.len(), 2);
            }
            _ => panic!("expected for"),
        }
    }
}
