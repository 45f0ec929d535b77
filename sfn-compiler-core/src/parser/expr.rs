//! Expression grammar and single-logical-line statement parsing.
//!
//! Built with `nom` combinators over the small expression subset of
//! spec §4.6.8; statement-line dispatch (assignment forms, aug-assign,
//! bare call statements) is done with top-level token scanning since
//! each statement has already been isolated to one logical line by
//! [`super::block`].

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
    combinator::{cut, map, opt, recognize, value},
    error::{context, VerboseError},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::ast::{AugOp, CmpOp, Expr, Literal, Stmt};

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn ws<'a, F, T>(inner: F) -> impl FnMut(&'a str) -> Res<'a, T>
where
    F: FnMut(&'a str) -> Res<'a, T>,
{
    delimited(multispace0, inner, multispace0)
}

fn ident(input: &str) -> Res<&str> {
    context(
        "ident",
        recognize(pair(
            alt((alpha1, recognize(char('_')))),
            many0(alt((alphanumeric1, recognize(char('_'))))),
        )),
    )(input)
}

fn dotted_path(input: &str) -> Res<&str> {
    recognize(separated_list1(char('.'), ident))(input)
}

fn literal(input: &str) -> Res<Literal> {
    alt((
        value(Literal::None, tag("None")),
        value(Literal::Bool(true), alt((tag("True"), tag("true")))),
        value(Literal::Bool(false), alt((tag("False"), tag("false")))),
        float_literal,
        int_literal,
        string_literal,
    ))(input)
}

fn int_literal(input: &str) -> Res<Literal> {
    map(
        recognize(pair(opt(char('-')), digit1)),
        |s: &str| Literal::Int(s.parse().unwrap()),
    )(input)
}

fn float_literal(input: &str) -> Res<Literal> {
    map(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        |s: &str| Literal::Float(s.parse().unwrap()),
    )(input)
}

fn string_literal(input: &str) -> Res<Literal> {
    map(quoted_string, Literal::Str)(input)
}

fn quoted_string(input: &str) -> Res<String> {
    alt((
        delimited(char('\''), |i| raw_string_body(i, '\''), char('\'')),
        delimited(char('"'), |i| raw_string_body(i, '"'), char('"')),
    ))(input)
}

fn raw_string_body(input: &str, quote: char) -> Res<String> {
    let mut out = String::new();
    let mut chars = input.char_indices().peekable();
    while let Some((idx, c)) = chars.peek().copied() {
        if c == quote {
            return Ok((&input[idx..], out));
        }
        out.push(c);
        chars.next();
        let _ = idx;
    }
    Ok((&input[input.len()..], out))
}

fn name_expr(input: &str) -> Res<Expr> {
    map(dotted_path, |n: &str| {
        if let Some(rest) = n.strip_prefix("self.") {
            Expr::SelfAttr(rest.to_string())
        } else {
            Expr::Name(n.to_string())
        }
    })(input)
}

fn dict_entry(input: &str) -> Res<(String, Expr)> {
    separated_pair(ws(quoted_string), char(':'), ws(expr_no_cmp))(input)
}

fn dict_literal(input: &str) -> Res<Expr> {
    map(
        delimited(
            char('{'),
            separated_list0(char(','), ws(dict_entry)),
            preceded(opt(char(',')), preceded(multispace0, char('}'))),
        ),
        Expr::Dict,
    )(input)
}

fn list_comp(input: &str) -> Res<Expr> {
    map(
        delimited(
            char('['),
            tuple((
                ws(expr_no_cmp),
                preceded(tag("for"), ws(ident)),
                preceded(tag("in"), ws(expr_no_cmp)),
            )),
            char(']'),
        ),
        |(elt, target, iter)| Expr::ListComp {
            elt: Box::new(elt),
            target: target.to_string(),
            iter: Box::new(iter),
        },
    )(input)
}

fn list_literal(input: &str) -> Res<Expr> {
    map(
        delimited(
            char('['),
            terminated(
                separated_list0(char(','), ws(expr_no_cmp)),
                opt(char(',')),
            ),
            preceded(multispace0, char(']')),
        ),
        Expr::List,
    )(input)
}

fn paren_or_tuple(input: &str) -> Res<Expr> {
    map(
        delimited(
            char('('),
            pair(
                separated_list0(char(','), ws(expr_no_cmp)),
                opt(char(',')),
            ),
            preceded(multispace0, char(')')),
        ),
        |(items, trailing_comma)| {
            if items.len() == 1 && trailing_comma.is_none() {
                items.into_iter().next().unwrap()
            } else {
                Expr::Tuple(items)
            }
        },
    )(input)
}

fn atom(input: &str) -> Res<Expr> {
    ws(alt((
        map(literal, Expr::Literal),
        list_comp,
        list_literal,
        dict_literal,
        paren_or_tuple,
        name_expr,
    )))(input)
}

#[derive(Debug)]
enum Trailer {
    Call(Vec<Expr>, Vec<(String, Expr)>),
    Subscript(Expr),
    Attr(String),
}

fn call_args(input: &str) -> Res<(Vec<Expr>, Vec<(String, Expr)>)> {
    delimited(
        char('('),
        |i| {
            let (i, items) = separated_list0(char(','), ws(call_arg))(i)?;
            let mut positional = Vec::new();
            let mut keywords = Vec::new();
            for item in items {
                match item {
                    Ok((k, v)) => keywords.push((k, v)),
                    Err(v) => positional.push(v),
                }
            }
            Ok((i, (positional, keywords)))
        },
        preceded(multispace0, char(')')),
    )(input)
}

fn call_arg(input: &str) -> Res<Result<(String, Expr), Expr>> {
    alt((
        map(
            separated_pair(ws(ident), char('='), ws(expr_no_cmp)),
            |(k, v): (&str, Expr)| Ok((k.to_string(), v)),
        ),
        map(expr_no_cmp, Err),
    ))(input)
}

fn trailer(input: &str) -> Res<Trailer> {
    alt((
        map(call_args, |(a, k)| Trailer::Call(a, k)),
        map(
            delimited(char('['), ws(expr_no_cmp), char(']')),
            Trailer::Subscript,
        ),
        map(preceded(char('.'), ident), |s: &str| {
            Trailer::Attr(s.to_string())
        }),
    ))(input)
}

fn postfix_expr(input: &str) -> Res<Expr> {
    let (input, base) = atom(input)?;
    let (input, trailers) = many0(trailer)(input)?;
    let mut result = base;
    for t in trailers {
        result = match t {
            Trailer::Call(args, keywords) => Expr::Call {
                func: Box::new(result),
                args,
                keywords,
            },
            Trailer::Subscript(idx) => Expr::Subscript(Box::new(result), Box::new(idx)),
            Trailer::Attr(name) => Expr::Attribute(Box::new(result), name),
        };
    }
    Ok((input, result))
}

fn cmp_op(input: &str) -> Res<CmpOp> {
    alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Lt, char('<')),
        value(CmpOp::Gt, char('>')),
    ))(input)
}

/// Expression without a top-level comparison (used inside call args,
/// list/dict literals, comprehension clauses — comparisons never nest
/// there in the accepted subset).
fn expr_no_cmp(input: &str) -> Res<Expr> {
    postfix_expr(input)
}

fn comparison(input: &str) -> Res<Expr> {
    let (input, left) = postfix_expr(input)?;
    let (input, rhs) = opt(pair(ws(cmp_op), cut(postfix_expr)))(input)?;
    Ok((
        input,
        match rhs {
            Some((op, right)) => Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            None => left,
        },
    ))
}

fn full_expr(input: &str) -> Res<Expr> {
    ws(comparison)(input)
}

fn finish<'a, T>(res: Res<'a, T>) -> Result<T, String> {
    match res {
        Ok((rest, val)) if rest.trim().is_empty() => Ok(val),
        Ok((rest, _)) => Err(format!("trailing input: `{rest}`")),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(format!("{e:?}"))
        }
        Err(nom::Err::Incomplete(_)) => Err("incomplete input".into()),
    }
}

pub fn parse_expr(input: &str) -> Result<Expr, String> {
    finish(full_expr(input))
}

/// Parses `def name(params):` or `def name(params) -> (a, b):`, minus
/// the trailing colon. The optional `-> (...)` annotation is captured as
/// a declared output-field list (spec §4.3b).
pub fn parse_def_header(
    line: &str,
) -> Result<
    (
        String,
        Vec<String>,
        Vec<(String, Literal)>,
        Option<Vec<String>>,
        std::collections::BTreeMap<String, crate::ast::DeclaredType>,
    ),
    String,
> {
    let line = line.trim().strip_suffix(':').ok_or("missing trailing `:`")?;
    let rest = line.strip_prefix("def ").ok_or("expected `def`")?;
    let open = rest.find('(').ok_or("expected `(`")?;
    let name = rest[..open].trim().to_string();
    let after_open = &rest[open + 1..];
    let mut depth = 1i32;
    let close_rel = after_open
        .char_indices()
        .find_map(|(i, c)| {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            None
        })
        .ok_or("unbalanced `(` in parameter list")?;
    let params_src = &after_open[..close_rel];
    let tail = after_open[close_rel + 1..].trim();

    let outputs = if let Some(ann) = tail.strip_prefix("->") {
        let ann = ann.trim();
        let ann = ann
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(ann);
        Some(
            split_top_level(ann, ',')
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    } else {
        None
    };

    let mut required = Vec::new();
    let mut optional = Vec::new();
    let mut param_types = std::collections::BTreeMap::new();
    for raw in split_top_level(params_src, ',') {
        let raw = raw.trim();
        if raw.is_empty() || raw == "self" {
            continue;
        }
        // split off a type annotation: `name: Type` or `name: Type = default`
        let (before_colon, annotation) = match split_top_level(raw, ':').as_slice() {
            [n, rest2] => (n.trim().to_string(), Some(rest2.clone())),
            _ => (raw.to_string(), None),
        };
        // with an annotation, `before_colon` is the bare name and any
        // default lives after `=` inside `annotation` (`Type = default`);
        // without one, `before_colon` itself may be `name = default`.
        let (param_name, default_src, type_text) = match &annotation {
            Some(ann) => match ann.split_once('=') {
                Some((ty, def)) => (before_colon, Some(def.trim().to_string()), Some(ty.trim().to_string())),
                None => (before_colon, None, Some(ann.trim().to_string())),
            },
            None => match before_colon.split_once('=') {
                Some((n, def)) => (n.trim().to_string(), Some(def.trim().to_string()), None),
                None => (before_colon, None, None),
            },
        };

        if let Some(type_text) = &type_text {
            if let Some(ty) = crate::ast::DeclaredType::from_annotation(type_text) {
                param_types.insert(param_name.clone(), ty);
            }
        }

        match default_src {
            Some(def_src) => {
                let lit = match finish(literal(&def_src)) {
                    Ok(l) => l,
                    Err(e) => return Err(format!("default for `{param_name}` must be a literal: {e}")),
                };
                optional.push((param_name, lit));
            }
            None => required.push(param_name),
        }
    }

    Ok((name.trim().to_string(), required, optional, outputs, param_types))
}

pub fn parse_for_header(rest: &str) -> Result<(String, Expr), String> {
    let (target, iter_src) = rest.split_once(" in ").ok_or("expected `in`")?;
    let iter = parse_expr(iter_src)?;
    Ok((target.trim().to_string(), iter))
}

pub fn parse_except_header(rest: &str) -> Result<(Option<String>, Option<String>), String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok((None, None));
    }
    if let Some((ty, bound)) = rest.split_once(" as ") {
        Ok((Some(ty.trim().to_string()), Some(bound.trim().to_string())))
    } else {
        Ok((Some(rest.to_string()), None))
    }
}

pub fn parse_return_values(rest: &str) -> Result<Vec<Expr>, String> {
    let e = parse_expr(rest)?;
    Ok(match e {
        Expr::Tuple(items) => items,
        other => vec![other],
    })
}

pub fn parse_simple_stmt(line: &str) -> Result<Stmt, String> {
    if let Some(idx) = find_top_level_op(line, "+=") {
        let (t, v) = line.split_at(idx);
        let value = parse_expr(&v[2..])?;
        return Ok(Stmt::AugAssign {
            target: parse_target(t.trim())?,
            op: AugOp::Add,
            value,
        });
    }
    if let Some(idx) = find_top_level_op(line, "-=") {
        let (t, v) = line.split_at(idx);
        let value = parse_expr(&v[2..])?;
        return Ok(Stmt::AugAssign {
            target: parse_target(t.trim())?,
            op: AugOp::Sub,
            value,
        });
    }
    if let Some(idx) = find_top_level_assign(line) {
        let (t, v) = line.split_at(idx);
        let value = parse_expr(&v[1..])?;
        return Ok(Stmt::Assign {
            target: parse_target(t.trim())?,
            value,
        });
    }
    Ok(Stmt::Expr(parse_expr(line)?))
}

fn parse_target(text: &str) -> Result<Expr, String> {
    if !text.starts_with('(') && split_top_level(text, ',').len() > 1 {
        let items = split_top_level(text, ',')
            .into_iter()
            .map(|p| parse_expr(p.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::Tuple(items));
    }
    parse_expr(text)
}

/// Finds the first top-level `=` that isn't part of `==`, `<=`, `>=`,
/// `+=`, `-=`, outside brackets/strings.
fn find_top_level_assign(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut in_str: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match in_str {
            Some(q) if c == q => in_str = None,
            Some(_) => {}
            None if c == b'\'' || c == b'"' => in_str = Some(c),
            None => match c {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'=' if depth == 0 => {
                    let prev = if i > 0 { bytes[i - 1] } else { 0 };
                    let next = if i + 1 < bytes.len() { bytes[i + 1] } else { 0 };
                    if next != b'=' && prev != b'=' && prev != b'<' && prev != b'>' && prev != b'+' && prev != b'-' {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn find_top_level_op(line: &str, op: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_str: Option<char> = None;
    let chars: Vec<char> = line.chars().collect();
    let op_chars: Vec<char> = op.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match in_str {
            Some(q) if c == q => in_str = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => in_str = Some(c),
            None => match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ if depth == 0 && chars[i..].starts_with(&op_chars[..]) => {
                    return Some(line.char_indices().nth(i).unwrap().0);
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Splits `text` on `sep` at depth zero, ignoring separators inside
/// brackets/parens/braces or quoted strings.
fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_str: Option<char> = None;
    let mut cur = String::new();
    for c in text.chars() {
        match in_str {
            Some(q) if c == q => {
                in_str = None;
                cur.push(c);
            }
            Some(_) => cur.push(c),
            None if c == '\'' || c == '"' => {
                in_str = Some(c);
                cur.push(c);
            }
            None => match c {
                '(' | '[' | '{' => {
                    depth += 1;
                    cur.push(c);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    cur.push(c);
                }
                _ if c == sep && depth == 0 => {
                    parts.push(std::mem::take(&mut cur));
                }
                _ => cur.push(c),
            },
        }
    }
    if !cur.trim().is_empty() || !parts.is_empty() {
        parts.push(cur);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_with_mixed_args() {
        let e = parse_expr("step1(s, opt=true)").unwrap();
        match e {
            Expr::Call { func, args, keywords } => {
                assert_eq!(*func, Expr::Name("step1".into()));
                assert_eq!(args, vec![Expr::Name("s".into())]);
                assert_eq!(keywords, vec![("opt".to_string(), Expr::Literal(Literal::Bool(true)))]);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn parses_subscript_chain() {
        let e = parse_expr("a.b[0].c").unwrap();
        assert_eq!(
            e,
            Expr::Attribute(
                Box::new(Expr::Subscript(
                    Box::new(Expr::Attribute(Box::new(Expr::Name("a".into())), "b".into())),
                    Box::new(Expr::Literal(Literal::Int(0))),
                )),
                "c".into(),
            )
        );
    }

    #[test]
    fn parses_comparison() {
        let e = parse_expr("x == 1").unwrap();
        assert!(matches!(e, Expr::Compare { op: CmpOp::Eq, .. }));
    }

    #[test]
    fn parses_def_header_with_defaults() {
        let (name, req, opt, outputs, types) = parse_def_header("def simple(s, opt=False):").unwrap();
        assert_eq!(name, "simple");
        assert_eq!(req, vec!["s".to_string()]);
        assert_eq!(opt, vec![("opt".to_string(), Literal::Bool(false))]);
        assert_eq!(outputs, None);
        assert!(types.is_empty());
    }

    #[test]
    fn parses_def_header_with_return_annotation() {
        let (_, _, _, outputs, _) = parse_def_header("def go(s) -> (a, b):").unwrap();
        assert_eq!(outputs, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn parses_def_header_with_type_annotations() {
        let (_, req, opt, _, types) =
            parse_def_header("def typed(s: str, n: int, opt: bool = False):").unwrap();
        assert_eq!(req, vec!["s".to_string(), "n".to_string()]);
        assert_eq!(opt, vec![("opt".to_string(), Literal::Bool(false))]);
        assert_eq!(types.get("s"), Some(&crate::ast::DeclaredType::Str));
        assert_eq!(types.get("n"), Some(&crate::ast::DeclaredType::Int));
        assert_eq!(types.get("opt"), Some(&crate::ast::DeclaredType::Bool));
    }

    #[test]
    fn splits_tuple_target() {
        let stmt = parse_simple_stmt("(a, mode, opt2) = step1(s, opt)").unwrap();
        match stmt {
            Stmt::Assign { target: Expr::Tuple(items), .. } => assert_eq!(items.len(), 3),
            _ => panic!("expected tuple-target assign"),
        }
    }

    #[test]
    fn parses_append_call_statement() {
        let stmt = parse_simple_stmt("results.append(step12(v))").unwrap();
        match stmt {
            Stmt::Expr(Expr::Call { func, .. }) => {
                assert_eq!(*func, Expr::Attribute(Box::new(Expr::Name("results".into())), "append".into()));
            }
            _ => panic!("expected append call"),
        }
    }
}
