//! Indentation-based logical-line grouping.
//!
//! Turns source text into a tree of [`Block`]s, one per statement,
//! nesting a statement's indented body as its `children`. This is the
//! only place indentation is interpreted; everything downstream deals in
//! single logical lines.

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub text: String,
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LogicalLine<'a> {
    indent: usize,
    text: &'a str,
}

/// Joins bracket/paren/brace continuations onto one logical line, strips
/// comments and blank lines, and returns each remaining line's
/// indentation plus trimmed text.
fn logical_lines(source: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut depth: i32 = 0;

    for raw in source.lines() {
        let stripped = strip_comment(raw);
        if pending.is_none() && stripped.trim().is_empty() {
            continue;
        }
        let indent = raw.len() - raw.trim_start_matches(' ').len();
        depth += bracket_delta(&stripped);

        match &mut pending {
            None => pending = Some((indent, stripped.trim().to_string())),
            Some((_, buf)) => {
                buf.push(' ');
                buf.push_str(stripped.trim());
            }
        }

        if depth <= 0 {
            depth = 0;
            if let Some((i, t)) = pending.take() {
                if !t.is_empty() {
                    out.push((i, t));
                }
            }
        }
    }
    if let Some((i, t)) = pending.take() {
        if !t.is_empty() {
            out.push((i, t));
        }
    }
    out
}

fn strip_comment(line: &str) -> String {
    let mut in_str: Option<char> = None;
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match in_str {
            Some(q) if c == q => in_str = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => in_str = Some(c),
            None if c == '#' => break,
            None => {}
        }
        out.push(c);
    }
    out
}

fn bracket_delta(line: &str) -> i32 {
    let mut in_str: Option<char> = None;
    let mut delta = 0;
    for c in line.chars() {
        match in_str {
            Some(q) if c == q => in_str = None,
            Some(_) => continue,
            None if c == '\'' || c == '"' => in_str = Some(c),
            None => match c {
                '(' | '[' | '{' => delta += 1,
                ')' | ']' | '}' => delta -= 1,
                _ => {}
            },
        }
    }
    delta
}

pub fn parse_blocks(source: &str) -> Result<Vec<Block>, String> {
    let lines = logical_lines(source);
    let mut pos = 0;
    let (blocks, next) = consume(&lines, 0, usize::MAX)?;
    pos = next;
    if pos != lines.len() {
        return Err(format!(
            "unexpected indentation at line {:?}",
            lines.get(pos)
        ));
    }
    Ok(blocks)
}

/// Consumes lines at exactly `indent` until a line with strictly less
/// indentation is seen (or input ends). `max_indent` bounds how deep a
/// child block may go before we consider it belongs to an outer level
/// (unused directly but kept for clarity of recursion contract).
fn consume(
    lines: &[(usize, String)],
    indent: usize,
    _max_indent: usize,
) -> Result<(Vec<Block>, usize), String> {
    let mut out = Vec::new();
    let mut i = 0;
    // Skip until we find the first line at >= indent; caller guarantees
    // lines[0] (if any) is at `indent` when called at top level.
    while i < lines.len() {
        let (line_indent, text) = &lines[i];
        if *line_indent < indent {
            break;
        }
        if *line_indent > indent {
            return Err(format!("unexpected indent before `{text}`"));
        }
        let is_block_head = text.ends_with(':');
        i += 1;
        let children = if is_block_head && i < lines.len() && lines[i].0 > indent {
            let child_indent = lines[i].0;
            let (children, consumed) = consume(&lines[i..], child_indent, usize::MAX)?;
            i += consumed;
            children
        } else {
            Vec::new()
        };
        out.push(Block {
            text: text.clone(),
            children,
        });
    }
    Ok((out, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_if_body() {
        let src = "if a:\n    x = 1\n    y = 2\nreturn x\n";
        let blocks = parse_blocks(src).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "if a:");
        assert_eq!(blocks[0].children.len(), 2);
        assert_eq!(blocks[1].text, "return x");
    }

    #[test]
    fn joins_paren_continuations() {
        let src = "x = foo(\n    1,\n    2,\n)\nreturn x\n";
        let blocks = parse_blocks(src).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "x = foo( 1, 2, )");
    }

    #[test]
    fn strips_comments() {
        let src = "x = 1  # a comment\nreturn x\n";
        let blocks = parse_blocks(src).unwrap();
        assert_eq!(blocks[0].text, "x = 1");
    }
}
