//! Splitting of `${ expression }` templates.

use harvest_shared::{HarvestError, Result};

/// One piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied through unchanged.
    Literal(String),
    /// Expression source between `${` and its matching `}`, trimmed.
    Expression(&'a str),
}

/// Whether `input` contains anything to evaluate.
pub fn has_expressions(input: &str) -> bool {
    input.contains("${")
}

/// Split `input` into literal and expression segments.
///
/// Braces nest, and braces inside quoted strings do not count. `$${` yields a
/// literal `${`. An unterminated expression is an error.
pub fn split_template(input: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut remainder = input;

    while let Some(start) = remainder.find("${") {
        if start > 0 && remainder.as_bytes()[start - 1] == b'$' {
            literal.push_str(&remainder[..start - 1]);
            literal.push_str("${");
            remainder = &remainder[start + 2..];
            continue;
        }

        literal.push_str(&remainder[..start]);
        let after_start = &remainder[start + 2..];
        let end = matching_brace(after_start).ok_or_else(|| {
            HarvestError::domain(format!("unterminated expression in '{input}'"))
        })?;

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Expression(after_start[..end].trim()));
        remainder = &after_start[end + 1..];
    }

    literal.push_str(remainder);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Byte offset of the `}` closing an expression that starts at `body[0]`.
fn matching_brace(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (index, ch) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(
            split_template("no markers").unwrap(),
            vec![Segment::Literal("no markers".into())]
        );
        assert!(split_template("").unwrap().is_empty());
    }

    #[test]
    fn expressions_between_literals() {
        assert_eq!(
            split_template("page-${ n + 1 }.html").unwrap(),
            vec![
                Segment::Literal("page-".into()),
                Segment::Expression("n + 1"),
                Segment::Literal(".html".into()),
            ]
        );
    }

    #[test]
    fn nested_braces_and_quoted_braces() {
        assert_eq!(
            split_template(r#"${ if a { "}" } else { "x" } }"#).unwrap(),
            vec![Segment::Expression(r#"if a { "}" } else { "x" }"#)]
        );
    }

    #[test]
    fn double_dollar_escapes() {
        assert_eq!(
            split_template("cost: $${price}").unwrap(),
            vec![Segment::Literal("cost: ${price}".into())]
        );
    }

    #[test]
    fn unterminated_expression_fails() {
        assert!(split_template("a ${ b").is_err());
    }
}
