//! Template parsing and evaluation.
//!
//! Supported syntax, inside an already pre-processed XML part:
//!
//! - `{{ path }}`: scalar placeholder, `path` is `name` or `item.field`
//! - `{% if path %}` / `{% if not path %}` … `{% else %}` … `{% endif %}`
//! - `{% for item in path %}` … `{% endfor %}`
//!
//! Evaluation is strict: a placeholder without data is an error, never an
//! empty string.

use serde_json::Value;

use darwin_shared::{DarwinError, Result};

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplateNode {
    /// Literal XML passed through unchanged.
    Literal(String),
    /// `{{ path }}`
    Variable(String),
    /// `{% if %}` block.
    Conditional {
        path: String,
        negated: bool,
        then_branch: Vec<TemplateNode>,
        else_branch: Vec<TemplateNode>,
    },
    /// `{% for %}` block.
    ForLoop {
        binding: String,
        path: String,
        body: Vec<TemplateNode>,
    },
}

/// A parsed template part.
#[derive(Debug, Clone)]
pub(crate) struct Template {
    nodes: Vec<TemplateNode>,
}

// ---------------------------------------------------------------------------
// Lexing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Expr(&'a str),
    Stmt(&'a str),
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = source;

    while let Some(start) = next_delimiter(rest) {
        if start > 0 {
            tokens.push(Token::Text(&rest[..start]));
        }
        let is_expr = rest[start..].starts_with("{{");
        let close = if is_expr { "}}" } else { "%}" };
        let body_start = start + 2;
        let Some(len) = rest[body_start..].find(close) else {
            let excerpt: String = rest[start..].chars().take(40).collect();
            return Err(DarwinError::render(excerpt, format!("unterminated tag, missing `{close}`")));
        };
        let body = rest[body_start..body_start + len].trim();
        tokens.push(if is_expr { Token::Expr(body) } else { Token::Stmt(body) });
        rest = &rest[body_start + len + 2..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

fn next_delimiter(s: &str) -> Option<usize> {
    match (s.find("{{"), s.find("{%")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Statement<'a> {
    If { path: &'a str, negated: bool },
    Else,
    EndIf,
    For { binding: &'a str, path: &'a str },
    EndFor,
}

fn parse_statement(stmt: &str) -> Result<Statement<'_>> {
    let words: Vec<&str> = stmt.split_whitespace().collect();
    let parsed = match words[..] {
        ["if", "not", path] => Statement::If { path, negated: true },
        ["if", path] => Statement::If { path, negated: false },
        ["else"] => Statement::Else,
        ["endif"] => Statement::EndIf,
        ["for", binding, "in", path] => Statement::For { binding, path },
        ["endfor"] => Statement::EndFor,
        _ => return Err(DarwinError::render(stmt, "unsupported template statement")),
    };

    match &parsed {
        Statement::If { path, .. } => validate_path(path)?,
        Statement::For { binding, path } => {
            validate_identifier(binding, stmt)?;
            validate_path(path)?;
        }
        _ => {}
    }
    Ok(parsed)
}

fn validate_identifier(ident: &str, context: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DarwinError::render(context, format!("`{ident}` is not a valid name")))
    }
}

fn validate_path(path: &str) -> Result<()> {
    path.split('.')
        .try_for_each(|segment| validate_identifier(segment, path))
}

/// What closed a block while parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Terminator {
    Else,
    EndIf,
    EndFor,
    Eof,
}

impl Template {
    /// Parse pre-processed template source.
    pub(crate) fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut pos = 0;
        let (nodes, terminator) = parse_block(&tokens, &mut pos)?;
        match terminator {
            Terminator::Eof => Ok(Self { nodes }),
            Terminator::Else => Err(DarwinError::render("else", "`else` outside of an `if` block")),
            Terminator::EndIf => Err(DarwinError::render("endif", "`endif` without matching `if`")),
            Terminator::EndFor => {
                Err(DarwinError::render("endfor", "`endfor` without matching `for`"))
            }
        }
    }

    /// Evaluate against a data tree.
    pub(crate) fn render(&self, data: &Value) -> Result<String> {
        let mut scope = Scope::new(data);
        let mut out = String::new();
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }
}

fn parse_block(tokens: &[Token<'_>], pos: &mut usize) -> Result<(Vec<TemplateNode>, Terminator)> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        match token {
            Token::Text(text) => nodes.push(TemplateNode::Literal((*text).to_string())),
            Token::Expr(expr) => {
                validate_path(expr)?;
                nodes.push(TemplateNode::Variable((*expr).to_string()));
            }
            Token::Stmt(stmt) => match parse_statement(stmt)? {
                Statement::If { path, negated } => {
                    let (then_branch, end) = parse_block(tokens, pos)?;
                    let else_branch = match end {
                        Terminator::EndIf => Vec::new(),
                        Terminator::Else => match parse_block(tokens, pos)? {
                            (branch, Terminator::EndIf) => branch,
                            _ => return Err(unclosed("if", path)),
                        },
                        _ => return Err(unclosed("if", path)),
                    };
                    nodes.push(TemplateNode::Conditional {
                        path: path.to_string(),
                        negated,
                        then_branch,
                        else_branch,
                    });
                }
                Statement::For { binding, path } => {
                    let (body, end) = parse_block(tokens, pos)?;
                    if end != Terminator::EndFor {
                        return Err(unclosed("for", path));
                    }
                    nodes.push(TemplateNode::ForLoop {
                        binding: binding.to_string(),
                        path: path.to_string(),
                        body,
                    });
                }
                Statement::Else => return Ok((nodes, Terminator::Else)),
                Statement::EndIf => return Ok((nodes, Terminator::EndIf)),
                Statement::EndFor => return Ok((nodes, Terminator::EndFor)),
            },
        }
    }

    Ok((nodes, Terminator::Eof))
}

fn unclosed(block: &str, path: &str) -> DarwinError {
    DarwinError::render(path, format!("`{block}` block is never closed"))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Variable bindings: the request root plus loop variables, innermost last.
struct Scope<'a> {
    root: &'a Value,
    locals: Vec<(String, &'a Value)>,
}

impl<'a> Scope<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            locals: Vec::new(),
        }
    }

    fn lookup(&self, path: &str) -> Result<&'a Value> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();

        let mut current = match self.locals.iter().rev().find(|(name, _)| name == head) {
            Some((_, value)) => *value,
            None => self
                .root
                .get(head)
                .ok_or_else(|| DarwinError::render(path, "no value bound to this placeholder"))?,
        };

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| {
                    DarwinError::render(path, format!("record has no field `{segment}`"))
                })?,
                other => {
                    return Err(DarwinError::render(
                        path,
                        format!("expected a record, found {}", type_name(other)),
                    ));
                }
            };
        }
        Ok(current)
    }
}

fn render_nodes<'a>(
    nodes: &[TemplateNode],
    scope: &mut Scope<'a>,
    out: &mut String,
) -> Result<()> {
    for node in nodes {
        match node {
            TemplateNode::Literal(text) => out.push_str(text),
            TemplateNode::Variable(path) => {
                let value = scope.lookup(path)?;
                out.push_str(&scalar_to_xml(path, value)?);
            }
            TemplateNode::Conditional {
                path,
                negated,
                then_branch,
                else_branch,
            } => {
                let truthy = is_truthy(scope.lookup(path)?);
                if truthy != *negated {
                    render_nodes(then_branch, scope, out)?;
                } else {
                    render_nodes(else_branch, scope, out)?;
                }
            }
            TemplateNode::ForLoop {
                binding,
                path,
                body,
            } => {
                let items = match scope.lookup(path)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(DarwinError::render(
                            path.as_str(),
                            format!("expected a list, found {}", type_name(other)),
                        ));
                    }
                };
                for item in items {
                    scope.locals.push((binding.clone(), item));
                    let result = render_nodes(body, scope, out);
                    scope.locals.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}

/// Render a scalar as WordprocessingML run text.
fn scalar_to_xml(path: &str, value: &Value) -> Result<String> {
    let text = match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(DarwinError::render(
                path,
                format!("expected a scalar value, found {}", type_name(other)),
            ));
        }
    };
    Ok(text_to_run_xml(&text))
}

/// Escape text for a `<w:t>` element, turning line breaks and tabs into
/// their run-level elements.
pub(crate) fn text_to_run_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str(r#"</w:t><w:br/><w:t xml:space="preserve">"#),
            '\t' => out.push_str(r#"</w:t><w:tab/><w:t xml:space="preserve">"#),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, data: Value) -> Result<String> {
        Template::parse(source)?.render(&data)
    }

    #[test]
    fn substitutes_scalars() {
        let out = render("<w:t>{{ titre_projet }}</w:t>", json!({"titre_projet": "Darwin"}));
        assert_eq!(out.unwrap(), "<w:t>Darwin</w:t>");
    }

    #[test]
    fn numbers_and_booleans_render_as_text() {
        let out = render("{{ cpu }}/{{ ok }}", json!({"cpu": 4, "ok": true})).unwrap();
        assert_eq!(out, "4/true");
    }

    #[test]
    fn escapes_xml_and_breaks_lines() {
        let out = render("{{ x }}", json!({"x": "a<b & c\nd"})).unwrap();
        assert_eq!(
            out,
            "a&lt;b &amp; c</w:t><w:br/><w:t xml:space=\"preserve\">d"
        );
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let err = render("{{ inconnu }}", json!({})).unwrap_err();
        assert_eq!(err.kind().as_str(), "render_error");
        assert!(err.to_string().contains("inconnu"));
    }

    #[test]
    fn loops_in_order() {
        let data = json!({"acteurs": [{"acteur": "A"}, {"acteur": "B"}, {"acteur": "C"}]});
        let out = render("{% for a in acteurs %}[{{ a.acteur }}]{% endfor %}", data).unwrap();
        assert_eq!(out, "[A][B][C]");
    }

    #[test]
    fn empty_collection_renders_nothing() {
        let out = render("x{% for a in acteurs %}row{% endfor %}y", json!({"acteurs": []}));
        assert_eq!(out.unwrap(), "xy");
    }

    #[test]
    fn loop_over_scalar_is_a_shape_mismatch() {
        let err = render("{% for a in acteurs %}{% endfor %}", json!({"acteurs": "nope"}))
            .unwrap_err();
        assert!(err.to_string().contains("expected a list"));
    }

    #[test]
    fn row_field_missing_is_a_shape_mismatch() {
        let data = json!({"vms": [{"nom": "SRV"}]});
        let err = render("{% for vm in vms %}{{ vm.cpu }}{% endfor %}", data).unwrap_err();
        match err {
            DarwinError::Render { binding, cause } => {
                assert_eq!(binding, "vm.cpu");
                assert!(cause.contains("cpu"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn field_access_on_text_is_an_error() {
        let data = json!({"dns_nom": ["not-a-record"]});
        let err = render("{% for d in dns_nom %}{{ d.nom_dns }}{% endfor %}", data).unwrap_err();
        assert!(err.to_string().contains("expected a record"));
    }

    #[test]
    fn record_in_scalar_placeholder_is_an_error() {
        let err = render("{{ acteurs }}", json!({"acteurs": []})).unwrap_err();
        assert!(err.to_string().contains("expected a scalar"));
    }

    #[test]
    fn conditionals_follow_flag() {
        let src = "{% if has_schema %}yes{% else %}no{% endif %}";
        assert_eq!(render(src, json!({"has_schema": true})).unwrap(), "yes");
        assert_eq!(render(src, json!({"has_schema": false})).unwrap(), "no");

        let negated = "{% if not has_schema %}hidden{% endif %}";
        assert_eq!(render(negated, json!({"has_schema": true})).unwrap(), "");
    }

    #[test]
    fn loop_variables_shadow_root() {
        let data = json!({"nom": "root", "vms": [{"nom": "inner"}]});
        let out = render("{{ nom }}{% for nom in vms %}{{ nom.nom }}{% endfor %}{{ nom }}", data);
        assert_eq!(out.unwrap(), "rootinnerroot");
    }

    #[test]
    fn nested_blocks_parse() {
        let template =
            Template::parse("{% if a %}{% for x in xs %}{{ x }}{% endfor %}{% endif %}").unwrap();
        assert_eq!(template.nodes().len(), 1);
        let out = template.render(&json!({"a": true, "xs": ["1", "2"]})).unwrap();
        assert_eq!(out, "12");
    }

    #[test]
    fn structural_errors() {
        assert!(Template::parse("{% for a in b %}").is_err());
        assert!(Template::parse("{% endif %}").is_err());
        assert!(Template::parse("{% if a %}{% endfor %}").is_err());
        assert!(Template::parse("{% while x %}").is_err());
        assert!(Template::parse("{{ a b }}").is_err());
        assert!(Template::parse("{{ unterminated").is_err());
    }
}
