//! Minimal placeholder renderer.
//!
//! Supports `{{field}}`, dotted paths (`{{order.id}}`) and a repeat block
//! `{{#each items}}...{{/each}}`. Inside a block, names resolve against the
//! current item first and then the enclosing scopes; `{{this}}` is the item.
//! Anything that cannot be resolved is written out verbatim.

use serde_json::Value;

/// Upper bound on iterations of a single repeat block.
pub const MAX_REPEAT: usize = 100;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const EACH: &str = "{{#each ";
const END_EACH: &str = "{{/each}}";

pub fn render(template: &str, data: &Value) -> String {
    render_scoped(template, &[data])
}

fn render_scoped(template: &str, scopes: &[&Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with(EACH) {
            match split_each_block(tail) {
                Some((name, body, after)) => {
                    match lookup(scopes, name) {
                        Some(Value::Array(items)) => {
                            for item in items.iter().take(MAX_REPEAT) {
                                let mut inner: Vec<&Value> = scopes.to_vec();
                                inner.push(item);
                                out.push_str(&render_scoped(body, &inner));
                            }
                        }
                        Some(_) => {}
                        None => out.push_str(&tail[..tail.len() - after.len()]),
                    }
                    rest = after;
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
            continue;
        }

        let Some(end) = tail[OPEN.len()..].find(CLOSE) else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let key = tail[OPEN.len()..OPEN.len() + end].trim();
        let token_len = OPEN.len() + end + CLOSE.len();
        match lookup(scopes, key).and_then(scalar) {
            Some(text) => out.push_str(&text),
            None => out.push_str(&tail[..token_len]),
        }
        rest = &tail[token_len..];
    }

    out.push_str(rest);
    out
}

/// Splits `{{#each name}}body{{/each}}rest`, honouring nested blocks.
fn split_each_block(tail: &str) -> Option<(&str, &str, &str)> {
    let header_end = tail.find(CLOSE)?;
    let name = tail[EACH.len()..header_end].trim();
    let body_start = header_end + CLOSE.len();

    let mut depth = 1usize;
    let mut cursor = body_start;
    while depth > 0 {
        let window = &tail[cursor..];
        let next_open = window.find(EACH);
        let next_close = window.find(END_EACH)?;
        match next_open {
            Some(open) if open < next_close => {
                depth += 1;
                cursor += open + EACH.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    let body = &tail[body_start..cursor + next_close];
                    let after = &tail[cursor + next_close + END_EACH.len()..];
                    return Some((name, body, after));
                }
                cursor += next_close + END_EACH.len();
            }
        }
    }
    None
}

fn lookup<'a>(scopes: &[&'a Value], key: &str) -> Option<&'a Value> {
    if key.is_empty() { return None; }
    if key == "this" { return scopes.last().copied(); }
    scopes.iter().rev().find_map(|scope| {
        key.split('.').try_fold(*scope, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    })
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
