//! String interpolation: f-strings, `.format()`, and `%`-formatting.
//!
//! `.format()` and `%` formatting are deliberately dumb: they substitute
//! already-evaluated values into named/positional slots and never evaluate
//! attribute or subscript access themselves. f-strings are the only
//! interpolation mechanism that reaches back into the expression evaluator,
//! so they are the only one that inherits the sandbox's attribute gating.
//!
//! Grounded on `examples/original_source/tests/tic/eval/test_string_format_security.py`,
//! which pins the exact refusal this module must reproduce: `.format()`
//! fields may name a plain identifier or position, never `.`/`[`/`(`.

use std::{fmt::Write as _, rc::Rc};

use ruff_python_ast::{self as ast, InterpolatedStringElement};
use ruff_text_size::TextRange;

use crate::{
    error::{EvalError, EvalResult, TicError},
    eval::Evaluator,
    value::Value,
};

impl Evaluator<'_> {
    pub fn eval_fstring(&self, fstring: &ast::ExprFString) -> EvalResult<Value> {
        let mut out = String::new();
        for part in &fstring.value {
            match part {
                ast::FStringPart::Literal(lit) => out.push_str(lit.value.as_ref()),
                ast::FStringPart::FString(inner) => {
                    for element in &inner.elements {
                        self.render_element(element, &mut out)?;
                    }
                }
            }
        }
        Ok(Value::str(out))
    }

    fn render_element(&self, element: &InterpolatedStringElement, out: &mut String) -> EvalResult<()> {
        match element {
            InterpolatedStringElement::Literal(lit) => {
                out.push_str(lit.value.as_ref());
                Ok(())
            }
            InterpolatedStringElement::Interpolation(interp) => {
                let mut value = self.eval_expr(&interp.expression)?;
                if matches!(interp.conversion, ast::ConversionFlag::Repr) {
                    value = Value::str(repr(&value));
                } else if matches!(interp.conversion, ast::ConversionFlag::Str) {
                    value = Value::str(value.to_string());
                }
                let spec = match &interp.format_spec {
                    Some(spec) => self.static_format_spec(spec)?,
                    None => String::new(),
                };
                let rendered = apply_format_spec(&value, &spec);
                out.push_str(&rendered);
                Ok(())
            }
        }
    }

    /// Nested interpolations inside a format spec (`f"{x:{width}}"`) are
    /// evaluated and stitched into a plain spec string; Python itself
    /// forbids a format spec from containing another `=` debug marker or
    /// further nesting.
    fn static_format_spec(&self, spec: &ast::InterpolatedStringFormatSpec) -> EvalResult<String> {
        let mut out = String::new();
        for element in &spec.elements {
            match element {
                InterpolatedStringElement::Literal(lit) => out.push_str(lit.value.as_ref()),
                InterpolatedStringElement::Interpolation(interp) => {
                    let value = self.eval_expr(&interp.expression)?;
                    write!(out, "{value}").ok();
                }
            }
        }
        Ok(out)
    }
}

/// `"template {name}".format(...)`. Refuses any field that isn't a bare
/// identifier or a bare decimal index — `.`, `[`, and a trailing `()` are
/// all rejected before a single substitution happens, matching the
/// all-or-nothing refusal the security tests pin down.
pub fn format_method(
    ev: &Evaluator,
    template: &Rc<String>,
    args: &[Value],
    kwargs: &[(String, Value)],
    range: TextRange,
) -> EvalResult<Value> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    field.push(c);
                }
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                if name.chars().any(|c| matches!(c, '.' | '[' | ']' | '(' | ')')) {
                    return Err(EvalError::new(format!(
                        "Format string attribute access '{name}' is not allowed."
                    ))
                    .at(range)
                    .into());
                }
                let value = if name.is_empty() {
                    let v = args.get(auto_index).cloned();
                    auto_index += 1;
                    v
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned()
                } else {
                    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
                };
                let Some(value) = value else {
                    return Err(ev.tic_err(
                        TicError::key_error(format!("no format argument for '{name}'")),
                        range,
                    ));
                };
                out.push_str(&apply_format_spec(&value, spec));
            }
            other => out.push(other),
        }
    }
    Ok(Value::str(out))
}

/// `"template %(name)s" % value` / `"%s %d" % (a, b)`.
pub fn percent_format(ev: &Evaluator, template: &Rc<String>, value: &Value, range: TextRange) -> EvalResult<Value> {
    let positional: Vec<Value> = match value {
        Value::Tuple(t) | Value::PrintTuple(t) => t.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut pos = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            Some('(') => {
                chars.next();
                let mut key = String::new();
                for c in chars.by_ref() {
                    if c == ')' {
                        break;
                    }
                    key.push(c);
                }
                let Some(conv) = chars.next() else {
                    return Err(EvalError::new("incomplete format").at(range).into());
                };
                let Value::Mapping(map) = value else {
                    return Err(ev.tic_err(TicError::type_error("format requires a mapping"), range));
                };
                let found = crate::value::ValueKey::from_value(&Value::str(key.clone()))
                    .and_then(|k| map.borrow().get(&k).cloned());
                let Some(found) = found else {
                    return Err(ev.tic_err(TicError::key_error(key), range));
                };
                out.push_str(&render_percent_conversion(conv, &found));
            }
            Some(_) => {
                let conv = chars.next().expect("peeked");
                let arg = positional.get(pos).cloned().unwrap_or(Value::None);
                pos += 1;
                out.push_str(&render_percent_conversion(conv, &arg));
            }
            None => return Err(EvalError::new("incomplete format").at(range).into()),
        }
    }
    Ok(Value::str(out))
}

fn render_percent_conversion(conv: char, value: &Value) -> String {
    match conv {
        's' => value.to_string(),
        'r' => repr(value),
        'd' | 'i' => match value {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => (*f as i64).to_string(),
            other => other.to_string(),
        },
        'f' => match value {
            Value::Float(f) => format!("{f:.6}"),
            Value::Int(i) => format!("{:.6}", *i as f64),
            other => other.to_string(),
        },
        other => format!("%{other}"),
    }
}

/// A minimal `str.format`-style mini-language: optional `[fill]align`
/// followed by a width. Anything more exotic (`,`/`_` grouping, precision,
/// presentation types) passes the value through `Display` unchanged.
fn apply_format_spec(value: &Value, spec: &str) -> String {
    if spec.is_empty() {
        return value.to_string();
    }
    let chars: Vec<char> = spec.chars().collect();
    let (fill, align, rest) = if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        (chars[0], Some(chars[1]), &chars[2..])
    } else if !chars.is_empty() && matches!(chars[0], '<' | '>' | '^') {
        (' ', Some(chars[0]), &chars[1..])
    } else {
        (' ', None, &chars[..])
    };
    let width: usize = rest.iter().collect::<String>().parse().unwrap_or(0);
    let rendered = value.to_string();
    let pad = width.saturating_sub(rendered.chars().count());
    match align.unwrap_or(if matches!(value, Value::Int(_) | Value::Float(_)) { '>' } else { '<' }) {
        '<' => format!("{rendered}{}", fill.to_string().repeat(pad)),
        '>' => format!("{}{rendered}", fill.to_string().repeat(pad)),
        '^' => {
            let left = pad / 2;
            let right = pad - left;
            format!("{}{rendered}{}", fill.to_string().repeat(left), fill.to_string().repeat(right))
        }
        _ => rendered,
    }
}

/// `repr()`: quotes strings the way Python's `repr` does, defers to
/// `Display` for everything else.
#[must_use]
pub fn repr(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}
