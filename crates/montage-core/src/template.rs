//! Request template substitution.
//!
//! Provider request bodies are stored as JSON trees whose string leaves may carry
//! `{{name}}` placeholders. [`substitute`] walks the tree and fills placeholders from a
//! [`GenerationContext`]:
//!
//! - a string that is exactly one placeholder (after trimming) is replaced by the raw
//!   context value, keeping its JSON type;
//! - placeholders embedded in a longer string are replaced by the value's text form
//!   ([`display_text`]: strings verbatim, other values in the Python `str()` form the
//!   templates were first written against, e.g. `True`, `None`, `['a', 1]`);
//! - unknown names leave the placeholder text in place.
//!
//! Substitution is total: it never fails and never panics on user data.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Context key holding the asset's prompt text.
pub const CONTEXT_PROMPT: &str = "prompt";
/// Context key holding the model's display name.
pub const CONTEXT_MODEL: &str = "model";
/// Context key holding the parent asset's file location (zero or one element).
pub const CONTEXT_INPUT_URLS: &str = "input_urls";

/// Regex pattern matching `{{name}}` tokens. Names may not contain `}`.
pub const PLACEHOLDER_PATTERN: &str = r"\{\{([^}]+)\}\}";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

static WHOLE_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{}$", PLACEHOLDER_PATTERN)).expect("valid regex"));

/// Runtime variable bindings for one dispatch. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationContext {
    vars: Map<String, Value>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for an asset dispatch.
    ///
    /// `prompt` and `model` are set first, then every key of `generation_config` is
    /// merged over them, then `input_urls` is set to the parent's file location (or an
    /// empty list). A non-object `generation_config` contributes nothing.
    pub fn for_asset(
        prompt: &str,
        model_name: &str,
        generation_config: &Value,
        parent_file_url: Option<&str>,
    ) -> Self {
        let mut ctx = Self::new();
        ctx.insert(CONTEXT_PROMPT, Value::String(prompt.to_string()));
        ctx.insert(CONTEXT_MODEL, Value::String(model_name.to_string()));

        if let Value::Object(config) = generation_config {
            for (key, value) in config {
                ctx.insert(key.clone(), value.clone());
            }
        }

        let input_urls = match parent_file_url {
            Some(url) if !url.is_empty() => vec![Value::String(url.to_string())],
            _ => Vec::new(),
        };
        ctx.insert(CONTEXT_INPUT_URLS, Value::Array(input_urls));

        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }
}

impl From<Map<String, Value>> for GenerationContext {
    fn from(vars: Map<String, Value>) -> Self {
        Self { vars }
    }
}

/// Substitute placeholders in `template` with values from `context`.
pub fn substitute(template: &Value, context: &GenerationContext) -> Value {
    match template {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, context)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, context)).collect()),
        Value::String(s) => substitute_str(s, context),
        other => other.clone(),
    }
}

fn substitute_str(raw: &str, context: &GenerationContext) -> Value {
    if let Some(caps) = WHOLE_PLACEHOLDER_RE.captures(raw.trim()) {
        let name = caps[1].trim();
        return match context.get(name) {
            Some(value) => value.clone(),
            None => Value::String(raw.to_string()),
        };
    }

    let replaced = PLACEHOLDER_RE.replace_all(raw, |caps: &regex::Captures<'_>| {
        match context.get(caps[1].trim()) {
            Some(value) => display_text(value),
            None => caps[0].to_string(),
        }
    });

    Value::String(replaced.into_owned())
}

/// Text form of a value spliced into a larger string.
///
/// Strings are used verbatim. Other values follow Python's `str()`: `True`/`False`,
/// `None`, `['a', 1]`, `{'k': 1.0}`.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_repr(other, &mut out);
            out
        }
    }
}

fn write_repr(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => out.push_str(&i.to_string()),
            (_, Some(u), _) => out.push_str(&u.to_string()),
            (_, _, Some(f)) => out.push_str(&float_repr(f)),
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => write_str_repr(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_str_repr(key, out);
                out.push_str(": ");
                write_repr(item, out);
            }
            out.push('}');
        }
    }
}

fn write_str_repr(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn float_repr(f: f64) -> String {
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let sci = format!("{:e}", f);
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            None => sci,
        };
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> GenerationContext {
        match value {
            Value::Object(map) => GenerationContext::from(map),
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn whole_placeholder_is_replaced_by_string() {
        let out = substitute(&json!({"prompt": "{{p}}"}), &ctx(json!({"p": "sunset"})));
        assert_eq!(out, json!({"prompt": "sunset"}));
    }

    #[test]
    fn whole_placeholder_keeps_value_type() {
        let out = substitute(&json!({"w": "{{width}}"}), &ctx(json!({"width": 1024})));
        assert_eq!(out, json!({"w": 1024}));

        let out = substitute(
            &json!({"urls": "{{input_urls}}"}),
            &ctx(json!({"input_urls": ["https://s3/a.jpg"]})),
        );
        assert_eq!(out, json!({"urls": ["https://s3/a.jpg"]}));
    }

    #[test]
    fn whole_placeholder_tolerates_whitespace() {
        let out = substitute(&json!({"w": "  {{ width }} "}), &ctx(json!({"width": 512})));
        assert_eq!(out, json!({"w": 512}));
    }

    #[test]
    fn embedded_placeholder_is_stringified() {
        let out = substitute(
            &json!({"msg": "Hello {{name}}!"}),
            &ctx(json!({"name": "Bob"})),
        );
        assert_eq!(out, json!({"msg": "Hello Bob!"}));

        let out = substitute(
            &json!({"size": "{{w}}x{{h}}"}),
            &ctx(json!({"w": 1024, "h": 768})),
        );
        assert_eq!(out, json!({"size": "1024x768"}));
    }

    #[test]
    fn embedded_non_string_values_use_python_text_form() {
        let out = substitute(
            &json!("flag={{on}} off={{off}} none={{n}} list={{l}} map={{m}}"),
            &ctx(json!({
                "on": true,
                "off": false,
                "n": null,
                "l": ["a", 1],
                "m": {"k": 1, "s": "it's"}
            })),
        );
        assert_eq!(
            out,
            json!("flag=True off=False none=None list=['a', 1] map={'k': 1, 's': \"it's\"}")
        );
    }

    #[test]
    fn embedded_floats_match_python_repr() {
        let out = substitute(
            &json!("{{a}} {{b}} {{c}} {{d}}"),
            &ctx(json!({"a": 2.0, "b": 0.75, "c": 1e16, "d": 1.5e-5})),
        );
        assert_eq!(out, json!("2.0 0.75 1e+16 1.5e-05"));
    }

    #[test]
    fn missing_variable_leaves_placeholder() {
        let out = substitute(&json!({"x": "{{missing}}"}), &GenerationContext::new());
        assert_eq!(out, json!({"x": "{{missing}}"}));

        let out = substitute(
            &json!({"x": "a {{missing}} b {{name}}"}),
            &ctx(json!({"name": "c"})),
        );
        assert_eq!(out, json!({"x": "a {{missing}} b c"}));
    }

    #[test]
    fn nested_structures_and_scalars() {
        let template = json!({
            "model": "bytedance/seedance-1.5-pro",
            "input": {
                "prompt": "{{prompt}}",
                "input_urls": "{{input_urls}}",
                "duration": "{{duration}}",
                "extras": [1, true, null, "{{prompt}} v2"]
            }
        });
        let context = GenerationContext::for_asset(
            "a cat",
            "Seedance 1.5 Pro",
            &json!({"duration": "8"}),
            Some("https://cdn/media/parent.jpg"),
        );
        let out = substitute(&template, &context);
        assert_eq!(
            out,
            json!({
                "model": "bytedance/seedance-1.5-pro",
                "input": {
                    "prompt": "a cat",
                    "input_urls": ["https://cdn/media/parent.jpg"],
                    "duration": "8",
                    "extras": [1, true, null, "a cat v2"]
                }
            })
        );
    }

    #[test]
    fn substitution_does_not_reapply_to_its_output() {
        let template = json!({"a": "{{x}}", "b": "pre {{y}} post", "c": 3});
        let context = ctx(json!({"x": "plain", "y": 7}));
        let once = substitute(&template, &context);
        let twice = substitute(&once, &context);
        assert_eq!(once, twice);
    }

    #[test]
    fn context_for_asset_without_parent_has_empty_input_urls() {
        let context = GenerationContext::for_asset("p", "m", &Value::Null, None);
        assert_eq!(context.get(CONTEXT_INPUT_URLS), Some(&json!([])));
        assert_eq!(context.get(CONTEXT_PROMPT), Some(&json!("p")));
        assert_eq!(context.get(CONTEXT_MODEL), Some(&json!("m")));
    }

    #[test]
    fn generation_config_is_merged_but_input_urls_is_reserved() {
        let context = GenerationContext::for_asset(
            "p",
            "m",
            &json!({"width": 1024, "input_urls": ["spoofed"]}),
            None,
        );
        assert_eq!(context.get("width"), Some(&json!(1024)));
        assert_eq!(context.get(CONTEXT_INPUT_URLS), Some(&json!([])));
    }
}
