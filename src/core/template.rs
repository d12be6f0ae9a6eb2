//! Template evaluation for pipeline definitions
//!
//! String scalars may contain `{{ expr }}` placeholders. Supported
//! expressions:
//!
//! - `environment` - the active environment
//! - `name` - the pipeline module name
//! - `env.NAME` - environment lookup (`env.ENVIRONMENT` is the active one)
//! - `vars.path` - a variable from the module or its imports
//!
//! A sequence item shaped `{ include_when: {...}, items: [...] }` is spliced
//! into the sequence when its condition holds and dropped otherwise.

use crate::core::context::RenderContext;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;
use thiserror::Error;

const INCLUDE_WHEN: &str = "include_when";
const INCLUDE_ITEMS: &str = "items";

/// A fault raised while evaluating a template
///
/// Every variant carries the raw template text so callers can point at
/// the line of the definition that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("undefined variable `{expr}`")]
    Undefined { expr: String, template: String },

    #[error("`environment` is not available while resolving environments")]
    NoEnvironment { template: String },

    #[error("unsupported expression `{expr}`")]
    Unsupported { expr: String, template: String },

    #[error("`{expr}` is not a scalar and cannot be embedded in text")]
    NotScalar { expr: String, template: String },

    #[error("invalid include_when block: {reason}")]
    InvalidInclude { reason: String, template: String },
}

impl TemplateError {
    /// The template text that raised the error
    pub fn template(&self) -> &str {
        match self {
            TemplateError::Undefined { template, .. }
            | TemplateError::NoEnvironment { template }
            | TemplateError::Unsupported { template, .. }
            | TemplateError::NotScalar { template, .. }
            | TemplateError::InvalidInclude { template, .. } => template,
        }
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid placeholder regex"))
}

/// Render a single string template into text
pub fn render_str(template: &str, ctx: &RenderContext) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in placeholder().captures_iter(template) {
        let whole = captures.get(0).expect("capture 0 always present");
        let expr = captures.get(1).map_or("", |m| m.as_str());
        rendered.push_str(&template[last..whole.start()]);
        let value = resolve(expr, template, ctx)?;
        rendered.push_str(&scalar_text(&value, expr, template)?);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Render a YAML value tree
pub fn render_value(value: &Value, ctx: &RenderContext) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => render_string_value(s, ctx),
        Value::Sequence(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                match include_block(item) {
                    Some((condition, included)) => {
                        if condition_holds(condition, item, ctx)? {
                            let included = match included {
                                Value::Sequence(included) => included,
                                _ => {
                                    return Err(TemplateError::InvalidInclude {
                                        reason: "`items` must be a sequence".to_string(),
                                        template: to_template_text(item),
                                    })
                                }
                            };
                            for included_item in included {
                                rendered.push(render_value(included_item, ctx)?);
                            }
                        }
                    }
                    None => rendered.push(render_value(item, ctx)?),
                }
            }
            Ok(Value::Sequence(rendered))
        }
        Value::Mapping(map) => {
            let mut rendered = Mapping::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(render_value(key, ctx)?, render_value(value, ctx)?);
            }
            Ok(Value::Mapping(rendered))
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.clone();
            tagged.value = render_value(&tagged.value, ctx)?;
            Ok(Value::Tagged(tagged))
        }
        other => Ok(other.clone()),
    }
}

/// A string that is exactly one placeholder keeps the YAML type of its value
fn render_string_value(s: &str, ctx: &RenderContext) -> Result<Value, TemplateError> {
    if let Some(captures) = placeholder().captures(s) {
        let whole = captures.get(0).expect("capture 0 always present");
        if whole.start() == 0 && whole.end() == s.len() {
            let expr = captures.get(1).map_or("", |m| m.as_str());
            return resolve(expr, s, ctx);
        }
    }
    render_str(s, ctx).map(Value::String)
}

fn resolve(expr: &str, template: &str, ctx: &RenderContext) -> Result<Value, TemplateError> {
    let undefined = || TemplateError::Undefined {
        expr: expr.to_string(),
        template: template.to_string(),
    };

    if expr == "environment" {
        return ctx
            .environment()
            .map(Value::from)
            .ok_or_else(|| TemplateError::NoEnvironment { template: template.to_string() });
    }
    if expr == "name" {
        return Ok(Value::from(ctx.pipeline()));
    }
    if let Some(name) = expr.strip_prefix("env.") {
        if name == crate::core::context::ENVIRONMENT_VAR && ctx.environment().is_none() {
            return Err(TemplateError::NoEnvironment { template: template.to_string() });
        }
        return ctx.env(name).map(Value::from).ok_or_else(undefined);
    }
    if let Some(path) = expr.strip_prefix("vars.") {
        return ctx.var(path).cloned().ok_or_else(undefined);
    }

    Err(TemplateError::Unsupported {
        expr: expr.to_string(),
        template: template.to_string(),
    })
}

fn scalar_text(value: &Value, expr: &str, template: &str) -> Result<String, TemplateError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(TemplateError::NotScalar {
            expr: expr.to_string(),
            template: template.to_string(),
        }),
    }
}

/// The condition and items of an include block, if `item` is one
fn include_block(item: &Value) -> Option<(&Value, &Value)> {
    let map = item.as_mapping()?;
    if map.len() != 2 {
        return None;
    }
    Some((map.get(INCLUDE_WHEN)?, map.get(INCLUDE_ITEMS)?))
}

fn condition_holds(condition: &Value, block: &Value, ctx: &RenderContext) -> Result<bool, TemplateError> {
    let invalid = |reason: &str| TemplateError::InvalidInclude {
        reason: reason.to_string(),
        template: to_template_text(block),
    };

    let map = condition
        .as_mapping()
        .ok_or_else(|| invalid("`include_when` must be a mapping"))?;
    let wanted = map
        .get("environment")
        .ok_or_else(|| invalid("`include_when` only supports `environment`"))?;
    if map.len() != 1 {
        return Err(invalid("`include_when` only supports `environment`"));
    }

    let active = ctx.environment().ok_or_else(|| TemplateError::NoEnvironment {
        template: to_template_text(block),
    })?;

    match wanted {
        Value::String(name) => Ok(name == active),
        Value::Sequence(names) => {
            let mut matched = false;
            for name in names {
                let name = name
                    .as_str()
                    .ok_or_else(|| invalid("`environment` must be a name or a list of names"))?;
                matched |= name == active;
            }
            Ok(matched)
        }
        _ => Err(invalid("`environment` must be a name or a list of names")),
    }
}

/// First line of a value as it would appear in the source, for error location
fn to_template_text(value: &Value) -> String {
    match value.as_mapping().and_then(|map| map.get(INCLUDE_WHEN)) {
        Some(_) => format!("{}:", INCLUDE_WHEN),
        None => serde_yaml::to_string(value)
            .ok()
            .and_then(|text| text.lines().next().map(str::to_string))
            .unwrap_or_default(),
    }
}
