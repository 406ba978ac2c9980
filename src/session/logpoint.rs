//! Logpoint template parsing and condition generation
//!
//! A logpoint message template interpolates expressions written inside
//! `{...}`. Placement turns the template into a breakpoint condition that,
//! in one evaluation inside the debuggee: increments the hit counter for the
//! resolved location, logs the interpolated message with an attribution
//! marker, and yields true only once the counter passes the ceiling.

use crate::cdp::RemoteObject;
use crate::common::{Error, Result};

/// Name of the global object holding per-location hit counters inside the
/// debuggee. The generated condition is its only writer.
pub const HIT_REGISTRY: &str = "__lpHits";

/// First console argument of every logpoint log line
pub const LOGPOINT_MARKER: &str = "__logpoint__";

/// One piece of a parsed message template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Expression(String),
}

/// A message template split into literal text and `{expr}` placeholders
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub segments: Vec<Segment>,
}

impl ParsedTemplate {
    /// The expressions interpolated by this template, in order
    pub fn expressions(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Expression(e) => Some(e.clone()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn has_expressions(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Expression(_)))
    }
}

/// Parse a message template, extracting `{expr}` placeholders.
///
/// Braces inside an expression may nest (object literals); a lone closing
/// brace or an unterminated placeholder is rejected.
pub fn parse_template(template: &str) -> Result<ParsedTemplate> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut depth = 1usize;
                let mut expr = String::new();
                for inner in chars.by_ref() {
                    match inner {
                        '{' => {
                            depth += 1;
                            expr.push(inner);
                        }
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            expr.push(inner);
                        }
                        _ => expr.push(inner),
                    }
                }
                if depth != 0 {
                    return Err(Error::InvalidLogpoint(format!(
                        "unterminated '{{' in template: {}",
                        template
                    )));
                }
                let expr = expr.trim().to_string();
                if expr.is_empty() {
                    return Err(Error::InvalidLogpoint(
                        "empty '{}' placeholder in template".to_string(),
                    ));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Expression(expr));
            }
            '}' => {
                return Err(Error::InvalidLogpoint(format!(
                    "unmatched '}}' in template: {}",
                    template
                )));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(ParsedTemplate { segments })
}

/// JavaScript expression producing the interpolated message string
fn message_expression(template: &ParsedTemplate) -> String {
    if template.segments.is_empty() {
        return "\"\"".to_string();
    }

    let mut parts = vec!["\"\"".to_string()];
    for segment in &template.segments {
        match segment {
            Segment::Literal(text) => parts.push(js_string(text)),
            Segment::Expression(expr) => parts.push(format!("({})", expr)),
        }
    }
    parts.join("+")
}

/// Build the breakpoint condition for a logpoint.
///
/// The whole thing is a single expression from the runtime's perspective:
/// the increment, the log call, and the ceiling check happen in one
/// evaluation per hit, so concurrent hits cannot lose increments to a
/// read-then-write round trip.
pub fn build_condition(key: &str, ceiling: u32, template: &ParsedTemplate) -> String {
    format!(
        "(function(){{var r=globalThis.{reg}=globalThis.{reg}||{{}};\
         var n=r[{key}]=(r[{key}]||0)+1;\
         console.log({marker},{key},n,{msg});\
         return n>{ceiling};}})()",
        reg = HIT_REGISTRY,
        key = js_string(key),
        marker = js_string(LOGPOINT_MARKER),
        msg = message_expression(template),
        ceiling = ceiling,
    )
}

/// Expression that zeroes the debuggee-side counter for one location
pub fn reset_expression(key: &str) -> String {
    format!(
        "(globalThis.{reg}=globalThis.{reg}||{{}})[{key}]=0",
        reg = HIT_REGISTRY,
        key = js_string(key),
    )
}

/// A console line attributed to a logpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedHit {
    pub key: String,
    pub count: u32,
    pub message: String,
}

/// Recognize a logpoint log line from its console arguments.
///
/// Returns `None` for unrelated console output.
pub fn parse_console_args(args: &[RemoteObject]) -> Option<ObservedHit> {
    let marker = args.first()?.value.as_ref()?.as_str()?;
    if marker != LOGPOINT_MARKER {
        return None;
    }
    let key = args.get(1)?.value.as_ref()?.as_str()?.to_string();
    let count = args.get(2)?.value.as_ref()?.as_u64()? as u32;
    let message = args
        .get(3)
        .map(|arg| arg.display())
        .unwrap_or_default();
    Some(ObservedHit {
        key,
        count,
        message,
    })
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote_str(s: &str) -> RemoteObject {
        RemoteObject {
            object_type: "string".to_string(),
            value: Some(json!(s)),
            ..Default::default()
        }
    }

    fn remote_num(n: u64) -> RemoteObject {
        RemoteObject {
            object_type: "number".to_string(),
            value: Some(json!(n)),
            ..Default::default()
        }
    }

    #[test]
    fn template_extracts_expressions_in_order() {
        let parsed = parse_template("user {user.name} has {cart.items.length} items").unwrap();
        assert_eq!(
            parsed.expressions(),
            vec!["user.name".to_string(), "cart.items.length".to_string()]
        );
        assert_eq!(
            parsed.segments[0],
            Segment::Literal("user ".to_string())
        );
    }

    #[test]
    fn template_without_placeholders_is_one_literal() {
        let parsed = parse_template("checkpoint reached").unwrap();
        assert!(!parsed.has_expressions());
        assert_eq!(parsed.segments.len(), 1);
    }

    #[test]
    fn nested_braces_stay_inside_one_expression() {
        let parsed = parse_template("state: {JSON.stringify({a: x, b: y})}").unwrap();
        assert_eq!(
            parsed.expressions(),
            vec!["JSON.stringify({a: x, b: y})".to_string()]
        );
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(parse_template("broken {x").is_err());
        assert!(parse_template("broken x}").is_err());
        assert!(parse_template("empty {}").is_err());
    }

    #[test]
    fn condition_embeds_key_and_ceiling() {
        let parsed = parse_template("x is {x}").unwrap();
        let condition = build_condition("app.js:12", 5, &parsed);
        // Twice in the check-and-increment, once as the console marker key
        assert_eq!(condition.matches("\"app.js:12\"").count(), 3);
        assert!(condition.contains("return n>5;"));
        assert!(condition.contains("console.log(\"__logpoint__\""));
        assert!(condition.starts_with("(function(){"));
        assert!(condition.ends_with("})()"));
    }

    #[test]
    fn condition_escapes_literal_quotes() {
        let parsed = parse_template("said \"{word}\"").unwrap();
        let condition = build_condition("a.js:1", 1, &parsed);
        assert!(condition.contains("\"said \\\"\""));
    }

    #[test]
    fn console_args_round_trip() {
        let args = vec![
            remote_str(LOGPOINT_MARKER),
            remote_str("app.js:12"),
            remote_num(3),
            remote_str("x is 7"),
        ];
        let hit = parse_console_args(&args).unwrap();
        assert_eq!(hit.key, "app.js:12");
        assert_eq!(hit.count, 3);
        assert_eq!(hit.message, "x is 7");
    }

    #[test]
    fn unrelated_console_output_is_ignored() {
        assert!(parse_console_args(&[remote_str("hello"), remote_num(1)]).is_none());
        assert!(parse_console_args(&[]).is_none());
        // Marker without key/count arguments
        assert!(parse_console_args(&[remote_str(LOGPOINT_MARKER)]).is_none());
    }
}
