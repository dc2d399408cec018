//! Placeholder substitution for call parameters.
//!
//! Parameters are a JSON tree. Every string scalar in it may contain
//! `{field}` or `{nested.field}` placeholders which are resolved against the
//! item being enriched; `{{` and `}}` produce literal braces. A string that is
//! exactly one placeholder takes the referenced value with its JSON type, so
//! `{"MaxItems": "{Count}"}` stays numeric.

use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::error::{
    InvalidPlaceholderSnafu, MissingValueSnafu, TemplateError, UnbalancedBraceSnafu,
};
use crate::path::FieldPath;

/// Substitute placeholders throughout `params` using values from `item`.
pub fn render(params: &Value, item: &Value) -> Result<Value, TemplateError> {
    match params {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), render(value, item)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|value| render(value, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(template) => render_str(template, item),
        other => Ok(other.clone()),
    }
}

enum Segment<'a> {
    Text(String),
    Placeholder(&'a str),
}

fn render_str(template: &str, item: &Value) -> Result<Value, TemplateError> {
    let segments = split(template)?;

    if let [Segment::Placeholder(name)] = segments.as_slice() {
        return lookup(name, item);
    }

    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(&text),
            Segment::Placeholder(name) => match lookup(name, item)? {
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            },
        }
    }
    Ok(Value::String(out))
}

fn lookup(placeholder: &str, item: &Value) -> Result<Value, TemplateError> {
    let path = FieldPath::compile(placeholder).context(InvalidPlaceholderSnafu { placeholder })?;
    let value = path.search(item);
    ensure!(!value.is_null(), MissingValueSnafu { placeholder });
    Ok(value)
}

fn split(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(position) = rest.find(['{', '}']) {
        text.push_str(&rest[..position]);
        let tail = &rest[position..];

        if tail.starts_with("{{") {
            text.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            text.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return UnbalancedBraceSnafu { template }.fail();
        } else {
            let end = tail.find('}').context(UnbalancedBraceSnafu { template })?;
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Placeholder(tail[1..end].trim()));
            rest = &tail[end + 1..];
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_simple_placeholder() {
        let rendered = render(&json!({"Resource": "{ARN}"}), &json!({"ARN": "arn:x"})).unwrap();
        assert_eq!(rendered, json!({"Resource": "arn:x"}));
    }

    #[test]
    fn test_recurses_and_keeps_other_scalars() {
        let params = json!({
            "Filters": [{"Name": "volume-id", "Values": ["{Volume.Id}"]}],
            "DryRun": false,
            "MaxResults": 50,
            "Marker": null
        });
        let item = json!({"Volume": {"Id": "vol-1"}});

        assert_eq!(
            render(&params, &item).unwrap(),
            json!({
                "Filters": [{"Name": "volume-id", "Values": ["vol-1"]}],
                "DryRun": false,
                "MaxResults": 50,
                "Marker": null
            })
        );
    }

    #[test]
    fn test_embedded_and_typed_placeholders() {
        let item = json!({"Name": "logs", "Count": 3});
        assert_eq!(
            render(&json!("arn:aws:s3:::{Name}/*"), &item).unwrap(),
            json!("arn:aws:s3:::logs/*")
        );
        assert_eq!(render(&json!("{Count}"), &item).unwrap(), json!(3));
        assert_eq!(render(&json!("n={Count}"), &item).unwrap(), json!("n=3"));
    }

    #[test]
    fn test_escaped_braces() {
        let item = json!({"Name": "x"});
        assert_eq!(
            render(&json!("{{\"name\": \"{Name}\"}}"), &item).unwrap(),
            json!("{\"name\": \"x\"}")
        );
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let err = render(&json!({"Bucket": "{Name}"}), &json!({"Id": 1})).unwrap_err();
        assert!(matches!(err, TemplateError::MissingValue { ref placeholder } if placeholder == "Name"));
        assert_eq!(err.to_string(), "Placeholder '{Name}' has no value in the item");
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(matches!(
            render(&json!("{Name"), &json!({})).unwrap_err(),
            TemplateError::UnbalancedBrace { .. }
        ));
        assert!(matches!(
            render(&json!("Name}"), &json!({})).unwrap_err(),
            TemplateError::UnbalancedBrace { .. }
        ));
    }
}
