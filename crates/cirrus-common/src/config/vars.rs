//! Environment variable references in configuration text.
//!
//! | Form              | Unset           | Set but empty |
//! |-------------------|-----------------|---------------|
//! | `$NAME`, `${NAME}` | error          | empty         |
//! | `${NAME:-dflt}`   | `dflt`          | `dflt`        |
//! | `${NAME-dflt}`    | `dflt`          | empty         |
//!
//! `$$` produces a literal `$`. Values containing line breaks are rejected
//! so a variable cannot inject YAML structure.

use std::env;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\$|\$\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<fallback>:?-)(?P<default>[^}]*))?\}|\$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("Invalid variable reference pattern")
});

/// Interpolated text plus every problem found along the way.
#[derive(Debug)]
pub struct InterpolationResult {
    pub text: String,
    /// One message per unresolvable reference.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// How a reference behaves when its variable is missing or empty.
enum Fallback<'a> {
    None,
    /// `${NAME-default}`
    IfUnset(&'a str),
    /// `${NAME:-default}`
    IfUnsetOrEmpty(&'a str),
}

enum Reference<'a> {
    Dollar,
    Variable { name: &'a str, fallback: Fallback<'a> },
}

impl<'a> Reference<'a> {
    fn parse(caps: &Captures<'a>) -> Self {
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return Self::Dollar;
        };
        let default = caps.name("default").map_or("", |m| m.as_str());
        let fallback = match caps.name("fallback").map(|m| m.as_str()) {
            Some(":-") => Fallback::IfUnsetOrEmpty(default),
            Some(_) => Fallback::IfUnset(default),
            None => Fallback::None,
        };
        Self::Variable {
            name: name.as_str(),
            fallback,
        }
    }

    fn resolve(&self) -> Result<String, String> {
        let (name, fallback) = match self {
            Self::Dollar => return Ok("$".to_string()),
            Self::Variable { name, fallback } => (*name, fallback),
        };

        match (env::var(name).ok(), fallback) {
            (Some(value), _) if value.contains(['\n', '\r']) => {
                Err(format!("environment variable '{name}' contains a line break"))
            }
            (Some(value), Fallback::IfUnsetOrEmpty(default)) if value.is_empty() => {
                Ok(default.to_string())
            }
            (Some(value), _) => Ok(value),
            (None, Fallback::IfUnset(default) | Fallback::IfUnsetOrEmpty(default)) => {
                Ok(default.to_string())
            }
            (None, Fallback::None) => Err(format!("environment variable '{name}' is not set")),
        }
    }
}

/// Replace every variable reference in `input`.
///
/// Unresolvable references are left in place and reported together.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut text = String::with_capacity(input.len());
    let mut errors = Vec::new();
    let mut last = 0;

    for caps in REFERENCE.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        text.push_str(&input[last..whole.start()]);
        match Reference::parse(&caps).resolve() {
            Ok(value) => text.push_str(&value),
            Err(message) => {
                errors.push(message);
                text.push_str(whole.as_str());
            }
        }
        last = whole.end();
    }
    text.push_str(&input[last..]);

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for the lifetime of the guard and restores them on drop.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let saved = vars.iter().map(|(key, _)| (*key, env::var(key).ok())).collect();
            for (key, value) in vars {
                apply(key, *value);
            }
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                apply(key, value.as_deref());
            }
        }
    }

    fn apply(key: &str, value: Option<&str>) {
        // SAFETY: every test touches only its own CIRRUS_VARS_* names
        unsafe {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    fn test_bare_and_braced() {
        let _env = EnvGuard::set(&[("CIRRUS_VARS_PROFILE", Some("prod"))]);
        let result = interpolate("- profile: $CIRRUS_VARS_PROFILE\n- profile: ${CIRRUS_VARS_PROFILE}");
        assert!(result.is_ok());
        assert_eq!(result.text, "- profile: prod\n- profile: prod");
    }

    #[test]
    fn test_every_missing_variable_is_reported() {
        let _env = EnvGuard::set(&[("CIRRUS_VARS_MISSING_A", None), ("CIRRUS_VARS_MISSING_B", None)]);
        let result = interpolate("url: $CIRRUS_VARS_MISSING_A/${CIRRUS_VARS_MISSING_B}");
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("CIRRUS_VARS_MISSING_A"));
        assert_eq!(result.text, "url: $CIRRUS_VARS_MISSING_A/${CIRRUS_VARS_MISSING_B}");
    }

    #[test]
    fn test_defaults() {
        let _env = EnvGuard::set(&[("CIRRUS_VARS_EMPTY", Some("")), ("CIRRUS_VARS_UNSET", None)]);
        assert_eq!(interpolate("${CIRRUS_VARS_EMPTY:-20}").text, "20");
        assert_eq!(interpolate("[${CIRRUS_VARS_EMPTY-20}]").text, "[]");
        assert_eq!(interpolate("${CIRRUS_VARS_UNSET-eu-west-1}").text, "eu-west-1");
        assert_eq!(interpolate("${CIRRUS_VARS_UNSET:-}").text, "");
    }

    #[test]
    fn test_line_breaks_rejected() {
        let _env = EnvGuard::set(&[("CIRRUS_VARS_MULTILINE", Some("a\nsources: [x]"))]);
        let result = interpolate("profile: $CIRRUS_VARS_MULTILINE");
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("line break"));
    }

    #[test]
    fn test_escaped_dollar() {
        let result = interpolate("password: p$$w0rd and a lone $ sign");
        assert!(result.is_ok());
        assert_eq!(result.text, "password: p$w0rd and a lone $ sign");
    }
}
