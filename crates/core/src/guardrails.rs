use std::collections::BTreeSet;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;

pub const REDACTED: &str = "[REDACTED]";

/// Field names that are always masked in log output, compared case-insensitively.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "authorization",
    "password",
    "secret",
    "api_key",
    "apikey",
    "token",
    "credential",
    "credentials",
    "private_key",
    "client_secret",
];

/// An empty allowlist allows every tool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolAllowlist {
    allowed: BTreeSet<String>,
}

impl ToolAllowlist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = names
            .into_iter()
            .map(|name| {
                let name: String = name.into();
                name.trim().to_string()
            })
            .filter(|name| !name.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn is_allowed(&self, tool_name: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(tool_name)
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed.is_empty()
    }
}

/// Secret values that must never leave the process inside tool arguments.
#[derive(Clone, Default)]
pub struct SecretSet {
    values: Vec<SecretString>,
}

impl SecretSet {
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = SecretString>,
    {
        let values =
            values.into_iter().filter(|value| !value.expose_secret().trim().is_empty()).collect();
        Self { values }
    }

    pub fn from_plain<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(values.into_iter().map(|value| SecretString::from(value.into())))
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.values.iter().any(|secret| secret.expose_secret() == candidate)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for SecretSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSet").field("tracked", &self.values.len()).finish()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardrailViolation {
    #[error("Tool \"{tool}\" is not in the allowed tools list")]
    ToolNotAllowlisted { tool: String },
    #[error("Request blocked: contains sensitive data")]
    SecretLeak { field_path: String },
}

impl GuardrailViolation {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ToolNotAllowlisted { .. } => "tool_not_allowlisted",
            Self::SecretLeak { .. } => "secret_leak_blocked",
        }
    }

    pub fn field_path(&self) -> Option<&str> {
        match self {
            Self::ToolNotAllowlisted { .. } => None,
            Self::SecretLeak { field_path } => Some(field_path),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Guardrails {
    allowlist: ToolAllowlist,
    secrets: SecretSet,
}

impl Guardrails {
    pub fn new(allowlist: ToolAllowlist, secrets: SecretSet) -> Self {
        Self { allowlist, secrets }
    }

    pub fn allowlist(&self) -> &ToolAllowlist {
        &self.allowlist
    }

    pub fn tracked_secret_count(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.allowlist.is_allowed(tool_name)
    }

    /// Dotted path of the first argument whose string value equals a tracked
    /// secret, or `None` when the arguments are clean. Array elements use their
    /// index as the path segment. Object keys are visited in sorted order, not
    /// the order the model sent them, so "first" is stable across calls.
    pub fn scan_for_secret_leak(&self, args: &Map<String, Value>) -> Option<String> {
        if self.secrets.is_empty() {
            return None;
        }
        scan_object(&self.secrets, args)
    }

    /// Allowlist first, then the secret scan.
    pub fn evaluate_call(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<(), GuardrailViolation> {
        if !self.is_tool_allowed(tool_name) {
            return Err(GuardrailViolation::ToolNotAllowlisted { tool: tool_name.to_string() });
        }

        if let Some(field_path) = self.scan_for_secret_leak(args) {
            return Err(GuardrailViolation::SecretLeak { field_path });
        }

        Ok(())
    }

    /// Deep copy of `value` safe for logging. The input is left untouched.
    pub fn redact_for_log(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let redacted = map
                    .iter()
                    .map(|(key, nested)| {
                        let replacement = if is_sensitive_field(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.redact_for_log(nested)
                        };
                        (key.clone(), replacement)
                    })
                    .collect();
                Value::Object(redacted)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.redact_for_log(item)).collect())
            }
            Value::String(text) if self.secrets.contains(text) => {
                Value::String(REDACTED.to_string())
            }
            other => other.clone(),
        }
    }
}

pub fn is_sensitive_field(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    SENSITIVE_FIELDS.iter().any(|field| *field == lowered)
}

fn scan_object(secrets: &SecretSet, map: &Map<String, Value>) -> Option<String> {
    map.iter().find_map(|(key, value)| scan_value(secrets, value).map(|rest| join(key, rest)))
}

// `Some(None)` marks a hit on the value itself; `Some(Some(path))` a hit below it.
fn scan_value(secrets: &SecretSet, value: &Value) -> Option<Option<String>> {
    match value {
        Value::String(text) if secrets.contains(text) => Some(None),
        Value::Object(map) => scan_object(secrets, map).map(Some),
        Value::Array(items) => items.iter().enumerate().find_map(|(index, item)| {
            scan_value(secrets, item).map(|rest| Some(join(&index.to_string(), rest)))
        }),
        _ => None,
    }
}

fn join(head: &str, rest: Option<String>) -> String {
    match rest {
        Some(rest) => format!("{head}.{rest}"),
        None => head.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{GuardrailViolation, Guardrails, SecretSet, ToolAllowlist, REDACTED};

    fn guardrails(allowed: &[&str]) -> Guardrails {
        Guardrails::new(
            ToolAllowlist::new(allowed.iter().copied()),
            SecretSet::from_plain(["sk-live-123", "bot-token-456"]),
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn empty_allowlist_allows_everything() {
        let allowlist = ToolAllowlist::default();
        assert!(allowlist.is_allowed("a"));
        assert!(allowlist.is_allowed("anything_else"));
        assert!(!allowlist.is_restricted());
    }

    #[test]
    fn configured_allowlist_rejects_unlisted_tools() {
        let allowlist = ToolAllowlist::new(["a"]);
        assert!(allowlist.is_allowed("a"));
        assert!(!allowlist.is_allowed("b"));
    }

    #[test]
    fn nested_secret_reports_dotted_path() {
        let rails = guardrails(&[]);
        let args = object(json!({
            "summary": "weekly sync",
            "attendees": [{"email": "a@example.com"}, {"note": "bot-token-456"}],
        }));

        assert_eq!(rails.scan_for_secret_leak(&args).as_deref(), Some("attendees.1.note"));

        let args = object(json!({"event": {"meta": {"key": "sk-live-123"}}}));
        assert_eq!(rails.scan_for_secret_leak(&args).as_deref(), Some("event.meta.key"));
    }

    #[test]
    fn first_leak_is_reported_in_sorted_key_order() {
        let rails = guardrails(&[]);
        let args = object(json!({"zeta": "sk-live-123", "alpha": {"token": "bot-token-456"}}));
        assert_eq!(rails.scan_for_secret_leak(&args).as_deref(), Some("alpha.token"));
    }

    #[test]
    fn clean_arguments_pass_scan() {
        let rails = guardrails(&[]);
        let args = object(json!({"query": "sk-live", "limit": 5, "nested": {"ok": true}}));
        assert_eq!(rails.scan_for_secret_leak(&args), None);
    }

    #[test]
    fn evaluate_call_checks_allowlist_before_secrets() {
        let rails = guardrails(&["calendar_list"]);
        let leaking = object(json!({"token": "sk-live-123"}));

        let violation = rails.evaluate_call("gmail_send", &leaking).unwrap_err();
        assert_eq!(violation.reason_code(), "tool_not_allowlisted");
        assert_eq!(violation.to_string(), "Tool \"gmail_send\" is not in the allowed tools list");

        let violation = rails.evaluate_call("calendar_list", &leaking).unwrap_err();
        assert_eq!(
            violation,
            GuardrailViolation::SecretLeak { field_path: "token".to_string() }
        );
        assert_eq!(violation.to_string(), "Request blocked: contains sensitive data");
        assert_eq!(violation.field_path(), Some("token"));

        assert!(rails.evaluate_call("calendar_list", &object(json!({"day": "monday"}))).is_ok());
    }

    #[test]
    fn redaction_masks_sensitive_names_and_secret_values_without_mutating_input() {
        let rails = guardrails(&[]);
        let original = json!({
            "Authorization": {"scheme": "Bearer"},
            "password": 1234,
            "refresh_token": null,
            "label": "bot-token-456",
            "items": ["sk-live-123", "plain"],
            "data": {"API_KEY": "whatever", "count": 2},
        });
        let snapshot = original.clone();

        let redacted = rails.redact_for_log(&original);

        assert_eq!(original, snapshot);
        assert_eq!(redacted["Authorization"], json!(REDACTED));
        assert_eq!(redacted["password"], json!(REDACTED));
        assert_eq!(redacted["refresh_token"], json!(REDACTED));
        assert_eq!(redacted["label"], json!(REDACTED));
        assert_eq!(redacted["items"], json!([REDACTED, "plain"]));
        assert_eq!(redacted["data"]["API_KEY"], json!(REDACTED));
        assert_eq!(redacted["data"]["count"], json!(2));
    }

    #[test]
    fn secret_set_debug_does_not_leak_values() {
        let secrets = SecretSet::from_plain(["sk-live-123", "  "]);
        assert_eq!(secrets.len(), 1);
        assert!(!format!("{secrets:?}").contains("sk-live-123"));
    }
}
