use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::McpError;

/// One entry of the server definitions file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Values of the form `${VAR}` are resolved from the process environment
    /// at launch time.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServerDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), ..Self::default() }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy of this definition with every env placeholder resolved.
    pub fn resolved(&self) -> Self {
        Self { env: resolve_env(&self.env), ..self.clone() }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServersFile {
    #[serde(default)]
    servers: BTreeMap<String, ServerDefinition>,
}

/// Reads `{ "servers": { name: { command, args, env } } }`. A missing file
/// means no servers. Definitions come back ordered by server name.
pub fn load_server_definitions(
    path: &Path,
) -> Result<BTreeMap<String, ServerDefinition>, McpError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => return Err(McpError::ReadConfig { path: path.to_path_buf(), source }),
    };

    let file: ServersFile = serde_json::from_str(&raw)
        .map_err(|source| McpError::ParseConfig { path: path.to_path_buf(), source })?;
    Ok(file.servers)
}

pub fn resolve_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    resolve_placeholders(env, |var| std::env::var(var).ok())
}

/// Resolves whole-value `${VAR}` placeholders through `lookup`. Unknown
/// variables become empty strings. Other values pass through untouched.
pub fn resolve_placeholders<F>(env: &BTreeMap<String, String>, lookup: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    env.iter()
        .map(|(key, value)| {
            let resolved = match placeholder_name(value) {
                Some(var) => lookup(var).unwrap_or_else(|| {
                    warn!(
                        event_name = "mcp.config.placeholder_missing",
                        env_key = %key,
                        variable = %var,
                        "placeholder variable is not set, using empty value"
                    );
                    String::new()
                }),
                None => value.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

fn placeholder_name(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{placeholder_name, resolve_placeholders};

    #[test]
    fn only_whole_value_placeholders_are_recognized() {
        assert_eq!(placeholder_name("${GITHUB_TOKEN}"), Some("GITHUB_TOKEN"));
        assert_eq!(placeholder_name("prefix-${GITHUB_TOKEN}"), None);
        assert_eq!(placeholder_name("${}"), None);
        assert_eq!(placeholder_name("plain"), None);
    }

    #[test]
    fn placeholders_resolve_and_missing_variables_become_empty() {
        let env = BTreeMap::from([
            ("TOKEN".to_string(), "${CLAWBY_TEST_TOKEN}".to_string()),
            ("MISSING".to_string(), "${CLAWBY_TEST_MISSING}".to_string()),
            ("REGION".to_string(), "eu-west-1".to_string()),
        ]);

        let resolved = resolve_placeholders(&env, |var| {
            (var == "CLAWBY_TEST_TOKEN").then(|| "ghp_value".to_string())
        });

        assert_eq!(resolved["TOKEN"], "ghp_value");
        assert_eq!(resolved["MISSING"], "");
        assert_eq!(resolved["REGION"], "eu-west-1");
    }
}
