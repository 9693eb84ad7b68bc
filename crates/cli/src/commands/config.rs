use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crmquery_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => render(&config, resolve_config_path(None)),
        Err(error) => format!("config validation failed: {error}"),
    }
}

pub fn render(config: &AppConfig, config_file_path: Option<PathBuf>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }
    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let llm = &config.llm;
    let crm = &config.crm;
    vec![
        Entry {
            key: "llm.provider",
            value: format!("{:?}", llm.provider),
            env_keys: &["CRMQUERY_LLM_PROVIDER"],
        },
        Entry {
            key: "llm.api_key",
            value: llm.api_key.as_ref().map(redact_secret).unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["CRMQUERY_LLM_API_KEY", "GROQ_API_KEY"],
        },
        Entry {
            key: "llm.base_url",
            value: llm.resolved_base_url().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["CRMQUERY_LLM_BASE_URL"],
        },
        Entry { key: "llm.model", value: llm.model.clone(), env_keys: &["CRMQUERY_LLM_MODEL"] },
        Entry {
            key: "llm.temperature",
            value: llm.temperature.to_string(),
            env_keys: &["CRMQUERY_LLM_TEMPERATURE"],
        },
        Entry {
            key: "llm.max_tokens",
            value: llm.max_tokens.to_string(),
            env_keys: &["CRMQUERY_LLM_MAX_TOKENS"],
        },
        Entry {
            key: "llm.timeout_secs",
            value: llm.timeout_secs.to_string(),
            env_keys: &["CRMQUERY_LLM_TIMEOUT_SECS"],
        },
        Entry {
            key: "crm.client_id",
            value: crm.client_id.clone(),
            env_keys: &["CRMQUERY_CRM_CLIENT_ID", "ZOHO_CLIENT_ID"],
        },
        Entry {
            key: "crm.client_secret",
            value: redact_secret(&crm.client_secret),
            env_keys: &["CRMQUERY_CRM_CLIENT_SECRET", "ZOHO_CLIENT_SECRET"],
        },
        Entry {
            key: "crm.refresh_token",
            value: redact_secret(&crm.refresh_token),
            env_keys: &["CRMQUERY_CRM_REFRESH_TOKEN", "ZOHO_REFRESH_TOKEN"],
        },
        Entry {
            key: "crm.region",
            value: crm.region.as_str().to_string(),
            env_keys: &["CRMQUERY_CRM_REGION"],
        },
        Entry {
            key: "crm.resource_path",
            value: crm.resource_path.display().to_string(),
            env_keys: &["CRMQUERY_CRM_RESOURCE_PATH"],
        },
        Entry {
            key: "crm.timeout_secs",
            value: crm.timeout_secs.to_string(),
            env_keys: &["CRMQUERY_CRM_TIMEOUT_SECS"],
        },
        Entry {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["CRMQUERY_SERVER_BIND_ADDRESS"],
        },
        Entry {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["CRMQUERY_SERVER_PORT"],
        },
        Entry {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["CRMQUERY_LOGGING_LEVEL", "CRMQUERY_LOG_LEVEL"],
        },
        Entry {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["CRMQUERY_LOGGING_FORMAT", "CRMQUERY_LOG_FORMAT"],
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a dotted prefix such as Zoho's `1000.` or a dashed one such as `gsk-`.
fn redact_secret(secret: &SecretString) -> String {
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let prefix = trimmed
        .split_once('.')
        .map(|(prefix, _)| (prefix, '.'))
        .or_else(|| trimmed.split_once('-').map(|(prefix, _)| (prefix, '-')))
        .filter(|(prefix, _)| prefix.len() <= 8);
    match prefix {
        Some((prefix, separator)) => format!("{prefix}{separator}***"),
        None => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crmquery_core::config::AppConfig;
    use secrecy::SecretString;

    use super::{contains_path, redact_secret, render};

    #[test]
    fn redaction_keeps_only_short_prefixes() {
        let redact = |raw: &str| redact_secret(&SecretString::from(raw.to_string()));
        assert_eq!(redact("1000.abcdef0123"), "1000.***");
        assert_eq!(redact("gsk-abcdef"), "gsk-***");
        assert_eq!(redact("plainsecretvalue"), "<redacted>");
        assert_eq!(redact("averyveryverylongprefix.tail"), "<redacted>");
        assert_eq!(redact("   "), "<empty>");
    }

    #[test]
    fn render_never_prints_secret_material() {
        let mut config = AppConfig::default();
        config.crm.client_secret = SecretString::from("super-secret-value".to_string());
        config.crm.refresh_token = SecretString::from("1000.refresh-token-body".to_string());
        config.llm.api_key = Some(SecretString::from("gsk-live-key".to_string()));

        let output = render(&config, None);

        assert!(!output.contains("secret-value"));
        assert!(!output.contains("refresh-token-body"));
        assert!(!output.contains("live-key"));
        assert!(output.contains("- crm.region = in"));
        assert!(output.contains("- llm.base_url = https://api.groq.com/openai/v1"));
    }

    #[test]
    fn file_source_is_attributed_when_key_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("crmquery.toml");
        std::fs::write(&path, "[server]\nport = 8080\n").expect("write config");

        let output = render(&AppConfig::default(), Some(PathBuf::from(&path)));

        let line = output
            .lines()
            .find(|line| line.starts_with("- server.port"))
            .expect("server.port line present");
        if std::env::var_os("CRMQUERY_SERVER_PORT").is_none() {
            assert!(line.contains("source: file"), "{line}");
        }
    }

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = "[crm]\nregion = \"eu\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "crm.region"));
        assert!(!contains_path(&doc, "crm.client_id"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
