use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

pub const ENV_PROVIDER: &str = "MINAGENT_PROVIDER";
pub const ENV_MODEL: &str = "MINAGENT_MODEL";
pub const ENV_TEMPERATURE: &str = "MINAGENT_TEMPERATURE";
pub const ENV_WORKSPACE_ROOT: &str = "WORKSPACE_ROOT";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful command-line assistant. \
You can run shell commands with the bash tool. Every command is shown to the \
user and only runs after they approve it, so never assume a command ran until \
you see its result, and never try to run commands any other way. If a command \
is rejected, ask how to proceed instead of retrying it. Prefer small, \
read-only commands first. When you are done, answer in plain text without \
tool calls.";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub workspace: WorkspaceConfig,
    pub agent: AgentConfig,
    pub audit: AuditConfig,
}

/// Wire dialect spoken by a provider.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name; known names fill in schema, base URL and key variable.
    pub provider: String,
    /// Model to use. Defaults to the provider's default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: Option<String>,
    /// Required for providers not in the built-in table.
    pub schema: Option<Schema>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Command to run to get the API key (e.g., "pass show groq").
    /// The command is run via `sh -c`.
    pub api_key_cmd: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            base_url: None,
            schema: None,
            api_key_env: None,
            api_key_cmd: None,
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory commands run in. Defaults to the current directory.
    pub root: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
    /// Directory of `/skill` files. Defaults to ~/.config/minagent/skills.
    pub skills_dir: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Custom audit log path. Defaults to ~/.local/share/minagent/audit.jsonl.
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Resolve the audit log path, using the configured path or the XDG default.
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(ref custom) = self.path {
            return PathBuf::from(custom);
        }
        data_dir().join("minagent").join("audit.jsonl")
    }
}

struct ProviderPreset {
    name: &'static str,
    schema: Schema,
    base_url: &'static str,
    key_env: &'static str,
    model: &'static str,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "groq",
        schema: Schema::OpenAi,
        base_url: "https://api.groq.com/openai/v1",
        key_env: "GROQ_API_KEY",
        model: "moonshotai/kimi-k2-instruct",
    },
    ProviderPreset {
        name: "openai",
        schema: Schema::OpenAi,
        base_url: "https://api.openai.com/v1",
        key_env: "OPENAI_API_KEY",
        model: "gpt-4o-mini",
    },
    ProviderPreset {
        name: "deepseek",
        schema: Schema::OpenAi,
        base_url: "https://api.deepseek.com",
        key_env: "DEEPSEEK_API_KEY",
        model: "deepseek-chat",
    },
    ProviderPreset {
        name: "anthropic",
        schema: Schema::Anthropic,
        base_url: "https://api.anthropic.com",
        key_env: "ANTHROPIC_API_KEY",
        model: "claude-sonnet-4-20250514",
    },
];

fn preset(name: &str) -> Option<&'static ProviderPreset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Fatal configuration problems, reported before the REPL starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{env} is not set and no api_key_cmd is configured (provider '{provider}')")]
    MissingApiKey { provider: String, env: String },
    #[error("unknown provider '{0}': set backend.schema and backend.base_url")]
    UnknownProvider(String),
    #[error("backend.base_url is required for provider '{0}'")]
    MissingBaseUrl(String),
    #[error("model is empty for provider '{0}'")]
    MissingModel(String),
    #[error("invalid temperature '{0}': expected a number between 0 and 2")]
    InvalidTemperature(String),
    #[error("workspace root {} is not usable: {source}", path.display())]
    InvalidWorkspace { path: PathBuf, source: io::Error },
}

/// Immutable settings resolved once at startup and handed to the agent.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub provider: String,
    pub schema: Schema,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub workspace_root: PathBuf,
    pub system_prompt: String,
    pub skills_dir: PathBuf,
    pub audit_path: Option<PathBuf>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("schema", &self.schema)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("workspace_root", &self.workspace_root)
            .field("skills_dir", &self.skills_dir)
            .field("audit_path", &self.audit_path)
            .finish()
    }
}

impl Config {
    pub fn load_or_default() -> Self {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("warning: failed to parse {}: {e}", path.display());
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    /// Resolve against the process environment and current directory.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let cwd = std::env::current_dir().map_err(|source| ConfigError::InvalidWorkspace {
            path: PathBuf::from("."),
            source,
        })?;
        self.resolve_with(|key| std::env::var(key).ok(), &cwd)
    }

    /// Resolve with an explicit environment lookup, so tests never touch
    /// process-wide state.
    pub fn resolve_with<F>(&self, env: F, cwd: &Path) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let provider = env(ENV_PROVIDER).unwrap_or_else(|| self.backend.provider.clone());
        let preset = preset(&provider);

        let schema = match (self.backend.schema, preset) {
            (Some(schema), _) => schema,
            (None, Some(p)) => p.schema,
            (None, None) => return Err(ConfigError::UnknownProvider(provider)),
        };

        let base_url = self
            .backend
            .base_url
            .clone()
            .or_else(|| preset.map(|p| p.base_url.to_string()))
            .ok_or_else(|| ConfigError::MissingBaseUrl(provider.clone()))?;

        let model = env(ENV_MODEL)
            .or_else(|| self.backend.model.clone())
            .or_else(|| preset.map(|p| p.model.to_string()))
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingModel(provider.clone()))?;

        let temperature = match env(ENV_TEMPERATURE) {
            Some(raw) => parse_temperature(&raw)?,
            None => check_temperature(self.backend.temperature)?,
        };

        let key_env = self
            .backend
            .api_key_env
            .clone()
            .or_else(|| preset.map(|p| p.key_env.to_string()))
            .unwrap_or_else(|| format!("{}_API_KEY", provider.to_uppercase()));
        let api_key = self
            .backend
            .api_key_cmd
            .as_deref()
            .and_then(run_key_command)
            .or_else(|| env(&key_env))
            .ok_or_else(|| ConfigError::MissingApiKey {
                provider: provider.clone(),
                env: key_env.clone(),
            })?;

        let root = env(ENV_WORKSPACE_ROOT)
            .or_else(|| self.workspace.root.clone())
            .map(|r| cwd.join(r))
            .unwrap_or_else(|| cwd.to_path_buf());
        let workspace_root = resolve_workspace(&root)?;

        let system_prompt = self
            .agent
            .system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let skills_dir = self
            .agent
            .skills_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| cwd.join(d))
            .unwrap_or_else(|| config_dir().join("minagent").join("skills"));

        let audit_path = self.audit.enabled.then(|| self.audit.resolve_path());

        Ok(Settings {
            provider,
            schema,
            base_url,
            api_key,
            model,
            temperature,
            max_tokens: self.backend.max_tokens,
            workspace_root,
            system_prompt,
            skills_dir,
            audit_path,
        })
    }
}

fn parse_temperature(raw: &str) -> Result<f32, ConfigError> {
    raw.trim()
        .parse::<f32>()
        .map_err(|_| ConfigError::InvalidTemperature(raw.to_string()))
        .and_then(check_temperature)
}

fn check_temperature(value: f32) -> Result<f32, ConfigError> {
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidTemperature(value.to_string()))
    }
}

fn resolve_workspace(root: &Path) -> Result<PathBuf, ConfigError> {
    let canonical = std::fs::canonicalize(root).map_err(|source| ConfigError::InvalidWorkspace {
        path: root.to_path_buf(),
        source,
    })?;
    if !canonical.is_dir() {
        return Err(ConfigError::InvalidWorkspace {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    Ok(canonical)
}

/// Run `api_key_cmd` and return its trimmed stdout if it succeeded.
fn run_key_command(cmd: &str) -> Option<String> {
    let output = Command::new("sh").arg("-c").arg(cmd).output().ok()?;
    if !output.status.success() {
        tracing::warn!(status = ?output.status.code(), "api_key_cmd failed");
        return None;
    }
    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!key.is_empty()).then_some(key)
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"))
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

fn config_path() -> PathBuf {
    config_dir().join("minagent").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn cwd() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.backend.provider, "groq");
        assert_eq!(cfg.backend.temperature, 0.7);
        assert_eq!(cfg.backend.max_tokens, 4096);
        assert!(cfg.audit.enabled);
        assert!(cfg.workspace.root.is_none());
    }

    #[test]
    fn parse_empty_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parse_backend_config() {
        let toml_str = r#"
[backend]
provider = "local"
schema = "openai"
base_url = "http://localhost:8080/v1"
model = "qwen"
api_key_env = "LOCAL_KEY"

[audit]
enabled = false
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.backend.provider, "local");
        assert_eq!(cfg.backend.schema, Some(Schema::OpenAi));
        assert_eq!(cfg.backend.model.as_deref(), Some("qwen"));
        assert_eq!(cfg.backend.temperature, 0.7);
        assert!(!cfg.audit.enabled);
    }

    #[test]
    fn resolve_defaults_with_key() {
        let dir = cwd();
        let settings = Config::default()
            .resolve_with(env_of(&[("GROQ_API_KEY", "gsk_test")]), dir.path())
            .unwrap();

        assert_eq!(settings.provider, "groq");
        assert_eq!(settings.schema, Schema::OpenAi);
        assert_eq!(settings.api_key, "gsk_test");
        assert_eq!(settings.model, "moonshotai/kimi-k2-instruct");
        assert_eq!(settings.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(
            settings.workspace_root,
            std::fs::canonicalize(dir.path()).unwrap()
        );
        assert!(settings.system_prompt.contains("approve"));
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let dir = cwd();
        let err = Config::default()
            .resolve_with(env_of(&[]), dir.path())
            .unwrap_err();
        match err {
            ConfigError::MissingApiKey { provider, env } => {
                assert_eq!(provider, "groq");
                assert_eq!(env, "GROQ_API_KEY");
            }
            other => panic!("expected MissingApiKey, got {other:?}"),
        }
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let dir = cwd();
        let err = Config::default()
            .resolve_with(env_of(&[("GROQ_API_KEY", "  ")]), dir.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));
    }

    #[test]
    fn environment_overrides_model_temperature_and_provider() {
        let dir = cwd();
        let settings = Config::default()
            .resolve_with(
                env_of(&[
                    (ENV_PROVIDER, "anthropic"),
                    (ENV_MODEL, "claude-test"),
                    (ENV_TEMPERATURE, "0.1"),
                    ("ANTHROPIC_API_KEY", "sk-ant"),
                ]),
                dir.path(),
            )
            .unwrap();
        assert_eq!(settings.schema, Schema::Anthropic);
        assert_eq!(settings.model, "claude-test");
        assert_eq!(settings.temperature, 0.1);
        assert_eq!(settings.api_key, "sk-ant");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let dir = cwd();
        for raw in ["hot", "3.5", "-1"] {
            let err = Config::default()
                .resolve_with(
                    env_of(&[("GROQ_API_KEY", "k"), (ENV_TEMPERATURE, raw)]),
                    dir.path(),
                )
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidTemperature(_)),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn workspace_root_from_env_relative_to_cwd() {
        let dir = cwd();
        std::fs::create_dir(dir.path().join("project")).unwrap();
        let settings = Config::default()
            .resolve_with(
                env_of(&[("GROQ_API_KEY", "k"), (ENV_WORKSPACE_ROOT, "project")]),
                dir.path(),
            )
            .unwrap();
        assert_eq!(
            settings.workspace_root,
            std::fs::canonicalize(dir.path().join("project")).unwrap()
        );
    }

    #[test]
    fn missing_workspace_root_is_fatal() {
        let dir = cwd();
        let err = Config::default()
            .resolve_with(
                env_of(&[("GROQ_API_KEY", "k"), (ENV_WORKSPACE_ROOT, "nope")]),
                dir.path(),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkspace { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn unknown_provider_needs_schema() {
        let dir = cwd();
        let cfg: Config = toml::from_str("[backend]\nprovider = \"mystery\"").unwrap();
        let err = cfg
            .resolve_with(env_of(&[("MYSTERY_API_KEY", "k")]), dir.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(ref p) if p == "mystery"));
    }

    #[test]
    fn custom_provider_needs_base_url() {
        let dir = cwd();
        let cfg: Config = toml::from_str(
            "[backend]\nprovider = \"local\"\nschema = \"openai\"\nmodel = \"m\"",
        )
        .unwrap();
        let err = cfg
            .resolve_with(env_of(&[("LOCAL_API_KEY", "k")]), dir.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl(_)));
    }

    #[test]
    fn custom_provider_resolves() {
        let dir = cwd();
        let cfg: Config = toml::from_str(
            r#"
[backend]
provider = "local"
schema = "openai"
base_url = "http://localhost:8080/v1"
model = "qwen"
api_key_env = "LOCAL_KEY"
"#,
        )
        .unwrap();
        let settings = cfg
            .resolve_with(env_of(&[("LOCAL_KEY", "abc")]), dir.path())
            .unwrap();
        assert_eq!(settings.base_url, "http://localhost:8080/v1");
        assert_eq!(settings.model, "qwen");
        assert_eq!(settings.api_key, "abc");
    }

    #[test]
    fn api_key_cmd_takes_precedence() {
        let dir = cwd();
        let cfg = Config {
            backend: BackendConfig {
                api_key_cmd: Some("echo test_key_123".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = cfg
            .resolve_with(env_of(&[("GROQ_API_KEY", "from_env")]), dir.path())
            .unwrap();
        assert_eq!(settings.api_key, "test_key_123");
    }

    #[test]
    fn failing_api_key_cmd_falls_back_to_env() {
        let dir = cwd();
        let cfg = Config {
            backend: BackendConfig {
                api_key_cmd: Some("exit 1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = cfg
            .resolve_with(env_of(&[("GROQ_API_KEY", "from_env")]), dir.path())
            .unwrap();
        assert_eq!(settings.api_key, "from_env");
    }

    #[test]
    fn custom_system_prompt_and_disabled_audit() {
        let dir = cwd();
        let cfg: Config = toml::from_str(
            "[agent]\nsystem_prompt = \"Be terse.\"\n\n[audit]\nenabled = false",
        )
        .unwrap();
        let settings = cfg
            .resolve_with(env_of(&[("GROQ_API_KEY", "k")]), dir.path())
            .unwrap();
        assert_eq!(settings.system_prompt, "Be terse.");
        assert!(settings.audit_path.is_none());
    }

    #[test]
    fn skills_dir_default_and_override() {
        let dir = cwd();
        let settings = Config::default()
            .resolve_with(env_of(&[("GROQ_API_KEY", "k")]), dir.path())
            .unwrap();
        assert!(settings.skills_dir.ends_with("minagent/skills"));

        let cfg: Config = toml::from_str("[agent]\nskills_dir = \"prompts\"").unwrap();
        let settings = cfg
            .resolve_with(env_of(&[("GROQ_API_KEY", "k")]), dir.path())
            .unwrap();
        assert_eq!(settings.skills_dir, dir.path().join("prompts"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let dir = cwd();
        let settings = Config::default()
            .resolve_with(env_of(&[("GROQ_API_KEY", "gsk_secret")]), dir.path())
            .unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn resolve_audit_path_custom() {
        let cfg = AuditConfig {
            path: Some("/custom/path/audit.jsonl".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_path(), PathBuf::from("/custom/path/audit.jsonl"));
    }

    #[test]
    fn resolve_audit_path_default() {
        let path = AuditConfig::default().resolve_path();
        assert!(path.to_string_lossy().ends_with("minagent/audit.jsonl"));
    }
}
