use cb_domain::config::{Config, ConfigSeverity};

#[test]
fn defaults_bind_loopback() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8000);
}

#[test]
fn server_table_overrides_bind() {
    let config: Config = toml::from_str(
        r#"
[server]
host = "0.0.0.0"
port = 9000
"#,
    )
    .unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
}

#[test]
fn cors_defaults_cover_both_localhost_spellings() {
    let origins = Config::default().server.cors.allowed_origins;
    assert!(origins.iter().any(|o| o == "http://localhost:*"));
    assert!(origins.iter().any(|o| o == "http://127.0.0.1:*"));
}

#[test]
fn cors_origins_replaceable_via_nested_table() {
    let config: Config = toml::from_str(
        r#"
[server.cors]
allowed_origins = ["https://chat.example.org", "http://localhost:5173"]
"#,
    )
    .unwrap();
    assert_eq!(
        config.server.cors.allowed_origins,
        vec![
            "https://chat.example.org".to_string(),
            "http://localhost:5173".to_string(),
        ]
    );
}

#[test]
fn default_config_validates_without_errors() {
    let config = Config::default();
    let issues = config.validate();
    assert!(
        issues.iter().all(|i| i.severity != ConfigSeverity::Error),
        "default config should have no error-severity issues: {issues:?}"
    );
}

#[test]
fn validate_rejects_zero_port() {
    let config: Config = toml::from_str("[server]\nport = 0").unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "server.port"));
}

#[test]
fn validate_rejects_zero_rate_limit_values() {
    let config: Config = toml::from_str(
        r#"
[server.rate_limit]
requests_per_second = 0
burst_size = 0
"#,
    )
    .unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "server.rate_limit.requests_per_second"));
    assert!(issues
        .iter()
        .any(|i| i.field == "server.rate_limit.burst_size"));
}

#[test]
fn validate_rejects_require_token_without_tokens() {
    let config: Config = toml::from_str("[auth]\nrequire_token = true").unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "auth.require_token"));
}

#[test]
fn validate_rejects_unknown_default_provider() {
    let toml_str = r#"
[ai]
default_provider = "missing"

[[ai.providers]]
id = "openai"
base_url = "https://api.openai.com/v1"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "ai.default_provider"));
}

#[test]
fn validate_rejects_duplicate_provider_ids() {
    let toml_str = r#"
[[ai.providers]]
id = "openai"
base_url = "https://api.openai.com/v1"

[[ai.providers]]
id = "openai"
base_url = "https://other.example/v1"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("duplicate")));
}

#[test]
fn history_limits_have_defaults() {
    let config = Config::default();
    assert_eq!(config.history.page_limit, 100);
    assert_eq!(config.history.recent_context, 10);
}
