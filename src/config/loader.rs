use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Load configuration from a file, with `GATEWAY_*` environment variables
/// layered on top. Supports YAML, JSON and TOML selected by extension.
pub fn load_config(config_path: &str) -> Result<GatewayConfig> {
    let path = Path::new(config_path);

    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("invalid UTF-8 path: {}", path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix("GATEWAY").separator("__"))
        .build()
        .with_context(|| format!("failed to read config from {}", path.display()))?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))?;

    Ok(gateway_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
jwt:
  secret_key: "s3cret"
  issuer: "auth-service"
rate_limit:
  capacity: 50
  refill_interval: "500ms"
services:
  - name: "user"
    prefix: "/user"
    host: "127.0.0.1"
    port: 8081
    public_paths: ["/register"]
    routes:
      - path: "/profile"
        methods: ["GET"]
        allowed_roles: ["user", "admin"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.rate_limit.capacity, 50);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].routes[0].methods, vec!["GET"]);
    }

    #[test]
    fn test_load_json_config() {
        let json_content = r#"
{
  "listen_addr": "127.0.0.1:3000",
  "jwt": { "secret_key": "s3cret", "issuer": "auth-service" },
  "services": [
    { "name": "user", "prefix": "/user", "host": "127.0.0.1", "port": 8081 }
  ]
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.services[0].prefix, "/user");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_config("/definitely/not/here.yaml").is_err());
    }
}
