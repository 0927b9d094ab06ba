//! Post-merge configuration validation.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ChannelKind, Config};

/// Longest accepted confirmation or backend timeout (one day).
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(config)?;
    validate_confirmation(config)?;
    validate_backend(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    if config.server.host.trim().is_empty() {
        return Err(invalid("server.host", "host must not be empty"));
    }
    if config.server.port == 0 {
        return Err(invalid("server.port", "port must be between 1 and 65535"));
    }
    if config.keys.file.as_os_str().is_empty() {
        return Err(invalid("keys.file", "key file path must not be empty"));
    }
    Ok(())
}

fn validate_confirmation(config: &Config) -> ConfigResult<()> {
    let c = &config.confirmation;

    if !matches!(c.mode.as_str(), "all" | "modify" | "modify_only" | "none") {
        return Err(invalid(
            "confirmation.mode",
            format!("unknown mode '{}'; expected one of: all, modify, none", c.mode),
        ));
    }

    if c.timeout_secs == 0 || c.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            "confirmation.timeout_secs",
            format!("timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds"),
        ));
    }

    if c.channel == ChannelKind::Web {
        if c.web_port == 0 {
            return Err(invalid(
                "confirmation.web_port",
                "port must be between 1 and 65535",
            ));
        }
        // Approval endpoints must never be reachable on the caller listener.
        if c.web_port == config.server.port && c.web_host == config.server.host {
            return Err(invalid(
                "confirmation.web_port",
                "operator listener must not share the caller listener's address",
            ));
        }
    }
    Ok(())
}

fn validate_backend(config: &Config) -> ConfigResult<()> {
    let b = &config.backend;

    if b.request_timeout_secs == 0 || b.request_timeout_secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            "backend.request_timeout_secs",
            format!("timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds"),
        ));
    }

    for route in &b.routes {
        if !route.prefix.starts_with('/') || !route.prefix.ends_with('/') || route.prefix.len() < 2
        {
            return Err(invalid(
                "backend.routes.prefix",
                format!("prefix '{}' must start and end with '/'", route.prefix),
            ));
        }
        let url = Url::parse(&route.base_url).map_err(|e| {
            invalid(
                "backend.routes.base_url",
                format!("'{}' is not a valid URL: {e}", route.base_url),
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                "backend.routes.base_url",
                format!("'{}' must use http or https", route.base_url),
            ));
        }
    }

    let mut prefixes: Vec<&str> = b.routes.iter().map(|r| r.prefix.as_str()).collect();
    prefixes.sort_unstable();
    if prefixes.windows(2).any(|w| w[0] == w[1]) {
        return Err(invalid(
            "backend.routes.prefix",
            "each prefix may only be routed once",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendRoute;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_eq!(field_of(validate(&config)), "server.port");
    }

    #[test]
    fn test_confirmation_timeout_bounds() {
        let mut config = Config::default();
        config.confirmation.timeout_secs = 0;
        assert_eq!(field_of(validate(&config)), "confirmation.timeout_secs");
        config.confirmation.timeout_secs = 86_401;
        assert_eq!(field_of(validate(&config)), "confirmation.timeout_secs");
        config.confirmation.timeout_secs = 1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_web_listener_must_differ_from_caller_listener() {
        let mut config = Config::default();
        config.confirmation.web_port = config.server.port;
        // Console channel: the web listener is never bound.
        assert!(validate(&config).is_ok());

        config.confirmation.channel = ChannelKind::Web;
        assert_eq!(field_of(validate(&config)), "confirmation.web_port");

        config.confirmation.web_host = "127.0.0.2".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_route_prefix_and_url() {
        let mut config = Config::default();
        config.backend.routes.push(BackendRoute {
            prefix: "/drive".into(),
            base_url: "https://www.googleapis.com".into(),
        });
        assert_eq!(field_of(validate(&config)), "backend.routes.prefix");

        let mut config = Config::default();
        config.backend.routes[0].base_url = "ftp://example.com".into();
        assert_eq!(field_of(validate(&config)), "backend.routes.base_url");

        let mut config = Config::default();
        config.backend.routes[0].base_url = "not a url".into();
        assert_eq!(field_of(validate(&config)), "backend.routes.base_url");

        let mut config = Config::default();
        let dup = config.backend.routes[0].clone();
        config.backend.routes.push(dup);
        assert_eq!(field_of(validate(&config)), "backend.routes.prefix");
    }

    #[test]
    fn test_logging_values() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".into();
        assert!(validate(&config).is_ok());
        config.logging.level = "loud".into();
        assert_eq!(field_of(validate(&config)), "logging.level");

        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }
}
