//! Bridge from `tollgate_config` sections to telemetry types.

use std::str::FromStr;

use anyhow::Result;
use tollgate_config::LoggingSection;
use tollgate_telemetry::{LogConfig, LogFormat};

/// Build the logging setup described by the `[logging]` section.
pub(crate) fn to_log_config(section: &LoggingSection) -> Result<LogConfig> {
    let mut config = LogConfig::new(section.level.clone()).with_format(LogFormat::from_str(&section.format)?);
    if let Some(path) = &section.file {
        config = config.with_file(path.clone());
    }
    for directive in &section.directives {
        config = config.with_directive(directive.clone());
    }
    Ok(config)
}
