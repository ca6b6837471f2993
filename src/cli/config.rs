//! `config show` command.

use super::write_error;
use crate::Result;
use crate::config::RippleConfig;
use std::io::Write;

/// Writes the effective configuration as TOML, secrets redacted.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn cmd_config_show(config: &RippleConfig, out: &mut impl Write) -> Result<()> {
    match &config.source {
        Some(path) => writeln!(out, "# Loaded from {}", path.display()),
        None => writeln!(out, "# No config file found, using defaults"),
    }
    .map_err(write_error)?;
    write!(out, "{}", config.to_toml()?).map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_show_redacts_secrets() {
        let mut config = RippleConfig::default();
        config.issues.token = Some(SecretString::from("ghp_supersecret"));
        let mut out = Vec::new();
        cmd_config_show(&config, &mut out).expect("show");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("# No config file found"));
        assert!(!text.contains("ghp_supersecret"));
        assert!(text.contains("REDACTED"));
    }
}
