//! `memloop config`: configuration management commands.

use super::load_config;
use memloop_config::AppConfig;

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run `memloop config init`.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Add your API key to {} (or set ANTHROPIC_API_KEY)", config_path.display());
    println!("  2. Run: memloop chat");
    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", render(&config)?);
    Ok(())
}

/// The configuration as TOML, with the API key masked.
pub fn render(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&shown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_never_printed() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-ant-secret".into());
        let out = render(&config).unwrap();
        assert!(!out.contains("sk-ant-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn rendered_config_parses_back() {
        let out = render(&AppConfig::default()).unwrap();
        let parsed: AppConfig = toml::from_str(&out).unwrap();
        assert_eq!(parsed.agent.max_iterations, AppConfig::default().agent.max_iterations);
    }
}
