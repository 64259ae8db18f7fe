//! `actormesh config`: print the effective configuration.

use actormesh_types::config::MeshConfig;

pub fn run(config: &MeshConfig) -> Result<(), String> {
    print!("{}", render(config)?);
    Ok(())
}

fn render(config: &MeshConfig) -> Result<String, String> {
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;
    toml::to_string_pretty(config).map_err(|e| format!("Failed to render config: {e}"))
}
