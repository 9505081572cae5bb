#![deny(clippy::all)]
#![allow(clippy::must_use_candidate)]

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = find_config_file()?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
    })?;
    let vellum: vellum::controller::Vellum = ron::from_str(&config_content)?;

    vellum.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `VELLUM_CONFIG` environment variable
/// 2. ./vellum.config.ron (current working directory)
/// 3. /etc/vellum/vellum.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("VELLUM_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("VELLUM_CONFIG points to non-existent file: {}", path.display());
    }

    let default_paths = vec![
        std::path::PathBuf::from("./vellum.config.ron"),
        std::path::PathBuf::from("/etc/vellum/vellum.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - VELLUM_CONFIG environment variable\n{paths_tried}"
    )
}
