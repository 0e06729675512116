#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let courier = match find_config_file() {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
            })?;
            toml::from_str(&content)?
        }
        None => courier::Courier::default(),
    };

    courier.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.toml (current working directory)
/// 3. /etc/courier/courier.config.toml (system-wide config)
///
/// No file at all is fine; every setting has a default.
fn find_config_file() -> Option<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
        eprintln!(
            "COURIER_CONFIG points to non-existent file: {}",
            path.display()
        );
        return None;
    }

    [
        std::path::PathBuf::from("./courier.config.toml"),
        std::path::PathBuf::from("/etc/courier/courier.config.toml"),
    ]
    .into_iter()
    .find(|path| path.exists())
}
