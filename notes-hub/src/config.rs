use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use notes_hub_core::{AnalyticsConfig, NotesConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Serve a directory of markdown notes over HTTP, with access analytics.
#[derive(Parser, Debug, Clone)]
#[command(name = "notes-hub")]
#[command(about = "Read-only markdown notes server with access analytics")]
pub struct Cli {
    /// Listen address
    #[arg(long, env = "NOTES_HUB_ADDR", default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,

    /// Root directory of the note tree
    #[arg(long, env = "NOTES_DIR", default_value = "notes")]
    pub notes_dir: PathBuf,

    /// Directory holding the analytics database
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Allowed CORS origins, comma separated; `*` allows any
    #[arg(long = "cors-origin", env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Upper bound on one search request, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub search_timeout_ms: u64,
}

impl Cli {
    pub fn notes_config(&self) -> NotesConfig {
        NotesConfig::new(&self.notes_dir)
    }

    pub fn analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig::new(self.data_dir.join("analytics.db"))
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o.trim() == "*")
    }

    /// Read-only CORS policy for the configured origins.
    pub fn cors_layer(&self) -> anyhow::Result<CorsLayer> {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any);
        if self.allows_any_origin() {
            return Ok(layer.allow_origin(Any));
        }
        let origins = self
            .cors_origins
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin {:?}", o)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(layer.allow_origin(AllowOrigin::list(origins)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "notes-hub",
            "--addr",
            "0.0.0.0:9000",
            "--notes-dir",
            "/srv/notes",
            "--data-dir",
            "/var/lib/notes-hub",
            "--cors-origin",
            "http://a.test,http://b.test",
            "--search-timeout-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(cli.addr.port(), 9000);
        assert_eq!(cli.notes_config().notes_dir, PathBuf::from("/srv/notes"));
        assert_eq!(
            cli.analytics_config().database_path,
            PathBuf::from("/var/lib/notes-hub/analytics.db")
        );
        assert_eq!(cli.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!cli.allows_any_origin());
        assert_eq!(cli.search_timeout(), Duration::from_millis(250));
        assert!(cli.cors_layer().is_ok());
    }

    #[test]
    fn bad_origin_is_reported() {
        let cli = Cli::try_parse_from(["notes-hub", "--cors-origin", "http://bad\nhost"]).unwrap();
        assert!(cli.cors_layer().is_err());
    }
}
