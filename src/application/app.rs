use crate::config::Settings;
use crate::proxy::{ProxyConfig, ProxyService};
use crate::{Error, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, instrument};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
}

impl Application {
    /// Load settings from `config/` and the environment
    pub fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Ok(Self::from_settings(settings))
    }

    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    /// Proxy service configured for this environment
    pub fn proxy_service(&self) -> ProxyService {
        let service = ProxyService::new(ProxyConfig::default())
            .with_detailed_errors(self.settings.is_development());

        if self.settings.application.cors_enabled {
            service
        } else {
            service.without_cors()
        }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.settings.listen_address();
        let address: SocketAddr = address
            .parse()
            .map_err(|_| Error::InvalidAddress(address.clone()))?;

        Ok(TcpListener::bind(address).await?)
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve the proxy on `listener` until ctrl-c
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            address = %listener.local_addr()?,
            environment = %self.settings.application.environment,
            "Postmaster proxy listening"
        );

        let router = self.proxy_service().into_router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Postmaster proxy stopped");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn settings(environment: &str) -> Settings {
        let dir = TempDir::new().unwrap();
        Settings::load(environment, dir.path()).unwrap()
    }

    #[test]
    fn test_new_falls_back_to_defaults_without_config_files() {
        let app = Application::new().unwrap();
        assert!(!app.settings().application.host.is_empty());
    }

    #[test]
    fn test_detailed_errors_follow_environment() {
        let app = Application::from_settings(settings("development"));
        assert!(app.settings().is_development());

        let app = Application::from_settings(settings("production"));
        assert!(!app.settings().is_development());
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_host() {
        let mut settings = settings("production");
        settings.application.host = "not a host".to_string();

        let result = Application::from_settings(settings).bind().await;

        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_serves_health_on_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Application::from_settings(settings("production"));
        tokio::spawn(app.serve(listener));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("postmaster-proxy"));
    }
}
