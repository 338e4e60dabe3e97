use anyhow::{Context, Result};
use quickdsm_core::api::{INFO_API, INFO_PATH};
use quickdsm_core::config::{default_config_path, load_config};
use quickdsm_core::quickconnect::{HttpDiscovery, QuickConnect};
use quickdsm_core::{
    ApiRequest, HttpTransport, Released, RequestOptions, RequestProxy, SessionManager, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Connection check: resolve (optionally), log in, list the APIs the session
/// can see, log out.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&path)?;
    let mut settings = config.settings.clone();

    if let Some(id) = &config.quick_connect_id {
        let resolver = QuickConnect::new(Arc::new(HttpDiscovery::new()), config.client.clone());
        let address = resolver
            .resolve(id, config.protocol, config.tunnel)
            .await
            .with_context(|| format!("failed to resolve QuickConnect id {}", id))?;
        let base_url = address.base_url(config.protocol);
        println!("{} resolved to {} ({:?})", id, base_url, address.kind);
        settings.base_url = Some(base_url);
    }

    let transport = Arc::new(HttpTransport::new(config.client.request_timeout()));
    let sessions = SessionManager::new(transport.clone());
    sessions.update_settings(settings);

    let options = RequestOptions::default();
    let session = sessions
        .acquire_session(&options)
        .await
        .context("login failed")?;
    if session.is_legacy_login {
        println!("Logged in with legacy login; the device will also set session cookies");
    } else {
        println!("Logged in");
    }

    let proxy = RequestProxy::new(sessions.clone());
    let apis = proxy
        .call(|sid| {
            let transport = transport.clone();
            let base_url = sessions.base_url().unwrap_or_default();
            let request = ApiRequest::new(INFO_PATH, INFO_API, 1, "query")
                .param("query", "ALL")
                .sid(&sid);
            async move { transport.get(&base_url, &request).await }
        })
        .await
        .context("API query failed")?;
    let count = apis.as_object().map(|o| o.len()).unwrap_or(0);
    println!("{} APIs available", count);

    match sessions.release_session(&options).await {
        Ok(Released::LoggedOut) => println!("Logged out"),
        Ok(Released::NotLoggedIn) => {}
        Err(e) => log::warn!("Logout failed: {}", e),
    }
    Ok(())
}
