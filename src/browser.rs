use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::{debug, info};

/// Obtain a browser session: connect to an already-running Chrome via CDP,
/// or launch a headless one.
///
/// For connect mode, Chrome must be started with
/// `--remote-debugging-port=<port>`, e.g.:
///   google-chrome --remote-debugging-port=9222
pub async fn session(launch: bool, port: u16) -> Result<Browser> {
    if launch {
        info!("launching headless Chrome");
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome. Is Chrome/Chromium installed?")?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });
        info!("headless Chrome launched");
        Ok(browser)
    } else {
        let url = format!("http://127.0.0.1:{port}");
        info!(port = port, "connecting to Chrome via CDP");
        let (browser, mut handler) = Browser::connect(&url)
            .await
            .with_context(|| format!("Failed to connect to Chrome on port {port}. Is Chrome running with --remote-debugging-port={port}?"))?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });
        info!(port = port, "connected to Chrome");
        Ok(browser)
    }
}

/// Open the target page and wait for its initial navigation. The returned
/// page stays live for the fill and auto-load operations.
pub async fn open(browser: &Browser, url: &str) -> Result<Page> {
    debug!(url = %url, "opening target page");
    let page = browser
        .new_page(url)
        .await
        .with_context(|| format!("Failed to navigate to {url}"))?;
    page.wait_for_navigation().await.ok();

    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());
    debug!(final_url = %final_url, "target page ready");
    Ok(page)
}
