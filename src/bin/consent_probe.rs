//! Loads the consent banner for a page the way the widget would and prints what
//! ends up in the document.
//!
//! ```text
//! consent-probe <page-url> [document-cookie] [config-json]
//! ```

use anyhow::Context;
use consent_engine::{
    resolve_config_json, BannerState, ConsentWidget, DefaultCookieJar, Document, ReqwestTransport, WidgetConfig,
    WidgetEvent, WidgetWorker,
};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::LocalSet;
use url::Url;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits until the banner is no longer being checked or fetched.
async fn settle(events: &mut broadcast::Receiver<WidgetEvent>) {
    loop {
        match events.recv().await {
            Ok(WidgetEvent::StateChanged { to, .. }) => {
                if !matches!(to, BannerState::Checking | BannerState::Fetching) {
                    return;
                }
            }
            Ok(WidgetEvent::Warning { message }) => eprintln!("warning: {}", message),
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => log::warn!("consent-probe: missed {} events", n),
            Err(RecvError::Closed) => return,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let page = args
        .next()
        .context("usage: consent-probe <page-url> [document-cookie] [config-json]")?;
    let page_url = Url::parse(&page).with_context(|| format!("invalid page url: {}", page))?;
    let cookie = args.next().unwrap_or_default();
    let config = match args.next() {
        Some(raw) => resolve_config_json(&WidgetConfig::default(), &raw),
        None => WidgetConfig::default(),
    };

    let jar = DefaultCookieJar::from_document_cookie(&page_url, &cookie);
    let widget = ConsentWidget::with_cookie_jar(config, page_url, Document::new(), Box::new(jar));
    let transport = ReqwestTransport::new()?;
    let (worker, handle) = WidgetWorker::new(widget, transport);
    let mut events = handle.subscribe();

    let widget = LocalSet::new()
        .run_until(async move {
            let task = tokio::task::spawn_local(worker.run());
            handle.page_ready().await?;

            if tokio::time::timeout(SETTLE_TIMEOUT, settle(&mut events)).await.is_err() {
                eprintln!("warning: banner did not settle within {:?}", SETTLE_TIMEOUT);
            }

            handle.shutdown();
            Ok::<_, anyhow::Error>(task.await?)
        })
        .await?;

    println!("state:  {}", widget.state());
    println!("cookie: {}", widget.document_cookie());

    let Some(banner) = widget.banner_node() else {
        println!("no banner mounted");
        return Ok(());
    };

    println!("controls:");
    for (node, kind) in widget.controls() {
        let tag = widget.document().tag_name(node).unwrap_or("?");
        println!("  {:<6} {:<10} {:?}", node.to_string(), tag, kind);
    }
    println!();
    println!("{}", widget.document().outer_html(banner));

    Ok(())
}
