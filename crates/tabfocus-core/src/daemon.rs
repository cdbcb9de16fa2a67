//! Host run loops: native messaging over stdio, or headless with an
//! in-memory browser. Both also serve the local control socket.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tabfocus_storage::KeyValueStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::browser::{MemoryBrowser, NavigationEvent};
use crate::config::Config;
use crate::error::FocusError;
use crate::ipc::listen;
use crate::native::{read_frame, write_frame, BridgeBrowser, Inbound, Outbound};
use crate::service::FocusService;

fn spawn_ipc(service: &Arc<FocusService>, socket: Option<PathBuf>) -> Option<JoinHandle<()>> {
    let sock_path = socket?;
    let service = service.clone();
    Some(tokio::spawn(async move {
        if let Err(e) = listen(service, &sock_path).await {
            log::error!("IPC listener failed: {e}");
        }
    }))
}

fn cleanup_socket(socket: Option<&PathBuf>) {
    if let Some(path) = socket {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Failed to remove socket {}: {e}", path.display());
            }
        }
    }
}

/// Serve the extension on `reader`/`writer` until the browser closes the
/// port or Ctrl-C.
///
/// UI requests and navigation events are each handled on their own task:
/// an engine operation waits on command replies that only this read loop
/// can deliver.
///
/// # Errors
///
/// Returns an error only if the host cannot start
pub async fn run_native<R, W>(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    mut reader: R,
    mut writer: W,
    socket: Option<PathBuf>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let bridge = Arc::new(BridgeBrowser::new(tx.clone(), config.command_timeout()));
    let service = Arc::new(FocusService::new(
        config,
        store,
        bridge.clone(),
        bridge.clone(),
    ));
    service.hydrate();

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &message).await {
                log::error!("Failed to write to browser: {e}");
                if !matches!(e, FocusError::FrameTooLarge(_)) {
                    break;
                }
            }
        }
    });

    let resume = tokio::spawn({
        let service = service.clone();
        async move { service.resume().await }
    });
    service.start_housekeeping();
    let ipc = spawn_ipc(&service, socket.clone());
    log::info!("Native host started");

    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => match frame {
                Ok(Some(value)) => dispatch(&service, &bridge, &tx, value),
                Ok(None) => {
                    log::info!("Browser closed the native port");
                    break;
                }
                Err(FocusError::Json(e)) => log::warn!("Ignoring malformed frame: {e}"),
                Err(e) => {
                    log::error!("Native port read failed: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    bridge.fail_all();
    resume.abort();
    service.shutdown();
    if let Some(ipc) = ipc {
        ipc.abort();
    }
    cleanup_socket(socket.as_ref());
    write_task.abort();
    log::info!("Native host shut down gracefully.");
    Ok(())
}

fn dispatch(
    service: &Arc<FocusService>,
    bridge: &BridgeBrowser,
    tx: &mpsc::UnboundedSender<Outbound>,
    value: serde_json::Value,
) {
    let inbound = match serde_json::from_value::<Inbound>(value) {
        Ok(inbound) => inbound,
        Err(e) => {
            log::warn!("Ignoring unrecognised message: {e}");
            return;
        }
    };

    match inbound {
        Inbound::Request { id, payload } => {
            let service = service.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let payload = service.handle_value(payload).await;
                if tx.send(Outbound::Response { id, payload }).is_err() {
                    log::warn!("Response {id} dropped, browser port closed");
                }
            });
        }
        Inbound::Navigation { tab_id, url } => {
            let service = service.clone();
            tokio::spawn(async move {
                service.on_navigation(&NavigationEvent { tab_id, url }).await;
            });
        }
        Inbound::Reply {
            id,
            ok,
            result,
            error,
        } => {
            bridge.resolve(id, ok, result, error);
        }
    }
}

/// Run the engines against an in-memory browser, driven only through the
/// control socket. Returns on Ctrl-C.
///
/// # Errors
///
/// Returns an error only if the host cannot start
pub async fn run_headless(
    config: Config,
    store: Arc<dyn KeyValueStore>,
    socket: Option<PathBuf>,
) -> Result<()> {
    let browser = Arc::new(MemoryBrowser::new());
    let service = Arc::new(FocusService::new(
        config,
        store,
        browser.clone(),
        browser,
    ));
    service.hydrate();
    service.resume().await;
    service.start_housekeeping();
    let ipc = spawn_ipc(&service, socket.clone());
    log::info!("Headless host started");

    tokio::signal::ctrl_c().await?;
    log::info!("Received Ctrl-C, shutting down...");

    service.shutdown();
    if let Some(ipc) = ipc {
        ipc.abort();
    }
    cleanup_socket(socket.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{StatusPort, TabHost};
    use serde_json::{json, Value};
    use tabfocus_storage::MemoryStore;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    /// Extension side of the port: runs host commands against a
    /// `MemoryBrowser` and hands back request responses.
    struct FakeExtension {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        browser: Arc<MemoryBrowser>,
    }

    impl FakeExtension {
        async fn send(&mut self, message: Value) {
            write_frame(&mut self.writer, &message).await.unwrap();
        }

        async fn execute(&self, command: &Value) -> Result<Value> {
            let browser = &self.browser;
            Ok(match command["op"].as_str().unwrap() {
                "query_tabs" => serde_json::to_value(browser.query_tabs().await?)?,
                "remove_tab" => {
                    browser.remove_tab(command["tabId"].as_i64().unwrap()).await?;
                    Value::Null
                }
                "create_tab" => {
                    let url = command["url"].as_str().unwrap();
                    json!(browser.create_tab(url, false).await?)
                }
                "update_tab_url" => {
                    let id = command["tabId"].as_i64().unwrap();
                    browser.update_tab_url(id, command["url"].as_str().unwrap()).await?;
                    Value::Null
                }
                "active_tab" => serde_json::to_value(browser.active_tab().await?)?,
                "set_badge" => {
                    browser.set_badge(&serde_json::from_value(command.clone())?).await?;
                    Value::Null
                }
                "notify" => {
                    browser.notify(&serde_json::from_value(command.clone())?).await?;
                    Value::Null
                }
                other => panic!("unexpected op {other}"),
            })
        }

        /// Serve commands until the response to request `id` arrives
        async fn response_to(&mut self, id: u64) -> Value {
            loop {
                let frame = read_frame(&mut self.reader).await.unwrap().unwrap();
                match frame["type"].as_str().unwrap() {
                    "command" => {
                        let reply = match self.execute(&frame["command"]).await {
                            Ok(result) => json!({"type": "reply", "id": frame["id"], "ok": true, "result": result}),
                            Err(e) => json!({"type": "reply", "id": frame["id"], "ok": false, "error": e.to_string()}),
                        };
                        self.send(reply).await;
                    }
                    "response" if frame["id"] == id => return frame["payload"].clone(),
                    _ => {}
                }
            }
        }

        async fn request(&mut self, id: u64, payload: Value) -> Value {
            self.send(json!({"type": "request", "id": id, "payload": payload}))
                .await;
            self.response_to(id).await
        }
    }

    fn start_host(store: Arc<MemoryStore>) -> (FakeExtension, JoinHandle<Result<()>>) {
        let (extension_end, host_end) = duplex(64 * 1024);
        let (host_reader, host_writer) = split(host_end);
        let (reader, writer) = split(extension_end);
        let host = tokio::spawn(run_native(
            Config::default(),
            store,
            host_reader,
            host_writer,
            None,
        ));
        let extension = FakeExtension {
            reader,
            writer,
            browser: Arc::new(MemoryBrowser::new()),
        };
        (extension, host)
    }

    #[tokio::test]
    async fn test_focus_session_over_native_port() {
        let (mut ext, host) = start_host(Arc::new(MemoryStore::new()));
        ext.browser.open_tab("https://a.com/", "A");
        ext.browser.open_tab("https://reddit.com/", "Reddit");
        ext.browser.open_tab("https://old.reddit.com/", "Old Reddit");

        let added = ext
            .request(1, json!({"action": "add_to_blacklist", "site": "reddit.com"}))
            .await;
        assert_eq!(added["success"], true);

        let started = ext.request(2, json!({"action": "start_focus"})).await;
        assert_eq!(started, json!({"success": true}));
        assert_eq!(ext.browser.urls(), vec!["https://a.com/"]);

        let status = ext.request(3, json!({"action": "get_session_status"})).await;
        assert_eq!(status["focusActive"], true);

        ext.request(4, json!({"action": "stop_focus"})).await;
        assert_eq!(ext.browser.urls().len(), 3);
        assert!(ext
            .browser
            .notifications()
            .iter()
            .any(|n| n.message == "Blocked 2 distracting tabs"));

        drop(ext);
        host.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_navigation_redirect_over_native_port() {
        let (mut ext, host) = start_host(Arc::new(MemoryStore::new()));
        let tab = ext.browser.open_tab("https://docs.rs/", "Docs");
        ext.request(1, json!({"action": "add_to_blacklist", "site": "youtube.com"}))
            .await;
        ext.request(2, json!({"action": "start_focus"})).await;

        ext.send(json!({"type": "navigation", "tabId": tab, "url": "https://www.youtube.com/"}))
            .await;
        // Requests are answered in order of completion; the redirect command
        // is served while waiting for this one
        ext.request(3, json!({"action": "get_blacklist"})).await;
        while ext.browser.redirects().is_empty() {
            ext.request(4, json!({"action": "get_session_status"})).await;
        }
        assert_eq!(
            ext.browser.redirects(),
            vec![(tab, "warning.html?site=www.youtube.com".to_string())]
        );

        drop(ext);
        host.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_action_and_garbage() {
        let (mut ext, host) = start_host(Arc::new(MemoryStore::new()));
        ext.send(json!({"type": "bogus"})).await;
        let response = ext.request(9, json!({"action": "hide_tabs"})).await;
        assert_eq!(response["success"], false);

        drop(ext);
        host.await.unwrap().unwrap();
    }
}
