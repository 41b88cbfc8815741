use lantern_core::{Command, Response};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::bridge::{HostEndpoint, Request};
use crate::host::{Bounds, RenderBackend, SurfaceSignal};
use crate::persistence::KeyValueStore;
use crate::views::ViewManager;

/// Host event loop: serves interface commands one at a time, in arrival
/// order, and forwards surface signals between them.
pub struct HostServer<B: RenderBackend> {
    views: ViewManager<B>,
    store: Box<dyn KeyValueStore>,
    requests: UnboundedReceiver<Request>,
    signals: UnboundedReceiver<SurfaceSignal>,
}

impl<B: RenderBackend> HostServer<B> {
    pub fn new(
        backend: B,
        store: Box<dyn KeyValueStore>,
        endpoint: HostEndpoint,
        bounds: Bounds,
    ) -> Self {
        let (views, signals) = ViewManager::new(backend, endpoint.notifications(), bounds);
        Self {
            views,
            store,
            requests: endpoint.into_requests(),
            signals,
        }
    }

    pub async fn run(mut self) {
        info!("host loop started");
        loop {
            tokio::select! {
                biased;
                Some(signal) = self.signals.recv() => self.views.handle_signal(signal),
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        info!("interface link closed");
                        self.shutdown().await;
                        break;
                    };
                    let stop = request.command == Command::Shutdown;
                    let response = self.serve(&request.command).await;
                    request.respond(response);
                    if stop {
                        break;
                    }
                }
            }
        }
        info!("host loop stopped");
    }

    /// Every command gets exactly one response; failures become the
    /// command's negative value.
    pub async fn serve(&mut self, command: &Command) -> Response {
        debug!(command = command.name(), "serving");
        match command {
            Command::CreateTab { tab_id, url } => {
                Response::Bool(self.views.create_or_focus(*tab_id, url.as_deref()).await)
            }
            Command::NavigateTab { tab_id, url } => {
                Response::Url(self.views.navigate(*tab_id, url).await)
            }
            Command::CloseTab { tab_id } => Response::Bool(self.views.close(*tab_id)),
            Command::SetActiveTab { tab_id } => Response::Bool(self.views.activate(*tab_id)),
            Command::GoBack { tab_id } => Response::Bool(self.views.back(*tab_id)),
            Command::GoForward { tab_id } => Response::Bool(self.views.forward(*tab_id)),
            Command::RefreshTab { tab_id } => Response::Bool(self.views.reload(*tab_id)),
            Command::GetTabInfo { tab_id } => Response::TabInfo(self.views.query_state(*tab_id)),
            Command::ClearBrowsingData { options } => {
                Response::Bool(self.views.clear_data(*options).await)
            }
            Command::OpenExternal { url } => Response::Bool(self.views.open_external(url).await),
            Command::GetStoreValue { key } => match self.store.get(key).await {
                Ok(value) => Response::Value(value),
                Err(error) => {
                    warn!(%key, %error, "store read failed");
                    Response::Value(None)
                }
            },
            Command::SetStoreValue { key, value } => {
                match self.store.set(key, value.clone()).await {
                    Ok(()) => Response::Bool(true),
                    Err(error) => {
                        warn!(%key, %error, "store write failed");
                        Response::Bool(false)
                    }
                }
            }
            Command::Shutdown => Response::Bool(self.shutdown().await),
        }
    }

    async fn shutdown(&mut self) -> bool {
        let closed = self.views.shutdown();
        info!(closed, "closed all surfaces");
        match self.store.flush().await {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "store flush failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lantern_core::{ClearDataOptions, Notification, TabId};
    use serde_json::json;

    use super::HostServer;
    use crate::bridge;
    use crate::host::{BackendCall, Bounds, RecordingBackend};
    use crate::persistence::MemoryStore;

    fn server(
        backend: &RecordingBackend,
    ) -> (
        HostServer<RecordingBackend>,
        bridge::HostClient,
        bridge::Subscription,
    ) {
        let (client, subscription, endpoint) = bridge::connect();
        let server = HostServer::new(
            backend.clone(),
            Box::new(MemoryStore::default()),
            endpoint,
            Bounds::default(),
        );
        (server, client, subscription)
    }

    #[tokio::test]
    async fn commands_are_served_until_shutdown() {
        let backend = RecordingBackend::default();
        let (server, client, mut subscription) = server(&backend);

        let interface = async {
            assert_eq!(
                client
                    .create_tab(TabId(1), Some("https://a.example".to_owned()))
                    .await,
                Ok(true)
            );
            assert_eq!(client.set_active_tab(TabId(1)).await, Ok(true));
            assert_eq!(
                client.navigate_tab(TabId(1), "https://b.example").await,
                Ok(Some("https://b.example".to_owned()))
            );
            let info = client
                .get_tab_info(TabId(1))
                .await
                .expect("host alive")
                .expect("surface exists");
            assert!(info.can_go_back);
            assert_eq!(client.get_tab_info(TabId(2)).await, Ok(None));
            assert_eq!(client.close_tab(TabId(2)).await, Ok(false));
            assert_eq!(
                client
                    .clear_browsing_data(ClearDataOptions::history_only())
                    .await,
                Ok(true)
            );
            assert_eq!(client.shutdown().await, Ok(true));
        };
        tokio::join!(server.run(), interface);

        assert!(backend.live_surfaces().is_empty(), "shutdown closes surfaces");
        assert!(backend.calls().contains(&BackendCall::Destroyed { tab_id: TabId(1) }));

        let mut urls = Vec::new();
        while let Some(notification) = subscription.try_next() {
            if let Notification::UrlUpdated { url, .. } = notification {
                urls.push(url);
            }
        }
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[tokio::test]
    async fn store_values_round_trip_through_commands() {
        let backend = RecordingBackend::default();
        let (server, client, _subscription) = server(&backend);

        let interface = async {
            assert_eq!(client.get_store_value("settings").await, Ok(None));
            assert_eq!(
                client
                    .set_store_value("settings", json!({"theme": "dark"}))
                    .await,
                Ok(true)
            );
            assert_eq!(
                client.get_store_value("settings").await,
                Ok(Some(json!({"theme": "dark"})))
            );
            drop(client);
        };
        tokio::join!(server.run(), interface);
    }

    #[tokio::test]
    async fn closed_link_still_closes_surfaces() {
        let backend = RecordingBackend::default();
        let (server, client, _subscription) = server(&backend);

        let interface = async move {
            client
                .create_tab(TabId(5), Some("https://a.example".to_owned()))
                .await
                .expect("host alive");
        };
        tokio::join!(server.run(), interface);
        assert!(backend.live_surfaces().is_empty());
    }
}
