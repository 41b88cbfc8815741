//! Channel transport between the interface loop and the host loop.
//!
//! Commands travel as [`Request`]s, each carrying its own `oneshot`
//! responder. Notifications travel the other way over a single ordered
//! stream; the subscription exists from the moment the link is created, so
//! nothing published before the interface starts reading is lost.

use lantern_core::{ClearDataOptions, Command, Notification, Response, TabId, TabInfo};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("host loop has stopped")]
    HostGone,
    #[error("host dropped the request without answering")]
    NoResponse,
}

#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub responder: oneshot::Sender<Response>,
}

impl Request {
    pub fn respond(self, response: Response) {
        if self.responder.send(response).is_err() {
            debug!(command = self.command.name(), "caller went away before the reply");
        }
    }
}

/// Creates a connected client, notification subscription and host endpoint.
pub fn connect() -> (HostClient, Subscription, HostEndpoint) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    (
        HostClient { tx: request_tx },
        Subscription {
            rx: notification_rx,
        },
        HostEndpoint {
            requests: request_rx,
            notifications: notification_tx,
        },
    )
}

#[derive(Debug, Clone)]
pub struct HostClient {
    tx: UnboundedSender<Request>,
}

impl HostClient {
    pub async fn request(&self, command: Command) -> Result<Response, BridgeError> {
        let (responder, reply) = oneshot::channel();
        self.tx
            .send(Request { command, responder })
            .map_err(|_| BridgeError::HostGone)?;
        reply.await.map_err(|_| BridgeError::NoResponse)
    }

    pub async fn create_tab(
        &self,
        tab_id: TabId,
        url: Option<String>,
    ) -> Result<bool, BridgeError> {
        self.request(Command::CreateTab { tab_id, url })
            .await
            .map(Response::into_bool)
    }

    pub async fn navigate_tab(
        &self,
        tab_id: TabId,
        url: impl Into<String>,
    ) -> Result<Option<String>, BridgeError> {
        self.request(Command::NavigateTab {
            tab_id,
            url: url.into(),
        })
        .await
        .map(Response::into_url)
    }

    pub async fn close_tab(&self, tab_id: TabId) -> Result<bool, BridgeError> {
        self.request(Command::CloseTab { tab_id })
            .await
            .map(Response::into_bool)
    }

    pub async fn set_active_tab(&self, tab_id: TabId) -> Result<bool, BridgeError> {
        self.request(Command::SetActiveTab { tab_id })
            .await
            .map(Response::into_bool)
    }

    pub async fn go_back(&self, tab_id: TabId) -> Result<bool, BridgeError> {
        self.request(Command::GoBack { tab_id })
            .await
            .map(Response::into_bool)
    }

    pub async fn go_forward(&self, tab_id: TabId) -> Result<bool, BridgeError> {
        self.request(Command::GoForward { tab_id })
            .await
            .map(Response::into_bool)
    }

    pub async fn refresh_tab(&self, tab_id: TabId) -> Result<bool, BridgeError> {
        self.request(Command::RefreshTab { tab_id })
            .await
            .map(Response::into_bool)
    }

    pub async fn get_tab_info(&self, tab_id: TabId) -> Result<Option<TabInfo>, BridgeError> {
        self.request(Command::GetTabInfo { tab_id })
            .await
            .map(Response::into_tab_info)
    }

    pub async fn clear_browsing_data(
        &self,
        options: ClearDataOptions,
    ) -> Result<bool, BridgeError> {
        self.request(Command::ClearBrowsingData { options })
            .await
            .map(Response::into_bool)
    }

    pub async fn open_external(&self, url: impl Into<String>) -> Result<bool, BridgeError> {
        self.request(Command::OpenExternal { url: url.into() })
            .await
            .map(Response::into_bool)
    }

    pub async fn get_store_value(&self, key: &str) -> Result<Option<Value>, BridgeError> {
        self.request(Command::GetStoreValue {
            key: key.to_owned(),
        })
        .await
        .map(Response::into_value)
    }

    pub async fn set_store_value(&self, key: &str, value: Value) -> Result<bool, BridgeError> {
        self.request(Command::SetStoreValue {
            key: key.to_owned(),
            value,
        })
        .await
        .map(Response::into_bool)
    }

    pub async fn shutdown(&self) -> Result<bool, BridgeError> {
        self.request(Command::Shutdown)
            .await
            .map(Response::into_bool)
    }
}

/// The interface side's single notification stream. Per-tab routing uses
/// [`Notification::tab_id`]; closing tears down delivery for every kind at
/// once.
#[derive(Debug)]
pub struct Subscription {
    rx: UnboundedReceiver<Notification>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<Notification> {
        match self.rx.try_recv() {
            Ok(notification) => Some(notification),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[derive(Debug)]
pub struct HostEndpoint {
    requests: UnboundedReceiver<Request>,
    notifications: UnboundedSender<Notification>,
}

impl HostEndpoint {
    pub fn notifications(&self) -> NotificationSink {
        NotificationSink {
            tx: self.notifications.clone(),
        }
    }

    pub fn into_requests(self) -> UnboundedReceiver<Request> {
        self.requests
    }
}

/// Fire-and-forget publisher; never blocks on the subscriber.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: UnboundedSender<Notification>,
}

impl NotificationSink {
    pub fn publish(&self, notification: Notification) {
        if let Err(error) = self.tx.send(notification) {
            debug!(kind = ?error.0.kind(), "subscription closed, notification discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use lantern_core::{Command, Notification, Response, TabId};

    use super::{connect, BridgeError};

    #[tokio::test]
    async fn requests_are_answered_through_their_responder() {
        let (client, _subscription, endpoint) = connect();
        let mut requests = endpoint.into_requests();

        let server = async {
            let request = requests.recv().await.expect("one request");
            assert_eq!(request.command, Command::CloseTab { tab_id: TabId(4) });
            request.respond(Response::Bool(true));
        };
        let (closed, ()) = tokio::join!(client.close_tab(TabId(4)), server);
        assert_eq!(closed, Ok(true));
    }

    #[tokio::test]
    async fn dropped_host_is_reported() {
        let (client, _subscription, endpoint) = connect();
        drop(endpoint);
        assert_eq!(
            client.set_active_tab(TabId(1)).await,
            Err(BridgeError::HostGone)
        );
    }

    #[tokio::test]
    async fn unanswered_request_is_reported() {
        let (client, _subscription, endpoint) = connect();
        let mut requests = endpoint.into_requests();
        let server = async {
            drop(requests.recv().await);
        };
        let (result, ()) = tokio::join!(client.go_back(TabId(1)), server);
        assert_eq!(result, Err(BridgeError::NoResponse));
    }

    #[tokio::test]
    async fn notifications_published_before_reading_are_kept_in_order() {
        let (_client, mut subscription, endpoint) = connect();
        let sink = endpoint.notifications();
        for is_loading in [true, false] {
            sink.publish(Notification::Loading {
                tab_id: TabId(2),
                is_loading,
            });
        }

        assert_eq!(
            subscription.next().await,
            Some(Notification::Loading {
                tab_id: TabId(2),
                is_loading: true,
            })
        );
        assert_eq!(
            subscription.try_next(),
            Some(Notification::Loading {
                tab_id: TabId(2),
                is_loading: false,
            })
        );
        subscription.close();
        sink.publish(Notification::NewTabRequested {
            url: "https://late.example".to_owned(),
        });
        assert_eq!(subscription.try_next(), None);
    }
}
