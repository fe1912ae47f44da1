// ----- standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
// ----- extra library imports
use cashu::MintUrl;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
// ----- local imports
use crate::error::{Error, Result};

// ----- end imports

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

///////////////////////////////////////////// SubscriptionKind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Bolt11MintQuote,
    Bolt11MeltQuote,
    ProofState,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Bolt11MintQuote => "bolt11_mint_quote",
            SubscriptionKind::Bolt11MeltQuote => "bolt11_melt_quote",
            SubscriptionKind::ProofState => "proof_state",
        }
    }
}

///////////////////////////////////////////// JSON-RPC frames
#[derive(Debug, Serialize)]
struct WsRequest<P: Serialize> {
    jsonrpc: &'static str,
    method: &'static str,
    params: P,
    id: u64,
}

#[derive(Debug, Serialize)]
struct SubscribeParams {
    kind: &'static str,
    #[serde(rename = "subId")]
    sub_id: String,
    filters: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UnsubscribeParams {
    #[serde(rename = "subId")]
    sub_id: String,
}

#[derive(Debug, Deserialize)]
struct WsNotification {
    params: NotificationParams,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    #[serde(rename = "subId")]
    sub_id: String,
    payload: Value,
}

/// `state` field shared by quote and proof-state notification payloads
pub fn payload_state(payload: &Value) -> Option<String> {
    payload
        .get("state")
        .and_then(|s| s.as_str())
        .map(str::to_string)
}

fn ws_endpoint(mint: &MintUrl) -> Result<String> {
    let base = mint.to_string();
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/v1/ws", rest.trim_end_matches('/')))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/v1/ws", rest.trim_end_matches('/')))
    } else {
        Err(Error::WebSocket(format!("unsupported mint url: {base}")))
    }
}

///////////////////////////////////////////// Subscription
/// Live NUT-17 subscription. `next()` yields notification payloads;
/// `unsubscribe()` sends the JSON-RPC unsubscribe and tears the socket down.
/// Dropping the handle closes the connection without the farewell frame.
pub struct Subscription {
    pub sub_id: String,
    rx: mpsc::Receiver<Value>,
    close: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    pub async fn unsubscribe(mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

///////////////////////////////////////////// subscribe
/// Opens `wss://…/v1/ws` on the mint and subscribes `filters` under a fresh
/// subscription id. Errors here mean no websocket; callers fall back to the
/// polling work queue.
pub async fn subscribe(
    mint: &MintUrl,
    kind: SubscriptionKind,
    filters: Vec<String>,
) -> Result<Subscription> {
    let endpoint = ws_endpoint(mint)?;
    let (mut socket, _) = connect_async(endpoint.clone())
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;

    let sub_id = Uuid::new_v4().to_string();
    let request = WsRequest {
        jsonrpc: "2.0",
        method: "subscribe",
        params: SubscribeParams {
            kind: kind.as_str(),
            sub_id: sub_id.clone(),
            filters,
        },
        id: REQUEST_ID.fetch_add(1, Ordering::SeqCst),
    };
    let frame = serde_json::to_string(&request)?;
    socket
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    tracing::debug!("subscribed {} on {endpoint}", request.params.sub_id);

    let (tx, rx) = mpsc::channel(16);
    let (close_tx, mut close_rx) = oneshot::channel::<()>();
    let task_sub_id = sub_id.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                incoming = socket.next() => {
                    let Some(Ok(message)) = incoming else {
                        break;
                    };
                    let Ok(text) = message.into_text() else {
                        continue;
                    };
                    let Ok(notification) = serde_json::from_str::<WsNotification>(&text) else {
                        continue;
                    };
                    if notification.params.sub_id != task_sub_id {
                        continue;
                    }
                    if tx.send(notification.params.payload).await.is_err() {
                        break;
                    }
                }
                _ = &mut close_rx => {
                    let request = WsRequest {
                        jsonrpc: "2.0",
                        method: "unsubscribe",
                        params: UnsubscribeParams { sub_id: task_sub_id.clone() },
                        id: REQUEST_ID.fetch_add(1, Ordering::SeqCst),
                    };
                    if let Ok(frame) = serde_json::to_string(&request) {
                        let _ = socket.send(Message::Text(frame.into())).await;
                    }
                    let _ = socket.close(None).await;
                    break;
                }
            }
        }
    });

    Ok(Subscription {
        sub_id,
        rx,
        close: Some(close_tx),
        task,
    })
}
