//! Continuation triggers: how a worker starts the next invocation.

use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::worker::WorkerInvocation;
use crate::kernel::traits::WorkerTrigger;

/// POSTs the invocation to a worker endpoint (`{base_url}/worker`) on a
/// detached task. The caller never waits for the response.
#[derive(Clone)]
pub struct HttpWorkerTrigger {
    http_client: Client,
    url: String,
}

impl HttpWorkerTrigger {
    pub fn new(base_url: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            url: format!("{}/worker", base_url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl WorkerTrigger for HttpWorkerTrigger {
    fn trigger(&self, invocation: WorkerInvocation) {
        let request = self.http_client.post(&self.url).json(&invocation);
        let url = self.url.clone();
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %url, "continuation accepted");
                }
                Ok(response) => {
                    warn!(url = %url, status = %response.status(), "continuation rejected");
                }
                Err(e) => warn!(url = %url, error = %e, "continuation request failed"),
            }
        });
    }
}

/// Sends invocations to an in-process loop that runs them one after another.
#[derive(Clone)]
pub struct ChannelTrigger {
    sender: mpsc::UnboundedSender<WorkerInvocation>,
}

impl ChannelTrigger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerInvocation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl WorkerTrigger for ChannelTrigger {
    fn trigger(&self, invocation: WorkerInvocation) {
        if self.sender.send(invocation).is_err() {
            warn!("worker loop has shut down, continuation dropped");
        }
    }
}

/// Drops every continuation. Used by the `drain` binary, which loops itself.
#[derive(Debug, Clone, Default)]
pub struct NoopTrigger;

impl WorkerTrigger for NoopTrigger {
    fn trigger(&self, _invocation: WorkerInvocation) {}
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_channel_trigger_delivers_invocation() {
        let (trigger, mut receiver) = ChannelTrigger::channel();
        let invocation = WorkerInvocation {
            batch_size: Some(3),
            max_runtime_secs: Some(60),
        };
        trigger.trigger(invocation);
        assert_eq!(receiver.recv().await, Some(invocation));
    }

    #[tokio::test]
    async fn test_http_trigger_posts_invocation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/worker"))
            .and(body_json(serde_json::json!({"batch_size": 2})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let trigger = HttpWorkerTrigger::new(&format!("{}/", server.uri()));
        assert_eq!(trigger.url(), format!("{}/worker", server.uri()));

        trigger.trigger(WorkerInvocation {
            batch_size: Some(2),
            max_runtime_secs: None,
        });

        for _ in 0..50 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // MockServer verifies `expect(1)` on drop
    }
}
