use std::sync::Arc;
use std::time::Instant;

use wsbroker_core::error::WsBrokerError;
use wsbroker_core::protocol::command::{Command, Operation};

use crate::broker::Broker;
use crate::obs::BrokerMetrics;
use crate::transport::session::SessionId;

/// Routes parsed commands to the broker and renders the reply text sent back
/// to the issuing session.
pub struct Dispatcher {
    broker: Arc<Broker>,
    metrics: Arc<BrokerMetrics>,
}

impl Dispatcher {
    pub fn new(broker: Arc<Broker>, metrics: Arc<BrokerMetrics>) -> Self {
        Self { broker, metrics }
    }

    /// Parse a data frame payload and run it. Always yields a reply.
    pub async fn dispatch_payload(&self, session: SessionId, payload: &[u8]) -> String {
        match Command::parse(payload) {
            Ok(cmd) => self.dispatch(session, cmd).await,
            Err(e) => {
                self.metrics
                    .commands
                    .inc(&[("op", "unknown"), ("result", e.client_code().as_str())]);
                tracing::debug!(session_id = session, error = %e, "command rejected");
                parse_error_reply(&e)
            }
        }
    }

    pub async fn dispatch(&self, session: SessionId, cmd: Command) -> String {
        let topic = cmd.topic.as_str();
        let (result, reply) = match cmd.operation {
            Operation::Subscribe => {
                if self.broker.subscribe(topic, session) {
                    ("ok", format!("Subscribed to topic: {topic}"))
                } else {
                    ("duplicate", format!("Already subscribed to topic: {topic}"))
                }
            }
            Operation::Unsubscribe => match self.broker.unsubscribe(topic, session) {
                Ok(()) => ("ok", format!("Unsubscribed from topic: {topic}")),
                Err(e) => (
                    e.client_code().as_str(),
                    format!("Error unsubscribing from topic {topic}: {e}"),
                ),
            },
            Operation::Publish => {
                let started = Instant::now();
                let res = self.broker.publish(topic, &cmd.message).await;
                self.metrics.publish_duration.observe(&[], started.elapsed());
                match res {
                    Ok(report) => {
                        self.metrics
                            .deliveries
                            .add(&[("result", "delivered")], report.delivered as u64);
                        self.metrics
                            .deliveries
                            .add(&[("result", "failed")], report.failed as u64);
                        self.metrics
                            .deliveries
                            .add(&[("result", "evicted")], report.evicted as u64);
                        ("ok", format!("Published to topic: {topic}"))
                    }
                    Err(e) => (
                        e.client_code().as_str(),
                        format!("Error publishing to topic {topic}: {e}"),
                    ),
                }
            }
        };

        self.metrics
            .commands
            .inc(&[("op", cmd.operation.as_str()), ("result", result)]);
        reply
    }
}

pub fn parse_error_reply(err: &WsBrokerError) -> String {
    format!("Error parsing command: {err}")
}
