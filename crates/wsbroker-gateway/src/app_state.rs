//! Shared application state.
//!
//! Owns the config, the broker, and the metrics registry. Cheap to clone; every
//! connection task and ops handler holds one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::broker::Broker;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::obs::BrokerMetrics;
use crate::transport::session::SessionOptions;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    broker: Arc<Broker>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<BrokerMetrics>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    session_opts: SessionOptions,
    draining: AtomicBool,
}

impl AppState {
    pub fn new(cfg: GatewayConfig) -> Self {
        let broker = Arc::new(Broker::from_config(&cfg.broker));
        let metrics = Arc::new(BrokerMetrics::default());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&broker), Arc::clone(&metrics)));
        let session_opts = SessionOptions::from_config(&cfg.session);

        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                session_opts,
                draining: AtomicBool::new(false),
            }),
            broker,
            dispatcher,
            metrics,
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn session_opts(&self) -> &SessionOptions {
        &self.inner.session_opts
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }

    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
        self.metrics.set_draining();
    }

    /// Point-in-time gauges appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("wsbroker_topics", self.broker.topic_count() as u64),
            ("wsbroker_registered_sessions", self.broker.session_count() as u64),
        ]
    }
}
