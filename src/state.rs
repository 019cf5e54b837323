use std::sync::Arc;

use crate::adapters::{
    Adapters, HmacPaymentVerifier, SaIdVerifier, SchemeAdjudicator, SchemeRegistry,
    ThresholdBiometricVerifier,
};
use crate::config::Config;
use crate::engine::hooks::{AuditHook, NotificationHook, PostCommitHook};
use crate::engine::orchestrator::Orchestrator;
use crate::error::AppError;
use crate::ledger::{ColdChainPolicy, OrderLedger};
use crate::notify::FanOut;
use crate::observability::metrics::Metrics;
use crate::store::{MemoryStore, Store};

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub fanout: Arc<FanOut>,
    pub metrics: Metrics,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: &Config, store: Arc<dyn Store>) -> Result<Self, AppError> {
        let metrics = Metrics::new();
        let fanout = Arc::new(FanOut::new(config.event_buffer_size));

        let registry = match &config.scheme_config_path {
            Some(path) => SchemeRegistry::from_json_file(path)?,
            None => SchemeRegistry::default(),
        };
        let adapters = Adapters {
            payment: Arc::new(HmacPaymentVerifier::new(&config.payment_webhook_secret)),
            adjudication: Arc::new(SchemeAdjudicator::new(registry, config.adapter_latency)),
            biometric: Arc::new(ThresholdBiometricVerifier::new(
                config.biometric_min_length,
                config.adapter_latency,
            )),
            identity: Arc::new(SaIdVerifier::new(config.adapter_latency)),
        };

        let hooks: Vec<Arc<dyn PostCommitHook>> = vec![
            Arc::new(AuditHook::new(store.clone())),
            Arc::new(NotificationHook::new(fanout.clone(), metrics.clone())),
        ];
        let ledger = OrderLedger::new(
            store,
            ColdChainPolicy {
                max_celsius: config.cold_chain_max_celsius,
            },
        );

        Ok(Self {
            orchestrator: Orchestrator::new(
                ledger,
                adapters,
                hooks,
                config.adapter_timeout,
                metrics.clone(),
            ),
            fanout,
            metrics,
            jwt_secret: config.jwt_secret.clone(),
        })
    }
}
