//! Delivery engine configuration
//!
//! Every section has serde defaults, so an empty (or missing) configuration
//! file yields the documented behavior: 3 workers, 5 starts per 10 second
//! window, 3 attempts with a 2 second backoff base.

use serde::Deserialize;

use crate::{
    queue::{RetentionPolicy, RetryPolicy},
    worker::PoolConfig,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub retention: RetentionPolicy,
}
