//! Gateway - the composition root route handlers talk to
//!
//! Owns the one scheduler, the one response cache and the caching policy
//! for the process. Route handlers describe their upstream request, hand
//! over the work that performs it, and get back either a cached response or
//! a freshly scheduled one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use respcache::{CacheError, CachePolicy, CacheStats, ResponseCache, compute_key};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::events::EventBus;
use crate::scheduler::{Priority, PriorityScheduler, Scheduler, SchedulerStats, TaskError};
use crate::upstream::UpstreamResponse;

/// Errors surfaced to route handlers
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A response and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub response: UpstreamResponse,
    pub cache_hit: bool,
}

/// Combined scheduler and cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayStats {
    pub scheduler: SchedulerStats,
    pub cache: CacheStats,
    pub caching_enabled: bool,
}

pub struct Gateway {
    scheduler: PriorityScheduler,
    cache: ResponseCache<UpstreamResponse>,
    policy: CachePolicy,
}

impl Gateway {
    /// Build the scheduler, cache and policy from configuration
    ///
    /// Must be called from within a Tokio runtime so the cache sweep can start.
    pub fn new(config: &Config) -> Self {
        Self::with_event_bus(config, Arc::new(EventBus::with_default_capacity()))
    }

    pub fn with_event_bus(config: &Config, events: Arc<EventBus>) -> Self {
        debug!("Gateway::new: called");
        Self {
            scheduler: PriorityScheduler::new(Scheduler::with_event_bus(config.scheduler.clone(), events)),
            cache: ResponseCache::new(config.cache.clone()),
            policy: CachePolicy::from_config(&config.cache),
        }
    }

    pub fn scheduler(&self) -> &PriorityScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &ResponseCache<UpstreamResponse> {
        &self.cache
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Serve from cache when possible, otherwise run `work` on the scheduler
    ///
    /// The response is stored when the policy admits it (caching enabled,
    /// 2xx status, within the size limit).
    pub async fn fetch<D, F, Fut>(&self, descriptor: &D, priority: Priority, work: F) -> Result<Fetched, GatewayError>
    where
        D: Serialize + ?Sized,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<UpstreamResponse>> + Send + 'static,
    {
        let key = compute_key(descriptor)?;

        if self.policy.is_enabled()
            && let Some(response) = self.cache.get(&key)
        {
            debug!(%key, "Gateway::fetch: cache hit");
            return Ok(Fetched {
                response,
                cache_hit: true,
            });
        }

        debug!(%key, %priority, "Gateway::fetch: scheduling upstream work");
        let response = self.scheduler.submit_at(priority, work).await?;

        if self.policy.should_store(response.status, response.serialized_len()) {
            self.cache.set(key, response.clone());
        }

        Ok(Fetched {
            response,
            cache_hit: false,
        })
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            scheduler: self.scheduler.stats(),
            cache: self.cache.stats(),
            caching_enabled: self.policy.is_enabled(),
        }
    }

    /// Drain the scheduler for up to `grace`, then destroy the cache
    ///
    /// Returns whether the scheduler drained cleanly.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(?grace, "Gateway::shutdown: called");
        let drained = self.scheduler.shutdown(grace).await;
        self.cache.destroy();
        drained
    }
}
