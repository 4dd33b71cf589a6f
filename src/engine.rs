//! Engine construction.
//!
//! An [`Engine`] owns everything that is process-wide and read-only after
//! startup: the validated [`EngineConfig`], the shared worker pool every
//! decode/encode runs on, the RAW [`DecoderChain`] and the bounded RAW
//! decode cache. The four public operations live next to their logic:
//!
//! | Operation | Module |
//! |---|---|
//! | [`Engine::compress`] | [`pipeline`](crate::pipeline) |
//! | [`Engine::compress_to_target_size`] | [`solver`](crate::solver) |
//! | [`Engine::assess_quality`] | [`metrics`](crate::metrics) |
//! | [`Engine::analyze`] | [`analyze`](crate::analyze) |
//!
//! Requests hold no engine state, so one `Engine` can serve any number of
//! concurrent callers.

use crate::cache::DecodeCache;
use crate::config::{EngineConfig, effective_workers};
use crate::error::{EngineError, Result};
use crate::raw::DecoderChain;
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::{debug, error};

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) pool: ThreadPool,
    pub(crate) decoders: Arc<DecoderChain>,
    pub(crate) cache: Arc<DecodeCache>,
}

impl Engine {
    /// Build an engine with the standard RAW chain.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let chain = DecoderChain::standard(&config.raw);
        Self::with_decoder_chain(config, chain)
    }

    /// Build an engine with an explicit RAW chain (tests, embedders that
    /// ship their own backends).
    pub fn with_decoder_chain(config: EngineConfig, chain: DecoderChain) -> Result<Self> {
        config.validate()?;
        let workers = effective_workers(&config.codec);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("squish-worker-{i}"))
            .panic_handler(|_| error!("codec worker panicked; request will fail"))
            .build()
            .map_err(|e| EngineError::conversion("engine", format!("worker pool: {e}")))?;
        debug!(
            workers,
            encoder_threads = config.codec.threads,
            cache_items = config.codec.cache_items,
            raw_backends = ?chain.names(),
            "engine ready"
        );
        Ok(Self {
            cache: Arc::new(DecodeCache::new(config.codec.cache_items)),
            decoders: Arc::new(chain),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Names of the RAW backends, in the order they are tried.
    pub fn raw_backends(&self) -> Vec<&str> {
        self.decoders.names()
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}
