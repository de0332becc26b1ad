//! Tunables recognized by the engine, deserializable from a host's config
//! file/environment the way the teacher's `NewSyncPair` is a plain `serde`
//! input struct distinct from the runtime type it configures.

use serde::{Deserialize, Serialize};

/// Executor configuration (spec §6), defaults `{2, 2, 500, 30000, 200, 5}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_uploads: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_concurrent() -> usize {
    2
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter_ms() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    5
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: default_max_concurrent(),
            max_concurrent_downloads: default_max_concurrent(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
        }
    }
}
