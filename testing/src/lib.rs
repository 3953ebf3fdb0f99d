//! Backends for the Harbor lifecycle core.
//!
//! Provides [`ResourceProvider`](hb_core::ResourceProvider) implementations:
//! - PostgreSQL (port 5432) via testcontainers and an sqlx pool
//! - Redis (port 6379) via testcontainers and a redis-rs connection manager
//! - an in-process backend with start/stop counters, used by the
//!   workspace's own tests

mod container;
mod memory;
mod postgres;
mod redis;

use std::sync::atomic::{AtomicU32, Ordering};

pub use container::TestcontainersContainer;
pub use memory::{MEMORY_PORT, MemoryConnection, MemoryContainer, MemoryDatabase, MemoryProvider};
pub use postgres::{POSTGRES_PORT, PostgresConnection, PostgresProvider};
pub use self::redis::{REDIS_PORT, RedisConnection, RedisProvider};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}
