//! Where background tasks run.
//!
//! Router health checkers are spawned on the caller's tokio runtime when
//! there is one. Routers built outside any runtime fall back to a shared
//! multi-threaded runtime created on first use.

use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

/// Fallback runtime, initialized once on first use.
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Environment variable overriding the fallback runtime's worker count.
pub const THREADS_ENV: &str = "RWPOOL_RUNTIME_THREADS";

/// Get (or initialize) the fallback runtime.
///
/// Multi-threaded with the default number of worker threads unless
/// `RWPOOL_RUNTIME_THREADS` holds a positive integer.
pub fn get_runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();

        if let Some(n) = std::env::var(THREADS_ENV)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            builder.worker_threads(n);
        }

        match builder.thread_name("rwpool-rt").build() {
            Ok(rt) => rt,
            // OnceLock::get_or_init can't fail; a runtime that cannot start
            // (e.g. thread limit reached) is unrecoverable.
            Err(e) => panic!("rwpool: failed to create tokio runtime: {e}"),
        }
    })
}

/// Spawn a future on the current runtime, or the fallback one outside tokio.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => handle.spawn(future),
        Err(_) => get_runtime().spawn(future),
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_is_same_instance() {
        let rt1 = get_runtime();
        let rt2 = get_runtime();
        assert!(std::ptr::eq(rt1, rt2));
    }

    #[test]
    fn spawn_outside_runtime_uses_fallback() {
        let handle = spawn(async { 123 });
        let result = get_runtime().block_on(handle).unwrap();
        assert_eq!(result, 123);
    }

    #[tokio::test]
    async fn spawn_inside_runtime_uses_current() {
        // current_thread test runtime: the task runs on this very thread.
        let outer = std::thread::current().id();
        let inner = spawn(async { std::thread::current().id() }).await.unwrap();
        assert_eq!(outer, inner);
    }

    #[test]
    fn fallback_supports_timers() {
        get_runtime().block_on(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        });
    }
}
