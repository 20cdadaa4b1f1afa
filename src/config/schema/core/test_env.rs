use std::sync::{Mutex, MutexGuard, PoisonError};

/// Variables read by `apply_env_overrides`.
const OVERRIDE_VARS: [&str; 6] = [
    "MEMORIA_API_KEY",
    "OPENAI_API_KEY",
    "MEMORIA_WORKSPACE",
    "MEMORIA_VECTOR_BACKEND",
    "MEMORIA_EMBEDDING_PROVIDER",
    "MEMORIA_LOG_LEVEL",
];

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes env-reading tests and starts each one with every override
/// variable cleared. Prior values come back on drop.
pub(super) struct ScopedEnv {
    saved: Vec<(&'static str, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    pub(super) fn clean() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = OVERRIDE_VARS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect();
        for key in OVERRIDE_VARS {
            // SAFETY: ENV_LOCK is held for the lifetime of this value.
            unsafe { std::env::remove_var(key) };
        }
        Self { saved, _lock: lock }
    }

    pub(super) fn set(&mut self, key: &'static str, value: &str) -> &mut Self {
        assert!(
            OVERRIDE_VARS.contains(&key),
            "{key} is not restored by ScopedEnv"
        );
        // SAFETY: ENV_LOCK is held for the lifetime of this value.
        unsafe { std::env::set_var(key, value) };
        self
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            // SAFETY: still holding ENV_LOCK; it is released after this body.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
