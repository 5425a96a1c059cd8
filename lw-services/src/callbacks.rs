//! Ordered callback lists with per-callback failure isolation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

/// Identifies one registered callback so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(Uuid);

impl CallbackToken {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A user callback. Errors and panics are logged, never propagated.
pub type Callback<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Callbacks invoked in registration order.
pub struct CallbackList<T> {
    entries: Vec<(CallbackToken, Callback<T>)>,
}

impl<T> Default for CallbackList<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> CallbackList<T> {
    /// Register a callback.
    pub fn add(&mut self, callback: Callback<T>) -> CallbackToken {
        let token = CallbackToken::new();
        self.entries.push((token, callback));
        token
    }

    /// Remove the callback registered under `token`.
    pub fn remove(&mut self, token: CallbackToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| *t != token);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every callback with `value`. Returns how many succeeded.
    pub fn invoke(&self, label: &str, value: &T) -> usize {
        let mut ok = 0;
        for (token, callback) in &self.entries {
            match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(Ok(())) => ok += 1,
                Ok(Err(e)) => warn!("{label} callback {token:?} failed: {e:#}"),
                Err(_) => error!("{label} callback {token:?} panicked"),
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_invoke_in_order_and_isolate_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut list: CallbackList<u32> = CallbackList::default();

        let s = seen.clone();
        list.add(Arc::new(move |v| {
            s.lock().unwrap().push(("first", *v));
            Ok(())
        }));
        list.add(Arc::new(|_| anyhow::bail!("boom")));
        list.add(Arc::new(|_| panic!("callback panic")));
        let s = seen.clone();
        list.add(Arc::new(move |v| {
            s.lock().unwrap().push(("last", *v));
            Ok(())
        }));

        assert_eq!(list.invoke("test", &5), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 5), ("last", 5)]);
    }

    #[test]
    fn test_remove_by_token() {
        let mut list: CallbackList<()> = CallbackList::default();
        let a = list.add(Arc::new(|_| Ok(())));
        let _b = list.add(Arc::new(|_| Ok(())));
        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.len(), 1);
    }
}
