use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connection::{lock, Connection, EventCallback, ListenerId};
use crate::error::{LinkError, Result};
use crate::registry::{ConnectionRegistry, WeakRegistry};

fn fingerprint<D: Hash + ?Sized>(deps: &D) -> u64 {
    let mut hasher = DefaultHasher::new();
    deps.hash(&mut hasher);
    hasher.finish()
}

struct Binding {
    connection: Arc<Connection>,
    listener: Option<ListenerId>,
    deps: u64,
    callback: EventCallback,
    closed: bool,
}

/// Wraps `callback` so deliveries from a replaced connection are dropped.
///
/// Holds only a weak handle on the registry: the listener lives inside a
/// connection the registry owns.
fn guarded(
    registry: WeakRegistry,
    event: String,
    generation: u64,
    callback: EventCallback,
) -> EventCallback {
    Arc::new(move |data: &Value| {
        if registry.generation() == Some(generation) {
            callback(data);
        } else {
            debug!(event = %event, generation, "dropping delivery from replaced connection");
        }
    })
}

/// Move the listener to `connection`. A closed binding never re-attaches.
fn attach(binding: &mut Binding, event: &str, connection: Arc<Connection>, registry: &WeakRegistry) {
    if binding.closed {
        return;
    }
    if let Some(old) = binding.listener.take() {
        binding.connection.off(event, old);
    }
    let listener = connection.on(
        event,
        guarded(
            registry.clone(),
            event.to_string(),
            connection.generation(),
            Arc::clone(&binding.callback),
        ),
    );
    binding.connection = connection;
    binding.listener = Some(listener);
}

/// A callback bound to one named event on whatever connection is current.
///
/// Replacing the registry's connection moves the listener to the new
/// channel; dropping the subscription removes it.
pub struct Subscription {
    event: String,
    state: Arc<Mutex<Binding>>,
    registry: WeakRegistry,
    rebinder: JoinHandle<()>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("generation", &self.generation())
            .finish()
    }
}

impl Subscription {
    /// Event name this subscription listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Generation of the connection the listener is attached to.
    pub fn generation(&self) -> u64 {
        lock(&self.state).connection.generation()
    }

    /// Swap in a new callback when `deps` changed since the last bind.
    ///
    /// Returns `true` if the subscription was rebound. With unchanged
    /// dependencies the existing callback is kept and `callback` is dropped.
    pub fn update<D, F>(&self, deps: &D, callback: F) -> bool
    where
        D: Hash + ?Sized,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let deps = fingerprint(deps);
        let mut binding = lock(&self.state);
        if binding.deps == deps {
            return false;
        }
        binding.deps = deps;
        binding.callback = Arc::new(callback);
        let connection = self
            .registry
            .current()
            .unwrap_or_else(|| Arc::clone(&binding.connection));
        attach(&mut binding, &self.event, connection, &self.registry);
        true
    }

    /// Remove the listener now rather than on drop.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rebinder.abort();
        let mut binding = lock(&self.state);
        binding.closed = true;
        if let Some(listener) = binding.listener.take() {
            binding.connection.off(&self.event, listener);
        }
    }
}

impl ConnectionRegistry {
    /// Bind `callback` to `event` on the current connection and keep it bound
    /// across connection replacements.
    ///
    /// `deps` plays the role of a dependency list: passing different values
    /// to [`Subscription::update`] later rebinds with the new callback.
    /// Requires a tokio runtime for the rebinding task.
    pub fn subscribe<D, F>(&self, event: impl Into<String>, deps: &D, callback: F) -> Result<Subscription>
    where
        D: Hash + ?Sized,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LinkError::NoRuntime)?;
        let event = event.into();

        let registry = self.downgrade();
        let mut rx = self.watch();
        let connection = Arc::clone(&rx.borrow_and_update());

        let mut binding = Binding {
            connection: Arc::clone(&connection),
            listener: None,
            deps: fingerprint(deps),
            callback: Arc::new(callback),
            closed: false,
        };
        attach(&mut binding, &event, connection, &registry);
        let state = Arc::new(Mutex::new(binding));

        let rebinder = runtime.spawn({
            let state = Arc::clone(&state);
            let registry = registry.clone();
            let event = event.clone();
            async move {
                while rx.changed().await.is_ok() {
                    let next = Arc::clone(&rx.borrow_and_update());
                    let mut binding = lock(&state);
                    if binding.closed {
                        break;
                    }
                    if binding.listener.is_some()
                        && binding.connection.generation() == next.generation()
                    {
                        continue;
                    }
                    debug!(event = %event, generation = next.generation(), "rebinding subscription");
                    attach(&mut binding, &event, next, &registry);
                }
            }
        });

        Ok(Subscription {
            event,
            state,
            registry,
            rebinder,
        })
    }

    /// Like [`subscribe`](Self::subscribe), decoding the payload into `T`
    /// first. Payloads that do not decode are skipped.
    pub fn subscribe_as<T, D, F>(
        &self,
        event: impl Into<String>,
        deps: &D,
        callback: F,
    ) -> Result<Subscription>
    where
        T: DeserializeOwned,
        D: Hash + ?Sized,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event = event.into();
        let name = event.clone();
        self.subscribe(event, deps, move |data: &Value| {
            match serde_json::from_value::<T>(data.clone()) {
                Ok(payload) => callback(payload),
                Err(e) => debug!(event = %name, error = %e, "skipping malformed payload"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    async fn settle<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_subscribe_binds_current_connection() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let sub = registry
            .subscribe("download_start", &(), move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(sub.event(), "download_start");
        assert_eq!(registry.current().listener_count("download_start"), 1);
        registry.current().dispatch("download_start", &json!({"id": "m1"}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(sub);
        assert_eq!(registry.current().listener_count("download_start"), 0);
        registry.current().dispatch("download_start", &json!({"id": "m1"}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rebinds_after_replacement() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let old = registry.current();
        let sub = registry.subscribe("model_load_started", &(), |_| {}).unwrap();

        let new = registry.set_address("http://127.0.0.1:1").unwrap();
        settle(|| new.listener_count("model_load_started") == 1).await;

        assert_eq!(new.listener_count("model_load_started"), 1);
        assert_eq!(old.listener_count("model_load_started"), 0);
        assert_eq!(sub.generation(), new.generation());
    }

    #[tokio::test]
    async fn test_stale_delivery_is_dropped() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let old = registry.current();
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        let sub = registry
            .subscribe("generation_phase", &(), move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        // Grab the old listener before the rebinder removes it.
        let new = registry.set_address("http://127.0.0.1:1").unwrap();
        old.dispatch("generation_phase", &Value::Null);
        settle(|| sub.generation() == new.generation()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        new.dispatch("generation_phase", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_rebinds_only_on_changed_deps() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        let sub = registry
            .subscribe("download_completed", &1u32, move |_| s.lock().unwrap().push("first"))
            .unwrap();

        let s = Arc::clone(&seen);
        assert!(!sub.update(&1u32, move |_| s.lock().unwrap().push("ignored")));
        let s = Arc::clone(&seen);
        assert!(sub.update(&2u32, move |_| s.lock().unwrap().push("second")));

        let conn = registry.current();
        assert_eq!(conn.listener_count("download_completed"), 1);
        conn.dispatch("download_completed", &Value::Null);
        assert_eq!(*seen.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn test_subscribe_as_decodes_payload() {
        #[derive(serde::Deserialize)]
        struct Started {
            id: String,
        }

        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let ids = Arc::new(Mutex::new(Vec::new()));
        let i = Arc::clone(&ids);
        let _sub = registry
            .subscribe_as("download_start", &(), move |p: Started| i.lock().unwrap().push(p.id))
            .unwrap();

        let conn = registry.current();
        conn.dispatch("download_start", &json!({"id": "m1"}));
        conn.dispatch("download_start", &json!({"unexpected": true}));
        assert_eq!(*ids.lock().unwrap(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_binding_does_not_reattach() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        let conn = registry.current();
        let mut binding = Binding {
            connection: Arc::clone(&conn),
            listener: None,
            deps: 0,
            callback: Arc::new(|_| {}),
            closed: true,
        };

        // What a rebinder woken just before drop would do.
        attach(&mut binding, "download_start", Arc::clone(&conn), &registry.downgrade());
        assert!(binding.listener.is_none());
        assert_eq!(conn.listener_count("download_start"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drop_during_replacement_leaves_no_listener() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        for i in 0..200u16 {
            let sub = registry.subscribe("download_start", &(), |_| {}).unwrap();
            let next = registry
                .set_address(&format!("http://127.0.0.1:{}", 1000 + i))
                .unwrap();
            drop(sub);
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert_eq!(next.listener_count("download_start"), 0, "iteration {}", i);
        }
    }

    #[test]
    fn test_subscribe_requires_runtime() {
        let registry = ConnectionRegistry::new(&LinkConfig::default()).unwrap();
        assert!(matches!(
            registry.subscribe("download_start", &(), |_| {}),
            Err(LinkError::NoRuntime)
        ));
    }
}
