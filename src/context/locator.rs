use std::any::{Any, TypeId, type_name};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use miette::Diagnostic;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::types::ConfigPriority;

/// Errors raised by service resolution and locator configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum LocatorError {
    /// Lookup failed; the message names both the requested type and the
    /// qualifier so miswired registrations are obvious.
    #[error("no such service: {type_name}{}", qualifier.as_deref().map(|q| format!(" (qualifier '{q}')")).unwrap_or_default())]
    #[diagnostic(
        code(pipewright::locator::no_such_service),
        help("Register the manager before launching, or check the qualifier spelling.")
    )]
    NoSuchService {
        type_name: &'static str,
        qualifier: Option<String>,
    },

    /// Initializer dependency cycle detected during `configure()`.
    #[error("initializer dependency cycle involving: {keys}")]
    #[diagnostic(
        code(pipewright::locator::dependency_cycle),
        help("Break the cycle by removing one of the listed depends-on edges.")
    )]
    DependencyCycle { keys: String },

    /// An initializer names a dependency that was never added.
    #[error("unknown dependency '{dependency}' required by initializer '{initializer}'")]
    #[diagnostic(code(pipewright::locator::unknown_dependency))]
    UnknownDependency {
        initializer: String,
        dependency: String,
    },

    /// `configure()` was called a second time.
    #[error("service locator already configured")]
    #[diagnostic(code(pipewright::locator::already_configured))]
    AlreadyConfigured,

    /// An initializer reported a failure.
    #[error("initializer '{initializer}' failed: {message}")]
    #[diagnostic(code(pipewright::locator::init_failed))]
    InitFailed {
        initializer: String,
        message: String,
    },
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct ServiceKey {
    type_id: TypeId,
    qualifier: Option<String>,
}

type InitFn = Box<dyn FnOnce(&ServiceLocator) -> Result<(), LocatorError> + Send>;

struct Initializer {
    name: String,
    priority: ConfigPriority,
    depends_on: Vec<String>,
    run: InitFn,
}

/// Typed registry of managers keyed by `(type, qualifier)`.
///
/// Resolution is O(1) and thread-safe; registration may run concurrently
/// with lookups. The locator owns the managers; contexts borrow it through
/// an `Arc`, so no reference cycles form between the two.
///
/// Configuration is two-phase: add initializers with a [`ConfigPriority`]
/// and optional dependencies, then call [`Self::configure`] exactly once.
/// Dependencies must be acyclic; a cycle fails with a diagnostic naming the
/// involved keys.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use pipewright::context::ServiceLocator;
/// use pipewright::context::EnvironmentStore;
///
/// let locator = ServiceLocator::new();
/// locator.register(Arc::new(EnvironmentStore::new()));
/// let env = locator.get::<EnvironmentStore>().unwrap();
/// env.set("CI", "true");
/// ```
#[derive(Default)]
pub struct ServiceLocator {
    services: RwLock<FxHashMap<ServiceKey, Arc<dyn Any + Send + Sync>>>,
    initializers: Mutex<Vec<Initializer>>,
    configured: AtomicBool,
}

impl ServiceLocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the unqualified instance for `T`, replacing any previous
    /// registration.
    pub fn register<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.insert(None, service);
    }

    /// Register a named instance for `T`.
    pub fn register_named<T: Any + Send + Sync>(&self, qualifier: impl Into<String>, service: Arc<T>) {
        self.insert(Some(qualifier.into()), service);
    }

    /// Resolve the unqualified instance for `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, LocatorError> {
        self.lookup(None)
    }

    /// Resolve a named instance for `T`.
    pub fn get_named<T: Any + Send + Sync>(&self, qualifier: &str) -> Result<Arc<T>, LocatorError> {
        self.lookup(Some(qualifier))
    }

    /// Whether an unqualified instance for `T` is registered.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.get::<T>().is_ok()
    }

    fn insert<T: Any + Send + Sync>(&self, qualifier: Option<String>, service: Arc<T>) {
        let key = ServiceKey {
            type_id: TypeId::of::<T>(),
            qualifier,
        };
        self.services.write().insert(key, service);
    }

    fn lookup<T: Any + Send + Sync>(&self, qualifier: Option<&str>) -> Result<Arc<T>, LocatorError> {
        let key = ServiceKey {
            type_id: TypeId::of::<T>(),
            qualifier: qualifier.map(str::to_string),
        };
        let entry = self.services.read().get(&key).cloned();
        entry
            .and_then(|any| any.downcast::<T>().ok())
            .ok_or_else(|| LocatorError::NoSuchService {
                type_name: type_name::<T>(),
                qualifier: qualifier.map(str::to_string),
            })
    }

    /// Queue an initializer for the configure phase.
    ///
    /// `depends_on` names other initializers that must have run first,
    /// independent of priority.
    pub fn add_initializer(
        &self,
        name: impl Into<String>,
        priority: ConfigPriority,
        depends_on: Vec<String>,
        run: impl FnOnce(&ServiceLocator) -> Result<(), LocatorError> + Send + 'static,
    ) {
        self.initializers.lock().push(Initializer {
            name: name.into(),
            priority,
            depends_on,
            run: Box::new(run),
        });
    }

    /// Run all queued initializers: priority order first, dependency order
    /// within it. Fails fast on cycles, unknown dependencies, or an
    /// initializer error.
    pub fn configure(&self) -> Result<(), LocatorError> {
        if self.configured.swap(true, Ordering::SeqCst) {
            return Err(LocatorError::AlreadyConfigured);
        }
        let mut pending = std::mem::take(&mut *self.initializers.lock());
        pending.sort_by_key(|init| init.priority);
        let ordered = Self::dependency_order(pending)?;
        for init in ordered {
            let name = init.name.clone();
            (init.run)(self).map_err(|err| match err {
                failure @ LocatorError::InitFailed { .. } => failure,
                other => LocatorError::InitFailed {
                    initializer: name,
                    message: other.to_string(),
                },
            })?;
        }
        Ok(())
    }

    /// Kahn's algorithm over the depends-on graph, preserving the incoming
    /// (priority-sorted) order among ready nodes.
    fn dependency_order(pending: Vec<Initializer>) -> Result<Vec<Initializer>, LocatorError> {
        let index: FxHashMap<String, usize> = pending
            .iter()
            .enumerate()
            .map(|(i, init)| (init.name.clone(), i))
            .collect();

        let mut indegree = vec![0usize; pending.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); pending.len()];
        for (i, init) in pending.iter().enumerate() {
            for dep in &init.depends_on {
                let Some(&dep_idx) = index.get(dep) else {
                    return Err(LocatorError::UnknownDependency {
                        initializer: init.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                indegree[i] += 1;
                dependents[dep_idx].push(i);
            }
        }

        let mut order: Vec<usize> = Vec::with_capacity(pending.len());
        let mut ready: Vec<usize> = (0..pending.len()).filter(|&i| indegree[i] == 0).collect();
        while let Some(next) = ready.first().copied() {
            ready.remove(0);
            order.push(next);
            for &dependent in &dependents[next] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push(dependent);
                    ready.sort_unstable();
                }
            }
        }

        if order.len() != pending.len() {
            let stuck: Vec<&str> = pending
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, init)| init.name.as_str())
                .collect();
            return Err(LocatorError::DependencyCycle {
                keys: stuck.join(", "),
            });
        }

        let mut slots: Vec<Option<Initializer>> = pending.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn missing_service_error_names_type() {
        let locator = ServiceLocator::new();
        let err = locator.get::<String>().unwrap_err();
        assert!(err.to_string().contains("String"));
    }

    #[test]
    fn named_and_unnamed_registrations_are_distinct() {
        let locator = ServiceLocator::new();
        locator.register(Arc::new(1u32));
        locator.register_named("alt", Arc::new(2u32));
        assert_eq!(*locator.get::<u32>().unwrap(), 1);
        assert_eq!(*locator.get_named::<u32>("alt").unwrap(), 2);
        assert!(locator.get_named::<u32>("missing").is_err());
    }

    #[test]
    fn configure_orders_by_priority_then_dependencies() {
        let locator = ServiceLocator::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let push = |order: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str| {
            let order = Arc::clone(order);
            move |_: &ServiceLocator| {
                order.lock().push(tag);
                Ok(())
            }
        };
        locator.add_initializer("low", ConfigPriority::Low, vec![], push(&order, "low"));
        locator.add_initializer(
            "high-b",
            ConfigPriority::High,
            vec!["high-a".to_string()],
            push(&order, "high-b"),
        );
        locator.add_initializer("high-a", ConfigPriority::High, vec![], push(&order, "high-a"));
        locator.configure().unwrap();
        assert_eq!(*order.lock(), vec!["high-a", "high-b", "low"]);
    }

    #[test]
    fn dependency_cycle_is_reported_with_keys() {
        let locator = ServiceLocator::new();
        locator.add_initializer("a", ConfigPriority::Normal, vec!["b".into()], |_| Ok(()));
        locator.add_initializer("b", ConfigPriority::Normal, vec!["a".into()], |_| Ok(()));
        let err = locator.configure().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('a') && msg.contains('b'), "got: {msg}");
    }

    #[test]
    fn configure_runs_once() {
        let locator = ServiceLocator::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        locator.add_initializer("only", ConfigPriority::Normal, vec![], move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        locator.configure().unwrap();
        assert!(matches!(
            locator.configure(),
            Err(LocatorError::AlreadyConfigured)
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
