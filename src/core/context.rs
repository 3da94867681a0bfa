//! Scoped tool context - the explicit per-call state handed to tools

use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::event::StateDelta;

// ============================================================================
// ResourceMap - Type-safe container for site resources
// ============================================================================

/// Type-safe container for site resources shared with tools
///
/// Holds things like database pools or document stores that tools need
/// but the model never sees. The map is built once at service start and
/// shared read-only with every tool call.
///
/// # Example
///
/// ```ignore
/// let mut resources = ResourceMap::new();
/// resources.insert(DocumentStore::open("docs")?);
///
/// // Inside a tool
/// let docs = ctx.resource::<DocumentStore>()
///     .ok_or_else(|| anyhow!("document store not configured"))?;
/// ```
#[derive(Default, Clone)]
pub struct ResourceMap {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ResourceMap {
    /// Create a new empty resource map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a resource by type
    ///
    /// If a resource of this type already exists, it will be replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Insert an Arc-wrapped resource by type
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.map.insert(TypeId::of::<T>(), value);
    }

    /// Get a resource by type
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|arc| arc.clone().downcast::<T>().ok())
    }

    /// Check if a resource of the given type exists
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Get the number of resources stored
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the resource map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMap")
            .field("count", &self.map.len())
            .finish()
    }
}

// ============================================================================
// ToolScope - Identity of the caller, shared by all calls in one turn
// ============================================================================

/// Caller identity and site handle for the tool calls of one turn
#[derive(Clone)]
pub struct ToolScope {
    /// Application namespace
    pub app_name: String,

    /// Owning user of the session
    pub user_id: String,

    /// Session the turn belongs to
    pub session_id: String,

    /// Turn being executed
    pub turn_id: String,

    /// Agent that requested the calls
    pub agent: String,

    /// Read-only state snapshot at the time the calls were requested
    pub state: Arc<BTreeMap<String, Value>>,

    /// Site resources
    pub resources: Arc<ResourceMap>,
}

impl fmt::Debug for ToolScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolScope")
            .field("app_name", &self.app_name)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("turn_id", &self.turn_id)
            .field("agent", &self.agent)
            .field("state_keys", &self.state.len())
            .field("resources", &self.resources)
            .finish()
    }
}

// ============================================================================
// ToolContext - Owned by exactly one tool call
// ============================================================================

/// Context passed to a tool for the lifetime of one invocation
///
/// Acquired by the registry right before the call and consumed right after
/// it (even when the tool fails). Writes made through `set_state` are
/// buffered here and only reach the session through the store.
pub struct ToolContext {
    scope: ToolScope,

    /// ID of the call being executed
    pub call_id: String,

    /// Name of the tool being executed
    pub tool_name: String,

    pending: StateDelta,
}

impl ToolContext {
    pub(crate) fn acquire(
        scope: ToolScope,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            pending: StateDelta::new(),
        }
    }

    /// Release the context and return the buffered state writes
    pub(crate) fn release(self) -> StateDelta {
        self.pending
    }

    /// Application namespace of the caller
    pub fn app_name(&self) -> &str {
        &self.scope.app_name
    }

    /// User the session belongs to
    pub fn user_id(&self) -> &str {
        &self.scope.user_id
    }

    /// Session ID of the caller
    pub fn session_id(&self) -> &str {
        &self.scope.session_id
    }

    /// Turn ID of the caller
    pub fn turn_id(&self) -> &str {
        &self.scope.turn_id
    }

    /// Agent that requested this call
    pub fn agent(&self) -> &str {
        &self.scope.agent
    }

    /// Read a state value (own pending writes win over the snapshot)
    pub fn state(&self, key: &str) -> Option<&Value> {
        self.pending.get(key).or_else(|| self.scope.state.get(key))
    }

    /// Buffer a state write
    pub fn set_state(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.pending.insert(key.into(), value.into());
    }

    /// Get a site resource by type
    pub fn resource<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.scope.resources.get::<T>()
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("scope", &self.scope)
            .field("call_id", &self.call_id)
            .field("tool_name", &self.tool_name)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct TestResource {
        value: i32,
    }

    #[derive(Debug)]
    struct AnotherResource {
        name: String,
    }

    fn test_scope() -> ToolScope {
        let mut state = BTreeMap::new();
        state.insert("project".to_string(), json!("atlas"));
        let mut resources = ResourceMap::new();
        resources.insert(TestResource { value: 7 });
        ToolScope {
            app_name: "app".into(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            turn_id: "t1".into(),
            agent: "Coder".into(),
            state: Arc::new(state),
            resources: Arc::new(resources),
        }
    }

    #[test]
    fn test_resource_map_insert_get() {
        let mut resources = ResourceMap::new();

        resources.insert(TestResource { value: 42 });
        resources.insert(AnotherResource {
            name: "test".to_string(),
        });

        assert_eq!(resources.get::<TestResource>().unwrap().value, 42);
        assert_eq!(resources.get::<AnotherResource>().unwrap().name, "test");
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn test_resource_map_replace_and_missing() {
        let mut resources = ResourceMap::new();
        assert!(resources.get::<TestResource>().is_none());
        assert!(!resources.contains::<TestResource>());

        resources.insert(TestResource { value: 1 });
        resources.insert(TestResource { value: 2 });
        assert_eq!(resources.get::<TestResource>().unwrap().value, 2);
    }

    #[test]
    fn test_context_reads_snapshot_and_pending() {
        let mut ctx = ToolContext::acquire(test_scope(), "call-1", "run_query");
        assert_eq!(ctx.session_id(), "s1");
        assert_eq!(ctx.agent(), "Coder");
        assert_eq!(ctx.state("project"), Some(&json!("atlas")));

        ctx.set_state("project", "zeus");
        assert_eq!(ctx.state("project"), Some(&json!("zeus")));
        assert_eq!(ctx.pending_writes(), 1);

        let delta = ctx.release();
        assert_eq!(delta["project"], json!("zeus"));
    }

    #[test]
    fn test_contexts_do_not_share_writes() {
        let scope = test_scope();
        let mut a = ToolContext::acquire(scope.clone(), "a", "t");
        let b = ToolContext::acquire(scope.clone(), "b", "t");

        a.set_state("only_a", 1);
        assert!(b.state("only_a").is_none());
        assert!(scope.state.get("only_a").is_none());
        assert_eq!(a.resource::<TestResource>().unwrap().value, 7);
    }
}
