use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::auth::Identity;
use crate::cache::policy;
use crate::error::FetchError;

pub type FetchFuture = BoxFuture<'static, Result<Value, FetchError>>;

/// Shared, re-invocable remote fetch.
pub type FetchFn = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// One unit of bulk loading: which remote action to call and where its
/// result lives in the cache.
#[derive(Clone)]
pub struct SyncTask {
    pub name: String,
    pub category: String,
    pub action: String,
    pub params: Value,
    fetch: FetchFn,
}

impl SyncTask {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        category: impl Into<String>,
        action: impl Into<String>,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            category: category.into(),
            action: action.into(),
            params: Value::Object(Default::default()),
            fetch: Arc::new(move || fetch().boxed()),
        }
    }

    /// Task filed under the category the policy table assigns to `action`.
    pub fn for_action<F, Fut>(name: impl Into<String>, action: &str, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        Self::new(name, policy::category_for(action), action, fetch)
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn cache_key(&self) -> String {
        policy::derive_key(&self.category, &self.action, &self.params)
    }

    pub fn fetch(&self) -> FetchFuture {
        (self.fetch)()
    }
}

impl fmt::Debug for SyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTask")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("action", &self.action)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Decides which tasks make up a full load for an identity.
pub trait TaskPlanner: Send + Sync {
    fn plan(&self, identity: &Identity) -> Vec<SyncTask>;
}

impl<F> TaskPlanner for F
where
    F: Fn(&Identity) -> Vec<SyncTask> + Send + Sync,
{
    fn plan(&self, identity: &Identity) -> Vec<SyncTask> {
        self(identity)
    }
}
