//! VirtualService CRUD with optimistic concurrency
//!
//! Production code uses `KubeVirtualServiceClient`, a thin wrapper over
//! `kube::Api<VirtualService>`. Tests use `MockVirtualServiceClient`, which keeps
//! objects in memory, versions every write and can simulate competing writers.

use crate::crd::virtual_service::VirtualService;
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("VirtualService not found")]
    NotFound,

    #[error("VirtualService was modified concurrently (resourceVersion mismatch)")]
    Conflict,

    #[error("VirtualService already exists")]
    AlreadyExists,

    #[error("VirtualService is missing metadata.{0}")]
    MissingMetadata(&'static str),

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

impl ClientError {
    /// Errors that a fresh read-modify-write cycle can resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict | ClientError::AlreadyExists)
    }
}

impl From<kube::Error> for ClientError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(err) if err.code == 404 => ClientError::NotFound,
            kube::Error::Api(err) if err.code == 409 && err.reason == "AlreadyExists" => {
                ClientError::AlreadyExists
            }
            kube::Error::Api(err) if err.code == 409 => ClientError::Conflict,
            other => ClientError::Kube(other),
        }
    }
}

/// CRUD over VirtualServices keyed by (namespace, name)
///
/// `replace` must be conditioned on `metadata.resourceVersion` of the value it
/// is given and fail with `ClientError::Conflict` when the stored object has
/// moved on.
#[async_trait]
pub trait VirtualServiceClient: Send + Sync {
    /// Fetch a VirtualService, `Ok(None)` when it does not exist
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<VirtualService>, ClientError>;

    async fn create(
        &self,
        namespace: &str,
        vs: &VirtualService,
    ) -> Result<VirtualService, ClientError>;

    async fn replace(
        &self,
        namespace: &str,
        vs: &VirtualService,
    ) -> Result<VirtualService, ClientError>;
}

/// VirtualService client backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeVirtualServiceClient {
    client: kube::Client,
}

impl KubeVirtualServiceClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VirtualService> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl VirtualServiceClient for KubeVirtualServiceClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualService>, ClientError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(
        &self,
        namespace: &str,
        vs: &VirtualService,
    ) -> Result<VirtualService, ClientError> {
        Ok(self
            .api(namespace)
            .create(&PostParams::default(), vs)
            .await?)
    }

    async fn replace(
        &self,
        namespace: &str,
        vs: &VirtualService,
    ) -> Result<VirtualService, ClientError> {
        let name = vs
            .metadata
            .name
            .as_deref()
            .ok_or(ClientError::MissingMetadata("name"))?;
        // The API server rejects the write with 409 when resourceVersion is stale
        if vs.metadata.resource_version.is_none() {
            return Err(ClientError::MissingMetadata("resourceVersion"));
        }
        Ok(self
            .api(namespace)
            .replace(name, &PostParams::default(), vs)
            .await?)
    }
}

/// Mutation applied to a stored object right before the next replace, as if
/// another writer got there first
#[cfg(test)]
type Interleaved = Box<dyn FnOnce(&mut VirtualService) + Send>;

#[cfg(test)]
#[derive(Default)]
struct MockState {
    objects: std::collections::HashMap<(String, String), VirtualService>,
    version: u64,
    gets: usize,
    writes: usize,
    pending_conflicts: u32,
    interleaved: Vec<Interleaved>,
    competing_create: Option<VirtualService>,
    fail_writes: Option<String>,
    fail_gets: Option<String>,
    get_delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl MockState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// A failure the way kube reports an unreachable API server
#[cfg(test)]
fn transport_error(message: &str) -> ClientError {
    ClientError::Kube(kube::Error::Service(message.to_string().into()))
}

/// In-memory VirtualService store for tests
#[cfg(test)]
#[derive(Default)]
pub struct MockVirtualServiceClient {
    state: std::sync::Mutex<MockState>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
impl MockVirtualServiceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful and attempted creates/replaces
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn gets(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<VirtualService> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Mutate a stored object out-of-band (does not count as a write)
    pub fn external_update(
        &self,
        namespace: &str,
        name: &str,
        mutate: impl FnOnce(&mut VirtualService),
    ) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let vs = state
            .objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("external_update on a missing VirtualService");
        mutate(vs);
        vs.metadata.resource_version = Some(version);
    }

    /// Store an object as if created by someone else
    pub fn insert(&self, namespace: &str, mut vs: VirtualService) {
        let mut state = self.state.lock().unwrap();
        vs.metadata.namespace = Some(namespace.to_string());
        vs.metadata.resource_version = Some(state.next_version());
        let name = vs.metadata.name.clone().unwrap_or_default();
        state.objects.insert((namespace.to_string(), name), vs);
    }

    /// Fail the next `n` replaces with a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.state.lock().unwrap().pending_conflicts = n;
    }

    /// Apply `mutate` to the stored object just before the next replace
    pub fn interleave_external_write(
        &self,
        mutate: impl FnOnce(&mut VirtualService) + Send + 'static,
    ) {
        self.state
            .lock()
            .unwrap()
            .interleaved
            .push(Box::new(mutate));
    }

    /// Store `vs` just before the next create, which then sees AlreadyExists
    pub fn interleave_external_create(&self, vs: VirtualService) {
        self.state.lock().unwrap().competing_create = Some(vs);
    }

    pub fn fail_writes(&self, message: &str) {
        self.state.lock().unwrap().fail_writes = Some(message.to_string());
    }

    pub fn fail_gets(&self, message: &str) {
        self.state.lock().unwrap().fail_gets = Some(message.to_string());
    }

    pub fn delay_gets(&self, delay: std::time::Duration) {
        self.state.lock().unwrap().get_delay = Some(delay);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl VirtualServiceClient for MockVirtualServiceClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<VirtualService>, ClientError> {
        let delay = self.state.lock().unwrap().get_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.gets += 1;
        if let Some(message) = &state.fail_gets {
            return Err(transport_error(message));
        }
        Ok(state
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(
        &self,
        namespace: &str,
        vs: &VirtualService,
    ) -> Result<VirtualService, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if let Some(message) = &state.fail_writes {
            return Err(transport_error(message));
        }

        let name = vs
            .metadata
            .name
            .clone()
            .ok_or(ClientError::MissingMetadata("name"))?;
        let key = (namespace.to_string(), name);
        if let Some(mut competing) = state.competing_create.take() {
            competing.metadata.namespace = Some(namespace.to_string());
            competing.metadata.resource_version = Some(state.next_version());
            state.objects.insert(key.clone(), competing);
        }
        if state.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists);
        }

        let mut stored = vs.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        namespace: &str,
        vs: &VirtualService,
    ) -> Result<VirtualService, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if let Some(message) = &state.fail_writes {
            return Err(transport_error(message));
        }
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(ClientError::Conflict);
        }

        let name = vs
            .metadata
            .name
            .clone()
            .ok_or(ClientError::MissingMetadata("name"))?;
        let key = (namespace.to_string(), name);

        if !state.interleaved.is_empty() {
            let mutate = state.interleaved.remove(0);
            let version = state.next_version();
            let current = state.objects.get_mut(&key).ok_or(ClientError::NotFound)?;
            mutate(current);
            current.metadata.resource_version = Some(version);
        }

        let version = state.next_version();
        let current = state.objects.get_mut(&key).ok_or(ClientError::NotFound)?;
        if current.metadata.resource_version != vs.metadata.resource_version {
            return Err(ClientError::Conflict);
        }

        let mut stored = vs.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(version);
        *current = stored.clone();
        Ok(stored)
    }
}
