use async_trait::async_trait;
use infragraph::{
    ActualState, Changeset, CloudProvider, Outputs, Payload, ProviderError, ResourceId,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider call as seen by the fake cloud
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    Find(ResourceId),
    Create(ResourceId, Payload),
    Update(ResourceId, Payload),
}

#[derive(Default)]
struct FakeState {
    resources: HashMap<ResourceId, ActualState>,
    calls: Vec<Call>,
    not_ready: HashMap<String, u32>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    next_id: u32,
}

/// In-memory cloud. Created resources get ids `<kind>-<n>` in creation order.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
    apply_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, kind: &str, name: &str, actual: ActualState) -> Self {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(ResourceId::new(kind, name), actual);
        self
    }

    /// Answer the next `times` mutations of task `name` with a transient error
    pub fn not_ready(self, name: &str, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .not_ready
            .insert(name.to_string(), times);
        self
    }

    /// Reject every mutation of task `name`
    pub fn failing(self, name: &str) -> Self {
        self.state.lock().unwrap().failing.insert(name.to_string());
        self
    }

    /// Panic inside every mutation of task `name`
    pub fn panicking(self, name: &str) -> Self {
        self.state.lock().unwrap().panicking.insert(name.to_string());
        self
    }

    /// Time every create or update takes
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn finds(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Find(_)))
            .count()
    }

    /// Names of mutated resources, in call order
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(id, _) | Call::Update(id, _) => Some(id.name.to_string()),
                Call::Find(_) => None,
            })
            .collect()
    }

    pub fn created(&self, name: &str) -> Option<Payload> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Create(id, payload) if id.name.as_str() == name => Some(payload),
            _ => None,
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn mutate(&self, call: Call) -> Result<Outputs, ProviderError> {
        let (id, desired) = match &call {
            Call::Create(id, desired) | Call::Update(id, desired) => (id.clone(), desired.clone()),
            Call::Find(_) => unreachable!(),
        };
        let panics = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            if let Some(remaining) = state.not_ready.get_mut(id.name.as_str()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::transient(format!("{id} not ready")));
                }
            }
            if state.failing.contains(id.name.as_str()) {
                return Err(ProviderError::fatal(format!("{id} rejected")));
            }
            state.panicking.contains(id.name.as_str())
        };
        // the lock is released first so other tasks keep a usable cloud
        if panics {
            panic!("{id} crashed the provider");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.apply_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        let existing = state.resources.get(&id).cloned();
        let outputs = match existing {
            Some(actual) => actual.outputs,
            None => {
                state.next_id += 1;
                let mut outputs = Outputs::new();
                outputs.insert("id".into(), json!(format!("{}-{}", id.kind, state.next_id)));
                outputs
            }
        };
        state.resources.insert(
            id,
            ActualState {
                properties: desired,
                outputs: outputs.clone(),
            },
        );
        Ok(outputs)
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn find(&self, id: &ResourceId) -> Result<Option<ActualState>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Find(id.clone()));
        Ok(state.resources.get(id).cloned())
    }

    async fn create(&self, id: &ResourceId, desired: &Payload) -> Result<Outputs, ProviderError> {
        self.mutate(Call::Create(id.clone(), desired.clone())).await
    }

    async fn update(
        &self,
        id: &ResourceId,
        desired: &Payload,
        _changes: &Changeset,
    ) -> Result<Outputs, ProviderError> {
        self.mutate(Call::Update(id.clone(), desired.clone())).await
    }
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
