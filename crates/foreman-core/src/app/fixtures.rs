//! Test fixtures shared by the app-layer tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use ulid::Ulid;

use crate::app::builder::{Engine, EngineBuilder};
use crate::app::commander::TransitionRequest;
use crate::app::context::CallContext;
use crate::config::EngineConfig;
use crate::domain::{
    Agent, AgentId, Identity, Job, JobAction, JobId, ParticipantId, Service, ServiceGroupId,
    ServiceId, ServicePlacement, ServiceState,
};
use crate::impls::InMemoryStore;
use crate::ports::{FixedClock, Repositories, Store, UlidGenerator};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// One provider, one consumer, one agent, an engine on a fixed clock.
pub(crate) struct Fixture {
    pub clock: Arc<FixedClock>,
    pub store: Arc<InMemoryStore>,
    pub engine: Engine,
    pub config: EngineConfig,
    pub provider: ParticipantId,
    pub consumer: ParticipantId,
    pub agent: Agent,
    group: ServiceGroupId,
}

impl Fixture {
    pub async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let config = EngineConfig::default();
        let dyn_store: Arc<dyn Store> = store.clone();
        let engine = EngineBuilder::new(dyn_store)
            .clock(clock.clone())
            .id_generator(Arc::new(UlidGenerator::new(clock.clone())))
            .config(config.clone())
            .build()
            .unwrap();

        let provider = ParticipantId::from_ulid(Ulid::new());
        let agent = Agent::new(
            AgentId::from_ulid(Ulid::new()),
            "edge-1",
            provider,
            t0(),
        );
        store.agents().create(&agent).await.unwrap();

        Self {
            clock,
            store,
            engine,
            config,
            provider,
            consumer: ParticipantId::from_ulid(Ulid::new()),
            agent,
            group: ServiceGroupId::from_ulid(Ulid::new()),
        }
    }

    /// Seed a service directly in `state`.
    pub async fn service(&self, state: ServiceState) -> Service {
        let mut service = Service::new(
            ServiceId::from_ulid(Ulid::new()),
            "db-primary",
            ServicePlacement {
                provider_id: self.provider,
                consumer_id: self.consumer,
                agent_id: self.agent.id,
                group_id: self.group,
            },
            None,
            t0(),
        );
        service.current_state = state;
        self.store.services().create(&service).await.unwrap();
        service
    }

    pub async fn request(&self, service: &Service, action: JobAction) -> Job {
        self.engine
            .commander
            .request(&self.consumer_ctx(), service.id, TransitionRequest::new(action))
            .await
            .unwrap()
    }

    pub async fn stored_job(&self, id: JobId) -> Job {
        self.store.jobs().find_by_id(id).await.unwrap().unwrap()
    }

    pub async fn stored_service(&self, id: ServiceId) -> Service {
        self.store.services().find_by_id(id).await.unwrap().unwrap()
    }

    pub fn admin_ctx(&self) -> CallContext {
        CallContext::new(Identity::admin("admin-1", "ops"))
    }

    pub fn agent_ctx(&self) -> CallContext {
        CallContext::new(Identity::agent("agent-token", "edge-1", self.agent.id))
    }

    pub fn provider_ctx(&self) -> CallContext {
        CallContext::new(Identity::participant("provider-user", "provider", self.provider))
    }

    pub fn consumer_ctx(&self) -> CallContext {
        CallContext::new(Identity::participant("consumer-user", "consumer", self.consumer))
    }
}
