use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use foreman_core::app::{CallContext, EngineBuilder, JobCompletion, TransitionRequest};
use foreman_core::config::EngineConfig;
use foreman_core::domain::{
    Agent, AgentId, Identity, JobAction, ParticipantId, Service, ServiceGroupId, ServiceId,
    ServicePlacement, ServiceState,
};
use foreman_core::impls::InMemoryStore;
use foreman_core::ports::{Clock, Repositories, Store, SystemClock};
use ulid::Ulid;

/// Foreman のデモ: in-memory の Engine で Job の一巡を実行する
#[derive(Debug, Parser)]
#[command(name = "foreman", version, about)]
struct Args {
    /// 設定ファイル。存在しなければ既定値を使う
    #[arg(long, default_value = "foreman.toml")]
    config: PathBuf,

    /// ログフィルタ（`FOREMAN_LOG` と設定ファイルより優先）
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // (A) 設定とログ
    let config = EngineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?
        .with_log_override(args.log);
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // (B) Store と Engine を用意
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let engine = Arc::new(
        EngineBuilder::new(store.clone() as Arc<dyn Store>)
            .clock(clock.clone())
            .config(config.clone())
            .build()?,
    );

    // (C) 背景の sweep ループ（終了時にキャンセルで止める）
    let shutdown = CancellationToken::new();
    let reaper = tokio::spawn({
        let engine = engine.clone();
        let cancel = shutdown.clone();
        async move { engine.reaper.run(cancel).await }
    });
    let retention = tokio::spawn({
        let engine = engine.clone();
        let cancel = shutdown.clone();
        async move { engine.retention.run(cancel).await }
    });

    // (D) 登場人物: provider / consumer / agent
    let provider = ParticipantId::from_ulid(Ulid::new());
    let consumer = ParticipantId::from_ulid(Ulid::new());
    let agent = Agent::new(AgentId::from_ulid(Ulid::new()), "edge-1", provider, clock.now());
    store.agents().create(&agent).await?;

    let consumer_ctx = CallContext::new(Identity::participant("consumer-user", "consumer", consumer));
    let agent_ctx = CallContext::new(Identity::agent("agent-token", "edge-1", agent.id));

    let placement = ServicePlacement {
        provider_id: provider,
        consumer_id: consumer,
        agent_id: agent.id,
        group_id: ServiceGroupId::from_ulid(Ulid::new()),
    };
    let mut web = Service::new(ServiceId::from_ulid(Ulid::new()), "web", placement, None, clock.now());
    web.current_state = ServiceState::Stopped;
    store.services().create(&web).await?;
    let mut db = Service::new(ServiceId::from_ulid(Ulid::new()), "db", placement, None, clock.now());
    db.current_state = ServiceState::Stopped;
    store.services().create(&db).await?;

    // (E) Start シナリオ: request -> poll -> claim -> complete
    let start = engine
        .commander
        .request(&consumer_ctx, web.id, TransitionRequest::new(JobAction::Start).with_priority(5))
        .await?;
    info!(job_id = %start.id, "start requested");

    let pending = engine
        .queries
        .pending_jobs_for_agent(&agent_ctx, agent.id, config.poll_limit)
        .await?;
    println!("pending for {}: {}", agent.name, pending.len());

    engine.commander.claim(&agent_ctx, start.id).await?;
    engine
        .commander
        .complete(
            &agent_ctx,
            start.id,
            JobCompletion {
                resources: Some(json!({"cpu": 2})),
                external_id: Some("vm-123".into()),
            },
        )
        .await?;

    // (F) 失敗と retry
    let db_start = engine
        .commander
        .request(&consumer_ctx, db.id, TransitionRequest::new(JobAction::Start))
        .await?;
    engine.commander.claim(&agent_ctx, db_start.id).await?;
    engine.commander.fail(&agent_ctx, db_start.id, "disk full").await?;
    engine.commander.retry(&consumer_ctx, db_start.id).await?;

    for id in [web.id, db.id] {
        if let Some(service) = store.services().find_by_id(id).await? {
            println!(
                "service {}: current={} target={:?} retries={} error={:?}",
                service.name,
                service.current_state,
                service.target_state,
                service.retry_count,
                service.error_message
            );
        }
    }

    // (G) 1 回ずつ明示的に sweep
    let reaped = engine.reaper.sweep(&shutdown).await?;
    let purged = engine.retention.sweep(&shutdown).await?;
    println!("reaped={} purged={}", reaped.reaped, purged);

    let admin_ctx = CallContext::new(Identity::admin("cli", "cli"));
    let counts = engine.queries.counts(&admin_ctx).await?;
    println!("counts: {}", serde_json::to_string(&counts)?);

    // (H) graceful shutdown
    shutdown.cancel();
    reaper.await?;
    retention.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_foreman_toml() {
        let args = Args::try_parse_from(["foreman"]).unwrap();
        assert_eq!(args.config, PathBuf::from("foreman.toml"));
        assert!(args.log.is_none());
    }

    #[test]
    fn args_accept_config_and_log() {
        let args =
            Args::try_parse_from(["foreman", "--config", "ops/foreman.toml", "--log", "debug"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("ops/foreman.toml"));

        let config = EngineConfig::default().with_log_override(args.log);
        assert_eq!(config.log_filter, "debug");
    }
}
