/// integration tests to ensure the dispatch and cache workers cooperate
///
use anyhow::Result;
use async_trait::async_trait;
use dispatch_lib::config::Config;
use dispatch_lib::error::{DispatchError, TaskError};
use dispatch_lib::task::{ExecutionContext, HandlerRegistry, Payload, SampleTask, TaskHandler};
use dispatch_lib::worker::{WorkerState, OK};
use dispatch_lib::Supervisor;
use serde_json::json;
use std::time::Duration;

/// read-then-write on a shared counter with a pause in between
struct Counter;

#[async_trait]
impl TaskHandler for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn handle(&self, payload: Payload, ctx: &ExecutionContext) -> Result<Payload> {
        let before = ctx
            .cache()
            .get("count")
            .await?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        async_std::task::sleep(Duration::from_millis(fastrand::u64(1..15))).await;

        ctx.cache().set("count", before + 1).await?;
        ctx.cache().set(&format!("seen:{}", payload), before).await?;

        Ok(json!(before))
    }
}

/// exposes the cache interface to tests through the dispatcher
struct CacheOp;

#[async_trait]
impl TaskHandler for CacheOp {
    fn name(&self) -> &str {
        "cacheOp"
    }

    async fn handle(&self, payload: Payload, ctx: &ExecutionContext) -> Result<Payload> {
        let key = payload["key"].as_str().unwrap_or_default();
        match payload["op"].as_str() {
            Some("set") => {
                ctx.cache().set(key, payload["value"].clone()).await?;
                Ok(Payload::Null)
            }
            Some("get") => {
                let value = ctx.cache().get(key).await?;
                Ok(json!({ "found": value.is_some(), "value": value }))
            }
            Some("clear") => {
                ctx.cache().clear().await?;
                Ok(Payload::Null)
            }
            other => anyhow::bail!("unsupported op: {:?}", other),
        }
    }
}

/// takes the execution lock around its own state
struct Locked;

#[async_trait]
impl TaskHandler for Locked {
    fn name(&self) -> &str {
        "locked"
    }

    async fn handle(&self, payload: Payload, ctx: &ExecutionContext) -> Result<Payload> {
        let _guard = ctx.lock().write().await;
        Ok(payload)
    }
}

fn registry() -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(SampleTask)
        .register(Counter)
        .register(CacheOp)
        .register(Locked)
        .build()
}

fn supervisor() -> Supervisor {
    Supervisor::start(Config::default(), registry()).expect("should create the supervisor")
}

#[test]
fn sample_task_scenario() {
    async_std::task::block_on(async move {
        let supervisor = supervisor();

        let resp = supervisor
            .submit("sampleTask", json!("x"))
            .await
            .expect("should respond");
        assert_eq!(resp.error(), None);
        assert_eq!(resp.data(), Some(&json!("X")));

        let status = supervisor.status().await.expect("status");
        assert_eq!(status.len(), 2);
        for sts in status.iter() {
            assert_eq!(sts.worker_id.len(), 16);
            assert_eq!(sts.status, OK);
            assert_eq!(sts.state, WorkerState::Running);
            assert_eq!(sts.error_count, 0);
        }

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn cache_scenario() {
    async_std::task::block_on(async move {
        let supervisor = supervisor();
        let dispatcher = supervisor.dispatcher();

        let set = json!({ "op": "set", "key": "k", "value": "v" });
        let get = json!({ "op": "get", "key": "k" });
        let clear = json!({ "op": "clear" });

        dispatcher.run("cacheOp", set).await.expect("set");
        let found = dispatcher.run("cacheOp", get.clone()).await.expect("get");
        assert_eq!(found, json!({ "found": true, "value": "v" }));

        dispatcher.run("cacheOp", clear.clone()).await.expect("clear");
        let found = dispatcher.run("cacheOp", get.clone()).await.expect("get");
        assert_eq!(found, json!({ "found": false, "value": null }));

        // clearing twice is the same as clearing once
        dispatcher.run("cacheOp", clear).await.expect("clear");
        let found = dispatcher.run("cacheOp", get).await.expect("get");
        assert_eq!(found, json!({ "found": false, "value": null }));

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn periodic_flush_scenario() {
    async_std::task::block_on(async move {
        let mut config = Config::default();
        config.cache.flush_interval_ms = 60;
        let supervisor = Supervisor::start(config, registry()).expect("supervisor");
        let dispatcher = supervisor.dispatcher();

        dispatcher
            .run("cacheOp", json!({ "op": "set", "key": "k", "value": 1 }))
            .await
            .expect("set");

        async_std::task::sleep(Duration::from_millis(250)).await;

        let found = dispatcher
            .run("cacheOp", json!({ "op": "get", "key": "k" }))
            .await
            .expect("get");
        assert_eq!(found["found"], json!(false));

        let status = supervisor.status().await.expect("status");
        assert!(status[1].ticks >= 1);

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn concurrent_read_then_write() {
    async_std::task::block_on(async move {
        let supervisor = supervisor();

        let mut tasks = vec![];
        for n in 0..5 {
            let dispatcher = supervisor.dispatcher();
            tasks.push(async_std::task::spawn(async move {
                dispatcher.run("counter", json!(n)).await
            }));
        }

        let mut seen = vec![];
        for task in tasks {
            let before = task.await.expect("counter job");
            seen.push(before.as_u64().expect("a number"));
        }

        // one job at a time: every job saw a distinct count
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        let total = supervisor
            .dispatcher()
            .run("cacheOp", json!({ "op": "get", "key": "count" }))
            .await
            .expect("get");
        assert_eq!(total["value"], json!(5));

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn unknown_task_does_not_crash() {
    async_std::task::block_on(async move {
        let supervisor = supervisor();
        let dispatcher = supervisor.dispatcher();

        let err = dispatcher
            .run("notRegistered", json!({}))
            .await
            .expect_err("unknown task");
        assert_eq!(
            err,
            DispatchError::Task(TaskError::UnknownTask("notRegistered".to_string()))
        );

        let data = dispatcher.run("locked", json!([1, 2])).await.expect("locked");
        assert_eq!(data, json!([1, 2]));

        let status = supervisor.status().await.expect("status");
        assert_eq!(status[0].error_count, 1);
        assert_eq!(status[0].processed, 2);

        assert!(supervisor.shutdown().await.is_ok());
    });
}

#[test]
fn submit_after_shutdown() {
    async_std::task::block_on(async move {
        let supervisor = supervisor();
        let dispatcher = supervisor.dispatcher();

        assert!(supervisor.shutdown().await.is_ok());

        let err = dispatcher
            .submit("sampleTask", json!("late"))
            .await
            .expect_err("closed");
        assert_eq!(err, DispatchError::Closed);
    });
}
