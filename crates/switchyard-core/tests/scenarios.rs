//! End-to-end scenarios: catalog -> orchestrator -> bus traffic between components.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rstest::rstest;
use serde_json::{Value, json};

use switchyard_core::app::FactoryContext;
use switchyard_core::bus::{BusConfig, Subscription, async_listener_fn, listener_fn};
use switchyard_core::domain::{BusError, ComponentError, LifecycleError, OrchestratorError};
use switchyard_core::lifecycle::RestartOptions;
use switchyard_core::{
    Component, ComponentCatalog, ComponentConfig, ComponentId, ComponentStatus, EventBus,
    EventDraft, LifecycleManager, OrchestratorBuilder, OrchestratorConfig,
};

type Journal = Arc<Mutex<Vec<String>>>;

/// Answers `store.get` requests while running.
struct Store {
    config: ComponentConfig,
    bus: EventBus,
    status: Mutex<ComponentStatus>,
    serving: Mutex<Option<Subscription>>,
    journal: Journal,
}

#[async_trait]
impl Component for Store {
    fn config(&self) -> &ComponentConfig {
        &self.config
    }

    fn status(&self) -> ComponentStatus {
        *self.status.lock()
    }

    async fn initialize(&self, _config: &ComponentConfig) -> Result<(), ComponentError> {
        self.journal.lock().push("init:store".into());
        *self.status.lock() = ComponentStatus::Ready;
        Ok(())
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let bus = self.bus.clone();
        let subscription = self.bus.subscribe(
            "store.get",
            async_listener_fn(move |event| {
                let bus = bus.clone();
                async move {
                    let key = event.data["key"].as_str().unwrap_or_default().to_string();
                    bus.respond(&event, json!({ "key": key, "value": key.len() }))
                        .await;
                    Ok(())
                }
            }),
        );
        *self.serving.lock() = Some(subscription);
        self.journal.lock().push("start:store".into());
        *self.status.lock() = ComponentStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        if let Some(subscription) = self.serving.lock().take() {
            subscription.unsubscribe();
        }
        self.journal.lock().push("stop:store".into());
        *self.status.lock() = ComponentStatus::Paused;
        Ok(())
    }

    async fn destroy(&self) {
        self.journal.lock().push("destroy:store".into());
        *self.status.lock() = ComponentStatus::Destroyed;
    }
}

/// Asks the store for a value when it starts.
struct Reader {
    config: ComponentConfig,
    bus: EventBus,
    status: Mutex<ComponentStatus>,
    answer: Mutex<Option<Value>>,
    journal: Journal,
}

#[async_trait]
impl Component for Reader {
    fn config(&self) -> &ComponentConfig {
        &self.config
    }

    fn status(&self) -> ComponentStatus {
        *self.status.lock()
    }

    async fn initialize(&self, _config: &ComponentConfig) -> Result<(), ComponentError> {
        self.journal.lock().push("init:reader".into());
        *self.status.lock() = ComponentStatus::Ready;
        Ok(())
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let answer = self
            .bus
            .request(
                "store.get",
                EventDraft::new("get", self.config.id.as_str()).with_data(json!({ "key": "hello" })),
                Duration::from_secs(1),
            )
            .await
            .map_err(|err| ComponentError::failed(err.to_string()))?;
        *self.answer.lock() = Some(answer);
        self.journal.lock().push("start:reader".into());
        *self.status.lock() = ComponentStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        self.journal.lock().push("stop:reader".into());
        *self.status.lock() = ComponentStatus::Paused;
        Ok(())
    }

    async fn destroy(&self) {
        self.journal.lock().push("destroy:reader".into());
        *self.status.lock() = ComponentStatus::Destroyed;
    }
}

fn catalog(journal: &Journal) -> ComponentCatalog {
    let for_store = Arc::clone(journal);
    let for_reader = Arc::clone(journal);
    ComponentCatalog::new()
        .define("store", Vec::<ComponentId>::new(), move |ctx: FactoryContext| {
            Ok(Store {
                config: ctx.component_config("Store").with_priority(10),
                bus: ctx.bus.clone(),
                status: Mutex::new(ComponentStatus::Idle),
                serving: Mutex::new(None),
                journal: Arc::clone(&for_store),
            })
        })
        .and_then(|catalog| {
            catalog.define("reader", ["store"], move |ctx: FactoryContext| {
                Ok(Reader {
                    config: ctx.component_config("Reader"),
                    bus: ctx.bus.clone(),
                    status: Mutex::new(ComponentStatus::Idle),
                    answer: Mutex::new(None),
                    journal: Arc::clone(&for_reader),
                })
            })
        })
        .unwrap()
}

#[tokio::test]
async fn reader_gets_its_answer_from_the_store() {
    let journal: Journal = Arc::default();
    let orchestrator = OrchestratorBuilder::new(catalog(&journal))
        .config(
            OrchestratorConfig::default()
                .enable_only(["reader"])
                .with_auto_start(true),
        )
        .build()
        .unwrap();

    orchestrator.initialize().await.unwrap();

    let reader = orchestrator.get::<Reader>("reader").unwrap();
    assert_eq!(
        *reader.answer.lock(),
        Some(json!({ "key": "hello", "value": 5 }))
    );
    assert!(orchestrator.health_check().healthy);
    assert_eq!(orchestrator.bus().pending_request_count(), 0);

    orchestrator.shutdown().await.unwrap();
    assert_eq!(
        *journal.lock(),
        vec![
            "init:store",
            "init:reader",
            "start:store",
            "start:reader",
            "stop:reader",
            "stop:store",
            "destroy:reader",
            "destroy:store",
        ]
    );
}

#[tokio::test]
async fn missing_dependency_blocks_initialization() {
    let journal: Journal = Arc::default();
    let bus = EventBus::new(BusConfig::default());
    let manager = LifecycleManager::new(bus.clone());

    let reader = Arc::new(Reader {
        config: ComponentConfig::new("reader", "Reader")
            .with_timeout(Duration::from_secs(5))
            .with_dependencies(["quiet"]),
        bus: bus.clone(),
        status: Mutex::new(ComponentStatus::Idle),
        answer: Mutex::new(None),
        journal: Arc::clone(&journal),
    });
    manager.register(reader).unwrap();

    assert!(matches!(
        manager.initialize_all().await,
        Err(LifecycleError::MissingDependencies { .. })
    ));
    assert!(manager.initialization_order().is_empty());
    assert!(journal.lock().is_empty());
}

#[tokio::test]
async fn restart_with_dependents_resumes_the_reader() {
    let journal: Journal = Arc::default();
    let orchestrator = OrchestratorBuilder::new(catalog(&journal))
        .config(OrchestratorConfig::default().with_auto_start(true))
        .build()
        .unwrap();
    orchestrator.initialize().await.unwrap();
    journal.lock().clear();

    orchestrator
        .lifecycle()
        .restart_component(&ComponentId::new("store"), RestartOptions::default())
        .await
        .unwrap();

    let entries = journal.lock().clone();
    assert_eq!(entries.first().map(String::as_str), Some("stop:reader"));
    assert!(entries.contains(&"stop:store".to_string()));
    assert!(entries.contains(&"start:store".to_string()));
    assert_eq!(entries.last().map(String::as_str), Some("start:reader"));
    assert_eq!(
        orchestrator.lifecycle().component_status(&ComponentId::new("reader")),
        Some(ComponentStatus::Running)
    );

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_fails_requests_still_waiting() {
    let journal: Journal = Arc::default();
    let orchestrator = OrchestratorBuilder::new(catalog(&journal))
        .config(OrchestratorConfig::default().enable_only(["store"]))
        .build()
        .unwrap();
    orchestrator.initialize().await.unwrap();

    // initialized but not started, so nothing answers
    let bus = orchestrator.bus().clone();
    let waiting = tokio::spawn(async move {
        bus.request("store.get", EventDraft::new("get", "test"), Duration::from_secs(30))
            .await
    });
    while orchestrator.bus().pending_request_count() == 0 {
        tokio::task::yield_now().await;
    }

    orchestrator.shutdown().await.unwrap();
    assert!(matches!(waiting.await.unwrap(), Err(BusError::ShuttingDown)));
}

#[tokio::test]
async fn get_before_initialize_is_not_initialized() {
    let journal: Journal = Arc::default();
    let orchestrator = OrchestratorBuilder::new(catalog(&journal)).build().unwrap();

    assert!(matches!(
        orchestrator.get::<Store>("store"),
        Err(OrchestratorError::NotInitialized)
    ));
}

#[rstest]
#[case::under_capacity(3, 5)]
#[case::at_capacity(5, 5)]
#[case::over_capacity(12, 5)]
#[tokio::test]
async fn history_keeps_last_events_in_order(#[case] published: usize, #[case] capacity: usize) {
    let bus = EventBus::new(BusConfig {
        history_capacity: capacity,
        ..BusConfig::default()
    });

    for n in 0..published {
        bus.publish("metrics", EventDraft::new("tick", "test").with_data(json!(n)))
            .await;
    }

    let kept: Vec<Value> = bus
        .history("metrics", None)
        .into_iter()
        .map(|event| event.data)
        .collect();
    let expected: Vec<Value> = (published.saturating_sub(capacity)..published)
        .map(|n| json!(n))
        .collect();
    assert_eq!(kept, expected);
}

#[tokio::test]
async fn concurrent_requests_resolve_with_their_own_answers() {
    let bus = EventBus::new(BusConfig::default());
    let responder = bus.clone();
    let _echo = bus.subscribe(
        "echo",
        async_listener_fn(move |event| {
            let bus = responder.clone();
            async move {
                // later requests answer first
                let n = event.data.as_u64().unwrap_or_default();
                tokio::time::sleep(Duration::from_millis(40 - n * 4)).await;
                bus.respond(&event, json!(n * 100)).await;
                Ok(())
            }
        }),
    );

    let requests = (0..8u64).map(|n| {
        let bus = bus.clone();
        async move {
            bus.request(
                "echo",
                EventDraft::new("echo", "test").with_data(json!(n)),
                Duration::from_secs(1),
            )
            .await
        }
    });
    let answers = futures::future::join_all(requests).await;

    for (n, answer) in answers.into_iter().enumerate() {
        assert_eq!(answer.unwrap(), json!(n as u64 * 100));
    }
}

#[tokio::test]
async fn failing_listener_does_not_starve_the_next_one() {
    let bus = EventBus::new(BusConfig::default());
    let seen = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&seen);

    let _bad = bus.subscribe(
        "updates",
        listener_fn(|_| Err(switchyard_core::domain::ListenerError::msg("boom"))),
    );
    let _panicky = bus.subscribe("updates", listener_fn(|_| panic!("listener blew up")));
    let _good = bus.subscribe(
        "updates",
        listener_fn(move |_| {
            *counter.lock() += 1;
            Ok(())
        }),
    );

    bus.publish("updates", EventDraft::new("changed", "test")).await;
    assert_eq!(*seen.lock(), 1);
}
