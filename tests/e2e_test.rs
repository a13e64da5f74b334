//! End-to-end tests wiring delivery to a live dispatch server.
//!
//! The platform is a wiremock server. Accepted events are shadow-forwarded
//! over real HTTP to a dispatch router bound on a local port, whose handler
//! marks each event confirmed in a shared store that the delivery side polls.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use flowhook::{
    flowhook_core::TestClock,
    flowhook_delivery::{
        Backoff, ConfirmationConfig, ConfirmationStore, InMemoryStore, RetryPolicy, SendOptions,
        ShadowTarget, StoreConfirmation,
    },
    flowhook_dispatch::{serve_on, Validated},
    DeliveryConfig, DeliveryEngine, DeliveryError, Dispatcher, EventId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use validator::Validate;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const SECRET: &str = "local-secret";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct OrderCreated {
    #[validate(length(min = 1))]
    order_id: String,
    total: u32,
}

/// Local consumer running on a real socket.
struct Consumer {
    base_url: String,
    orders: mpsc::UnboundedReceiver<(EventId, OrderCreated)>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn start_consumer(confirmations: StoreConfirmation) -> Consumer {
    let (orders_tx, orders) = mpsc::unbounded_channel();
    let confirmations = Arc::new(confirmations);

    let dispatcher = Dispatcher::builder("order.0")
        .with_secret(SECRET)
        .on_event_type("order.created.0", Validated::<OrderCreated>::new(), move |order, envelope| {
            let orders_tx = orders_tx.clone();
            let confirmations = Arc::clone(&confirmations);
            async move {
                confirmations.mark_confirmed(&envelope.event_id).await?;
                orders_tx.send((envelope.event_id, order)).ok();
                Ok(())
            }
        })
        .build()
        .expect("dispatcher should build");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind local port");
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(serve_on(dispatcher, listener, async move {
        let _ = shutdown_rx.await;
    }));

    Consumer { base_url, orders, shutdown: Some(shutdown_tx) }
}

fn confirmations(store: &Arc<InMemoryStore>) -> StoreConfirmation {
    StoreConfirmation::new(Arc::clone(store) as Arc<dyn ConfirmationStore>, "flowcore:event")
}

fn engine(platform: &MockServer, consumer: &Consumer, store: &Arc<InMemoryStore>, secret: &str) -> DeliveryEngine {
    let config = DeliveryConfig::new("acme", "sales", "fc_key")
        .with_base_url(platform.uri())
        .with_shadow(ShadowTarget::new(consumer.base_url.clone(), secret))
        .with_confirmation(
            ConfirmationConfig::new(Arc::new(confirmations(store)))
                .with_policy(RetryPolicy::new(3, Backoff::fixed_ms(50))),
        );

    DeliveryEngine::with_clock(config, Arc::new(TestClock::new())).expect("engine should build")
}

#[tokio::test]
async fn single_event_round_trip() {
    let platform = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/event/acme/sales/order.0/order.created.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "eventId": "evt-1" })))
        .expect(1)
        .mount(&platform)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let mut consumer = start_consumer(confirmations(&store)).await;
    let engine = engine(&platform, &consumer, &store, SECRET);

    let order = OrderCreated { order_id: "o-1".to_string(), total: 42 };
    let event_id = engine
        .webhook::<OrderCreated>("order.0", "order.created.0")
        .send(&order, None)
        .await
        .expect("send should be confirmed");

    assert_eq!(event_id, EventId::from("evt-1"));

    let (handled_id, handled) = consumer.orders.recv().await.expect("consumer handled the event");
    assert_eq!(handled_id, event_id);
    assert_eq!(handled.order_id, "o-1");
    assert_eq!(handled.total, 42);

    assert_eq!(store.get("flowcore:event:evt-1").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn every_batch_event_reaches_consumer() {
    let platform = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/acme/sales/order.0/order.created.0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "eventIds": ["evt-1", "evt-2"] })),
        )
        .expect(1)
        .mount(&platform)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let mut consumer = start_consumer(confirmations(&store)).await;
    let engine = engine(&platform, &consumer, &store, SECRET);

    let orders = [
        OrderCreated { order_id: "o-1".to_string(), total: 1 },
        OrderCreated { order_id: "o-2".to_string(), total: 2 },
    ];
    let ids = engine
        .webhook::<OrderCreated>("order.0", "order.created.0")
        .send_batch(&orders, None)
        .await
        .expect("batch should be confirmed");

    assert_eq!(ids, vec![EventId::from("evt-1"), EventId::from("evt-2")]);

    let mut handled = Vec::new();
    for _ in 0..2 {
        let (id, order) = consumer.orders.recv().await.unwrap();
        handled.push((id.to_string(), order.order_id));
    }
    handled.sort();
    assert_eq!(
        handled,
        vec![("evt-1".to_string(), "o-1".to_string()), ("evt-2".to_string(), "o-2".to_string())]
    );
}

#[tokio::test]
async fn wrong_secret_surfaces_as_shadow_failure() {
    let platform = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/event/acme/sales/order.0/order.created.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "eventId": "evt-9" })))
        .mount(&platform)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let consumer = start_consumer(confirmations(&store)).await;
    let engine = engine(&platform, &consumer, &store, "not-the-secret");

    let err = engine
        .send(
            "order.0",
            "order.created.0",
            &json!({ "order_id": "o-9", "total": 9 }),
            None,
            &SendOptions::default(),
        )
        .await
        .unwrap_err();

    let DeliveryError::ShadowForward { event_id, response, .. } = err else {
        panic!("expected shadow forward failure, got {err:?}");
    };
    assert_eq!(event_id, EventId::from("evt-9"));
    assert_eq!(response.as_ref().map(|r| r["statusCode"].clone()), Some(json!(401)));
    assert_eq!(store.get("flowcore:event:evt-9").await.unwrap(), None);
}
