#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use constellation_core::{Request, Response};
use constellation_rpc::DispatchTable;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// Records the level and message of every event emitted on this thread
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl EventLog {
    pub fn count(&self, level: Level, message: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, m)| *l == level && m == message)
            .count()
    }

    pub fn count_level(&self, level: Level) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }
}

struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0.unwrap_or_default()));
    }
}

/// Capture events until the returned guard is dropped
pub fn capture() -> (EventLog, DefaultGuard) {
    let log = EventLog::default();
    let guard = tracing::subscriber::set_default(Registry::default().with(log.clone()));
    (log, guard)
}

/// Methods shared by the listener, client and service tests
pub fn register_test_methods(table: &DispatchTable) {
    table.register("test:channel", |request: Request| async move {
        let data = request.param("data")?.to_string();
        Ok::<_, anyhow::Error>(Response::success(request.id, data))
    });
    table.register("test:exception", |_request: Request| async move {
        Err::<Response, _>(anyhow::anyhow!("Error"))
    });
    table.register("test:large", |request: Request| async move {
        let size: usize = request.parse_param("size")?;
        Ok::<_, anyhow::Error>(Response::success(request.id, "x".repeat(size)))
    });
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
