//! Tracing output of rendering, flushing and teardown.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use weft_runtime::prelude::*;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Record {
    message: String,
    effects: Option<u64>,
}

#[derive(Default)]
struct Captured {
    spans: Vec<String>,
    events: Vec<Record>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

#[derive(Default)]
struct Fields(Record);

impl Visit for Fields {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "effects" {
            self.0.effects = Some(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0.message = value.to_owned();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.message = format!("{value:?}").trim_matches('"').to_owned();
        }
    }
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::Id,
        _ctx: Context<'_, S>,
    ) {
        self.state
            .lock()
            .expect("trace lock")
            .spans
            .push(attrs.metadata().name().to_owned());
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        self.state.lock().expect("trace lock").events.push(fields.0);
    }
}

fn count_of(captured: &Captured, message: &str) -> usize {
    captured
        .events
        .iter()
        .filter(|record| record.message == message)
        .count()
}

#[test]
fn render_update_and_destroy_are_traced() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let text: EffectFn = Rc::new(|cx: &mut Cx<'_>| -> Result<()> {
        let value = cx.get(0).clone();
        cx.set_data(0, &value)
    });
    let dynamic: DynamicInput = Rc::new(|cx: &mut Cx<'_>, input: &Input| -> Result<()> {
        cx.set(0, input.get("label").cloned().unwrap_or_default())?;
        Ok(())
    });
    let renderer = Renderer::builder("<span></span>")
        .with_walks("%")
        .with_size(1)
        .with_effect("label.text", &[0], text)
        .build();
    let render = create_render_fn(Rc::new(renderer), Some(dynamic));
    let dom = Document::shared();

    let first = json!({ "label": "a" });
    let mut result = render
        .render(&dom, first.as_object().expect("object"))
        .expect("renders");
    let second = json!({ "label": "b" });
    result
        .update(second.as_object().expect("object"))
        .expect("updates");
    result.destroy();
    assert!(result.update(second.as_object().expect("object")).is_err());

    let captured = state.lock().expect("trace lock");
    assert!(
        captured.spans.iter().any(|name| name == "runtime.render"),
        "expected runtime.render span, got {:?}",
        captured.spans
    );
    assert_eq!(count_of(&captured, "runtime.template.parsed"), 1);
    assert_eq!(count_of(&captured, "runtime.effect"), 2);
    assert_eq!(count_of(&captured, "runtime.destroy"), 1);
    assert_eq!(count_of(&captured, "runtime.update.destroyed"), 1);

    let flushes: Vec<Option<u64>> = captured
        .events
        .iter()
        .filter(|record| record.message == "runtime.flush")
        .map(|record| record.effects)
        .collect();
    assert_eq!(flushes, vec![Some(1), Some(1)]);
}
