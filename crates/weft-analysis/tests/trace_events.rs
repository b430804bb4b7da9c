//! Tracing output of the tracker.

use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use weft_analysis::{Aliases, CompilationContext, SourceKind, TagKind, TagSpec, TreeBuilder};

#[derive(Default)]
struct Captured {
    spans: Vec<String>,
    messages: Vec<String>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
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
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state.lock().expect("trace lock").messages.push(message);
        }
    }
}

#[test]
fn tracking_emits_span_intern_closure_and_finalize_events() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    // <let/x/> <if>${x}</if> ${merged}
    let mut b = TreeBuilder::new();
    let x = b.declare("x");
    let let_tag = b.tag(TagSpec::new("let", TagKind::Core).with_var(x.node));
    let read = b.ident(x.binding);
    let inner = b.placeholder(read);
    let branch = b.tag(TagSpec::new("if", TagKind::Core).with_children(vec![inner]));
    let merged = b.free_ident("merged");
    let outer = b.placeholder(merged);
    let tree = b.finish(vec![let_tag, branch, outer]);

    let mut cx = CompilationContext::new(&tree);
    cx.track_references(let_tag, Aliases::Empty, SourceKind::Let)
        .expect("tracks");
    cx.merge_references(merged, vec![Some(read)]);
    let _analysis = cx.finish();

    let captured = state.lock().expect("trace lock");
    assert!(
        captured.spans.iter().any(|name| name == "analysis.track"),
        "expected analysis.track span, got {:?}",
        captured.spans
    );
    for expected in [
        "analysis.reference.interned",
        "analysis.closure",
        "analysis.finalize",
    ] {
        assert!(
            captured.messages.iter().any(|m| m == expected),
            "expected {expected} event, got {:?}",
            captured.messages
        );
    }
    assert_eq!(
        captured
            .messages
            .iter()
            .filter(|m| *m == "analysis.closure")
            .count(),
        1
    );
}
