//! Instantiation and update costs of a small counter template.
//!
//! Run with: cargo bench -p weft-runtime -- render

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;
use std::rc::Rc;

use weft_runtime::prelude::*;

fn counter() -> RenderFn {
    let text: EffectFn = Rc::new(|cx: &mut Cx<'_>| -> Result<()> {
        let count = cx.get(0).clone();
        cx.set_data(0, &count)
    });
    let dynamic: DynamicInput = Rc::new(|cx: &mut Cx<'_>, input: &Input| -> Result<()> {
        cx.set(0, input.get("count").cloned().unwrap_or_default())?;
        Ok(())
    });
    let renderer = Renderer::builder("<div><button> </button><span>static</span></div>")
        .with_walks("E ")
        .with_size(1)
        .with_effect("count.text", &[0], text)
        .build();
    create_render_fn(Rc::new(renderer), Some(dynamic))
}

fn input(count: u64) -> Input {
    match json!({ "count": count }) {
        Value::Object(map) => map,
        _ => Input::new(),
    }
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let render = counter();

    group.bench_function("instantiate", |b| {
        let dom = Document::shared();
        let first = input(0);
        b.iter(|| black_box(render.render(&dom, &first).expect("renders")));
    });

    group.bench_function("update", |b| {
        let dom = Document::shared();
        let mut result = render.render(&dom, &input(0)).expect("renders");
        let mut count = 0;
        b.iter(|| {
            count += 1;
            black_box(result.update(&input(count)).expect("updates"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
