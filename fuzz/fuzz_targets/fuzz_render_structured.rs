#![no_main]

use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weft_runtime::walker::{WalkCode, encode};
use weft_runtime::{Document, Input, Renderer, create_render_fn};

#[derive(Arbitrary, Debug)]
enum FuzzNode {
    Text(u8),
    Comment,
    Element { tag: u8, children: Vec<FuzzNode> },
}

impl FuzzNode {
    fn write(&self, out: &mut String, depth: usize) {
        match self {
            FuzzNode::Text(ch) => out.push(char::from(b'a' + ch % 26)),
            FuzzNode::Comment => out.push_str("<!--c-->"),
            FuzzNode::Element { tag, children } => {
                let tag = ["div", "span", "p", "br"][usize::from(*tag) % 4];
                out.push('<');
                out.push_str(tag);
                out.push('>');
                if tag != "br" && depth < 8 {
                    for child in children {
                        child.write(out, depth + 1);
                    }
                }
                if tag != "br" {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

#[derive(Arbitrary, Debug)]
enum FuzzCode {
    Get,
    Before,
    After,
    Replace,
    Next(u8),
    Over(u8),
    Out(u8),
}

impl From<&FuzzCode> for WalkCode {
    fn from(code: &FuzzCode) -> Self {
        match code {
            FuzzCode::Get => WalkCode::Get,
            FuzzCode::Before => WalkCode::Before,
            FuzzCode::After => WalkCode::After,
            FuzzCode::Replace => WalkCode::Replace,
            FuzzCode::Next(n) => WalkCode::Next(usize::from(*n)),
            FuzzCode::Over(n) => WalkCode::Over(usize::from(*n)),
            FuzzCode::Out(n) => WalkCode::Out(usize::from(*n)),
        }
    }
}

fuzz_target!(|input: (Vec<FuzzNode>, Vec<FuzzCode>)| {
    let (nodes, codes) = input;
    let mut template = String::new();
    for node in nodes.iter().take(32) {
        node.write(&mut template, 0);
    }
    let codes: Vec<WalkCode> = codes.iter().take(64).map(WalkCode::from).collect();
    let renderer = Renderer::builder(template).with_walks(&encode(&codes)).build();
    let render = create_render_fn(Rc::new(renderer), None);
    let dom = Document::shared();
    if let Ok(mut result) = render.render(&dom, &Input::new()) {
        result.destroy();
    }
});
