#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_runtime::{Document, parse_template};

fuzz_target!(|data: &[u8]| {
    let Ok(markup) = std::str::from_utf8(data) else {
        return;
    };
    let mut doc = Document::new();
    let Ok(root) = parse_template(&mut doc, markup, false) else {
        return;
    };
    // Serialized output is itself a valid template.
    let printed = doc.to_markup(root);
    let mut reparsed = Document::new();
    assert!(parse_template(&mut reparsed, &printed, false).is_ok());
});
