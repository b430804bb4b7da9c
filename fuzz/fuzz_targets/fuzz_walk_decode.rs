#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_runtime::walker::{decode, encode, trim_walk_string};

fuzz_target!(|data: &[u8]| {
    let Ok(walks) = std::str::from_utf8(data) else {
        return;
    };
    let _ = trim_walk_string(walks);
    if let Ok(codes) = decode(walks) {
        let canonical = encode(&codes);
        let again = decode(&canonical).expect("canonical walk strings decode");
        assert_eq!(again, codes);
    }
});
