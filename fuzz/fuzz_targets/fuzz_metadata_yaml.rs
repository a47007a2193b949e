#![no_main]
use fuzz_bundle::Metadata;
use libfuzzer_sys::fuzz_target;

// Any bundle.yaml that parses must serialize and parse back to itself.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(metadata) = Metadata::from_yaml(text) else {
        return;
    };

    let yaml = metadata.to_yaml().expect("parsed metadata serializes");
    let reparsed = Metadata::from_yaml(&yaml).expect("serialized metadata parses");
    assert_eq!(reparsed, metadata);
});
