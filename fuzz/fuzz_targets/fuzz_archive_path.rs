#![no_main]
use fuzz_bundle::core::validation::{archive_path, FuzzTestName};
use libfuzzer_sys::fuzz_target;

// Normalized archive paths must be relative, slash-separated and free of
// traversal, and normalizing twice must not change them.
fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(path) = archive_path(raw) {
        assert!(!path.is_empty());
        assert!(!path.starts_with('/'));
        assert!(!path.contains('\\'));
        assert!(!path.split('/').any(|s| s.is_empty() || s == "." || s == ".."));
        assert_eq!(archive_path(&path).ok().as_deref(), Some(path.as_str()));
    }

    if let Ok(name) = FuzzTestName::new(raw) {
        assert!(!name.as_str().contains(':'));
    }
});
