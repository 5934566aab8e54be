//! Fuzz target: `Document::parse`
//!
//! Any text either fails as a whole or yields a document whose device
//! names are unique and never collide with a section name.
//!
//! cargo fuzz run fuzz_config_document

#![no_main]

use std::collections::HashSet;

use breadboard::config::{Document, RESERVED_KEYS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(doc) = Document::parse(text) {
        let mut seen = HashSet::new();
        for entry in &doc.devices {
            assert!(seen.insert(entry.name.as_str()), "device `{}` listed twice", entry.name);
            assert!(!RESERVED_KEYS.contains(&entry.name.as_str()), "section `{}` read as a device", entry.name);
        }
    }
});
