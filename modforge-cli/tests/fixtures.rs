//! Test fixtures for integration tests.
//!
//! This module provides helpers that write mod trees into temporary directories.

use std::path::{Path, PathBuf};

/// Writes `body` as `<root>/<dir_name>/mod.toml` and returns the mod directory.
pub fn write_mod(root: &Path, dir_name: &str, body: &str) -> PathBuf {
    let mod_dir = root.join(dir_name);
    std::fs::create_dir_all(&mod_dir).unwrap();
    std::fs::write(mod_dir.join("mod.toml"), body).unwrap();
    mod_dir
}

/// Manifest text for a mod with required dependencies.
pub fn manifest(id: &str, version: &str, deps: &[&str]) -> String {
    let mut body = format!(
        "capabilities = [\"events\"]\n\n[mod]\nid = \"{}\"\nname = \"{} mod\"\nversion = \"{}\"\n",
        id, id, version
    );
    for dep in deps {
        body.push_str(&format!("\n[[dependencies]]\nid = \"{}\"\n", dep));
    }
    body
}

/// A small valid tree: `core`, `ui -> core`, `maps -> ui`.
pub fn valid_tree(root: &Path) {
    write_mod(root, "core", &manifest("core", "1.2.0", &[]));
    write_mod(root, "ui", &manifest("ui", "0.3.0", &["core"]));
    write_mod(root, "maps", &manifest("maps", "2.0.0", &["ui"]));
}
