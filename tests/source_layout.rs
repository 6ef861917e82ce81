//! Formatting checks over the crate's own sources

use std::fs;
use std::path::Path;
use walkdir::WalkDir;

const MAX_WIDTH: usize = 100;

#[test]
fn test_source_lines_fit_max_width() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut too_wide = Vec::new();

    for dir in ["src", "tests", "benches"] {
        for entry in WalkDir::new(root.join(dir)).into_iter().flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "rs") {
                continue;
            }
            let contents = fs::read_to_string(path).unwrap();
            for (i, line) in contents.lines().enumerate() {
                if line.chars().count() > MAX_WIDTH {
                    too_wide.push(format!("{}:{}", path.display(), i + 1));
                }
            }
        }
    }

    assert!(too_wide.is_empty(), "lines over {} columns: {:?}", MAX_WIDTH, too_wide);
}
