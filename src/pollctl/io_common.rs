use std::path::{Path, PathBuf};

/// The name of the file, for the logs.
pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

/// A sibling of the given path, so that renaming it over the path stays on the
/// same filesystem.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data");
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(simplify_file_name("/var/lib/polls/polls.json"), "polls.json");
        assert_eq!(simplify_file_name("polls.json"), "polls.json");
        assert_eq!(
            temp_path_for(Path::new("/tmp/x/polls.json")),
            PathBuf::from("/tmp/x/.polls.json.tmp")
        );
    }
}
