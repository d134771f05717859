//! String-level path helpers
//!
//! Paths are persisted as text, so normalization happens on the string form
//! rather than through the filesystem (the files may not exist any more).

/// Collapse duplicate separators, `.` and `..` segments and a trailing separator
pub fn normpath(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Split into (directory, file name). The directory of a root-level entry is `/`.
pub fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

/// Directory part of a path
pub fn dirname(path: &str) -> String {
    split_path(path).0
}

/// File name part of a path
pub fn basename(path: &str) -> String {
    split_path(path).1
}

/// Join a directory and a file name
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Whether `child` is `parent` or lies below it
pub fn is_path_in_path(parent: &str, child: &str) -> bool {
    let parent = normpath(parent);
    let child = normpath(child);
    if parent == child {
        return true;
    }
    if parent == "/" {
        return child.starts_with('/');
    }
    child.starts_with(&format!("{}/", parent))
}

/// Character-wise longest common prefix
pub fn common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// Convert Windows separators to `/`
pub fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normpath() {
        assert_eq!(normpath("/data//movies/./a/../b/"), "/data/movies/b");
        assert_eq!(normpath("/.."), "/");
        assert_eq!(normpath("a/../../b"), "../b");
        assert_eq!(normpath(""), ".");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/downloads/Show.S01E01.mkv"),
            ("/downloads".to_string(), "Show.S01E01.mkv".to_string())
        );
        assert_eq!(split_path("/file"), ("/".to_string(), "file".to_string()));
        assert_eq!(split_path("file"), (String::new(), "file".to_string()));
    }

    #[test]
    fn test_is_path_in_path() {
        assert!(is_path_in_path("/downloads", "/downloads/done"));
        assert!(is_path_in_path("/downloads", "/downloads"));
        assert!(!is_path_in_path("/downloads", "/downloads2"));
        assert!(!is_path_in_path("/downloads/done", "/downloads"));
    }

    #[test]
    fn test_common_prefix_is_character_wise() {
        assert_eq!(common_prefix("/mnt/a", "/mnt/b"), "/mnt/");
        assert_eq!(common_prefix("/data/x", "/downloads"), "/d");
        assert_eq!(common_prefix("/a", "/b"), "/");
    }
}
