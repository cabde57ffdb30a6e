use std::fmt;

/// Slash-joined path relative to a mount. The empty path is the mount root.
///
/// Paths are kept in cleaned form: no leading, trailing or doubled slashes
/// and no `.` segments. Directory markers returned by listings (`db/`) are
/// dropped on [`RelPath::join`], so `db/` and `db` name the same node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath(String);

impl RelPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(path: &str) -> Self {
        Self(clean_segments(path).collect::<Vec<_>>().join("/"))
    }

    /// Append `child` below this path.
    pub fn join(&self, child: &str) -> Self {
        let mut joined = self.0.clone();
        for segment in clean_segments(child) {
            if !joined.is_empty() {
                joined.push('/');
            }
            joined.push_str(segment);
        }
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        clean_segments(&self.0)
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for RelPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn clean_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
}
