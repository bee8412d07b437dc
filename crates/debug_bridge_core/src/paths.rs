use std::path::{Component, Path, PathBuf};

/// Converts between the absolute paths adapters work with and the workspace-relative
/// paths reported to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    roots: Vec<PathBuf>,
}

impl WorkspacePaths {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Absolute paths pass through; relative ones are joined onto the first root.
    /// `.` and `..` are collapsed lexically.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        match self.roots.first() {
            Some(root) if !candidate.is_absolute() => normalize(&root.join(candidate)),
            _ => normalize(candidate),
        }
    }

    /// Path relative to the first root containing it, `/`-separated. Paths outside
    /// every root are returned unchanged.
    pub fn relativize(&self, path: &Path) -> String {
        let path = normalize(path);
        for root in &self.roots {
            if let Ok(stripped) = path.strip_prefix(normalize(root)) {
                if stripped.as_os_str().is_empty() {
                    continue;
                }
                return join_components(stripped);
            }
        }
        path.to_string_lossy().into_owned()
    }

    pub fn relativize_str(&self, path: &str) -> String {
        self.relativize(Path::new(path))
    }
}

fn join_components(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Collapses `.` and `..` without touching the filesystem. `..` never climbs above the
/// root of an absolute path; leading `..` of a relative path are kept.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
