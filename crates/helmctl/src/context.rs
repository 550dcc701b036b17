//! settings shared by every step of a single load
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, derive_new::new)]
pub struct LoadContext {
    /// Directory of the root document
    ///
    /// `!include` paths and paths declared in the root document resolve against it.
    root_dir: PathBuf,

    /// Unset environment variables resolve to an empty string instead of failing the load
    permissive: bool,
}

impl LoadContext {
    pub fn for_file(file: &Path, permissive: bool) -> Self {
        let root_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::new(root_dir, permissive)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn permissive(&self) -> bool {
        self.permissive
    }

    /// Directory of the file that declared a record
    ///
    /// `include_path` is the path an `!include` directive injected into the record, relative to the root directory.
    pub fn base_dir(&self, include_path: Option<&Path>) -> PathBuf {
        match include_path
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            Some(dir) => self.root_dir.join(dir),
            None => self.root_dir.clone(),
        }
    }

    /// Makes a path declared in a record relative to the current directory
    ///
    /// Absolute paths are kept as they are.
    pub fn resolve_path(&self, include_path: Option<&Path>, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }

        self.base_dir(include_path).join(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_dir_from_file() {
        let context = LoadContext::for_file(Path::new("deploy/helmctl.yaml"), false);
        assert_eq!(context.root_dir(), Path::new("deploy"));

        let context = LoadContext::for_file(Path::new("helmctl.yaml"), true);
        assert_eq!(context.root_dir(), Path::new(""));
        assert!(context.permissive());
    }

    #[test]
    fn paths_follow_the_declaring_file() {
        let context = LoadContext::new("deploy".into(), false);

        assert_eq!(
            context.resolve_path(None, Path::new("scripts/pre.sh")),
            PathBuf::from("deploy/scripts/pre.sh")
        );
        assert_eq!(
            context.resolve_path(Some(Path::new("releases/web.yaml")), Path::new("pre.sh")),
            PathBuf::from("deploy/releases/pre.sh")
        );
        assert_eq!(
            context.resolve_path(Some(Path::new("web.yaml")), Path::new("pre.sh")),
            PathBuf::from("deploy/pre.sh")
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let context = LoadContext::new("deploy".into(), false);
        assert_eq!(
            context.resolve_path(Some(Path::new("a/b.yaml")), Path::new("/opt/pre.sh")),
            PathBuf::from("/opt/pre.sh")
        );
    }
}
