//! Lazily resolved home directory owned by the top-level context.

use std::path::PathBuf;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

type HomeLookup = Box<dyn Fn() -> Option<PathBuf> + Send + Sync>;

/// Errors raised while resolving the user's home directory.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HomeDirError {
    /// Raised when the platform lookup yields no usable UTF-8 directory.
    #[error("could not determine the current user's home directory")]
    Unavailable,
}

/// The current user's home directory, looked up at most once.
///
/// The lookup runs inside [`OnceLock::get_or_init`], so concurrent first
/// callers block on a single resolution instead of racing to fill a cache.
pub struct HomeDir {
    lookup: HomeLookup,
    resolved: OnceLock<Option<Utf8PathBuf>>,
}

impl HomeDir {
    /// Uses the platform home directory lookup.
    #[must_use]
    pub fn from_system() -> Self {
        Self::with_lookup(dirs::home_dir)
    }

    /// Uses a fixed directory; mostly useful for tests.
    #[must_use]
    pub fn fixed(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        Self::with_lookup(move || Some(path.clone().into_std_path_buf()))
    }

    /// Uses a custom lookup function.
    #[must_use]
    pub fn with_lookup(lookup: impl Fn() -> Option<PathBuf> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            resolved: OnceLock::new(),
        }
    }

    /// Returns the home directory, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`HomeDirError::Unavailable`] when the lookup fails or yields
    /// a non-UTF-8 path.
    pub fn path(&self) -> Result<&Utf8Path, HomeDirError> {
        self.resolved
            .get_or_init(|| (self.lookup)().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()))
            .as_deref()
            .ok_or(HomeDirError::Unavailable)
    }

    /// Expands a leading `~/` to the home directory. Other paths are returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`HomeDirError::Unavailable`] when the path needs expanding
    /// and the home directory cannot be resolved.
    pub fn expand_tilde(&self, path: &str) -> Result<Utf8PathBuf, HomeDirError> {
        if path == "~" {
            return self.path().map(Utf8Path::to_path_buf);
        }
        match path.strip_prefix("~/") {
            Some(rest) => Ok(self.path()?.join(rest)),
            None => Ok(Utf8PathBuf::from(path)),
        }
    }
}

impl std::fmt::Debug for HomeDir {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HomeDir")
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[rstest]
    #[case("~/.ssh/id_rsa", "/home/sim/.ssh/id_rsa")]
    #[case("~", "/home/sim")]
    #[case("/etc/hosts", "/etc/hosts")]
    #[case("relative/~/path", "relative/~/path")]
    fn expand_tilde_joins_home(#[case] input: &str, #[case] expected: &str) {
        let home = HomeDir::fixed("/home/sim");
        let expanded = home.expand_tilde(input).expect("expand");
        assert_eq!(expanded, Utf8PathBuf::from(expected));
    }

    #[test]
    fn expand_tilde_fails_without_home() {
        let home = HomeDir::with_lookup(|| None);
        assert_eq!(
            home.expand_tilde("~/key"),
            Err(HomeDirError::Unavailable)
        );
        assert_eq!(
            home.expand_tilde("/abs/key"),
            Ok(Utf8PathBuf::from("/abs/key"))
        );
    }

    #[test]
    fn lookup_runs_once_under_concurrent_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let home = Arc::new(HomeDir::with_lookup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::yield_now();
            Some(PathBuf::from("/home/sim"))
        }));

        let handles = (0..8)
            .map(|_| {
                let shared = Arc::clone(&home);
                thread::spawn(move || shared.path().map(Utf8Path::to_path_buf))
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let path = handle.join().expect("thread").expect("home");
            assert_eq!(path, Utf8PathBuf::from("/home/sim"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
