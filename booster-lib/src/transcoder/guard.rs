//! Process-wide exclusivity for output paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use log::debug;

use crate::error::BoostError;

fn active_outputs() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Guard that holds an output path for the lifetime of one transcode.
#[derive(Debug)]
pub struct OutputReservation {
    path: PathBuf,
}

impl OutputReservation {
    /// Reserve `path`, failing with `OutputInUse` if another job holds it.
    pub fn acquire(path: &Path) -> Result<Self, BoostError> {
        let key = absolute(path);
        let mut active = active_outputs()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(BoostError::OutputInUse(key));
        }
        debug!("reserved output {}", key.display());
        Ok(Self { path: key })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputReservation {
    fn drop(&mut self) {
        active_outputs()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_path;

    #[test]
    fn second_reservation_is_refused() {
        let path = temp_path("guard", "wav");
        let first = OutputReservation::acquire(&path).expect("first");
        let err = OutputReservation::acquire(&path).unwrap_err();
        assert_eq!(err.kind(), "output_in_use");
        assert_eq!(first.path(), path.as_path());

        drop(first);
        let again = OutputReservation::acquire(&path).expect("released");
        drop(again);
    }

    #[test]
    fn distinct_paths_do_not_conflict() {
        let a = OutputReservation::acquire(&temp_path("guard-a", "wav")).expect("a");
        let b = OutputReservation::acquire(&temp_path("guard-b", "wav")).expect("b");
        assert_ne!(a.path(), b.path());
    }
}
