use crate::ledger::paths::SyncPaths;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;

/// Exclusive lock held for the length of one run. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(paths: &SyncPaths) -> Result<Self> {
        fs::create_dir_all(&paths.home)
            .with_context(|| format!("failed to create {}", paths.home.display()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .with_context(|| format!("failed to open {}", paths.lock_file.display()))?;
        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "another sync run holds {}; only one writer may touch the destination",
                paths.lock_file.display()
            );
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paths(root: &std::path::Path) -> SyncPaths {
        SyncPaths {
            home: root.to_path_buf(),
            logs_dir: root.join("logs"),
            lock_file: root.join("sync.lock"),
        }
    }

    #[test]
    fn second_holder_is_refused_until_release() {
        let tmp = tempdir().expect("tempdir");
        let paths = paths(tmp.path());
        let first = RunLock::acquire(&paths).expect("first lock");
        let err = RunLock::acquire(&paths).expect_err("contended");
        assert!(format!("{err}").contains("another sync run"));
        drop(first);
        RunLock::acquire(&paths).expect("lock after release");
    }
}
