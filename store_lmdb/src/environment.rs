//! LMDB environment setup.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::LmdbError;

/// Wraps one LMDB environment (one directory on disk).
pub struct LmdbEnvironment {
    env: Env,
    path: PathBuf,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given directory.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: each store is the sole owner of its directory and never opens
        // the same path twice in one process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)?
        };
        tracing::debug!(path = %path.display(), map_size, max_dbs, "opened LMDB environment");
        Ok(Self {
            env,
            path: path.to_path_buf(),
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a named database, creating it if missing.
    pub fn create_database(&self, name: &str) -> Result<Database<Bytes, Bytes>, LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        let db = self.env.create_database::<Bytes, Bytes>(&mut wtxn, Some(name))?;
        wtxn.commit()?;
        Ok(db)
    }

    /// Close the environment and wait until LMDB has released the files.
    pub fn close(self) {
        let path = self.path;
        self.env.prepare_for_closing().wait();
        tracing::debug!(path = %path.display(), "closed LMDB environment");
    }
}
