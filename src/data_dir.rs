use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Where the engine keeps its persistent corpus.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path from the host application
    /// 2. The SLIPSTACK_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/slipstack/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("SLIPSTACK_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("slipstack")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the combined document + embedding database.
    pub fn store_path(&self) -> PathBuf {
        self.root.join("receipts.redb")
    }
}
