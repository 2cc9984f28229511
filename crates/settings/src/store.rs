use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tabcaption_core::OptionValues;
use thiserror::Error;

pub const OPTIONS_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum OptionsStoreError {
    #[error("failed to read options {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse options {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize options {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write options {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("options file {path} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
}

/// 磁碟上的設定檔格式。 / On-disk layout of the options file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOptions {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(flatten)]
    pub values: OptionValues,
}

fn default_version() -> u32 {
    OPTIONS_VERSION
}

impl Default for StoredOptions {
    fn default() -> Self {
        Self {
            version: OPTIONS_VERSION,
            values: OptionValues::default(),
        }
    }
}

impl StoredOptions {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = OPTIONS_VERSION;
        }
        self.values.sanitize();
    }
}

/// 以 JSON 保存標題選項。 / Persists caption options as JSON.
#[derive(Debug)]
pub struct OptionsStore {
    path: PathBuf,
    data: StoredOptions,
}

impl OptionsStore {
    pub fn new(path: impl Into<PathBuf>, values: OptionValues) -> Self {
        let mut data = StoredOptions {
            version: OPTIONS_VERSION,
            values,
        };
        data.sanitize();
        Self {
            path: path.into(),
            data,
        }
    }

    /// 載入設定；檔案不存在時使用預設值。 / Loads options, falling back to defaults when the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsStoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "options file missing, using defaults");
            return Ok(Self {
                path,
                data: StoredOptions::default(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|source| OptionsStoreError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: StoredOptions =
            serde_json::from_str(&contents).map_err(|source| OptionsStoreError::Parse {
                path: path.clone(),
                source,
            })?;
        if data.version > OPTIONS_VERSION {
            return Err(OptionsStoreError::UnsupportedVersion {
                path,
                version: data.version,
            });
        }
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn values(&self) -> &OptionValues {
        &self.data.values
    }

    pub fn version(&self) -> u32 {
        self.data.version
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), OptionsStoreError>
    where
        F: FnMut(&mut OptionValues),
    {
        op(&mut self.data.values);
        self.data.sanitize();
        self.save()
    }

    pub fn overwrite(&mut self, values: OptionValues) -> Result<(), OptionsStoreError> {
        self.data.values = values;
        self.data.sanitize();
        self.save()
    }

    /// 先寫入暫存檔再改名。 / Writes a temporary file, then renames it over the target.
    pub fn save(&self) -> Result<(), OptionsStoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| OptionsStoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = serde_json::to_string_pretty(&self.data).map_err(|source| {
            OptionsStoreError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| OptionsStoreError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| OptionsStoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "options saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
