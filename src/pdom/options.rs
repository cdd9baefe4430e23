use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::DatabaseOptions;
use crate::types::{PdomError, Result};

/// Default number of records visited between two cancellation checks.
pub const DEFAULT_CANCELLATION_POLL_INTERVAL: u32 = 1000;
/// Default number of names added between two write-lock yields.
pub const DEFAULT_YIELD_INTERVAL: u32 = 100;

/// Configuration of an index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdomOptions {
    /// Options of the underlying heap.
    #[serde(skip)]
    pub database: DatabaseOptions,
    /// Entries of the name to bindings cache of each linkage; zero disables it.
    pub binding_cache_capacity: usize,
    /// Entries of the name to macro container cache; zero disables it.
    pub macro_cache_capacity: usize,
    /// Entries of the decoded location cache; zero disables it.
    pub location_cache_capacity: usize,
    /// Records a collector visits between two checks of its cancellation flag.
    pub cancellation_poll_interval: u32,
    /// Names `File::add_names` stores between two write-lock yields.
    pub yield_interval: u32,
    /// Root that `<WS>` locations are relative to.
    pub workspace_root: Option<PathBuf>,
}

impl Default for PdomOptions {
    fn default() -> Self {
        Self {
            database: DatabaseOptions::default(),
            binding_cache_capacity: 512,
            macro_cache_capacity: 256,
            location_cache_capacity: 1024,
            cancellation_poll_interval: DEFAULT_CANCELLATION_POLL_INTERVAL,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            workspace_root: None,
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigFile {
    index: PdomOptions,
    database: DatabaseOptions,
}

impl PdomOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from TOML with optional `[index]` and `[database]` tables.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|err| PdomError::Config(err.to_string()))?;
        let mut options = file.index;
        options.database = file.database;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|err| PdomError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Renders the options as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        let file = ConfigFile {
            index: self.clone(),
            database: self.database.clone(),
        };
        toml::to_string_pretty(&file).map_err(|err| PdomError::Config(err.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.cancellation_poll_interval == 0 {
            return Err(PdomError::Config(
                "cancellation_poll_interval must be positive".into(),
            ));
        }
        if self.yield_interval == 0 {
            return Err(PdomError::Config("yield_interval must be positive".into()));
        }
        Ok(())
    }

    /// Sets the heap options.
    pub fn database(mut self, database: DatabaseOptions) -> Self {
        self.database = database;
        self
    }

    /// Sets the binding cache capacity; zero disables the cache.
    pub fn binding_cache_capacity(mut self, entries: usize) -> Self {
        self.binding_cache_capacity = entries;
        self
    }

    /// Sets the macro container cache capacity; zero disables the cache.
    pub fn macro_cache_capacity(mut self, entries: usize) -> Self {
        self.macro_cache_capacity = entries;
        self
    }

    /// Sets the location cache capacity; zero disables the cache.
    pub fn location_cache_capacity(mut self, entries: usize) -> Self {
        self.location_cache_capacity = entries;
        self
    }

    /// Sets how many records are visited between cancellation checks.
    pub fn cancellation_poll_interval(mut self, records: u32) -> Self {
        self.cancellation_poll_interval = records.max(1);
        self
    }

    /// Sets how many names are stored between write-lock yields.
    pub fn yield_interval(mut self, names: u32) -> Self {
        self.yield_interval = names.max(1);
        self
    }

    /// Sets the workspace root used by the location converter.
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let options = PdomOptions::from_toml_str("[index]\nyield_interval = 7\n").unwrap();
        assert_eq!(options.yield_interval, 7);
        assert_eq!(
            options.cancellation_poll_interval,
            DEFAULT_CANCELLATION_POLL_INTERVAL
        );
        assert_eq!(options.database, DatabaseOptions::default());
    }

    #[test]
    fn database_table_is_read() {
        let options = PdomOptions::from_toml_str(
            "[database]\nmax_size = 65536\nverify_header_checksum = false\n",
        )
        .unwrap();
        assert_eq!(options.database.max_size, 65536);
        assert!(!options.database.verify_header_checksum);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = PdomOptions::from_toml_str("[index]\nyield_interval = 0\n").unwrap_err();
        assert!(matches!(err, PdomError::Config(_)));
        assert!(PdomOptions::from_toml_str("[index]\nbogus = [").is_err());
    }

    #[test]
    fn rendered_options_parse_back() {
        let options = PdomOptions::default()
            .binding_cache_capacity(0)
            .workspace_root("/work");
        let text = options.to_toml_string().unwrap();
        assert_eq!(PdomOptions::from_toml_str(&text).unwrap(), options);
    }
}
