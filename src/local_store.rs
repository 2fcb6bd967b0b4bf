use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http_cache::app_cache_dir;

const STORAGE_FILE: &str = "local_storage.json";

pub const GUEST_FAVORITES_KEY: &str = "guestFavorites";
pub const GUEST_ONBOARDING_KEY: &str = "guestOnboardingComplete";

/// Device-local key/value storage used when nobody is signed in.
///
/// Every `set`/`remove` rewrites the whole file through a temp file and rename.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Option<Self> {
        app_cache_dir().map(|dir| Self::open(dir.join(STORAGE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let map = self.load();
        let value = map.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut map = self.load();
        let value = serde_json::to_value(value).context("serialize local storage value")?;
        map.insert(key.to_string(), value);
        self.save(&map)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.load();
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.save(&map)
    }

    pub fn onboarding_complete(&self) -> bool {
        self.get::<bool>(GUEST_ONBOARDING_KEY).unwrap_or(false)
    }

    pub fn mark_onboarding_complete(&self) -> Result<()> {
        self.set(GUEST_ONBOARDING_KEY, &true)
    }

    fn load(&self) -> BTreeMap<String, Value> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    fn save(&self, map: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).ok();
        }
        let json = serde_json::to_string(map).context("serialize local storage")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context("write local storage")?;
        fs::rename(&tmp, &self.path).context("swap local storage")?;
        Ok(())
    }
}
