use crate::compat::CompatibilityMap;
use crate::error::StoreError;
use crate::repository::short_id;
use crate::side::{Side, SidePair};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Marker written for a commit without a compatible counterpart
pub const UNMATCHED: &str = "n/a";

/// Identity of one search run, used to give its result files distinct names
#[derive(Debug, Clone)]
pub struct RunId {
    pub labels: SidePair<String>,
    pub start: SidePair<String>,
}

/// Writes compatibility maps as `key;value` lines, one file per direction
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        ResultStore { dir: dir.as_ref().to_path_buf() }
    }

    /// `match_<key side>_<value side>_<key side start>.csv`. The inverted
    /// file is keyed by side B.
    pub fn destination(&self, run: &RunId, inverted: bool) -> PathBuf {
        let (key, value) = if inverted { (Side::B, Side::A) } else { (Side::A, Side::B) };
        self.dir.join(format!(
            "match_{}_{}_{}.csv",
            run.labels[key],
            run.labels[value],
            short_id(&run.start[key]),
        ))
    }

    pub fn persist(&self, map: &CompatibilityMap, run: &RunId, inverted: bool) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io { path: self.dir.clone(), source })?;
        let path = self.destination(run, inverted);
        write_map(map, &path)?;
        info!("wrote {} records to {}", map.len(), path.display());
        Ok(path)
    }
}

/// Render records newest first, `n/a` for missing values
pub fn render(map: &CompatibilityMap) -> String {
    let mut out = String::new();
    for entry in map.entries() {
        out.push_str(&entry.key);
        out.push(';');
        out.push_str(entry.value.as_deref().unwrap_or(UNMATCHED));
        out.push('\n');
    }
    out
}

pub fn write_map(map: &CompatibilityMap, path: &Path) -> Result<(), StoreError> {
    fs::write(path, render(map)).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

/// Read a file written by [`write_map`] back into a map
pub fn load(path: &Path) -> Result<CompatibilityMap, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    parse(&content, path)
}

fn parse(content: &str, path: &Path) -> Result<CompatibilityMap, StoreError> {
    let mut map = CompatibilityMap::new();

    for (i, line) in content.lines().enumerate() {
        let record = line.trim();
        if record.is_empty() {
            continue;
        }

        let (key, value) = record.split_once(';').ok_or_else(|| StoreError::Malformed {
            path: path.to_path_buf(),
            line: i + 1,
            record: record.to_string(),
        })?;
        let (key, value) = (key.trim(), value.trim());

        if key.is_empty() || key == UNMATCHED {
            warn!("{}:{}: record without key skipped", path.display(), i + 1);
            continue;
        }
        let value = if value.is_empty() || value == UNMATCHED { None } else { Some(value) };

        if !map.insert(key, value) {
            warn!("{}:{}: duplicate key {} ignored", path.display(), i + 1, key);
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn run_id() -> RunId {
        RunId {
            labels: SidePair::new("os".to_string(), "ee".to_string()),
            start: SidePair::new("aaaaaaaaaaaa".to_string(), "bbbbbbbbbbbb".to_string()),
        }
    }

    fn sample() -> CompatibilityMap {
        let mut map = CompatibilityMap::new();
        map.insert("a3", Some("b3"));
        map.mark_unmatched("a2");
        map.insert("a1", Some("b1"));
        map
    }

    #[test]
    fn test_render_layout() {
        assert_eq!(render(&sample()), "a3;b3\na2;n/a\na1;b1\n");
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results"));
        let map = sample();

        let path = store.persist(&map, &run_id(), false).unwrap();
        assert_eq!(load(&path).unwrap(), map);
    }

    #[test]
    fn test_persist_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        let map = sample();

        let path = store.persist(&map, &run_id(), true).unwrap();
        let first = fs::read(&path).unwrap();
        store.persist(&map, &run_id(), true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_directions_use_distinct_files() {
        let store = ResultStore::new("out");
        let forward = store.destination(&run_id(), false);
        let reverse = store.destination(&run_id(), true);
        assert_eq!(forward, PathBuf::from("out/match_os_ee_aaaaaaaa.csv"));
        assert_eq!(reverse, PathBuf::from("out/match_ee_os_bbbbbbbb.csv"));
    }

    #[test]
    fn test_load_skips_blank_and_keyless_records() {
        let map = parse("a1;b1\n\nn/a;b0\na0;n/a\n", Path::new("mem")).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a0").unwrap().value, None);
    }

    #[test]
    fn test_load_rejects_malformed_line() {
        let err = parse("a1;b1\ngarbage\n", Path::new("mem")).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 2, .. }));
    }
}
