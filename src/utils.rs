//! Utility functions for the Docent CLI

use std::path::Path;

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

/// Binary units, one decimal
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Recursive size of a directory; a missing directory is 0
pub fn dir_size(path: &Path) -> std::io::Result<u64> {
    if !path.is_dir() {
        return Ok(0);
    }
    std::fs::read_dir(path)?.try_fold(0, |total, entry| {
        let entry = entry?;
        let size = if entry.file_type()?.is_dir() {
            dir_size(&entry.path())?
        } else {
            entry.metadata()?.len()
        };
        Ok(total + size)
    })
}

/// Bytes used by the LanceDB tables (`*.lance`)
pub fn lance_db_size(data_path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(data_path.join(docent::VECTORS_DIR)) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.extension().is_some_and(|ext| ext == "lance"))
        .map(|path| dir_size(&path).unwrap_or(0))
        .sum()
}

/// A model snapshot in the HuggingFace cache
#[derive(Debug, Clone)]
pub struct CachedModel {
    /// `org/name`
    pub name: String,
    pub size_bytes: u64,
}

/// Models under `~/.cache/huggingface/hub`, largest first
pub fn scan_hf_cache() -> Vec<CachedModel> {
    let Some(hub) = dirs::home_dir().map(|h| h.join(".cache").join("huggingface").join("hub")) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(&hub) else {
        return Vec::new();
    };

    let mut models: Vec<CachedModel> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            // models--org--name
            let repo = path.file_name()?.to_str()?.strip_prefix("models--")?.replace("--", "/");
            path.is_dir().then(|| CachedModel {
                name: repo,
                size_bytes: dir_size(&path).unwrap_or(0),
            })
        })
        .collect();

    models.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    models
}

/// Size of everything Docent keeps under the data directory
pub fn data_size(data_path: &Path) -> DataSize {
    DataSize {
        vectors: lance_db_size(data_path),
        records: std::fs::metadata(docent::records_path(data_path))
            .map(|m| m.len())
            .unwrap_or(0),
        documents: dir_size(&data_path.join(docent::DOCUMENTS_DIR)).unwrap_or(0),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DataSize {
    pub vectors: u64,
    pub records: u64,
    pub documents: u64,
}

impl DataSize {
    pub fn total(&self) -> u64 {
        self.vectors + self.records + self.documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn test_expand_path_leaves_plain_paths() {
        assert_eq!(expand_path("/tmp/docent"), "/tmp/docent");
        assert_eq!(expand_path("relative/dir"), "relative/dir");
    }

    #[test]
    fn test_data_size_counts_each_store() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join(docent::VECTORS_DIR).join("knowledge_base.lance");
        std::fs::create_dir_all(&table).unwrap();
        std::fs::write(table.join("data"), vec![0u8; 100]).unwrap();
        std::fs::write(docent::records_path(dir.path()), vec![0u8; 10]).unwrap();
        std::fs::create_dir_all(dir.path().join(docent::DOCUMENTS_DIR)).unwrap();
        std::fs::write(dir.path().join(docent::DOCUMENTS_DIR).join("a.pdf"), vec![0u8; 5]).unwrap();

        let size = data_size(dir.path());
        assert_eq!(size, DataSize { vectors: 100, records: 10, documents: 5 });
        assert_eq!(size.total(), 115);
    }
}
