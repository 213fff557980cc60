//! Record-file codec.
//!
//! Each file holds one EDN record per line. Files are rewritten whole on
//! every mutation — every operation touches multiple fields, and a full
//! rewrite keeps the format trivially append-friendly for hand edits. The
//! replace is atomic: write to a sibling temp file, fsync, rename.

use std::io::Write;
use std::path::Path;

use anyhow::Context;

use crate::edn::{self, Value};

/// Read all records from `path`. A missing file is an empty store; a parse
/// error is fatal and names the file and line.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = edn::parse(line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), lineno + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Atomically replace `path` with the given records, one per line.
pub fn write_records(path: &Path, records: &[Value]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    for record in records {
        writeln!(tmp, "{record}")
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    tmp.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
