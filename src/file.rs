// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Error;
use std::{fs::File, io::Write, path::Path};

pub const METADATA_FILE: &str = "metadata";
pub const METADATA_DB_FILE: &str = "metadata.db";
pub const LOGTYPE_DICT_FILE: &str = "logtype.dict";
pub const LOGTYPE_SEGINDEX_FILE: &str = "logtype.segindex";
pub const VAR_DICT_FILE: &str = "var.dict";
pub const VAR_SEGINDEX_FILE: &str = "var.segindex";
pub const SCHEMA_FILE: &str = "schema.txt";
pub const GLOBAL_DB_FILE: &str = "global.db";

/// Atomically rewrites a file
pub fn rewrite_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> crate::Result<()> {
    let path = path.as_ref();
    let folder = path
        .parent()
        .ok_or(Error::BadParam("path has no parent directory"))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.persist(path)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = File::open(path)?;
        file.sync_all()?;
    }

    Ok(())
}

/// Syncs a directory, so newly created entries are durable
pub fn fsync_directory<P: AsRef<Path>>(path: P) -> crate::Result<()> {
    #[cfg(not(target_os = "windows"))]
    {
        let file = File::open(path)?;
        file.sync_all()?;
    }

    #[cfg(target_os = "windows")]
    {
        let _ = path;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use test_log::test;

    #[test]
    fn atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.txt");

        {
            let mut file = File::create(&path)?;
            write!(file, "asdasdasdasdasd")?;
        }

        rewrite_atomic(&path, b"newcontent")?;

        let mut content = String::new();
        File::open(&path)?.read_to_string(&mut content)?;
        assert_eq!("newcontent", content);

        Ok(())
    }
}
