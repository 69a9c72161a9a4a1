// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

#[allow(clippy::module_name_repetitions)]
pub fn absolute_path<P: AsRef<Path>>(path: P) -> crate::Result<PathBuf> {
    // TODO: replace with https://doc.rust-lang.org/std/path/fn.absolute.html once MSRV >= 1.79
    Ok(path.as_ref().absolutize()?.into())
}

/// Turns an absolute input path into a path relative to the extraction root.
pub fn strip_root(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect()
}
