// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Header serialization.
//!
//! The artifact is a single include-guarded C header with one zero-argument
//! macro per sequence:
//!
//! ```c
//! #ifndef FLOWER_BLOCKS_H
//! #define FLOWER_BLOCKS_H
//!
//! #define FLOWER_BLOCK_001() __asm__ __volatile__("..." ::: "memory", "cc")
//!
//! #endif // FLOWER_BLOCKS_H
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::config::EmitConfig;
use crate::error::EmitError;
use crate::sequence::SequenceCollection;

/// Include guard for a namespace, e.g. `FLOWER_BLOCKS_H`.
pub fn guard_name(prefix: &str) -> String {
    format!("{prefix}_BLOCKS_H")
}

/// Macro name of the sequence at 1-based `index`, zero-padded to three digits.
pub fn unit_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_BLOCK_{index:03}")
}

/// Renders the whole header in memory.
pub fn render_header(collection: &SequenceCollection, config: &EmitConfig) -> String {
    let guard = guard_name(config.prefix());
    let mut output = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(output, "#ifndef {guard}");
    let _ = writeln!(output, "#define {guard}\n");
    for (index, sequence) in collection.numbered() {
        let _ = writeln!(
            output,
            "#define {}() {}\n",
            unit_name(config.prefix(), index),
            sequence.inline_asm(config.jump_style)
        );
    }
    let _ = writeln!(output, "\n#endif // {guard}");

    output
}

/// Writes a rendered header to `path`, replacing any existing file.
pub fn write_artifact(path: &Path, contents: &str) -> Result<(), EmitError> {
    fs::write(path, contents).map_err(|source| EmitError::Write {
        path: path.to_path_buf(),
        source,
    })
}
