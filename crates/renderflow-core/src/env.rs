//! Per-run output directory context.
//!
//! `RunEnvironment` replaces ambient directory-initialization state: it is
//! constructed once per run, prepared explicitly, and passed to every
//! component that writes files. Steps write their artifacts into the
//! fixed subdirectory layout below the run's output directory.

use std::io;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// RunEnvironment
// ---------------------------------------------------------------------------

/// Filesystem context for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunEnvironment {
    output_dir: PathBuf,
}

impl RunEnvironment {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Create the output directory and all step subdirectories.
    pub fn prepare(&self) -> io::Result<()> {
        for dir in [
            self.output_dir.clone(),
            self.cuts_dir(),
            self.audio_dir(),
            self.background_dir(),
            self.composition_dir(),
            self.final_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Cropped region images.
    pub fn cuts_dir(&self) -> PathBuf {
        self.output_dir.join("cuts")
    }

    /// Synthesized narration audio.
    pub fn audio_dir(&self) -> PathBuf {
        self.output_dir.join("audio")
    }

    /// Generated background clips.
    pub fn background_dir(&self) -> PathBuf {
        self.output_dir.join("background")
    }

    /// Intermediate composition artifacts.
    pub fn composition_dir(&self) -> PathBuf {
        self.output_dir.join("composition")
    }

    /// Final rendered output.
    pub fn final_dir(&self) -> PathBuf {
        self.output_dir.join("final")
    }

    /// Where the run record JSON is written after each run.
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("execution_report.json")
    }
}

// ---------------------------------------------------------------------------
// Filename helpers
// ---------------------------------------------------------------------------

/// Reduce an arbitrary string to a filesystem-safe file stem:
/// alphanumerics pass through, everything else collapses to `_`.
pub fn safe_file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("untitled");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
