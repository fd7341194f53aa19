//! # Annotated Corpus
//!
//! Loads relation-annotated windows from JSON-lines split files and caches
//! the parsed examples next to them, keyed by a hash of the split layout.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{LexError, Result};
use crate::relation::Relation;

/// Bump when the on-disk example layout changes.
pub const CACHE_VERSION: u32 = 1;

/// One annotated window of the corpus.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Example {
    pub text: Vec<String>,
    pub target: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    #[serde(default)]
    pub hypernyms: Vec<String>,
    #[serde(default)]
    pub meronyms: Vec<String>,
}

impl Example {
    /// Raw `"a,b"` entries for a relation.
    pub fn relation(&self, relation: Relation) -> &[String] {
        match relation {
            Relation::Synonym => &self.synonyms,
            Relation::Antonym => &self.antonyms,
            Relation::Hypernym => &self.hypernyms,
            Relation::Meronym => &self.meronyms,
        }
    }
}

/// Train / validation / test examples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusSplits {
    pub train: Vec<Example>,
    pub valid: Vec<Example>,
    pub test: Vec<Example>,
}

/// Locations of the three split files.
#[derive(Debug, Clone)]
pub struct SplitPaths {
    pub dir: PathBuf,
    pub train: PathBuf,
    pub valid: PathBuf,
    pub test: PathBuf,
}

impl SplitPaths {
    /// Standard `train.txt` / `valid.txt` / `test.txt` layout under `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            train: dir.join("train.txt"),
            valid: dir.join("valid.txt"),
            test: dir.join("test.txt"),
            dir,
        }
    }

    /// Content address of the parsed examples for this layout.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}-{}-{}-{}-{}",
                CACHE_VERSION,
                self.dir.display(),
                self.train.display(),
                self.valid.display(),
                self.test.display()
            )
            .as_bytes(),
        );
        format!("{:x}", hasher.finalize())
    }

    /// Where the parsed examples are cached.
    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.cache_key()))
    }
}

/// Parses one JSON-lines split file. Blank lines are skipped.
pub fn load_split<P: AsRef<Path>>(path: P) -> Result<Vec<Example>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut examples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let example: Example =
            serde_json::from_str(line).map_err(|e| LexError::MalformedCorpus {
                path: path.display().to_string(),
                line: idx + 1,
                reason: e.to_string(),
            })?;
        examples.push(example);
    }

    Ok(examples)
}

/// Loads the three splits, preferring the cache unless `reparse` is set.
///
/// A missing or unreadable cache falls back to parsing the split files and
/// rewriting the cache.
pub fn load_corpus(paths: &SplitPaths, reparse: bool) -> Result<CorpusSplits> {
    let cache = paths.cache_path();

    if !reparse {
        match read_cache(&cache) {
            Ok(splits) => {
                info!(path = %cache.display(), "Loaded cached examples");
                return Ok(splits);
            }
            Err(e) => warn!(path = %cache.display(), error = %e, "Example cache unusable, re-parsing"),
        }
    }

    let splits = CorpusSplits {
        train: load_split(&paths.train)?,
        valid: load_split(&paths.valid)?,
        test: load_split(&paths.test)?,
    };
    info!(
        train = splits.train.len(),
        valid = splits.valid.len(),
        test = splits.test.len(),
        "Parsed annotated corpus"
    );

    if let Err(e) = std::fs::write(&cache, serde_json::to_vec(&splits)?) {
        warn!(path = %cache.display(), error = %e, "Could not write example cache");
    }

    Ok(splits)
}

fn read_cache(path: &Path) -> Result<CorpusSplits> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
