//! Corpus directory scanning.
//!
//! Lists the eligible plain-text files under `[corpus].dir` and loads them
//! as [`Document`]s. Include globs are matched against the path relative to
//! the corpus root with `*` not crossing `/`, so the default `*.txt` only
//! picks up top-level files.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use aula_retrieval_core::fingerprint::{content_hash, FingerprintEntry};
use aula_retrieval_core::models::Document;
use aula_retrieval_core::subject::SubjectClassifier;
use aula_retrieval_core::RetrievalError;

use crate::config::CorpusConfig;

/// An eligible file, before it is read.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub path: PathBuf,
    /// Path relative to the corpus root, `/`-separated. Used as the
    /// document's identity everywhere.
    pub relative: String,
    pub size: u64,
    pub modified_time: i64,
}

impl CorpusFile {
    /// File name without directories, the input to subject classification.
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }
}

/// List eligible files, sorted by relative path.
///
/// A path must match an include glob and no exclude glob. Hidden files and
/// `.git` are always excluded.
///
/// Fails with [`RetrievalError::CorpusNotFound`] if the directory is missing.
pub fn scan_corpus(config: &CorpusConfig) -> Result<Vec<CorpusFile>> {
    let root = &config.dir;
    if !root.is_dir() {
        return Err(RetrievalError::CorpusNotFound(root.clone()).into());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/.*".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %rel_str, error = %e, "skipping file without metadata");
                continue;
            }
        };
        let modified_time = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        files.push(CorpusFile {
            path: path.to_path_buf(),
            relative: rel_str,
            size: metadata.len(),
            modified_time,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(files)
}

/// Read a file and compute its fingerprint.
pub fn fingerprint_file(file: &CorpusFile) -> Result<FingerprintEntry> {
    let bytes = read_bytes(&file.path)?;
    Ok(FingerprintEntry {
        filename: file.relative.clone(),
        content_hash: content_hash(&bytes),
        modified_time: file.modified_time,
        size: bytes.len() as u64,
    })
}

/// Read a file as a [`Document`], classifying its subject by file name.
///
/// Byte sequences that are not valid UTF-8 are dropped, so a Latin-1 lesson
/// still loads with its ASCII text intact.
pub fn load_document(file: &CorpusFile, classifier: &SubjectClassifier) -> Result<Document> {
    let bytes = read_bytes(&file.path)?;
    let content_hash = content_hash(&bytes);
    let size = bytes.len() as u64;
    let raw_text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                file = %file.relative,
                "file is not valid UTF-8, dropping undecodable bytes"
            );
            String::from_utf8_lossy(e.as_bytes()).replace(char::REPLACEMENT_CHARACTER, "")
        }
    };

    Ok(Document {
        path: file.relative.clone(),
        raw_text,
        subject: classifier.classify(file.file_name()).to_string(),
        content_hash,
        size,
        modified_time: file.modified_time,
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .with_context(|| format!("Invalid glob pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus_config(dir: &Path) -> CorpusConfig {
        CorpusConfig {
            dir: dir.to_path_buf(),
            include_globs: vec!["*.txt".to_string()],
            exclude_globs: Vec::new(),
        }
    }

    #[test]
    fn test_scan_top_level_txt_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("matematicas.txt"), "uno").unwrap();
        fs::write(tmp.path().join("ingles.txt"), "two").unwrap();
        fs::write(tmp.path().join("notas.md"), "# no").unwrap();
        fs::write(tmp.path().join(".oculto.txt"), "no").unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/anidado.txt"), "no").unwrap();

        let files = scan_corpus(&corpus_config(tmp.path())).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["ingles.txt", "matematicas.txt"]);
        assert_eq!(files[1].size, 3);
    }

    #[test]
    fn test_recursive_glob_and_excludes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("grado3")).unwrap();
        fs::write(tmp.path().join("grado3/sociales.txt"), "x").unwrap();
        fs::write(tmp.path().join("borrador.txt"), "x").unwrap();

        let config = CorpusConfig {
            dir: tmp.path().to_path_buf(),
            include_globs: vec!["**/*.txt".to_string()],
            exclude_globs: vec!["borrador*".to_string()],
        };
        let files = scan_corpus(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "grado3/sociales.txt");
        assert_eq!(files[0].file_name(), "sociales.txt");
    }

    #[test]
    fn test_missing_corpus_is_typed_error() {
        let tmp = TempDir::new().unwrap();
        let err = scan_corpus(&corpus_config(&tmp.path().join("nope"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RetrievalError>(),
            Some(RetrievalError::CorpusNotFound(_))
        ));
    }

    #[test]
    fn test_load_document_and_fingerprint_agree() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("ciencias_naturales.txt"), "Las plantas").unwrap();
        let files = scan_corpus(&corpus_config(tmp.path())).unwrap();

        let doc = load_document(&files[0], &SubjectClassifier::default()).unwrap();
        let entry = fingerprint_file(&files[0]).unwrap();
        assert_eq!(doc.subject, "ciencias_naturales");
        assert_eq!(doc.raw_text, "Las plantas");
        assert_eq!(doc.content_hash, entry.content_hash);
        assert_eq!(entry.size, 11);
    }

    #[test]
    fn test_invalid_utf8_bytes_dropped() {
        let tmp = TempDir::new().unwrap();
        // "Mañana" in Latin-1.
        fs::write(tmp.path().join("ingles.txt"), b"Ma\xf1ana llueve").unwrap();
        let files = scan_corpus(&corpus_config(tmp.path())).unwrap();

        let doc = load_document(&files[0], &SubjectClassifier::default()).unwrap();
        let entry = fingerprint_file(&files[0]).unwrap();
        assert_eq!(doc.raw_text, "Maana llueve");
        assert_eq!(doc.size, 13);
        assert_eq!(doc.content_hash, entry.content_hash);
    }
}
