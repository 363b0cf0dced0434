//! Per-document file naming and cleanup.
//!
//! Every file a document produces is named `<tag>-<role>.<ext>`, where the
//! tag is derived from the input file stem. Documents of one batch get
//! distinct tags, so concurrent pipelines sharing a working directory never
//! write to the same path.

use crate::error::CleanupWarning;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tag used when an input path has no usable file stem.
const FALLBACK_TAG: &str = "scan";

/// File-name prefix for `input`: its stem, or `scan` if it has none.
pub fn document_tag(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_TAG.to_string())
}

/// Assign a distinct tag to every input, in order.
///
/// The first input with a given stem keeps it; later ones get `-2`, `-3`, …
/// skipping any suffix another input already claimed. Stems are compared
/// ignoring case, as `Scan-A3.png` and `scan-A3.png` are one file on
/// case-insensitive filesystems.
pub fn assign_tags(inputs: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = inputs.iter().map(|p| document_tag(p)).collect();
    // Plain stems are reserved up front so a later "scan-2.pdf" keeps its
    // own name even after two "scan.pdf" inputs.
    let mut taken: HashSet<String> = stems.iter().map(|s| s.to_lowercase()).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(stems.len());
    let mut tags = Vec::with_capacity(stems.len());

    for stem in &stems {
        if seen.insert(stem.to_lowercase()) {
            tags.push(stem.clone());
            continue;
        }
        let mut n = 2;
        let tag = loop {
            let candidate = format!("{stem}-{n}");
            if !taken.contains(&candidate.to_lowercase()) {
                break candidate;
            }
            n += 1;
        };
        taken.insert(tag.to_lowercase());
        tags.push(tag);
    }
    tags
}

/// Every path one document reads or writes after its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentArtifacts {
    pub tag: String,
    /// Page 1 as rendered.
    pub page_one: PathBuf,
    /// Page 2, rotated 180° in place after extraction.
    pub page_two: PathBuf,
    /// Generated ImageJ macro.
    pub stitch_macro: PathBuf,
    /// Raw output of the stitcher.
    pub stitched: PathBuf,
    /// Level-adjusted full-size result.
    pub final_image: PathBuf,
    /// Square variant of `final_image`.
    pub square_image: PathBuf,
}

impl DocumentArtifacts {
    pub fn new(tag: &str, work_dir: &Path, output_dir: &Path) -> Self {
        Self {
            tag: tag.to_string(),
            page_one: work_dir.join(format!("{tag}-1.png")),
            page_two: work_dir.join(format!("{tag}-2.png")),
            stitch_macro: work_dir.join(format!("{tag}-stitch.ijm")),
            stitched: work_dir.join(format!("{tag}-stitched.png")),
            final_image: output_dir.join(format!("{tag}-A3.png")),
            square_image: output_dir.join(format!("{tag}-A3-square.png")),
        }
    }

    /// Files that only exist to feed a later stage.
    pub fn intermediates(&self) -> [&Path; 4] {
        [
            &self.page_one,
            &self.page_two,
            &self.stitch_macro,
            &self.stitched,
        ]
    }

    /// Intermediates currently present on disk.
    pub fn existing_intermediates(&self) -> Vec<PathBuf> {
        self.intermediates()
            .into_iter()
            .filter(|p| p.exists())
            .map(Path::to_path_buf)
            .collect()
    }

    /// Delete every intermediate that exists. Best effort: a file that
    /// cannot be removed becomes a warning and the rest are still tried.
    ///
    /// Returns the removed paths and the warnings.
    pub fn remove_intermediates(&self) -> (Vec<PathBuf>, Vec<CleanupWarning>) {
        let mut removed = Vec::new();
        let mut warnings = Vec::new();

        for path in self.intermediates() {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed.push(path.to_path_buf());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    let warning = CleanupWarning {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    };
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        (removed, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn tag_is_file_stem() {
        assert_eq!(document_tag(Path::new("/scans/131.pdf")), "131");
        assert_eq!(document_tag(Path::new("poster.v2.pdf")), "poster.v2");
        assert_eq!(document_tag(Path::new("/")), "scan");
    }

    #[test]
    fn unique_stems_keep_their_names() {
        assert_eq!(
            assign_tags(&paths(&["a/one.pdf", "b/two.pdf"])),
            vec!["one", "two"]
        );
    }

    #[test]
    fn duplicate_stems_get_suffixes() {
        assert_eq!(
            assign_tags(&paths(&["a/scan.pdf", "b/scan.pdf", "c/scan.pdf"])),
            vec!["scan", "scan-2", "scan-3"]
        );
    }

    #[test]
    fn suffix_skips_names_taken_by_other_inputs() {
        let tags = assign_tags(&paths(&["a/scan.pdf", "b/scan.pdf", "scan-2.pdf"]));
        assert_eq!(tags, vec!["scan", "scan-3", "scan-2"]);
        let unique: HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn stems_differing_only_in_case_are_disambiguated() {
        let tags = assign_tags(&paths(&["a/Scan.pdf", "b/scan.pdf", "SCAN-2.pdf"]));
        assert_eq!(tags, vec!["Scan", "scan-3", "SCAN-2"]);
        let unique: HashSet<_> = tags.iter().map(|t| t.to_lowercase()).collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn artifact_names_derive_from_tag() {
        let a = DocumentArtifacts::new("131", Path::new("/work"), Path::new("/out"));
        assert_eq!(a.page_one, PathBuf::from("/work/131-1.png"));
        assert_eq!(a.page_two, PathBuf::from("/work/131-2.png"));
        assert_eq!(a.stitch_macro, PathBuf::from("/work/131-stitch.ijm"));
        assert_eq!(a.stitched, PathBuf::from("/work/131-stitched.png"));
        assert_eq!(a.final_image, PathBuf::from("/out/131-A3.png"));
        assert_eq!(a.square_image, PathBuf::from("/out/131-A3-square.png"));
    }

    #[test]
    fn remove_intermediates_skips_missing_and_keeps_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = DocumentArtifacts::new("doc", dir.path(), dir.path());
        std::fs::write(&a.page_one, b"x").unwrap();
        std::fs::write(&a.stitched, b"x").unwrap();
        std::fs::write(&a.final_image, b"x").unwrap();

        assert_eq!(a.existing_intermediates().len(), 2);
        let (removed, warnings) = a.remove_intermediates();

        assert_eq!(removed, vec![a.page_one.clone(), a.stitched.clone()]);
        assert!(warnings.is_empty());
        assert!(a.existing_intermediates().is_empty());
        assert!(a.final_image.exists());
    }

    #[test]
    fn undeletable_intermediate_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        let a = DocumentArtifacts::new("doc", dir.path(), dir.path());
        // A non-empty directory where a file is expected cannot be removed
        // with remove_file.
        std::fs::create_dir(&a.stitch_macro).unwrap();
        std::fs::write(a.stitch_macro.join("inner"), b"x").unwrap();
        std::fs::write(&a.page_two, b"x").unwrap();

        let (removed, warnings) = a.remove_intermediates();
        assert_eq!(removed, vec![a.page_two.clone()]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, a.stitch_macro);
    }
}
