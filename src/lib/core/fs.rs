use anyhow::Result;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

/// Create parent directories for a path when missing.
pub fn make_parent_dirs<P: AsRef<Path>>(path: P) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Detect whether a path uses a gzip-compatible extension (plain gzip or BGZF).
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> bool {
    matches!(
        path.as_ref().extension().unwrap_or_else(|| OsStr::new("")),
        ext if ext == "gz" || ext == "gzip" || ext == "bgz" || ext == "bgzf"
    )
}

/// File stem with a trailing compression extension removed (`genes.gtf.gz` -> `gtf`).
pub fn inner_extension<P: AsRef<Path>>(path: P) -> Option<String> {
    let path = path.as_ref();
    let stripped = if is_gzipped(path) {
        Path::new(path.file_stem()?)
    } else {
        path
    };
    stripped
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_compressed_extensions() {
        assert!(is_gzipped("genes.gtf.gz"));
        assert!(is_gzipped("reads.bgzf"));
        assert!(!is_gzipped("genes.gtf"));
        assert!(!is_gzipped("no_extension"));
    }

    #[test]
    fn inner_extension_skips_compression_suffix() {
        assert_eq!(inner_extension("a/genes.GTF.gz").as_deref(), Some("gtf"));
        assert_eq!(inner_extension("peaks.bed").as_deref(), Some("bed"));
        assert_eq!(inner_extension("plain"), None);
    }
}
