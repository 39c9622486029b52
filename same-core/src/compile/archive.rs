//! Pipeline archive packaging
//!
//! Kubeflow accepts a gzipped tarball holding a single workflow document.
//! Header fields that would vary between runs (mtime, owner) are fixed.

use flate2::Compression;
use flate2::GzBuilder;
use flate2::read::GzDecoder;
use std::io::{self, Read, Write};
use std::path::Path;
use tar::{Archive, Builder, Header};

/// Name of the workflow document inside the archive
pub const ARCHIVE_ENTRY: &str = "pipeline.yaml";

pub(super) fn pack(document: &[u8]) -> io::Result<Vec<u8>> {
    let encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let mut header = Header::new_gnu();
    header.set_size(document.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    builder.append_data(&mut header, ARCHIVE_ENTRY, document)?;

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()
}

/// Extract the workflow document from an archive on disk
pub fn read_archive(path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_os_str() == ARCHIVE_ENTRY {
            let mut document = Vec::new();
            entry.read_to_end(&mut document)?;
            return Ok(document);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("archive does not contain {}", ARCHIVE_ENTRY),
    ))
}
