//! ZIP packaging of fetched documents

use std::collections::HashSet;
use std::io::{Cursor, Write};

use tracing::debug;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::error::Result;
use crate::progress::{ProgressSink, percent};
use crate::types::FetchedDocument;
use crate::utils::{sanitize_filename, unique_entry_name};

/// Write `documents` into a Deflate-compressed ZIP, one entry per document, in slice order
///
/// Entry names are the sanitized request filenames, de-duplicated with ` (n)`
/// suffixes. Bytes are stored as fetched; content is never inspected.
pub fn build_archive(
    documents: &[FetchedDocument],
    compression_level: i32,
    progress: &dyn ProgressSink,
) -> Result<Vec<u8>> {
    let total = documents.len();
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level))
            .unix_permissions(0o644);

        let mut taken = HashSet::with_capacity(total);
        for (i, document) in documents.iter().enumerate() {
            let mut name = sanitize_filename(&document.request.filename);
            if name.is_empty() {
                name = format!("label_{}.pdf", document.request.original_index + 1);
            }
            let name = unique_entry_name(&name, &mut taken);

            zip.start_file(name.as_str(), options)?;
            zip.write_all(&document.bytes)?;
            debug!(entry = %name, size = document.bytes.len(), "added archive entry");

            progress.report(
                i + 1,
                total,
                &format!("Compressing... {:.0}%", percent(i + 1, total)),
            );
        }

        zip.finish()?;
    }
    Ok(buffer)
}
