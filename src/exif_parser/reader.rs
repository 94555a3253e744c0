use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::metadata::MetadataMap;

/// Reads every primary-image tag from `path`.
///
/// Screenshots and edited exports often carry no EXIF at all, so a missing
/// block, an unreadable file or a broken container all give an empty map.
/// When only part of the EXIF data is damaged the readable fields are kept.
pub fn read_metadata(path: &Path) -> MetadataMap {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("Cannot open {} for metadata: {}", path.display(), e);
            return MetadataMap::new();
        }
    };

    let mut buf_reader = BufReader::new(file);
    let mut exif_reader = exif::Reader::new();
    exif_reader.continue_on_error(true); // Tolerate non-standard EXIF structures

    match exif_reader.read_from_container(&mut buf_reader) {
        Ok(exif) => MetadataMap::from_exif(&exif),
        Err(exif::Error::PartialResult(partial)) => {
            let (exif, errors) = partial.into_inner();
            tracing::debug!(
                "Partial EXIF in {} ({} errors ignored)",
                path.display(),
                errors.len()
            );
            MetadataMap::from_exif(&exif)
        }
        Err(e) => {
            tracing::debug!("No readable metadata in {}: {}", path.display(), e);
            MetadataMap::new()
        }
    }
}
