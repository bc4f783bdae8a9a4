//! Whole-file read and write helpers.

use std::{fs, io::Write, path::Path};

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Read the entire content of the given file into memory.
///
/// Missing files result in an [`Error::AudioFileNotFound`], other failures in an
/// [`Error::IoError`]. Callers decide if they skip the operation which needed the file.
pub fn read_entire_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, Error> {
    let path = path.as_ref();
    fs::read(path).map_err(|err| {
        log::warn!("Failed to read file '{}': {err}", path.display());
        Error::from(err)
    })
}

/// Create or replace the given file with the given content.
pub fn write_entire_file<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<(), Error> {
    let path = path.as_ref();
    let mut file = fs::File::create(path)?;
    file.write_all(content)?;
    file.flush()?;
    Ok(())
}

// -------------------------------------------------------------------------------------------------
