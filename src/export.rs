use std::fs;
use std::path::Path;

use tracing::*;

use crate::{Composed, GridError, Piece};

/// Writes every piece's encoded bytes into `output_dir`, creating the
/// directory if needed. File names come from [`Piece::filename`], so they
/// are stable and collision-free within one cut.
///
/// # Errors
/// Returns [`GridError::ExportFailure`] on the first write that fails; files
/// already written are left in place.
pub fn export_pieces(pieces: &[Piece], output_dir: impl AsRef<Path>) -> Result<(), GridError> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).map_err(|e| GridError::ExportFailure(e.to_string()))?;
    for piece in pieces {
        let path = output_dir.join(&piece.filename);
        trace!("Writing piece to {:?}", path);
        fs::write(&path, &piece.encoded).map_err(|e| GridError::ExportFailure(e.to_string()))?;
    }
    debug!("Exported {} pieces to {:?}", pieces.len(), output_dir);
    Ok(())
}

/// Writes a composed image's encoded bytes to `output_path`.
///
/// # Errors
/// Returns [`GridError::ExportFailure`] if the file cannot be written.
pub fn export_composed(composed: &Composed, output_path: impl AsRef<Path>) -> Result<(), GridError> {
    let output_path = output_path.as_ref();
    trace!("Writing composed image to {:?}", output_path);
    fs::write(output_path, &composed.encoded).map_err(|e| GridError::ExportFailure(e.to_string()))
}
