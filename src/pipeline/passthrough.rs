//! PDF passthrough: the input is already a PDF, so copy it byte-for-byte.
//!
//! No validation happens here; a file named `.pdf` is trusted.

use crate::error::StrategyError;
use crate::store;
use std::fs::File;
use std::path::Path;

pub fn copy_pdf(input: &Path, output: &Path) -> Result<(), StrategyError> {
    let mut source =
        File::open(input).map_err(|e| StrategyError::io("Failed to read input", input, e))?;
    store::persist_with(output, |dest| std::io::copy(&mut source, dest).map(|_| ()))
}
