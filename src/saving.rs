use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::table::DataTable;

/// Write columns and rows as gzip-compressed JSON. Listeners and undo
/// history are not saved.
pub fn save_table(table: &DataTable, path: impl AsRef<Path>) -> std::io::Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serde_json::to_writer(&mut writer, table)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .finish()?;
    Ok(())
}

pub fn load_table(path: impl AsRef<Path>) -> std::io::Result<DataTable> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let reader = BufReader::new(decoder);

    let table: DataTable = serde_json::from_reader(reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(table)
}
