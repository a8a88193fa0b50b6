//! Flat text dumps of the sample and press tables for offline inspection

use crate::analysis::{PressTable, SampleTable};
use crate::error::Result as PianoResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn create(path: &Path) -> PianoResult<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

fn write_header<W: Write>(out: &mut W, names: impl Iterator<Item = String>) -> PianoResult<()> {
    write!(out, "frame")?;
    for name in names {
        write!(out, "\t{}", name)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Write `table` as tab-separated rows of `h:s:v` cells, one row per frame
pub fn write_sample_table<P: AsRef<Path>>(table: &SampleTable, path: P) -> PianoResult<()> {
    let mut out = create(path.as_ref())?;
    write_header(&mut out, (0..table.n_keys()).map(|col| table.column_name(col)))?;

    for frame in 0..table.n_frames() {
        write!(out, "{}", frame)?;
        for col in 0..table.n_keys() {
            let hsv = table.get(frame, col);
            write!(out, "\t{}:{}:{}", hsv.h, hsv.s, hsv.v)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Write `table` as tab-separated rows of state codes (0 unpressed, 1 left, 2 right)
pub fn write_press_table<P: AsRef<Path>>(table: &PressTable, path: P) -> PianoResult<()> {
    let mut out = create(path.as_ref())?;
    write_header(&mut out, (0..table.n_keys()).map(|col| table.column_name(col)))?;

    for (frame, row) in table.states().rows().into_iter().enumerate() {
        write!(out, "{}", frame)?;
        for state in row {
            write!(out, "\t{}", state.code())?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
