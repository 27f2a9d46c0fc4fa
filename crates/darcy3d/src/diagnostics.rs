//! Plain-text field dumps for debugging.
//!
//! One block per z slice from the top ghost layer down to the bottom one.
//! Inside a block, rows run from high y to low y and columns from low x to
//! high x, so a slice reads like a map. Ghost values are wrapped in brackets.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::FluidResult;
use crate::field::{Field, FieldValue};

fn format_value<T: FieldValue>(value: &T) -> String {
    let components = value.components();
    let parts: Vec<String> = components[..T::ARITY]
        .iter()
        .map(|c| format!("{c:.4e}"))
        .collect();
    if T::ARITY == 1 {
        parts[0].clone()
    } else {
        format!("({})", parts.join(", "))
    }
}

/// Write every value of `field`, ghosts included, to `out`.
pub fn write_field<W: Write, T: FieldValue>(out: &mut W, field: &Field<T>) -> FluidResult<()> {
    let layout = field.layout();
    let top_x = layout.padded_x() as i32 - 2;
    let top_y = layout.padded_y() as i32 - 2;
    let top_z = layout.padded_z() as i32 - 2;

    writeln!(out, "# {}", field.name())?;
    for z in (-1..=top_z).rev() {
        writeln!(out, "z = {z}")?;
        for y in (-1..=top_y).rev() {
            let row: Vec<String> = (-1..=top_x)
                .map(|x| {
                    let text = format_value(&field.at(x, y, z));
                    if layout.is_interior(x, y, z) {
                        format!(" {text} ")
                    } else {
                        format!("[{text}]")
                    }
                })
                .collect();
            writeln!(out, "{}", row.join(" "))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Dump `field` to the file at `path`, replacing it if present.
pub fn write_field_file<T: FieldValue>(path: impl AsRef<Path>, field: &Field<T>) -> FluidResult<()> {
    let path = path.as_ref();
    let mut out = BufWriter::new(File::create(path)?);
    write_field(&mut out, field)?;
    out.flush()?;
    log::debug!("wrote field `{}` to {}", field.name(), path.display());
    Ok(())
}
