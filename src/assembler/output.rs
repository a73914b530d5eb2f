// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Output files: Intel HEX images, map and listing.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::assembler::error::PassCounts;
use crate::core::assembler::listing::ListingWriter;
use crate::core::imagestore::ImageStore;

use super::{AsmConfig, Assembler, VERSION};

/// Create the listing file and write its header.
pub(super) fn open_listing(path: &Path) -> io::Result<ListingWriter<Box<dyn Write>>> {
    let file = File::create(path).map_err(|err| annotate(path, err))?;
    let out: Box<dyn Write> = Box::new(BufWriter::new(file));
    let mut listing = ListingWriter::new(out);
    listing.header(&format!("avrforge AVR Assembler v{VERSION}"))?;
    Ok(listing)
}

/// Finish the listing and write the images and the map file.
pub(super) fn write_outputs(
    config: &AsmConfig,
    asm: &Assembler,
    listing: Option<ListingWriter<Box<dyn Write>>>,
    counts: &PassCounts,
) -> io::Result<()> {
    if let Some(mut listing) = listing {
        listing.footer(counts, &asm.segments)?;
        listing.flush()?;
    }
    write_hex(&config.hex_path, &asm.code)?;
    write_hex(&config.eep_path, &asm.eeprom)?;
    if let Some(path) = &config.map_path {
        let mut out = BufWriter::new(File::create(path).map_err(|err| annotate(path, err))?);
        asm.symbols.write_map(&mut out)?;
        out.flush()?;
        debug!(path = %path.display(), "map written");
    }
    Ok(())
}

fn write_hex(path: &Path, image: &ImageStore) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path).map_err(|err| annotate(path, err))?);
    image.write_hex_file(&mut out)?;
    out.flush()?;
    debug!(path = %path.display(), bytes = image.num_entries(), "image written");
    Ok(())
}

fn annotate(path: &Path, err: io::Error) -> io::Error {
    io::Error::new(
        err.kind(),
        format!("Error opening file {} for write: {err}", path.display()),
    )
}

/// Remove outputs left over from an earlier run.
pub(super) fn remove_outputs(config: &AsmConfig) {
    let paths = [
        Some(&config.hex_path),
        Some(&config.eep_path),
        config.list_path.as_ref(),
        config.map_path.as_ref(),
    ];
    for path in paths.into_iter().flatten() {
        if !path.exists() {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale output"),
            Err(err) => warn!(path = %path.display(), %err, "could not remove output"),
        }
    }
}
