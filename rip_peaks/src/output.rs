use std::{io::Write, path::Path};

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::{assemble::Peak, config::Contig};

/// Write the final peaks as tab separated chrom / start / end lines.
/// The caller supplies chromosomes in sorted order with peaks ascending
/// by start.
pub fn write_peaks(path: Option<&Path>, peaks: &[(Contig, Vec<Peak>)]) -> anyhow::Result<()> {
    let mut wrt = CompressIo::new()
        .opt_path(path)
        .bufwriter()
        .with_context(|| "Failed to open output file")?;

    for (chrom, v) in peaks {
        for p in v {
            writeln!(wrt, "{}\t{}\t{}", chrom, p.start, p.end)?;
        }
    }
    Ok(())
}
