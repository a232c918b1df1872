use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::Context;
use compress_io::compress::CompressIo;
use utils::get_next_line;

use crate::config::Contig;

/// Chromosome sizes for a run
///
/// Loaded once from a tab separated name<TAB>length file and read only
/// afterwards.  Reads mapped to chromosomes that do not appear here are
/// silently skipped during counting.
pub struct Genome {
    chroms: HashMap<Contig, usize>,
}

impl Genome {
    pub fn new() -> Self {
        Self {
            chroms: HashMap::new(),
        }
    }

    pub fn add_contig(&mut self, name: &str, len: usize) {
        if self.chroms.insert(Arc::from(name), len).is_some() {
            warn!("Duplicate chromosome {} in genome size table", name)
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chroms.contains_key(name)
    }

    pub fn contig(&self, name: &str) -> Option<&Contig> {
        self.chroms.get_key_value(name).map(|(k, _)| k)
    }

    pub fn length(&self, name: &str) -> Option<usize> {
        self.chroms.get(name).copied()
    }

    pub fn n_chroms(&self) -> usize {
        self.chroms.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Contig, usize)> {
        self.chroms.iter().map(|(k, &v)| (k, v))
    }

    /// Approximate genome wide window count, used as the denominator for
    /// multiple testing correction
    pub fn n_windows(&self, step_size: usize) -> u64 {
        self.chroms
            .values()
            .map(|&l| ((l + step_size - 1) / step_size) as u64)
            .sum()
    }
}

/// Read in a chromosome size table.  Each line should contain the
/// chromosome name and its length in base pairs; a line that cannot be
/// parsed aborts the run.
pub fn read_genome_file<P: AsRef<Path>>(fname: P) -> anyhow::Result<Genome> {
    debug!(
        "Reading in chromosome sizes from {}",
        fname.as_ref().display()
    );

    let mut rdr = CompressIo::new().path(&fname).bufreader()?;

    let mut buf = String::new();
    let mut line = 0;
    let mut genome = Genome::new();
    while let Some(fields) = get_next_line(&mut rdr, &mut buf).with_context(|| {
        format!(
            "Error after reading {} lines from {}",
            line,
            fname.as_ref().display()
        )
    })? {
        line += 1;
        // Allow blank lines but nothing else that is not a (name, length) pair
        if fields.len() == 1 && fields[0].is_empty() {
            continue;
        }
        if fields.len() < 2 {
            return Err(anyhow!(
                "{}:{} Missing chromosome length",
                fname.as_ref().display(),
                line
            ));
        }
        let l = fields[1].parse::<usize>().with_context(|| {
            format!(
                "{}:{} Error reading length for chromosome {}",
                fname.as_ref().display(),
                line,
                fields[0]
            )
        })?;
        genome.add_contig(fields[0], l);
    }

    if genome.n_chroms() == 0 {
        Err(anyhow!(
            "No chromosomes found in {}",
            fname.as_ref().display()
        ))
    } else {
        debug!("Found {} chromosomes", genome.n_chroms());
        Ok(genome)
    }
}
