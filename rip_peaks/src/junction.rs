use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use coitrees::{COITree, IntervalNode, IntervalTree};
use compress_io::compress::CompressIo;
use utils::get_next_line;

use crate::{config::Contig, genome::Genome};

/// A splice junction flanking interval, half open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flank {
    pub start: i64,
    pub end: i64,
}

/// Junction annotation for one chromosome: the deduplicated flanking
/// intervals with an overlap index, and the (start, end) pairs that
/// generated them.  Immutable once built; per flank state (counts,
/// p-values) lives in vectors owned by each pipeline phase, indexed by
/// the flank slot stored as tree metadata.
pub struct JunctionIndex {
    flanks: Vec<Flank>,
    tree: COITree<usize, u32>,
    pairs: HashMap<i64, HashSet<i64>>,
}

impl JunctionIndex {
    pub fn n_flanks(&self) -> usize {
        self.flanks.len()
    }

    pub fn flank(&self, i: usize) -> Flank {
        self.flanks[i]
    }

    pub fn pairs(&self) -> &HashMap<i64, HashSet<i64>> {
        &self.pairs
    }

    /// Collect the slots of all flanks overlapping the half open
    /// interval [start, end)
    pub fn overlaps(&self, start: i64, end: i64, out: &mut HashSet<usize>) {
        if end <= start {
            return;
        }
        self.tree.query(start as i32, (end - 1) as i32, |n| {
            out.insert(n.metadata);
        });
    }
}

struct ChromJunctions {
    flanks: Vec<Flank>,
    flank_slots: HashMap<(i64, i64), usize>,
    pairs: HashMap<i64, HashSet<i64>>,
}

impl ChromJunctions {
    fn new() -> Self {
        Self {
            flanks: Vec::new(),
            flank_slots: HashMap::new(),
            pairs: HashMap::new(),
        }
    }

    fn add_flank(&mut self, start: i64, end: i64) {
        let n = self.flanks.len();
        self.flank_slots.entry((start, end)).or_insert_with(|| {
            self.flanks.push(Flank { start, end });
            n
        });
    }
}

/// Accumulates junctions chromosome by chromosome, deduplicating both
/// the (start, end) pairs and the flanking intervals they generate
pub struct JunctionBuilder<'a> {
    genome: &'a Genome,
    window_size: i64,
    chroms: HashMap<Contig, ChromJunctions>,
}

impl<'a> JunctionBuilder<'a> {
    pub fn new(genome: &'a Genome, window_size: usize) -> Self {
        Self {
            genome,
            window_size: window_size as i64,
            chroms: HashMap::new(),
        }
    }

    /// Register one junction.  Unknown chromosomes and duplicate
    /// (start, end) pairs are silently ignored; a new pair adds its two
    /// flanking intervals (donor [start-w, start), acceptor
    /// [end, end+w)) unless an identical interval is already present.
    pub fn add_junction(&mut self, chrom: &str, start: i64, end: i64) {
        let ctg = match self.genome.contig(chrom) {
            Some(c) => c,
            None => return,
        };
        let w = self.window_size;
        let cj = self
            .chroms
            .entry(Arc::clone(ctg))
            .or_insert_with(ChromJunctions::new);
        if cj.pairs.entry(start).or_default().insert(end) {
            cj.add_flank(start - w, start);
            cj.add_flank(end, end + w);
        }
    }

    /// Derive junctions from a BED12 style gene model file: one junction
    /// per adjacent exon pair of each transcript
    pub fn add_genes_from_file<P: AsRef<Path>>(&mut self, fname: P) -> anyhow::Result<()> {
        let fname = fname.as_ref();
        debug!("Reading gene models from {}", fname.display());

        let mut rdr = CompressIo::new().path(fname).bufreader()?;
        let mut buf = String::new();
        let mut line = 0;
        while let Some(fields) = get_next_line(&mut rdr, &mut buf)
            .with_context(|| format!("Error after reading {} lines from {}", line, fname.display()))?
        {
            line += 1;
            if fields.len() == 1 && fields[0].is_empty() {
                continue;
            }
            if fields.len() < 12 {
                return Err(anyhow!(
                    "{}:{} Truncated gene model record",
                    fname.display(),
                    line
                ));
            }
            let chrom = fields[0];
            if !self.genome.contains(chrom) {
                continue;
            }
            let ctx = |what| format!("{}:{} Error reading {}", fname.display(), line, what);
            let tx_start = fields[1].parse::<i64>().with_context(|| ctx("tx start"))?;
            let n_exons = fields[9].parse::<usize>().with_context(|| ctx("exon count"))?;
            let lengths = parse_int_list(fields[10]).with_context(|| ctx("exon lengths"))?;
            let starts = parse_int_list(fields[11]).with_context(|| ctx("exon starts"))?;
            if lengths.len() < n_exons || starts.len() < n_exons {
                return Err(anyhow!(
                    "{}:{} Exon list shorter than exon count",
                    fname.display(),
                    line
                ));
            }
            for i in 0..n_exons.saturating_sub(1) {
                let start = tx_start + starts[i] + lengths[i] - 1;
                let end = tx_start + starts[i + 1];
                self.add_junction(chrom, start, end);
            }
        }
        Ok(())
    }

    /// Read junction calls (STAR SJ.out.tab layout), keeping those with
    /// sufficient read coverage
    pub fn add_junctions_from_file<P: AsRef<Path>>(
        &mut self,
        fname: P,
        min_coverage: u32,
    ) -> anyhow::Result<()> {
        let fname = fname.as_ref();
        debug!("Reading junction calls from {}", fname.display());

        let mut rdr = CompressIo::new().path(fname).bufreader()?;
        let mut buf = String::new();
        let mut line = 0;
        while let Some(fields) = get_next_line(&mut rdr, &mut buf)
            .with_context(|| format!("Error after reading {} lines from {}", line, fname.display()))?
        {
            line += 1;
            if fields.len() == 1 && fields[0].is_empty() {
                continue;
            }
            if fields.len() < 7 {
                return Err(anyhow!(
                    "{}:{} Truncated junction record",
                    fname.display(),
                    line
                ));
            }
            let ctx = |what| format!("{}:{} Error reading {}", fname.display(), line, what);
            let start = fields[1].parse::<i64>().with_context(|| ctx("start"))? - 2;
            let end = fields[2].parse::<i64>().with_context(|| ctx("end"))?;
            let cov = fields[6].parse::<u32>().with_context(|| ctx("coverage"))?;
            if cov >= min_coverage {
                self.add_junction(fields[0], start, end);
            }
        }
        Ok(())
    }

    /// Build the per chromosome overlap indexes
    pub fn build(self) -> HashMap<Contig, JunctionIndex> {
        self.chroms
            .into_iter()
            .map(|(ctg, cj)| {
                let nodes: Vec<_> = cj
                    .flanks
                    .iter()
                    .enumerate()
                    .map(|(i, f)| IntervalNode::<usize, u32>::new(f.start as i32, (f.end - 1) as i32, i))
                    .collect();
                let ix = JunctionIndex {
                    flanks: cj.flanks,
                    tree: COITree::new(&nodes),
                    pairs: cj.pairs,
                };
                (ctg, ix)
            })
            .collect()
    }
}

/// Parse a comma delimited list of integers (trailing comma allowed, as
/// written by genome browsers)
fn parse_int_list(s: &str) -> anyhow::Result<Vec<i64>> {
    s.split(',')
        .filter(|x| !x.is_empty())
        .map(|x| {
            x.parse::<i64>()
                .with_context(|| format!("Bad list entry {}", x))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genome() -> Genome {
        let mut g = Genome::new();
        g.add_contig("chr1", 100_000);
        g
    }

    fn sorted_flanks(ix: &JunctionIndex) -> Vec<(i64, i64)> {
        let mut v: Vec<_> = (0..ix.n_flanks())
            .map(|i| {
                let f = ix.flank(i);
                (f.start, f.end)
            })
            .collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn junction_creates_two_flanks() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        b.add_junction("chr1", 100, 300);
        let m = b.build();
        let ix = m.get("chr1").unwrap();
        assert_eq!(sorted_flanks(ix), vec![(75, 100), (300, 325)]);
        assert_eq!(ix.pairs().get(&100).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_pairs_are_ignored() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        b.add_junction("chr1", 100, 300);
        b.add_junction("chr1", 100, 300);
        b.add_junction("chr1", 100, 400);
        let m = b.build();
        let ix = m.get("chr1").unwrap();
        // the shared donor flank is materialized once
        assert_eq!(
            sorted_flanks(ix),
            vec![(75, 100), (300, 325), (400, 425)]
        );
        assert_eq!(ix.pairs().get(&100).unwrap().len(), 2);
    }

    #[test]
    fn unknown_chromosome_is_skipped() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        b.add_junction("chrUn", 100, 300);
        assert!(b.build().is_empty());
    }

    #[test]
    fn overlap_query() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        b.add_junction("chr1", 100, 300);
        let m = b.build();
        let ix = m.get("chr1").unwrap();

        let mut hits = HashSet::new();
        ix.overlaps(80, 90, &mut hits);
        assert_eq!(hits.len(), 1);
        assert_eq!(ix.flank(*hits.iter().next().unwrap()), Flank {
            start: 75,
            end: 100
        });

        hits.clear();
        ix.overlaps(100, 300, &mut hits); // the intron itself touches neither flank
        assert!(hits.is_empty());

        hits.clear();
        ix.overlaps(0, 1_000, &mut hits);
        assert_eq!(hits.len(), 2);
    }

    fn temp_file(tag: &str, content: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rip_peaks_junction_{}_{}", std::process::id(), tag));
        std::fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn genes_yield_exon_adjacent_junctions() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        // txStart 1000, exons (0,100) (200,50) (500,200); a second record
        // on an unknown chromosome is skipped
        let bed = "chr1\t1000\t1700\ttx1\t0\t+\t1000\t1700\t0\t3\t100,50,200,\t0,200,500,\n\
                   chrUn\t1000\t1700\ttx2\t0\t+\t1000\t1700\t0\t3\t100,50,200,\t0,200,500,\n";
        let p = temp_file("genes", bed);
        b.add_genes_from_file(&p).unwrap();
        std::fs::remove_file(&p).ok();

        let m = b.build();
        assert_eq!(m.len(), 1);
        let ix = m.get("chr1").unwrap();
        // junctions (1099, 1200) and (1249, 1500)
        assert!(ix.pairs().get(&1099).unwrap().contains(&1200));
        assert!(ix.pairs().get(&1249).unwrap().contains(&1500));
        assert_eq!(
            sorted_flanks(ix),
            vec![(1074, 1099), (1200, 1225), (1224, 1249), (1500, 1525)]
        );
    }

    #[test]
    fn junction_calls_respect_coverage_filter() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        let calls = "chr1\t102\t300\t1\t1\t0\t10\t0\t40\n\
                     chr1\t502\t700\t1\t1\t0\t4\t0\t40\n";
        let p = temp_file("calls", calls);
        b.add_junctions_from_file(&p, 5).unwrap();
        std::fs::remove_file(&p).ok();

        let m = b.build();
        let ix = m.get("chr1").unwrap();
        // only the first call passes; start is shifted by -2
        assert_eq!(ix.pairs().len(), 1);
        assert!(ix.pairs().get(&100).unwrap().contains(&300));
    }

    #[test]
    fn malformed_gene_record_is_fatal() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        let p = temp_file("bad_genes", "chr1\t1000\t1700\ttx1\n");
        let r = b.add_genes_from_file(&p);
        std::fs::remove_file(&p).ok();
        assert!(r.is_err());
    }
}
