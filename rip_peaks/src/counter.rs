use std::{
    collections::{HashMap, HashSet},
    io::BufRead,
};

use crate::{
    config::Contig,
    genome::Genome,
    junction::JunctionIndex,
    reads::{SamRec, SamReader},
};

pub type WindowCounts = HashMap<i64, u32>;

/// Window and junction flank counts from one alignment stream, plus the
/// total number of counted reads (the library size normalizer).  Owned
/// exclusively by the counting task that builds it until testing begins.
pub struct StreamCounts {
    pub windows: HashMap<Contig, WindowCounts>,
    pub flanks: HashMap<Contig, Vec<u32>>,
    pub total: u64,
}

/// Count reads per window (and per junction flank where junctions are
/// annotated) for one alignment stream
///
/// Each mapped read on a known chromosome contributes at most one count
/// to any window or flank, however many of its alignment blocks land
/// there.  Unmapped reads and reads on chromosomes absent from the
/// genome table are skipped silently.  Returns the per chromosome count
/// tables and the number of counted reads.
pub fn count_stream<R: BufRead>(
    reader: &mut SamReader<R>,
    genome: &Genome,
    junctions: &HashMap<Contig, JunctionIndex>,
    window_size: usize,
    step_size: usize,
) -> anyhow::Result<StreamCounts> {
    let w = window_size as i64;
    let s = step_size as i64;

    let mut windows: HashMap<Contig, WindowCounts> = HashMap::new();
    for (ctg, _) in genome.iter() {
        windows.insert(ctg.clone(), HashMap::new());
    }
    let mut flanks: HashMap<Contig, Vec<u32>> = junctions
        .iter()
        .map(|(ctg, ix)| (ctg.clone(), vec![0; ix.n_flanks()]))
        .collect();
    let mut total = 0;

    let mut rec = SamRec::new();
    let mut win_set: HashSet<i64> = HashSet::new();
    let mut flank_set: HashSet<usize> = HashSet::new();
    while reader.read_rec(&mut rec)? {
        if !rec.is_mapped() || !genome.contains(rec.chrom()) {
            continue;
        }
        let jix = junctions.get(rec.chrom());
        for &(start, len) in rec.blocks() {
            let b0 = start as i64 - 1;
            let first = ((b0 - (w - s)) / s).max(0);
            let last = (b0 + len as i64) / s;
            for i in first..=last {
                win_set.insert(i * s);
            }
            if let Some(ix) = jix {
                ix.overlaps(b0, b0 + len as i64, &mut flank_set);
            }
        }

        // a read spliced twice into the same window or flank still
        // counts once there
        let wc = windows.get_mut(rec.chrom()).unwrap();
        for win in win_set.drain() {
            *wc.entry(win).or_insert(0) += 1;
        }
        if !flank_set.is_empty() {
            let fc = flanks.get_mut(rec.chrom()).unwrap();
            for slot in flank_set.drain() {
                fc[slot] += 1;
            }
        }

        total += 1;
    }

    Ok(StreamCounts {
        windows,
        flanks,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::junction::JunctionBuilder;
    use std::io::Cursor;

    fn genome() -> Genome {
        let mut g = Genome::new();
        g.add_contig("chr1", 100_000);
        g
    }

    fn count(
        sam: &str,
        genome: &Genome,
        junctions: &HashMap<Contig, JunctionIndex>,
        window_size: usize,
        step_size: usize,
    ) -> StreamCounts {
        let mut rdr = SamReader::new(Cursor::new(sam.to_owned()), String::from("test"));
        count_stream(&mut rdr, genome, junctions, window_size, step_size).unwrap()
    }

    fn rec(chrom: &str, pos: usize, cigar: &str) -> String {
        format!("r\t0\t{}\t{}\t60\t{}\t*\t0\t0\t*\t*\n", chrom, pos, cigar)
    }

    #[test]
    fn single_block_single_window() {
        let g = genome();
        let c = count(&rec("chr1", 1, "10M"), &g, &HashMap::new(), 25, 25);
        assert_eq!(c.total, 1);
        let wc = c.windows.get("chr1").unwrap();
        assert_eq!(wc.get(&0), Some(&1));
        assert_eq!(wc.len(), 1);
    }

    #[test]
    fn block_spanning_two_windows() {
        let g = genome();
        // block [24, 28) covers windows 0 and 25
        let c = count(&rec("chr1", 24, "4M"), &g, &HashMap::new(), 25, 25);
        let wc = c.windows.get("chr1").unwrap();
        assert_eq!(wc.get(&0), Some(&1));
        assert_eq!(wc.get(&25), Some(&1));
    }

    #[test]
    fn spliced_read_counts_once_per_window() {
        let g = genome();
        // both blocks fall in window 0
        let c = count(&rec("chr1", 1, "5M10N5M"), &g, &HashMap::new(), 25, 25);
        let wc = c.windows.get("chr1").unwrap();
        assert_eq!(wc.get(&0), Some(&1));
        assert_eq!(c.total, 1);
    }

    #[test]
    fn skips_unmapped_and_unknown_chromosomes() {
        let g = genome();
        let sam = format!(
            "r0\t4\t*\t0\t0\t*\t*\t0\t0\t*\t*\n{}{}",
            rec("chr9", 1, "10M"),
            rec("chr1", 1, "10M")
        );
        let c = count(&sam, &g, &HashMap::new(), 25, 25);
        assert_eq!(c.total, 1);
        assert_eq!(c.windows.get("chr1").unwrap().len(), 1);
    }

    #[test]
    fn gapped_windows_are_preserved() {
        let g = genome();
        // step > window: windows [0,10) [25,35) ... with step 25
        let c = count(&rec("chr1", 30, "5M"), &g, &HashMap::new(), 10, 25);
        let wc = c.windows.get("chr1").unwrap();
        // block [29, 34) overlaps window 25 ([25,35))
        assert_eq!(wc.get(&25), Some(&1));
        assert_eq!(wc.len(), 1);
    }

    #[test]
    fn flank_counting_dedups_across_blocks() {
        let g = genome();
        let mut b = JunctionBuilder::new(&g, 25);
        b.add_junction("chr1", 100, 300); // flanks [75,100) and [300,325)
        let junctions = b.build();

        // one read with two blocks in the donor flank, one read crossing
        // the junction, one read far away
        let sam = format!(
            "{}{}{}",
            rec("chr1", 80, "5M5N5M"),
            rec("chr1", 91, "10M200N10M"),
            rec("chr1", 1000, "10M")
        );
        let c = count(&sam, &g, &junctions, 25, 25);
        let ix = junctions.get("chr1").unwrap();
        let fc = c.flanks.get("chr1").unwrap();
        let slot = |start: i64| {
            (0..ix.n_flanks())
                .find(|&i| ix.flank(i).start == start)
                .unwrap()
        };
        // donor flank: one count from each of the first two reads
        assert_eq!(fc[slot(75)], 2);
        // acceptor flank: only the junction crossing read
        assert_eq!(fc[slot(300)], 1);
        assert_eq!(c.total, 3);
    }
}
