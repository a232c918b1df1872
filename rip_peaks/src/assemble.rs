use std::collections::HashMap;

use crate::{config::Contig, junction::JunctionIndex};

/// A final peak, half open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peak {
    pub start: i64,
    pub end: i64,
}

/// Assembly input for one chromosome; owned by exactly one worker task
pub struct AssembleJob {
    pub chrom: Contig,
    pub significant: HashMap<i64, f64>,
    pub flank_pvalues: Vec<f64>,
    pub chrom_len: i64,
}

/// Merge sorted half open intervals into maximal runs, joining intervals
/// that overlap or are book-ended
fn merge_intervals(ivs: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut runs = Vec::new();
    let mut it = ivs.iter();
    let Some(&first) = it.next() else {
        return runs;
    };
    let mut cur = first;
    for &(start, end) in it {
        if start <= cur.1 {
            cur.1 = cur.1.max(end);
        } else {
            runs.push(cur);
            cur = (start, end);
        }
    }
    runs.push(cur);
    runs
}

/// Surviving windows as sorted half open intervals, clipped at the
/// chromosome end
fn surviving_windows(
    significant: &HashMap<i64, f64>,
    alpha: f64,
    window_size: i64,
    chrom_len: i64,
) -> Vec<(i64, i64)> {
    let mut v: Vec<(i64, i64)> = significant
        .iter()
        .filter(|(_, &p)| p <= alpha)
        .map(|(&w, _)| (w, (w + window_size).min(chrom_len)))
        .collect();
    v.sort_unstable();
    v
}

/// Scratch interval set for the junction aware merge: intervals in
/// (start, end) order with positional overlap queries
struct Scratch {
    ivs: Vec<ScratchIv>,
    max_len: i64,
}

struct ScratchIv {
    start: i64,
    end: i64,
    passes: bool,
}

impl Scratch {
    fn new() -> Self {
        Self {
            ivs: Vec::new(),
            max_len: 0,
        }
    }

    fn push(&mut self, start: i64, end: i64, passes: bool) {
        self.ivs.push(ScratchIv { start, end, passes });
    }

    /// Sort and index; must be called after the last push and before the
    /// first query
    fn seal(&mut self) {
        self.ivs.sort_unstable_by_key(|iv| (iv.start, iv.end));
        self.max_len = self.ivs.iter().map(|iv| iv.end - iv.start).max().unwrap_or(0);
    }

    /// Indexes of intervals overlapping the half open [start, end)
    fn overlaps(&self, start: i64, end: i64, out: &mut Vec<usize>) {
        out.clear();
        // everything earlier than this cannot reach start
        let lo = self.ivs.partition_point(|iv| iv.start <= start - self.max_len);
        for (i, iv) in self.ivs.iter().enumerate().skip(lo) {
            if iv.start >= end {
                break;
            }
            if iv.end > start {
                out.push(i);
            }
        }
    }

    /// Envelope (min start, max end) over the given intervals and a seed
    /// interval
    fn envelope(&self, seed: (i64, i64), hits: &[usize]) -> (i64, i64) {
        let mut lo = seed.0;
        let mut hi = seed.1;
        for &i in hits {
            lo = lo.min(self.ivs[i].start);
            hi = hi.max(self.ivs[i].end);
        }
        (lo, hi)
    }

    fn mark(&mut self, hits: &[usize]) {
        for &i in hits {
            self.ivs[i].passes = true;
        }
    }
}

/// Merge the significant windows (and junction flanks, where annotated)
/// of one chromosome into final peaks
///
/// Without junctions this is a plain adjacency sweep keeping runs of at
/// least min_window_size.  With junctions, short runs are kept in a
/// scratch set and can be rescued by a significant flank whose envelope
/// with its overlapping runs is long enough, or by the two sides of a
/// junction together covering enough sequence.
pub fn assemble_chromosome(
    job: AssembleJob,
    junctions: Option<&JunctionIndex>,
    alpha: f64,
    window_size: usize,
    min_window_size: usize,
) -> (Contig, Vec<Peak>) {
    let w = window_size as i64;
    let min_w = min_window_size as i64;
    let windows = surviving_windows(&job.significant, alpha, w, job.chrom_len);
    let runs = merge_intervals(&windows);

    let peaks = match junctions {
        Some(ix) if ix.n_flanks() > 0 => {
            junction_merge(&runs, ix, &job.flank_pvalues, alpha, w, min_w)
        }
        _ => runs
            .into_iter()
            .filter(|&(s, e)| e - s >= min_w)
            .map(|(start, end)| Peak { start, end })
            .collect(),
    };
    (job.chrom, peaks)
}

fn junction_merge(
    runs: &[(i64, i64)],
    ix: &JunctionIndex,
    flank_pvalues: &[f64],
    alpha: f64,
    window_size: i64,
    min_window_size: i64,
) -> Vec<Peak> {
    let mut scratch = Scratch::new();
    for &(start, end) in runs {
        scratch.push(start, end, end - start >= min_window_size);
    }

    // every significant flank joins the scratch set before any envelope
    // query runs
    let sig_flanks: Vec<usize> = (0..ix.n_flanks())
        .filter(|&i| flank_pvalues[i] <= alpha)
        .collect();
    for &i in &sig_flanks {
        let f = ix.flank(i);
        scratch.push(f.start, f.end, false);
    }
    scratch.seal();

    // a significant flank rescues everything it touches when the
    // combined envelope is long enough
    let mut hits = Vec::new();
    for &i in &sig_flanks {
        let f = ix.flank(i);
        scratch.overlaps(f.start, f.end, &mut hits);
        let (lo, hi) = scratch.envelope((f.start, f.end), &hits);
        if hi - lo >= min_window_size {
            scratch.mark(&hits);
        }
    }

    // the two sides of a junction can rescue each other: short covered
    // stretches on the donor and acceptor sides combine across the
    // spliced-out intron
    let mut side_hits = Vec::new();
    let mut marks = Vec::new();
    for (&start, ends) in ix.pairs() {
        for &end in ends {
            marks.clear();
            let mut length = 0;
            for (qs, qe) in [
                (start - window_size, start),
                (end, end + window_size),
            ] {
                scratch.overlaps(qs, qe, &mut side_hits);
                if let Some(&first) = side_hits.first() {
                    let mut lo = scratch.ivs[first].start;
                    let mut hi = scratch.ivs[first].end;
                    for &i in &side_hits[1..] {
                        lo = lo.min(scratch.ivs[i].start);
                        hi = hi.max(scratch.ivs[i].end);
                    }
                    length += hi - lo;
                    marks.extend_from_slice(&side_hits);
                }
            }
            if length >= min_window_size {
                scratch.mark(&marks);
            }
        }
    }

    // final sweep: passing intervals only, merging those that share at
    // least one base
    let mut peaks = Vec::new();
    let mut cur: Option<(i64, i64)> = None;
    for iv in scratch.ivs.iter().filter(|iv| iv.passes) {
        cur = Some(match cur {
            Some((s, e)) if iv.start < e => (s, e.max(iv.end)),
            Some((s, e)) => {
                peaks.push(Peak { start: s, end: e });
                (iv.start, iv.end)
            }
            None => (iv.start, iv.end),
        });
    }
    if let Some((start, end)) = cur {
        peaks.push(Peak { start, end });
    }
    peaks
}
