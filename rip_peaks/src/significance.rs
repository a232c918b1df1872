use std::collections::HashMap;

use anyhow::Context;

use crate::{config::Contig, counter::WindowCounts};

/// Raw cutoff for recording a window p-value.  Fixed, independent of the
/// configured alpha: the multiple testing correction later operates on
/// the p-values that survive this filter.
pub const RAW_P_CUTOFF: f64 = 0.05;

/// Sentinel value for a flank that was never tested (or not enriched)
pub const FLANK_SENTINEL: f64 = 1.0;

/// Per chromosome input to the testing phase; owned by exactly one
/// worker task
pub struct TestJob {
    pub chrom: Contig,
    pub sample: WindowCounts,
    pub control: WindowCounts,
    pub flank_sample: Vec<u32>,
    pub flank_control: Vec<u32>,
}

/// Per chromosome output of the testing phase
pub struct TestResult {
    pub chrom: Contig,
    pub significant: HashMap<i64, f64>,
    pub flank_pvalues: Vec<f64>,
}

fn enriched(sample_count: u32, sample_total: u64, control_count: u32, control_total: u64) -> bool {
    sample_count as f64 / sample_total as f64 >= control_count as f64 / control_total as f64
}

fn exact_test(
    sample_count: u32,
    sample_total: u64,
    control_count: u32,
    control_total: u64,
) -> anyhow::Result<f64> {
    utils::fisher_exact(
        sample_count as u64,
        sample_total - sample_count as u64,
        control_count as u64,
        control_total - control_count as u64,
    )
}

/// Run the exact test over every window and junction flank of one
/// chromosome
///
/// A window is recorded in the significant set iff its sample count is
/// positive, the sample proportion is at least the control proportion,
/// and the exact test p-value is at most RAW_P_CUTOFF.  Depletion is
/// never reported.  Flanks keep their computed p-value whenever tested
/// (no raw cutoff); untested flanks keep the sentinel.
pub fn test_chromosome(
    job: TestJob,
    sample_total: u64,
    control_total: u64,
) -> anyhow::Result<TestResult> {
    let mut significant = HashMap::new();
    for (&window, &sc) in job.sample.iter() {
        if sc == 0 {
            continue;
        }
        let cc = job.control.get(&window).copied().unwrap_or(0);
        if enriched(sc, sample_total, cc, control_total) {
            let p = exact_test(sc, sample_total, cc, control_total)
                .with_context(|| format!("Exact test failed for window {}:{}", job.chrom, window))?;
            if p <= RAW_P_CUTOFF {
                significant.insert(window, p);
            }
        }
    }

    let mut flank_pvalues = vec![FLANK_SENTINEL; job.flank_sample.len()];
    for (i, (&sc, &cc)) in job
        .flank_sample
        .iter()
        .zip(job.flank_control.iter())
        .enumerate()
    {
        if sc > 0 && enriched(sc, sample_total, cc, control_total) {
            flank_pvalues[i] = exact_test(sc, sample_total, cc, control_total).with_context(
                || format!("Exact test failed for junction flank on {}", job.chrom),
            )?;
        }
    }

    Ok(TestResult {
        chrom: job.chrom,
        significant,
        flank_pvalues,
    })
}
