use std::{collections::HashMap, path::Path, thread};

use anyhow::Context;
use compress_io::compress::CompressIo;
use crossbeam_channel::bounded;

use crate::{
    assemble::{self, AssembleJob, Peak},
    config::{Config, Contig},
    counter::{self, StreamCounts},
    junction::{JunctionBuilder, JunctionIndex},
    output, padjust,
    reads::SamReader,
    significance::{self, TestJob, TestResult},
};

/// Strategy
///
/// Build the junction index, then run the pipeline phases with a strict
/// join barrier between each: (1) count the sample and control streams
/// concurrently; (2) run the exact tests chromosome by chromosome on the
/// worker pool; (3) derive the corrected alpha in a single threaded
/// pass; (4) assemble peaks chromosome by chromosome on the worker pool.
/// Output is written only after the last barrier, with chromosomes
/// sorted so the result does not depend on task scheduling.
pub fn process_data(cfg: &Config) -> anyhow::Result<()> {
    let junctions = build_junctions(cfg)?;

    let (sample, control) = count_phase(cfg, &junctions)?;
    info!(
        "Counted {} sample reads and {} control reads",
        sample.total, control.total
    );

    let results = test_phase(cfg, sample, control)?;
    let pvalues: Vec<f64> = results
        .iter()
        .flat_map(|r| r.significant.values().copied())
        .collect();
    debug!("Recorded {} significant window p-values", pvalues.len());

    let alpha = padjust::adjust_alpha(
        cfg.p_adjust(),
        cfg.alpha(),
        cfg.genome().n_windows(cfg.step_size()),
        pvalues,
    );

    let mut peaks = assemble_phase(cfg, &junctions, results, alpha)?;
    peaks.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    info!(
        "Found {} peaks",
        peaks.iter().map(|(_, v)| v.len()).sum::<usize>()
    );

    output::write_peaks(cfg.output_file(), &peaks).with_context(|| "Error writing peaks")
}

fn build_junctions(cfg: &Config) -> anyhow::Result<HashMap<Contig, JunctionIndex>> {
    let mut b = JunctionBuilder::new(cfg.genome(), cfg.window_size());
    if let Some(p) = cfg.genes_file() {
        b.add_genes_from_file(p)
            .with_context(|| "Error reading gene models")?;
    }
    if let Some(p) = cfg.junctions_file() {
        b.add_junctions_from_file(p, cfg.junctions_min_coverage())
            .with_context(|| "Error reading junction calls")?;
    }
    let m = b.build();
    if !m.is_empty() {
        debug!("Junction flanks annotated on {} chromosomes", m.len());
    }
    Ok(m)
}

fn count_file(
    cfg: &Config,
    path: &Path,
    junctions: &HashMap<Contig, JunctionIndex>,
) -> anyhow::Result<StreamCounts> {
    info!("Reading alignments from {}", path.display());
    let rdr = CompressIo::new()
        .path(path)
        .bufreader()
        .with_context(|| format!("Failed to open alignment file {}", path.display()))?;
    let mut reader = SamReader::new(rdr, path.display().to_string());
    counter::count_stream(
        &mut reader,
        cfg.genome(),
        junctions,
        cfg.window_size(),
        cfg.step_size(),
    )
}

/// Phase 1: the sample and control streams are counted by two concurrent
/// tasks with no shared mutable state
fn count_phase(
    cfg: &Config,
    junctions: &HashMap<Contig, JunctionIndex>,
) -> anyhow::Result<(StreamCounts, StreamCounts)> {
    thread::scope(|sc| {
        let sample_jh = sc.spawn(|| count_file(cfg, cfg.sample_file(), junctions));
        let control_jh = sc.spawn(|| count_file(cfg, cfg.control_file(), junctions));
        let sample = sample_jh
            .join()
            .map_err(|_| anyhow!("Sample counting task panicked"))?
            .with_context(|| "Sample read counting failed")?;
        let control = control_jh
            .join()
            .map_err(|_| anyhow!("Control counting task panicked"))?
            .with_context(|| "Control read counting failed")?;
        Ok((sample, control))
    })
}

/// Phase 2: one testing job per chromosome, each owning that
/// chromosome's count tables
fn test_phase(
    cfg: &Config,
    mut sample: StreamCounts,
    mut control: StreamCounts,
) -> anyhow::Result<Vec<TestResult>> {
    let sample_total = sample.total;
    let control_total = control.total;

    let mut jobs = Vec::with_capacity(cfg.genome().n_chroms());
    for (ctg, _) in cfg.genome().iter() {
        jobs.push(TestJob {
            chrom: ctg.clone(),
            sample: sample.windows.remove(ctg.as_ref()).unwrap_or_default(),
            control: control.windows.remove(ctg.as_ref()).unwrap_or_default(),
            flank_sample: sample.flanks.remove(ctg.as_ref()).unwrap_or_default(),
            flank_control: control.flanks.remove(ctg.as_ref()).unwrap_or_default(),
        });
    }

    run_tasks(cfg.n_tasks(), jobs, |job| {
        let chrom = job.chrom.clone();
        significance::test_chromosome(job, sample_total, control_total)
            .with_context(|| format!("Significance testing failed for {}", chrom))
    })
}

/// Phase 4: one assembly job per chromosome
fn assemble_phase(
    cfg: &Config,
    junctions: &HashMap<Contig, JunctionIndex>,
    results: Vec<TestResult>,
    alpha: f64,
) -> anyhow::Result<Vec<(Contig, Vec<Peak>)>> {
    let jobs: Vec<AssembleJob> = results
        .into_iter()
        .map(|r| {
            let chrom_len = cfg.genome().length(&r.chrom).unwrap_or(0) as i64;
            AssembleJob {
                chrom: r.chrom,
                significant: r.significant,
                flank_pvalues: r.flank_pvalues,
                chrom_len,
            }
        })
        .collect();

    run_tasks(cfg.n_tasks(), jobs, |job| {
        let ix = junctions.get(&job.chrom);
        Ok(assemble::assemble_chromosome(
            job,
            ix,
            alpha,
            cfg.window_size(),
            cfg.min_window_size(),
        ))
    })
}

/// Run jobs on a fixed pool of worker tasks, collecting one result per
/// job.  The first failed job aborts the run.
fn run_tasks<J, R, F>(n_tasks: usize, jobs: Vec<J>, f: F) -> anyhow::Result<Vec<R>>
where
    J: Send,
    R: Send,
    F: Fn(J) -> anyhow::Result<R> + Sync,
{
    let n_jobs = jobs.len();
    if n_jobs == 0 {
        return Ok(Vec::new());
    }
    let nt = n_tasks.clamp(1, n_jobs);

    thread::scope(|sc| {
        let (job_snd, job_rcv) = bounded(n_jobs);
        let (res_snd, res_rcv) = bounded(n_jobs);
        for j in jobs {
            // the channel holds all jobs, so this cannot block
            job_snd.send(j).expect("Error queueing job");
        }
        drop(job_snd);

        for _ in 0..nt {
            let job_rcv = job_rcv.clone();
            let res_snd = res_snd.clone();
            let f = &f;
            sc.spawn(move || {
                while let Ok(job) = job_rcv.recv() {
                    let res = f(job);
                    let failed = res.is_err();
                    if res_snd.send(res).is_err() || failed {
                        break;
                    }
                }
            });
        }
        drop(job_rcv);
        drop(res_snd);

        let mut results = Vec::with_capacity(n_jobs);
        while let Ok(r) = res_rcv.recv() {
            results.push(r?);
        }
        Ok(results)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAdjust;
    use std::path::PathBuf;

    fn temp_file(tag: &str, content: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rip_peaks_process_{}_{}", std::process::id(), tag));
        std::fs::write(&p, content).unwrap();
        p
    }

    fn sam_reads(chrom: &str, pos: usize, cigar: &str, n: usize) -> String {
        let mut s = String::new();
        for i in 0..n {
            s.push_str(&format!(
                "r{}\t0\t{}\t{}\t60\t{}\t*\t0\t0\t*\t*\n",
                i, chrom, pos, cigar
            ));
        }
        s
    }

    #[test]
    fn run_tasks_collects_all_results() {
        let jobs: Vec<usize> = (0..20).collect();
        let mut out = run_tasks(4, jobs, |j| Ok(j * 2)).unwrap();
        out.sort_unstable();
        assert_eq!(out, (0..20).map(|j| j * 2).collect::<Vec<_>>());
    }

    #[test]
    fn run_tasks_fails_fast() {
        let jobs: Vec<usize> = (0..8).collect();
        let r = run_tasks(2, jobs, |j| {
            if j == 3 {
                Err(anyhow!("job {} failed", j))
            } else {
                Ok(j)
            }
        });
        assert!(r.is_err());
    }

    #[test]
    fn pipeline_end_to_end() {
        // sample enriched over windows 0 and 25, control elsewhere
        let sample = format!(
            "{}{}",
            sam_reads("chr1", 1, "10M", 30),
            sam_reads("chr1", 26, "10M", 30)
        );
        let control = sam_reads("chr1", 501, "10M", 300);

        let sample_p = temp_file("sample.sam", &sample);
        let control_p = temp_file("control.sam", &control);
        let genome_p = temp_file("genome.txt", "chr1\t1000\n");
        let out_p = {
            let mut p = std::env::temp_dir();
            p.push(format!("rip_peaks_process_{}_peaks.txt", std::process::id()));
            p
        };

        let genome = crate::genome::read_genome_file(&genome_p).unwrap();
        let cfg = Config::new(
            sample_p.clone(),
            control_p.clone(),
            None,
            None,
            Some(out_p.clone()),
            genome,
            25,
            25,
            50,
            5,
            0.05,
            PAdjust::None,
            2,
        );
        process_data(&cfg).unwrap();

        let out = std::fs::read_to_string(&out_p).unwrap();
        assert_eq!(out, "chr1\t0\t50\n");

        for p in [&sample_p, &control_p, &genome_p, &out_p] {
            std::fs::remove_file(p).ok();
        }
    }
}
