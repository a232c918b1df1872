use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::genome::Genome;

pub type Contig = Arc<str>;

/// Multiple testing correction method.  Validated at the command line,
/// before any counting work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PAdjust {
    None,
    Bonferroni,
    BenjaminiHochberg,
}

impl FromStr for PAdjust {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "bonferroni" => Ok(Self::Bonferroni),
            "benjaminihochberg" => Ok(Self::BenjaminiHochberg),
            _ => Err("no match"),
        }
    }
}

impl fmt::Display for PAdjust {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bonferroni => write!(f, "Bonferroni"),
            Self::BenjaminiHochberg => write!(f, "BenjaminiHochberg"),
        }
    }
}

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
pub struct Config {
    sample_file: PathBuf,
    control_file: PathBuf,
    genes_file: Option<PathBuf>,
    junctions_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    genome: Genome,
    window_size: usize,
    step_size: usize,
    min_window_size: usize,
    junctions_min_coverage: u32,
    alpha: f64,
    p_adjust: PAdjust,
    n_tasks: usize,
}

impl Config {
    pub fn new(
        sample_file: PathBuf,
        control_file: PathBuf,
        genes_file: Option<PathBuf>,
        junctions_file: Option<PathBuf>,
        output_file: Option<PathBuf>,
        genome: Genome,
        window_size: usize,
        step_size: usize,
        min_window_size: usize,
        junctions_min_coverage: u32,
        alpha: f64,
        p_adjust: PAdjust,
        n_tasks: usize,
    ) -> Self {
        Self {
            sample_file,
            control_file,
            genes_file,
            junctions_file,
            output_file,
            genome,
            window_size,
            step_size,
            min_window_size,
            junctions_min_coverage,
            alpha,
            p_adjust,
            n_tasks,
        }
    }

    pub fn sample_file(&self) -> &Path {
        &self.sample_file
    }

    pub fn control_file(&self) -> &Path {
        &self.control_file
    }

    pub fn genes_file(&self) -> Option<&Path> {
        self.genes_file.as_deref()
    }

    pub fn junctions_file(&self) -> Option<&Path> {
        self.junctions_file.as_deref()
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn step_size(&self) -> usize {
        self.step_size
    }

    pub fn min_window_size(&self) -> usize {
        self.min_window_size
    }

    pub fn junctions_min_coverage(&self) -> u32 {
        self.junctions_min_coverage
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn p_adjust(&self) -> PAdjust {
        self.p_adjust
    }

    pub fn n_tasks(&self) -> usize {
        self.n_tasks
    }
}
