#[macro_use]
extern crate anyhow;

use std::{fmt, io::BufRead, str::FromStr};

use clap::ArgMatches;
use special::Gamma;

/// LogLevel
///
/// Represents minimum level of messages that will be logged
///
#[derive(Debug, Clone, Copy)]
pub struct LogLevel {
    pub level: usize,
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel { level: 0 }),
            "warn" => Ok(LogLevel { level: 1 }),
            "info" => Ok(LogLevel { level: 2 }),
            "debug" => Ok(LogLevel { level: 3 }),
            "trace" => Ok(LogLevel { level: 4 }),
            "none" => Ok(LogLevel { level: 5 }),
            _ => Err("no match"),
        }
    }
}

impl LogLevel {
    pub fn is_none(&self) -> bool {
        self.level > 4
    }
    pub fn get_level(&self) -> usize {
        if self.level > 4 {
            0
        } else {
            self.level
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_str = ["error", "warn", "info", "debug", "trace", "none"];
        if self.level < 6 {
            write!(f, "{}", level_str[self.level])
        } else {
            write!(f, "unknown")
        }
    }
}

/// Initialize logging from command line arguments
pub fn init_log(m: &ArgMatches) {
    let verbose = m
        .get_one::<LogLevel>("loglevel")
        .copied()
        .unwrap_or_else(|| LogLevel::from_str("info").expect("Could not set loglevel info"));
    let quiet = verbose.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .copied()
        .unwrap_or(stderrlog::Timestamp::Off);

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbose.get_level())
        .timestamp(ts)
        .init()
        .unwrap();
}

/// Read in next line and split on tabs after trimming white space
pub fn get_next_line<'a, R: BufRead>(
    rdr: &mut R,
    buf: &'a mut String,
) -> anyhow::Result<Option<Vec<&'a str>>> {
    buf.clear();
    if rdr.read_line(buf)? == 0 {
        Ok(None)
    } else {
        Ok(Some(buf.trim().split('\t').collect()))
    }
}

fn ln_fact(n: u64) -> f64 {
    ((n + 1) as f64).ln_gamma().0
}

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_fact(n) - ln_fact(k) - ln_fact(n - k)
}

/// Relative tolerance when comparing point probabilities against the
/// observed table (same convention as R's fisher.test)
const FISHER_EPS: f64 = 1.0e-7;

/// Fisher's exact test on a 2x2 contingency table
///
///   [ a  b ]
///   [ c  d ]
///
/// Returns the two-sided p-value: the sum of hypergeometric point
/// probabilities, over all tables with the observed margins, that do not
/// exceed the probability of the observed table.  Computed in log space
/// so that large margins (library sizes) do not overflow.
pub fn fisher_exact(a: u64, b: u64, c: u64, d: u64) -> anyhow::Result<f64> {
    let r1 = a + b;
    let r2 = c + d;
    let n = r1 + r2;
    if n == 0 {
        return Err(anyhow!("fisher_exact(): empty table"));
    }
    let c1 = a + c;

    // support of cell a with the margins fixed
    let lo = c1.saturating_sub(r2);
    let hi = c1.min(r1);

    let ln_denom = ln_choose(n, c1);
    let lp_obs = ln_choose(r1, a) + ln_choose(r2, c) - ln_denom;
    let cutoff = lp_obs + FISHER_EPS;

    let mut p = 0.0;
    for x in lo..=hi {
        let lp = ln_choose(r1, x) + ln_choose(r2, c1 - x) - ln_denom;
        if lp <= cutoff {
            p += lp.exp()
        }
    }
    Ok(p.min(1.0))
}
