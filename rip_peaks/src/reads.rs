use std::io::BufRead;

use anyhow::Context;
use utils::get_next_line;

/// One alignment record, reduced to what the counters need: the mapped
/// flag, the reference name and the reference blocks covered by the
/// alignment.  Reused across reads to avoid per record allocation.
pub struct SamRec {
    mapped: bool,
    chrom: String,
    blocks: Vec<(usize, usize)>, // (1 based reference start, length)
}

impl SamRec {
    pub fn new() -> Self {
        Self {
            mapped: false,
            chrom: String::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn blocks(&self) -> &[(usize, usize)] {
        &self.blocks
    }
}

impl Default for SamRec {
    fn default() -> Self {
        Self::new()
    }
}

const FLAG_UNMAPPED: u16 = 0x4;

/// Streaming reader of SAM text.  Header lines are skipped; each
/// alignment line yields the fields needed for window counting.  The
/// alignment blocks are derived from the CIGAR string: M/=/X segments
/// produce blocks, D/N advance the reference position, I/S/H/P do not.
pub struct SamReader<R: BufRead> {
    rdr: R,
    name: String,
    buf: String,
    line: usize,
}

impl<R: BufRead> SamReader<R> {
    pub fn new(rdr: R, name: String) -> Self {
        Self {
            rdr,
            name,
            buf: String::new(),
            line: 0,
        }
    }

    /// Read the next alignment record into rec, returning false at end
    /// of input
    pub fn read_rec(&mut self, rec: &mut SamRec) -> anyhow::Result<bool> {
        loop {
            let fields = match get_next_line(&mut self.rdr, &mut self.buf).with_context(|| {
                format!("Error after reading {} lines from {}", self.line, self.name)
            })? {
                Some(f) => f,
                None => return Ok(false),
            };
            self.line += 1;
            if fields[0].is_empty() || fields[0].starts_with('@') {
                continue;
            }
            if fields.len() < 6 {
                return Err(anyhow!(
                    "{}:{} Truncated alignment record",
                    self.name,
                    self.line
                ));
            }
            let flag = fields[1].parse::<u16>().with_context(|| {
                format!("{}:{} Error reading flag field", self.name, self.line)
            })?;
            rec.chrom.clear();
            rec.chrom.push_str(fields[2]);
            rec.blocks.clear();
            rec.mapped = (flag & FLAG_UNMAPPED) == 0 && fields[2] != "*";
            if rec.mapped {
                let pos = fields[3].parse::<usize>().with_context(|| {
                    format!("{}:{} Error reading position field", self.name, self.line)
                })?;
                parse_cigar(fields[5], pos, &mut rec.blocks).with_context(|| {
                    format!("{}:{} Error reading CIGAR field", self.name, self.line)
                })?;
            }
            return Ok(true);
        }
    }
}

/// Expand a CIGAR string into reference blocks starting at pos
fn parse_cigar(cigar: &str, pos: usize, blocks: &mut Vec<(usize, usize)>) -> anyhow::Result<()> {
    if cigar == "*" {
        return Ok(());
    }
    let mut x = pos;
    let mut n: usize = 0;
    let mut have_len = false;
    for c in cigar.chars() {
        if let Some(d) = c.to_digit(10) {
            n = n * 10 + d as usize;
            have_len = true;
        } else {
            if !have_len {
                return Err(anyhow!("Operation '{}' with no length", c));
            }
            match c {
                'M' | '=' | 'X' => {
                    blocks.push((x, n));
                    x += n;
                }
                'D' | 'N' => x += n,
                'I' | 'S' | 'H' | 'P' => (),
                _ => return Err(anyhow!("Unknown operation '{}'", c)),
            }
            n = 0;
            have_len = false;
        }
    }
    if have_len {
        Err(anyhow!("Truncated CIGAR string"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(s: &str) -> SamReader<Cursor<&str>> {
        SamReader::new(Cursor::new(s), String::from("test"))
    }

    #[test]
    fn skips_header_and_reads_record() {
        let sam = "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:1000\n\
                   r1\t0\tchr1\t100\t60\t50M\t*\t0\t0\t*\t*\n";
        let mut rdr = reader(sam);
        let mut rec = SamRec::new();
        assert!(rdr.read_rec(&mut rec).unwrap());
        assert!(rec.is_mapped());
        assert_eq!(rec.chrom(), "chr1");
        assert_eq!(rec.blocks(), &[(100, 50)]);
        assert!(!rdr.read_rec(&mut rec).unwrap());
    }

    #[test]
    fn unmapped_flag_and_star_rname() {
        let sam = "r1\t4\t*\t0\t0\t*\t*\t0\t0\t*\t*\n\
                   r2\t0\t*\t0\t0\t*\t*\t0\t0\t*\t*\n";
        let mut rdr = reader(sam);
        let mut rec = SamRec::new();
        assert!(rdr.read_rec(&mut rec).unwrap());
        assert!(!rec.is_mapped());
        assert!(rdr.read_rec(&mut rec).unwrap());
        assert!(!rec.is_mapped());
    }

    #[test]
    fn spliced_cigar_blocks() {
        let sam = "r1\t0\tchr1\t100\t60\t10M5I20M100N30M\t*\t0\t0\t*\t*\n";
        let mut rdr = reader(sam);
        let mut rec = SamRec::new();
        assert!(rdr.read_rec(&mut rec).unwrap());
        // 10M at 100, 20M at 110 (insertion consumes no reference),
        // then the 100N intron skips to 230
        assert_eq!(rec.blocks(), &[(100, 10), (110, 20), (230, 30)]);
    }

    #[test]
    fn clip_and_match_operators() {
        let sam = "r1\t16\tchr2\t501\t60\t5S10=2X3M\t*\t0\t0\t*\t*\n";
        let mut rdr = reader(sam);
        let mut rec = SamRec::new();
        assert!(rdr.read_rec(&mut rec).unwrap());
        assert_eq!(rec.blocks(), &[(501, 10), (511, 2), (513, 3)]);
    }

    #[test]
    fn deletion_advances_reference() {
        let sam = "r1\t0\tchr1\t1\t60\t10M5D10M\t*\t0\t0\t*\t*\n";
        let mut rdr = reader(sam);
        let mut rec = SamRec::new();
        assert!(rdr.read_rec(&mut rec).unwrap());
        assert_eq!(rec.blocks(), &[(1, 10), (16, 10)]);
    }

    #[test]
    fn bad_records_are_fatal() {
        let mut rec = SamRec::new();
        assert!(reader("r1\t0\tchr1\n").read_rec(&mut rec).is_err());
        assert!(reader("r1\tx\tchr1\t1\t60\t10M\t*\t0\t0\t*\t*\n")
            .read_rec(&mut rec)
            .is_err());
        assert!(reader("r1\t0\tchr1\t1\t60\t10Q\t*\t0\t0\t*\t*\n")
            .read_rec(&mut rec)
            .is_err());
        assert!(reader("r1\t0\tchr1\t1\t60\t10\t*\t0\t0\t*\t*\n")
            .read_rec(&mut rec)
            .is_err());
    }
}
