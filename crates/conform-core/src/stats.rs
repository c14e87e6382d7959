//! Per-class mismatch statistics and the durable full log

use crate::error::HarnessError;
use crate::mismatch::{MismatchKind, MismatchSet};
use crate::waiver::WaiverLedger;
use crate::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const RULE: &str = "===========================================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bucket {
    ReferenceFoundMore,
    UnderTestFoundMore,
    OutputDiffers,
}

impl Bucket {
    pub fn for_kind(kind: MismatchKind) -> Option<Bucket> {
        if MismatchSet::REFERENCE_FOUND_MORE.contains(kind) {
            Some(Bucket::ReferenceFoundMore)
        } else if MismatchSet::UNDER_TEST_FOUND_MORE.contains(kind) {
            Some(Bucket::UnderTestFoundMore)
        } else if MismatchSet::OUTPUT_DIFFERS.contains(kind) {
            Some(Bucket::OutputDiffers)
        } else {
            None
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn summary_line(self, count: u32) -> String {
        let what = match self {
            Bucket::ReferenceFoundMore => {
                "the reference compiler found errors/warnings but the compiler under test did not"
            }
            Bucket::UnderTestFoundMore => {
                "the compiler under test found errors/warnings but the reference compiler did not"
            }
            Bucket::OutputDiffers => "the two compilers did not have the same output",
        };
        format!("\t- {count} test(s) where {what}")
    }
}

/// The three mismatch counters of one test class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    counts: [u32; 3],
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `kind` in its bucket; infrastructure kinds are not counted
    pub fn record(&mut self, kind: MismatchKind) {
        if let Some(bucket) = Bucket::for_kind(kind) {
            self.counts[bucket.index()] += 1;
        }
    }

    pub fn count(&self, bucket: Bucket) -> u32 {
        self.counts[bucket.index()]
    }

    pub fn is_clean(&self) -> bool {
        self.counts.iter().all(|c| *c == 0)
    }

    pub fn reset(&mut self) {
        self.counts = [0; 3];
    }

    /// Summary block, empty when nothing was counted
    pub fn summary(&self) -> Vec<String> {
        if self.is_clean() {
            return Vec::new();
        }
        let mut lines = vec![RULE.to_string(), "Results summary:".to_string()];
        for bucket in [
            Bucket::ReferenceFoundMore,
            Bucket::UnderTestFoundMore,
            Bucket::OutputDiffers,
        ] {
            let count = self.count(bucket);
            if count != 0 {
                lines.push(bucket.summary_line(count));
            }
        }
        lines
    }
}

/// One plain-text file per run holding every comparison's raw text
#[derive(Debug)]
pub struct FullLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FullLog {
    /// Create `<dir>/<version>_<yyyyMMdd_HHmmss>.txt`, headed by the version
    pub fn create(dir: &Path, primary_version: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| HarnessError::io_error(dir, e))?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.txt", primary_version.replace(' ', "_"), stamp));
        let file = File::create(&path).map_err(|e| HarnessError::io_error(&path, e))?;
        let mut log = Self {
            path,
            writer: BufWriter::new(file),
        };
        log.line(primary_version)?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{message}").map_err(|e| HarnessError::io_error(&self.path, e))
    }

    /// Write to both the console and the log
    pub fn dual_line(&mut self, message: &str) -> Result<()> {
        println!("{message}");
        self.line(message)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| HarnessError::io_error(&self.path, e))
    }
}

/// A test class in progress: its countdown, counters and waiver ledger
#[derive(Debug)]
pub struct ClassSession {
    class: String,
    remaining: usize,
    statistics: RunStatistics,
    ledger: WaiverLedger,
}

impl ClassSession {
    pub fn new(class: impl Into<String>, test_count: usize) -> Self {
        Self {
            class: class.into(),
            remaining: test_count,
            statistics: RunStatistics::new(),
            ledger: WaiverLedger::new(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut RunStatistics {
        &mut self.statistics
    }

    pub fn ledger_mut(&mut self) -> &mut WaiverLedger {
        &mut self.ledger
    }

    /// Announce the class on the console and in the log
    pub fn begin(&self, log: Option<&mut FullLog>) -> Result<()> {
        let title = format!("{} ({} tests)", self.class, self.remaining);
        match log {
            Some(log) => {
                log.dual_line(RULE)?;
                log.dual_line(&format!("* Comparison with reference compilers for class {title}"))
            }
            None => {
                info!("Comparison with reference compilers for class {}", title);
                Ok(())
            }
        }
    }

    /// Tear down one test. After the last one the summary is printed, unused
    /// excuses are swept and the counters reset; the returned statistics are
    /// the ones of the finished class.
    pub fn finish_test(&mut self, log: Option<&mut FullLog>) -> Result<Option<RunStatistics>> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return Ok(None);
        }

        let summary = self.statistics.summary();
        match log {
            Some(log) => {
                for line in &summary {
                    log.dual_line(line)?;
                }
                log.dual_line(&format!("\n\nFull results sent to {}", log.path().display()))?;
                log.flush()?;
            }
            None => {
                for line in &summary {
                    println!("{line}");
                }
            }
        }

        let finished = std::mem::take(&mut self.statistics);
        self.ledger.sweep_into_result(&self.class)?;
        Ok(Some(finished))
    }
}
