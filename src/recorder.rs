use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::types::CycleReport;

/// Per-cycle CSV trace of the feedback signal chain.
pub struct TraceRecorder<W: Write> {
    writer: BufWriter<W>,
    rows: u64,
}

impl TraceRecorder<Box<dyn Write>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        info!("Recording feedback trace to {}", path.display());
        Self::new(Box::new(file))
    }
}

impl<W: Write> TraceRecorder<W> {
    pub fn new(inner: W) -> io::Result<Self> {
        let mut writer = BufWriter::new(inner);
        writeln!(
            writer,
            "elapsed_sec,last_timestamp,feature,ratio,smoothed,volume_1,volume_2"
        )?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_record(&mut self, report: &CycleReport) -> io::Result<()> {
        writeln!(
            self.writer,
            "{:.4},{:.6},{:.6},{:.6},{:.6},{:.4},{:.4}",
            report.elapsed.as_secs_f64(),
            report.last_timestamp,
            report.feature,
            report.ratio,
            report.smoothed,
            report.volumes.0,
            report.volumes.1
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}
