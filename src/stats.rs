//! Statistics collection and export for simulation runs.
//!
//! Statistics can be exported as JSON, CSV or a human-readable summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::types::Tick;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Design metadata
    pub metadata: SimulationMetadata,

    /// Engine-level counters
    pub engine: EngineStats,

    /// Per-block invocation counts, in schedule order
    pub blocks: Vec<BlockStats>,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulated design.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Path of the top component
    pub top: String,

    /// Framework version
    pub version: String,
}

/// Engine-level counters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Completed ticks, including reset ticks
    pub cycles: Tick,

    /// Number of `reset()` calls
    pub resets: u64,

    /// Number of `eval_combinational()` passes, including settles
    pub comb_evals: u64,

    /// Blocks in the schedule
    pub schedule_len: usize,

    pub comb_blocks: usize,

    pub seq_blocks: usize,

    pub nets: usize,

    pub components: usize,
}

/// Counters for one update block.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BlockStats {
    pub path: String,
    pub kind: String,
    pub invocations: u64,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Ticks executed per second
    pub ticks_per_second: f64,

    /// Block invocations per second
    pub blocks_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.ticks_per_second = self.engine.cycles as f64 / seconds;
            let invocations: u64 = self.blocks.iter().map(|b| b.invocations).sum();
            self.timing.blocks_per_second = invocations as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("metric,value\n");

        csv.push_str(&format!("cycles,{}\n", self.engine.cycles));
        csv.push_str(&format!("resets,{}\n", self.engine.resets));
        csv.push_str(&format!("comb_evals,{}\n", self.engine.comb_evals));
        csv.push_str(&format!("schedule_len,{}\n", self.engine.schedule_len));
        csv.push_str(&format!("comb_blocks,{}\n", self.engine.comb_blocks));
        csv.push_str(&format!("seq_blocks,{}\n", self.engine.seq_blocks));
        csv.push_str(&format!("nets,{}\n", self.engine.nets));
        csv.push_str(&format!("components,{}\n", self.engine.components));

        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("ticks_per_second,{:.2}\n", self.timing.ticks_per_second));
        csv.push_str(&format!("blocks_per_second,{:.2}\n", self.timing.blocks_per_second));

        csv
    }

    /// Exports summary statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Exports per-block statistics to CSV.
    pub fn blocks_to_csv(&self) -> String {
        let mut csv = String::from("block,kind,invocations\n");
        for block in &self.blocks {
            csv.push_str(&format!("{},{},{}\n", block.path, block.kind, block.invocations));
        }
        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.top.is_empty() {
            writeln!(w, "Top: {}", self.metadata.top)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Engine ---")?;
        writeln!(w, "Cycles: {}", self.engine.cycles)?;
        writeln!(w, "Resets: {}", self.engine.resets)?;
        writeln!(w, "Combinational evaluations: {}", self.engine.comb_evals)?;
        writeln!(
            w,
            "Schedule: {} blocks ({} comb, {} seq)",
            self.engine.schedule_len, self.engine.comb_blocks, self.engine.seq_blocks
        )?;
        writeln!(w, "Nets: {}", self.engine.nets)?;
        writeln!(w, "Components: {}", self.engine.components)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Ticks/sec: {:.2}", self.timing.ticks_per_second)?;
        writeln!(w, "Blocks/sec: {:.2}", self.timing.blocks_per_second)?;
        writeln!(w)?;

        writeln!(w, "--- Blocks ---")?;
        for block in &self.blocks {
            writeln!(w, "{} ({}): {}", block.path, block.kind, block.invocations)?;
        }

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SimulationStats {
        let mut stats = SimulationStats::new();
        stats.metadata.top = "top".to_string();
        stats.engine.cycles = 100;
        stats.engine.schedule_len = 2;
        stats.blocks = vec![
            BlockStats {
                path: "top.a".into(),
                kind: "comb".into(),
                invocations: 200,
            },
            BlockStats {
                path: "top.b".into(),
                kind: "seq".into(),
                invocations: 100,
            },
        ];
        stats
    }

    #[test]
    fn test_compute_timing() {
        let mut stats = sample();
        stats.compute_timing(1000.0);
        assert_eq!(stats.timing.ticks_per_second, 100.0);
        assert_eq!(stats.timing.blocks_per_second, 300.0);
    }

    #[test]
    fn test_json_export() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["engine"]["cycles"], 100);
        assert_eq!(value["blocks"][1]["path"], "top.b");
    }

    #[test]
    fn test_csv_export() {
        let stats = sample();
        assert!(stats.to_csv().contains("cycles,100"));
        let blocks = stats.blocks_to_csv();
        assert!(blocks.starts_with("block,kind,invocations\n"));
        assert!(blocks.contains("top.a,comb,200"));
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert!(summary.contains("Top: top"));
        assert!(summary.contains("top.b (seq): 100"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5.0);
    }
}
