//! Aggregation of per-segment byte counters into one status display.
//!
//! Workers push [`ProgressEvent`]s into a single channel. Exactly one
//! [`ProgressAggregator`] consumes it and owns the [`ProgressTable`], so the
//! table is never shared and needs no lock. Closing the channel (dropping
//! every sender) is what ends the aggregator.

use std::collections::BTreeMap;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the event channel before workers start waiting on the display.
pub const EVENT_BUFFER: usize = 1024;

/// Cumulative progress of one segment, sent after every read of its stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressEvent {
    pub segment_id: usize,
    pub transferred: u64,
    /// 0 when the length is unknown.
    pub segment_len: u64,
}

impl ProgressEvent {
    pub fn percentage(&self) -> u64 {
        percentage(self.transferred, self.segment_len)
    }
}

pub type ProgressSender = mpsc::Sender<ProgressEvent>;
pub type ProgressReceiver = mpsc::Receiver<ProgressEvent>;

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(EVENT_BUFFER)
}

/// Integer percentage, 0 for an empty or unknown length.
pub fn percentage(transferred: u64, len: u64) -> u64 {
    if len == 0 {
        return 0;
    }
    (transferred as u128 * 100 / len as u128) as u64
}

/// Latest event seen for each segment id.
#[derive(Debug, Clone, Default)]
pub struct ProgressTable {
    segments: usize,
    rows: BTreeMap<usize, ProgressEvent>,
}

impl ProgressTable {
    pub fn new(segments: usize) -> Self {
        Self {
            segments,
            rows: BTreeMap::new(),
        }
    }

    pub fn update(&mut self, event: ProgressEvent) {
        self.rows.insert(event.segment_id, event);
    }

    #[cfg(test)]
    pub fn get(&self, segment_id: usize) -> Option<&ProgressEvent> {
        self.rows.get(&segment_id)
    }

    /// One line per segment id `1..=segments`; ids not heard from yet show as `0/0`.
    pub fn render(&self) -> String {
        (1..=self.segments)
            .map(|id| {
                let row = self.rows.get(&id).copied().unwrap_or(ProgressEvent {
                    segment_id: id,
                    ..Default::default()
                });
                format!(
                    "[{}] {}/{} ({}%)",
                    id,
                    row.transferred,
                    row.segment_len,
                    row.percentage()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Multi-line status area redrawn in place on stderr.
pub fn status_bar() -> ProgressBar {
    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr_with_hz(10));
    pb.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));
    pb
}

pub struct ProgressAggregator {
    table: ProgressTable,
    bar: ProgressBar,
    started: Instant,
}

impl ProgressAggregator {
    pub fn new(segments: usize, bar: ProgressBar, started: Instant) -> Self {
        Self {
            table: ProgressTable::new(segments),
            bar,
            started,
        }
    }

    pub fn spawn(self, events: ProgressReceiver) -> JoinHandle<ProgressTable> {
        tokio::spawn(self.run(events))
    }

    /// Renders every event until the channel closes, then prints the elapsed time.
    pub async fn run(mut self, mut events: ProgressReceiver) -> ProgressTable {
        self.bar.set_message(self.table.render());
        while let Some(event) = events.recv().await {
            self.table.update(event);
            self.bar.set_message(self.table.render());
        }

        debug!("progress channel closed");
        self.bar.finish_with_message(self.table.render());
        println!("Completed in {:.2?}", self.started.elapsed());
        self.table
    }
}
