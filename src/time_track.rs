use crate::meta_tile::MetaTile;
use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub enum StatsMsg {
    Duration(Metric, Duration),
    /// Meta-tiles done so far, total, last one finished.
    Progress(usize, usize, MetaTile),
}

#[derive(Debug, Clone, Copy)]
pub enum Metric {
    Acquire,
    Render,
    Encode,
    Insert,
}

impl Metric {
    const ALL: [Metric; 4] = [Metric::Acquire, Metric::Render, Metric::Encode, Metric::Insert];

    fn name(self) -> &'static str {
        match self {
            Metric::Acquire => "acquire",
            Metric::Render => "render",
            Metric::Encode => "encode",
            Metric::Insert => "insert",
        }
    }
}

pub fn record(tx: &Sender<StatsMsg>, metric: Metric, since: Instant) {
    // stats are best effort; the collector only stops after the run
    let _ = tx.send(StatsMsg::Duration(metric, since.elapsed()));
}

/// Sample count and summed duration per metric since the last report.
#[derive(Default)]
pub struct TimeStats([(u32, Duration); 4]);

impl TimeStats {
    pub fn add(&mut self, metric: Metric, duration: Duration) {
        let (count, total) = &mut self.0[metric as usize];

        *count += 1;
        *total += duration;
    }
}

impl Display for TimeStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for metric in Metric::ALL {
            if metric as usize > 0 {
                f.write_str(", ")?;
            }

            match self.0[metric as usize] {
                (0, _) => write!(f, "{}: -", metric.name())?,
                (count, total) => write!(
                    f,
                    "{}: {count} x {} ms",
                    metric.name(),
                    (total / count).as_millis()
                )?,
            }
        }

        Ok(())
    }
}

/// Spawns the collector; it logs every 10 seconds and exits once all
/// senders are dropped.
pub fn new() -> (Sender<StatsMsg>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<StatsMsg>();

    let thread = thread::spawn(move || {
        let mut stats = TimeStats::default();

        let mut last_log = Instant::now();

        let mut progress: Option<(usize, usize, MetaTile)> = None;

        for msg in rx {
            match msg {
                StatsMsg::Duration(metric, duration) => stats.add(metric, duration),
                StatsMsg::Progress(done, total, meta_tile) => {
                    progress = Some((done, total, meta_tile));
                }
            }

            if last_log.elapsed().as_secs() >= 10 {
                last_log = Instant::now();

                report(&mut stats, progress.as_ref());
            }
        }

        report(&mut stats, progress.as_ref());
    });

    (tx, thread)
}

fn report(stats: &mut TimeStats, progress: Option<&(usize, usize, MetaTile)>) {
    if let Some((done, total, meta_tile)) = progress {
        let pct = *done as f32 / (*total).max(1) as f32 * 100.0;

        log::info!("{pct:.2} % | {done}/{total} | {meta_tile} | {stats}");
    }

    *stats = TimeStats::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_averages() {
        let mut stats = TimeStats::default();

        stats.add(Metric::Render, Duration::from_millis(30));
        stats.add(Metric::Render, Duration::from_millis(10));
        stats.add(Metric::Insert, Duration::from_millis(4));

        assert_eq!(
            stats.to_string(),
            "acquire: -, render: 2 x 20 ms, encode: -, insert: 1 x 4 ms"
        );
    }

    #[test]
    fn collector_stops_when_senders_drop() {
        let (tx, thread) = new();

        record(&tx, Metric::Encode, Instant::now());

        drop(tx);

        thread.join().unwrap();
    }
}
