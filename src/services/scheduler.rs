use log::{error, info};
use std::thread;
use std::time::{Duration, Instant};

/// Run `tick` every `interval`, forever or for `max_ticks` ticks.
///
/// Ticks are independent: an error is logged and the next tick still runs.
/// The interval is measured from the start of a tick, so a slow tick shortens
/// the following pause instead of shifting the schedule.
pub fn run_loop(
    interval: Duration,
    max_ticks: Option<u64>,
    mut tick: impl FnMut(u64) -> Result<(), String>,
) -> u64 {
    let mut completed = 0u64;
    loop {
        let tick_start = Instant::now();
        completed += 1;

        match tick(completed) {
            Ok(()) => info!("Tick {} finished in {}ms", completed, tick_start.elapsed().as_millis()),
            Err(e) => error!("Tick {} failed: {}", completed, e),
        }

        if max_ticks.is_some_and(|max| completed >= max) {
            return completed;
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}
