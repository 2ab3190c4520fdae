use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

/// A job run on its own thread: once at start, then every `interval`, until
/// the returned handle is cancelled or dropped.
pub struct PeriodicTask;

impl PeriodicTask {
    pub fn spawn<F>(name: &str, interval: Duration, mut job: F) -> anyhow::Result<TaskHandle>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        if interval.is_zero() {
            anyhow::bail!("interval for task {name} must be greater than zero");
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let runs = Arc::new(AtomicUsize::new(0));
        let thread_runs = Arc::clone(&runs);
        let task_name = name.to_string();
        let join = thread::Builder::new()
            .name(format!("periodic-{name}"))
            .spawn(move || {
                info!(task = %task_name, every = ?interval, "periodic task started");
                loop {
                    let run = thread_runs.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Err(e) = job() {
                        error!(task = %task_name, run, error = %e, "periodic job failed");
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(task = %task_name, "periodic task stopped");
            })?;
        Ok(TaskHandle {
            stop: Some(stop_tx),
            join: Some(join),
            runs,
        })
    }
}

pub struct TaskHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
    runs: Arc<AtomicUsize>,
}

impl TaskHandle {
    /// Number of times the job has started.
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Stops the schedule and waits for an in-flight run to finish.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    /// Blocks on the task thread without signalling it, so the schedule
    /// keeps running until the process exits or the thread dies.
    pub fn wait(mut self) {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            error!("periodic task panicked");
        }
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            error!("periodic task panicked");
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn runs_immediately_and_repeats() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = PeriodicTask::spawn("repeat", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.cancel();
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn cancel_interrupts_long_wait() {
        let handle = PeriodicTask::spawn("slow", Duration::from_secs(3600), || Ok(())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.run_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let started = Instant::now();
        handle.cancel();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn failing_job_keeps_schedule() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = PeriodicTask::spawn("flaky", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("provider unavailable")
        })
        .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.run_count() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        drop(handle);
        assert!(hits.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn no_runs_after_cancel() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = PeriodicTask::spawn("once", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        handle.cancel();
        let after_cancel = hits.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn wait_keeps_schedule_running_until_thread_ends() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = PeriodicTask::spawn("until-crash", Duration::from_millis(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                panic!("job crashed");
            }
            Ok(())
        })
        .unwrap();
        handle.wait();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_interval_rejected() {
        assert!(PeriodicTask::spawn("zero", Duration::ZERO, || Ok(())).is_err());
    }
}
