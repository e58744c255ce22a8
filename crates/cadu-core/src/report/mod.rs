//! Progress reporting between the update worker and an observer.
//!
//! A `Reporter` (producer half) and a `Progress` (consumer half) are created
//! as a pair over two bounded channels: one for task records, one for step
//! payloads. Opening a task while another is open pushes a terminator
//! sentinel on the step channel so the observer can close its inner loop;
//! `stop` terminates both channels and makes every later producer call fail.
//! Cancellation flows the other way: the observer sets the shared stopped
//! flag, and the worker notices at its next reporter call.


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default bound for both channels.
pub const DEFAULT_CAPACITY: usize = 256;

/// Contract violations surfaced to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The reporter was stopped; no further tasks or steps are accepted.
    #[error("operation on stopped reporter")]
    Stopped,
    /// `task_iter` advanced without the previous step being reported.
    #[error("step not reported in previous iteration")]
    ReportMissing,
}

/// A unit of work announced to the observer. `length` is the expected step
/// count when known; `unit` names what one step represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub title: String,
    pub unit: Option<String>,
    pub length: Option<u64>,
}

enum TaskMsg {
    Start(Task),
    Done,
}

enum StepMsg {
    Step(Option<String>),
    EndTask,
}

#[derive(Debug)]
struct Shared {
    stopped: Arc<AtomicBool>,
    start: Mutex<Option<Instant>>,
}

/// Producer half, held by the update worker.
#[derive(Debug)]
pub struct Reporter {
    shared: Arc<Shared>,
    tasks: SyncSender<TaskMsg>,
    steps: SyncSender<StepMsg>,
    task_open: AtomicBool,
    terminated: AtomicBool,
}

/// Consumer half, held by the observer (terminal or GUI front-end).
pub struct Progress {
    shared: Arc<Shared>,
    tasks: Receiver<TaskMsg>,
    steps: Receiver<StepMsg>,
}

/// Create a connected reporter/observer pair with the given channel bound.
pub fn channel(capacity: usize) -> (Reporter, Progress) {
    let shared = Arc::new(Shared {
        stopped: Arc::new(AtomicBool::new(false)),
        start: Mutex::new(None),
    });
    let (task_tx, task_rx) = sync_channel(capacity);
    let (step_tx, step_rx) = sync_channel(capacity);
    (
        Reporter {
            shared: Arc::clone(&shared),
            tasks: task_tx,
            steps: step_tx,
            task_open: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        },
        Progress {
            shared,
            tasks: task_rx,
            steps: step_rx,
        },
    )
}

impl Reporter {
    /// Open a new task. The first task records the start timestamp; any
    /// later one first terminates the previous task's step stream.
    pub fn task(
        &self,
        title: &str,
        unit: Option<&str>,
        length: Option<u64>,
    ) -> Result<(), ReportError> {
        self.ensure_running()?;
        if self.task_open.swap(true, Ordering::SeqCst) {
            self.steps
                .send(StepMsg::EndTask)
                .map_err(|_| ReportError::Stopped)?;
        } else {
            *self.shared.start.lock().unwrap() = Some(Instant::now());
        }
        self.tasks
            .send(TaskMsg::Start(Task {
                title: title.to_string(),
                unit: unit.map(str::to_string),
                length,
            }))
            .map_err(|_| ReportError::Stopped)
    }

    /// Emit one step within the current task. The payload is opaque to the
    /// core; observers typically display it as the current item.
    pub fn step(&self, payload: Option<String>) -> Result<(), ReportError> {
        self.ensure_running()?;
        self.steps
            .send(StepMsg::Step(payload))
            .map_err(|_| ReportError::Stopped)
    }

    /// Open a task sized to `items` and iterate it. Every yielded element
    /// comes with a one-shot [`StepHandle`] that must be consumed before the
    /// next element; advancing without reporting yields `ReportMissing`.
    pub fn task_iter<T>(
        &self,
        title: &str,
        items: Vec<T>,
        unit: Option<&str>,
    ) -> Result<TaskIter<'_, T>, ReportError> {
        self.task(title, unit, Some(items.len() as u64))?;
        Ok(TaskIter {
            reporter: self,
            items: items.into_iter(),
            reported: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Stop the reporter: set the cancellation flag, terminate both channels
    /// (exactly once), and reject every later `task`/`step` call. Idempotent.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        if !self.terminated.swap(true, Ordering::SeqCst) {
            let _ = self.steps.send(StepMsg::EndTask);
            let _ = self.tasks.send(TaskMsg::Done);
        }
    }

    /// Cooperative cancellation probe.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Shared cancellation flag, for workers that outlive a borrow of the
    /// reporter (the download pool consults it before each request).
    pub fn stop_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.stopped)
    }

    /// Wall-clock time since the first task was opened.
    pub fn elapsed(&self) -> Duration {
        elapsed_since_start(&self.shared)
    }

    fn ensure_running(&self) -> Result<(), ReportError> {
        if self.is_stopped() {
            Err(ReportError::Stopped)
        } else {
            Ok(())
        }
    }
}

/// Iterator returned by [`Reporter::task_iter`].
pub struct TaskIter<'a, T> {
    reporter: &'a Reporter,
    items: std::vec::IntoIter<T>,
    reported: Arc<AtomicBool>,
}

impl<'a, T> Iterator for TaskIter<'a, T> {
    type Item = Result<(T, StepHandle<'a>), ReportError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        if self.reporter.is_stopped() {
            return Some(Err(ReportError::Stopped));
        }
        if !self.reported.swap(false, Ordering::SeqCst) {
            return Some(Err(ReportError::ReportMissing));
        }
        Some(Ok((
            item,
            StepHandle {
                reporter: self.reporter,
                reported: Arc::clone(&self.reported),
            },
        )))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

/// One-shot step emitter tied to a single `task_iter` element.
#[derive(Debug)]
pub struct StepHandle<'a> {
    reporter: &'a Reporter,
    reported: Arc<AtomicBool>,
}

impl StepHandle<'_> {
    /// Report the step for this iteration. Consuming the handle is what
    /// satisfies the exactly-once contract.
    pub fn report(self, payload: Option<String>) -> Result<(), ReportError> {
        self.reported.store(true, Ordering::SeqCst);
        self.reporter.step(payload)
    }
}

impl Progress {
    /// Iterate task records until the reporter stops (or is dropped).
    pub fn tasks(&self) -> Tasks<'_> {
        Tasks(&self.tasks)
    }

    /// Iterate the current task's steps until its terminator sentinel.
    pub fn steps(&self) -> Steps<'_> {
        Steps(&self.steps)
    }

    /// Request cancellation. Only the flag is set here; the worker, as the
    /// producer, terminates the channels on its way out.
    pub fn cancel(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
    }

    /// Wall-clock time since the first task was opened.
    pub fn elapsed(&self) -> Duration {
        elapsed_since_start(&self.shared)
    }
}

fn elapsed_since_start(shared: &Shared) -> Duration {
    shared
        .start
        .lock()
        .unwrap()
        .map(|start| start.elapsed())
        .unwrap_or_default()
}

/// Task iterator for the observer; ends on the task-channel terminator or
/// when the producer disappears.
pub struct Tasks<'a>(&'a Receiver<TaskMsg>);

impl Iterator for Tasks<'_> {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        match self.0.recv() {
            Ok(TaskMsg::Start(task)) => {
                tracing::debug!(title = %task.title, "task start");
                Some(task)
            }
            Ok(TaskMsg::Done) | Err(_) => None,
        }
    }
}

/// Step iterator for the observer; ends on the per-task sentinel or when
/// the producer disappears.
pub struct Steps<'a>(&'a Receiver<StepMsg>);

impl Iterator for Steps<'_> {
    type Item = Option<String>;

    fn next(&mut self) -> Option<Option<String>> {
        match self.0.recv() {
            Ok(StepMsg::Step(payload)) => Some(payload),
            Ok(StepMsg::EndTask) | Err(_) => None,
        }
    }
}
