//! Long-running scripts as resumable tasks.
//!
//! A script containing `yield` does not run to completion in one call. Each
//! `yield <ms>` suspends it for that many milliseconds (`yield` alone means
//! the next tick); a [`Scheduler`] resumes it when the delay has passed.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use super::value::Value;
use super::vm::{Exit, Machine};
use super::{ScriptEffect, ScriptError};

/// Result of resuming a task once.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStep {
    /// Resume again after this delay
    Suspended(Duration),
    Done,
    Failed(ScriptError),
}

/// A resumable unit of work.
pub trait Task {
    fn resume(&mut self) -> TaskStep;

    /// Effects requested since the last call.
    fn take_effects(&mut self) -> Vec<ScriptEffect>;
}

/// A generator script bound to its arguments.
pub struct ScriptTask {
    machine: Machine,
    done: bool,
}

impl fmt::Debug for ScriptTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTask").field("done", &self.done).finish()
    }
}

impl ScriptTask {
    pub(crate) fn new(machine: Machine) -> Self {
        Self {
            machine,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done || self.machine.is_finished()
    }
}

fn delay(value: &Value) -> Result<Duration, ScriptError> {
    match value {
        Value::None => Ok(Duration::ZERO),
        Value::Int(ms) if *ms >= 0 => Ok(Duration::from_millis(*ms as u64)),
        Value::Float(ms) if ms.is_finite() && *ms >= 0.0 => Ok(Duration::from_secs_f64(ms / 1000.0)),
        other => Err(ScriptError::contract(format!(
            "yield expects a delay in milliseconds, not {}",
            other.repr()
        ))),
    }
}

impl Task for ScriptTask {
    fn resume(&mut self) -> TaskStep {
        if self.is_done() {
            return TaskStep::Done;
        }
        let step = match self.machine.run() {
            Ok(Exit::Yield(value)) => match delay(&value) {
                Ok(d) => return TaskStep::Suspended(d),
                Err(e) => TaskStep::Failed(e),
            },
            Ok(Exit::Return(_)) => TaskStep::Done,
            Err(e) if e.is_not_found() => {
                log::debug!("script task stopped: {}", e);
                TaskStep::Done
            }
            Err(e) => TaskStep::Failed(e),
        };
        self.done = true;
        step
    }

    fn take_effects(&mut self) -> Vec<ScriptEffect> {
        self.machine.context_mut().take_effects()
    }
}

/// Identifies a task spawned on a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

struct Entry {
    id: TaskId,
    task: Box<dyn Task>,
    due: Instant,
}

/// Drives suspended tasks from the host's event loop.
///
/// Tasks run on the thread that owns the scheduler, one at a time, in spawn
/// order among those that are due.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
    next_id: u64,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.entries.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task; it first runs on the next tick.
    pub fn spawn(&mut self, task: impl Task + 'static) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.entries.push(Entry {
            id,
            task: Box::new(task),
            due: Instant::now(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop a task without resuming it again.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Earliest time a task wants to run.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.due).min()
    }

    /// Resume every task due at `now`. Effects are handed to `on_effects`
    /// after each resume; finished tasks are reported in the result.
    pub fn tick<F>(&mut self, now: Instant, mut on_effects: F) -> Vec<(TaskId, Result<(), ScriptError>)>
    where
        F: FnMut(TaskId, Vec<ScriptEffect>),
    {
        let mut finished = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].due > now {
                i += 1;
                continue;
            }
            let entry = &mut self.entries[i];
            let step = entry.task.resume();
            let effects = entry.task.take_effects();
            let id = entry.id;
            if !effects.is_empty() {
                on_effects(id, effects);
            }
            match step {
                TaskStep::Suspended(delay) => {
                    self.entries[i].due = now + delay;
                    i += 1;
                }
                TaskStep::Done => {
                    self.entries.remove(i);
                    finished.push((id, Ok(())));
                }
                TaskStep::Failed(e) => {
                    log::error!("script task failed: {}", e);
                    self.entries.remove(i);
                    finished.push((id, Err(e)));
                }
            }
        }
        finished
    }

    /// Run all tasks to completion, sleeping between deadlines.
    pub fn run_blocking<F>(&mut self, mut on_effects: F) -> Vec<(TaskId, Result<(), ScriptError>)>
    where
        F: FnMut(TaskId, Vec<ScriptEffect>),
    {
        let mut finished = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            finished.extend(self.tick(Instant::now(), &mut on_effects));
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Paragraph, TextBlock, TextDocument};
    use crate::script::{Invocation, Script, ScriptCall};

    fn task(source: &str) -> ScriptTask {
        let doc = TextDocument::new(vec![TextBlock::new("one"), TextBlock::new("two")]);
        let p = Paragraph::new(doc.cursor_at(0));
        match Script::compile(source).unwrap().invoke(ScriptCall::new(p.clone(), p)).unwrap() {
            Invocation::Task(task) => task,
            Invocation::Finished { .. } => panic!("expected a task"),
        }
    }

    #[test]
    fn test_task_suspends_on_yield() {
        let mut t = task("speak('a')\nyield 20\nspeak('b')\nyield\nspeak('c')");
        assert_eq!(t.resume(), TaskStep::Suspended(Duration::from_millis(20)));
        assert_eq!(t.take_effects().len(), 1);
        assert_eq!(t.resume(), TaskStep::Suspended(Duration::ZERO));
        assert!(matches!(&t.take_effects()[..], [ScriptEffect::Speak(s)] if s == "b"));
        assert_eq!(t.resume(), TaskStep::Done);
        assert!(matches!(&t.take_effects()[..], [ScriptEffect::Speak(s)] if s == "c"));
        assert_eq!(t.resume(), TaskStep::Done);
    }

    #[test]
    fn test_task_failure() {
        let mut t = task("yield 1\nraise ScriptError('stuck')");
        assert!(matches!(t.resume(), TaskStep::Suspended(_)));
        assert!(matches!(t.resume(), TaskStep::Failed(e) if e.message == "stuck"));
        let mut bad = task("yield 'soon'");
        assert!(matches!(bad.resume(), TaskStep::Failed(e) if e.is_contract()));
    }

    #[test]
    fn test_scheduler_respects_deadlines() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.spawn(task("yield 1000\nspeak('late')"));
        let start = Instant::now();
        let mut spoken = Vec::new();
        assert!(scheduler.tick(start, |_, e| spoken.extend(e)).is_empty());
        assert!(scheduler.tick(start + Duration::from_millis(10), |_, e| spoken.extend(e)).is_empty());
        assert!(spoken.is_empty());
        let done = scheduler.tick(start + Duration::from_secs(2), |_, e| spoken.extend(e));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, id);
        assert!(done[0].1.is_ok());
        assert_eq!(spoken.len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_run_blocking() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(task("for i in range(3):\n    speak(str(i))\n    yield 1"));
        let mut spoken = Vec::new();
        let done = scheduler.run_blocking(|_, effects| {
            for e in effects {
                if let ScriptEffect::Speak(s) = e {
                    spoken.push(s);
                }
            }
        });
        assert_eq!(done.len(), 1);
        assert_eq!(spoken, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.spawn(task("while True:\n    yield 10"));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.next_deadline().is_none());
    }
}
