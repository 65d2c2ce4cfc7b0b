//! A minimal single-threaded cooperative scheduler: the concurrency
//! contract only, not a coroutine runtime or an `async` executor, just
//! the `Scheduler`/`TaskHandle`/`Channel`/`Bundle` shapes a caller can
//! drive by hand. Deadlines are counted in scheduler steps rather than
//! wall-clock time, keeping observable behavior free of a clock
//! dependency.

use std::collections::VecDeque;

/// Opaque handle to a spawned task (§6).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TaskHandle(usize);

enum TaskState {
    Ready,
    Done,
    Cancelled,
}

struct Task {
    state: TaskState,
    deadline_step: Option<u64>,
}

/// A cooperative, step-counted scheduler. Callers `spawn` a task, then
/// drive it forward with `step`; there is no preemption and no threads.
pub struct Scheduler {
    tasks: Vec<Task>,
    ready: VecDeque<usize>,
    current_step: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tasks: Vec::new(),
            ready: VecDeque::new(),
            current_step: 0,
        }
    }

    pub fn spawn(&mut self, deadline_steps: Option<u64>) -> TaskHandle {
        let id = self.tasks.len();
        let deadline_step = deadline_steps.map(|d| self.current_step + d);
        self.tasks.push(Task {
            state: TaskState::Ready,
            deadline_step,
        });
        self.ready.push_back(id);
        TaskHandle(id)
    }

    pub fn cancel(&mut self, handle: TaskHandle) {
        if let Some(task) = self.tasks.get_mut(handle.0) {
            task.state = TaskState::Cancelled;
        }
    }

    pub fn is_cancelled(&self, handle: TaskHandle) -> bool {
        matches!(self.tasks.get(handle.0).map(|t| &t.state), Some(TaskState::Cancelled))
    }

    pub fn is_done(&self, handle: TaskHandle) -> bool {
        matches!(self.tasks.get(handle.0).map(|t| &t.state), Some(TaskState::Done))
    }

    pub fn finish(&mut self, handle: TaskHandle) {
        if let Some(task) = self.tasks.get_mut(handle.0) {
            task.state = TaskState::Done;
        }
    }

    /// Advances the scheduler by one step, expiring any task whose
    /// deadline has passed. Returns the next ready task id, if any.
    pub fn step(&mut self) -> Option<TaskHandle> {
        self.current_step += 1;
        for (id, task) in self.tasks.iter_mut().enumerate() {
            if let Some(deadline) = task.deadline_step {
                if self.current_step >= deadline && matches!(task.state, TaskState::Ready) {
                    task.state = TaskState::Cancelled;
                    let _ = id;
                }
            }
        }
        loop {
            let id = self.ready.pop_front()?;
            if matches!(self.tasks[id].state, TaskState::Ready) {
                return Some(TaskHandle(id));
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

/// A single-producer, single-consumer, unbounded queue: the contract-only
/// analogue of an inter-task channel.
pub struct Channel<T> {
    queue: VecDeque<T>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Channel { queue: VecDeque::new() }
    }

    pub fn send(&mut self, value: T) {
        self.queue.push_back(value);
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.queue.pop_front()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Channel::new()
    }
}

/// A set of tasks spawned together that should be waited on as a unit,
/// tearing the rest down if one is cancelled (structured-concurrency
/// contract per §5).
pub struct Bundle {
    members: Vec<TaskHandle>,
}

impl Bundle {
    pub fn new() -> Self {
        Bundle { members: Vec::new() }
    }

    pub fn add(&mut self, handle: TaskHandle) {
        self.members.push(handle);
    }

    pub fn all_done(&self, scheduler: &Scheduler) -> bool {
        self.members.iter().all(|h| scheduler.is_done(*h) || scheduler.is_cancelled(*h))
    }

    pub fn cancel_all(&self, scheduler: &mut Scheduler) {
        for handle in &self.members {
            scheduler.cancel(*handle);
        }
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Bundle::new()
    }
}
