//! A generic branching graph walker.
//!
//! A [`Traversal`] repeatedly takes an item off its queue, checks it against
//! the tracker, evaluates stop conditions, runs step actions and asks the
//! caller's `queue_next` callback for more work. Work emitted as a branch is
//! walked later by a sub-traversal with its own queue and a tracker chained
//! to its parent's.
//!
//! Processing order for one `run`:
//!
//! 1. start items,
//! 2. the main queue until empty,
//! 3. branches, each fully finished (including its own branches) before the
//!    next sibling starts.

use crate::queue::{QueueDiscipline, TraversalQueue};
use crate::tracker::Tracker;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::hash::Hash;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraversalError {
    #[error("traversal is already running")]
    AlreadyRunning,

    #[error("traversal has already run, call reset() before running it again")]
    NotReset,

    #[error("traversal has no start items and nothing queued")]
    NoStartItems,
}

// ---------------------------------------------------------------------------
// Step context
// ---------------------------------------------------------------------------

/// A value derived along the walk by a [`ContextValueComputer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ContextValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Per-item record kept alongside every queued item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepContext {
    pub is_start_item: bool,
    /// True for the first item of a branch only.
    pub is_branch_start_item: bool,
    pub step_number: usize,
    /// Nesting level, 0 on the root walk.
    pub branch_depth: usize,
    /// Set once the stop conditions have matched this item.
    pub is_stopping: bool,
    values: BTreeMap<String, ContextValue>,
}

impl StepContext {
    pub fn value(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Derives a named [`ContextValue`] for every item from its predecessor.
pub trait ContextValueComputer<T> {
    /// Name the value is stored under in [`StepContext`].
    fn key(&self) -> &str;

    fn initial_value(&self, item: &T) -> ContextValue;

    fn next_value(
        &self,
        next_item: &T,
        current_item: &T,
        current_value: Option<&ContextValue>,
    ) -> ContextValue;
}

// ---------------------------------------------------------------------------
// StepQueue
// ---------------------------------------------------------------------------

/// Collects the work emitted by one `queue_next` call.
///
/// Emitted items are filtered through the queue conditions once the callback
/// returns.
pub struct StepQueue<'s, T, K> {
    tracker: &'s Tracker<K>,
    key_of: fn(&T) -> K,
    items: Vec<T>,
    branches: Vec<T>,
}

impl<T, K: Eq + Hash> StepQueue<'_, T, K> {
    /// Continue the current walk with `item`.
    pub fn queue(&mut self, item: T) {
        self.items.push(item);
    }

    /// Start a new branch at `item`.
    pub fn branch(&mut self, item: T) {
        self.branches.push(item);
    }

    /// Whether the walk producing this step has already visited `item`.
    pub fn has_visited(&self, item: &T) -> bool {
        self.tracker.has_visited(&(self.key_of)(item))
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Callback types
// ---------------------------------------------------------------------------

pub type QueueNext<'a, T, K, E> =
    Box<dyn FnMut(&T, &StepContext, &mut StepQueue<'_, T, K>) -> Result<(), E> + 'a>;
pub type StopCondition<'a, T> = Box<dyn FnMut(&T, &StepContext) -> bool + 'a>;
pub type QueueCondition<'a, T> = Box<dyn FnMut(&T, &StepContext, &T, &StepContext) -> bool + 'a>;
pub type StepAction<'a, T> = Box<dyn FnMut(&T, &StepContext) + 'a>;

struct Queued<T> {
    item: T,
    context: StepContext,
}

fn queued_item<T>(queued: &Queued<T>) -> &T {
    &queued.item
}

struct Frame<T, K> {
    queue: TraversalQueue<Queued<T>>,
    branches: TraversalQueue<Queued<T>>,
    tracker: Rc<Tracker<K>>,
}

impl<T: 'static, K> Frame<T, K> {
    fn new(discipline: &QueueDiscipline<T>, tracker: Tracker<K>) -> Self {
        Self {
            queue: discipline.queue_of(queued_item::<T>),
            branches: discipline.queue_of(queued_item::<T>),
            tracker: Rc::new(tracker),
        }
    }

    fn abandon(&mut self) {
        self.queue.clear();
        self.branches.clear();
    }
}

/// Everything that decides how an item is handled.
struct Steps<'a, T, K, E> {
    discipline: QueueDiscipline<T>,
    key_of: fn(&T) -> K,
    queue_next: QueueNext<'a, T, K, E>,
    stop_conditions: Vec<StopCondition<'a, T>>,
    queue_conditions: Vec<QueueCondition<'a, T>>,
    step_actions: Vec<StepAction<'a, T>>,
    computers: Vec<Box<dyn ContextValueComputer<T> + 'a>>,
}

impl<T: 'static, K: Eq + Hash + Clone, E> Steps<'_, T, K, E> {
    fn initial_values(&self, item: &T) -> BTreeMap<String, ContextValue> {
        self.computers
            .iter()
            .map(|c| (c.key().to_owned(), c.initial_value(item)))
            .collect()
    }

    fn next_context(
        &self,
        current: &T,
        context: &StepContext,
        next: &T,
        is_branch: bool,
    ) -> StepContext {
        StepContext {
            is_start_item: false,
            is_branch_start_item: is_branch,
            step_number: context.step_number + 1,
            branch_depth: context.branch_depth + usize::from(is_branch),
            is_stopping: false,
            values: self
                .computers
                .iter()
                .map(|c| {
                    let value = c.next_value(next, current, context.values.get(c.key()));
                    (c.key().to_owned(), value)
                })
                .collect(),
        }
    }

    fn can_queue(
        &mut self,
        next: &T,
        next_context: &StepContext,
        current: &T,
        context: &StepContext,
    ) -> bool {
        self.queue_conditions
            .iter_mut()
            .all(|condition| condition(next, next_context, current, context))
    }

    /// Evaluate, act on and expand one item that has already been visited.
    fn step(
        &mut self,
        frame: &mut Frame<T, K>,
        item: T,
        mut context: StepContext,
        can_stop: bool,
    ) -> Result<(), E> {
        if can_stop {
            let mut stopping = false;
            for condition in &mut self.stop_conditions {
                stopping |= condition(&item, &context);
            }
            context.is_stopping = stopping;
        }

        for action in &mut self.step_actions {
            action(&item, &context);
        }

        if context.is_stopping {
            return Ok(());
        }

        let mut emitted = StepQueue {
            tracker: &*frame.tracker,
            key_of: self.key_of,
            items: Vec::new(),
            branches: Vec::new(),
        };
        (self.queue_next)(&item, &context, &mut emitted)?;
        let StepQueue {
            items, branches, ..
        } = emitted;

        for next in items {
            let next_context = self.next_context(&item, &context, &next, false);
            if self.can_queue(&next, &next_context, &item, &context) {
                frame.queue.put(Queued {
                    item: next,
                    context: next_context,
                });
            }
        }
        for next in branches {
            let next_context = self.next_context(&item, &context, &next, true);
            if self.can_queue(&next, &next_context, &item, &context) {
                frame.branches.put(Queued {
                    item: next,
                    context: next_context,
                });
            }
        }
        Ok(())
    }

    fn drain(&mut self, frame: &mut Frame<T, K>) -> Result<(), E> {
        while let Some(Queued { item, context }) = frame.queue.get() {
            if !Rc::make_mut(&mut frame.tracker).visit((self.key_of)(&item)) {
                continue;
            }
            self.step(frame, item, context, true)?;
        }
        Ok(())
    }

    /// Walk every pending branch of `root`, depth first over branch frames.
    fn run_branches(&mut self, root: &mut Frame<T, K>, failures: &mut Vec<E>) {
        let mut stack: Vec<Frame<T, K>> = Vec::new();
        loop {
            let parent = match stack.last_mut() {
                Some(frame) => frame,
                None => &mut *root,
            };
            let Some(Queued { item, context }) = parent.branches.get() else {
                if stack.pop().is_none() {
                    break;
                }
                continue;
            };

            let mut child = Frame::new(
                &self.discipline,
                Tracker::child_of(Rc::clone(&parent.tracker)),
            );
            if !Rc::make_mut(&mut child.tracker).visit((self.key_of)(&item)) {
                continue;
            }
            let outcome = self
                .step(&mut child, item, context, true)
                .and_then(|()| self.drain(&mut child));
            if let Err(e) = outcome {
                failures.push(e);
                child.abandon();
            }
            stack.push(child);
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// A reusable walk over items of type `T`, tracked by key `K`.
///
/// `E` is the error `queue_next` may raise to abandon the current branch.
pub struct Traversal<'a, T, K = T, E = Infallible> {
    steps: Steps<'a, T, K, E>,
    start_items: Vec<T>,
    root: Frame<T, K>,
    failures: Vec<E>,
    running: bool,
    has_run: bool,
}

impl<'a, T, E> Traversal<'a, T, T, E>
where
    T: Clone + Eq + Hash + 'static,
{
    /// A traversal tracked by the items themselves.
    pub fn new(
        discipline: QueueDiscipline<T>,
        queue_next: impl FnMut(&T, &StepContext, &mut StepQueue<'_, T, T>) -> Result<(), E> + 'a,
    ) -> Self {
        Self::keyed(discipline, <T as Clone>::clone, queue_next)
    }
}

impl<'a, T, K, E> Traversal<'a, T, K, E>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone,
{
    /// A traversal tracked by `key_of(item)`.
    pub fn keyed(
        discipline: QueueDiscipline<T>,
        key_of: fn(&T) -> K,
        queue_next: impl FnMut(&T, &StepContext, &mut StepQueue<'_, T, K>) -> Result<(), E> + 'a,
    ) -> Self {
        let root = Frame::new(&discipline, Tracker::new());
        Self {
            steps: Steps {
                discipline,
                key_of,
                queue_next: Box::new(queue_next),
                stop_conditions: Vec::new(),
                queue_conditions: Vec::new(),
                step_actions: Vec::new(),
                computers: Vec::new(),
            },
            start_items: Vec::new(),
            root,
            failures: Vec::new(),
            running: false,
            has_run: false,
        }
    }

    // --- Configuration ---

    pub fn add_stop_condition(
        &mut self,
        condition: impl FnMut(&T, &StepContext) -> bool + 'a,
    ) -> &mut Self {
        self.steps.stop_conditions.push(Box::new(condition));
        self
    }

    /// Gate candidates as `(next_item, next_context, current_item, current_context)`.
    pub fn add_queue_condition(
        &mut self,
        condition: impl FnMut(&T, &StepContext, &T, &StepContext) -> bool + 'a,
    ) -> &mut Self {
        self.steps.queue_conditions.push(Box::new(condition));
        self
    }

    pub fn add_step_action(&mut self, action: impl FnMut(&T, &StepContext) + 'a) -> &mut Self {
        self.steps.step_actions.push(Box::new(action));
        self
    }

    pub fn add_context_computer(
        &mut self,
        computer: impl ContextValueComputer<T> + 'a,
    ) -> &mut Self {
        self.steps.computers.push(Box::new(computer));
        self
    }

    pub fn add_start_item(&mut self, item: T) -> &mut Self {
        self.start_items.push(item);
        self
    }

    pub fn clear_start_items(&mut self) {
        self.start_items.clear();
    }

    // --- Pre-seeding ---

    /// Put `item` straight onto the main queue.
    pub fn queue_item(&mut self, item: T) {
        let context = StepContext {
            values: self.steps.initial_values(&item),
            ..StepContext::default()
        };
        self.root.queue.put(Queued { item, context });
    }

    /// Put `item` straight onto the branch queue as a branch start.
    pub fn queue_branch(&mut self, item: T) {
        let context = StepContext {
            is_branch_start_item: true,
            branch_depth: 1,
            values: self.steps.initial_values(&item),
            ..StepContext::default()
        };
        self.root.branches.put(Queued { item, context });
    }

    pub fn tracker(&self) -> &Tracker<K> {
        &self.root.tracker
    }

    /// The root tracker, for marking items visited before `run`.
    pub fn tracker_mut(&mut self) -> &mut Tracker<K> {
        Rc::make_mut(&mut self.root.tracker)
    }

    // --- Results ---

    /// Errors that abandoned a branch or the root walk during the last run.
    pub fn failures(&self) -> &[E] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<E> {
        std::mem::take(&mut self.failures)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Clear the queues, tracker, failures and run flags. Start items and
    /// callbacks are kept.
    pub fn reset(&mut self) {
        self.root = Frame::new(&self.steps.discipline, Tracker::new());
        self.failures.clear();
        self.running = false;
        self.has_run = false;
    }

    // --- Running ---

    pub fn run(&mut self, can_stop_on_start_item: bool) -> Result<(), TraversalError> {
        if self.running {
            return Err(TraversalError::AlreadyRunning);
        }
        if self.has_run {
            return Err(TraversalError::NotReset);
        }
        if self.start_items.is_empty() && self.root.queue.is_empty() && self.root.branches.is_empty()
        {
            return Err(TraversalError::NoStartItems);
        }

        self.running = true;
        let Self {
            steps,
            start_items,
            root,
            failures,
            ..
        } = self;

        let mut outcome = Ok(());
        for start in start_items.iter() {
            if !Rc::make_mut(&mut root.tracker).visit((steps.key_of)(start)) {
                continue;
            }
            let context = StepContext {
                is_start_item: true,
                values: steps.initial_values(start),
                ..StepContext::default()
            };
            outcome = steps.step(root, start.clone(), context, can_stop_on_start_item);
            if outcome.is_err() {
                break;
            }
        }
        if let Err(e) = outcome.and_then(|()| steps.drain(root)) {
            failures.push(e);
            root.abandon();
        }
        steps.run_branches(root, failures);

        self.running = false;
        self.has_run = true;
        Ok(())
    }
}
