//! Work queues with pluggable ordering for traversals.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Orders two queued items. The greater item is dequeued first.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

// ---------------------------------------------------------------------------
// TraversalQueue
// ---------------------------------------------------------------------------

/// A queue of pending traversal items.
pub enum TraversalQueue<T> {
    /// Last in, first out.
    DepthFirst(Vec<T>),
    /// First in, first out.
    BreadthFirst(VecDeque<T>),
    /// Greatest first by `compare`, insertion order among equals.
    Priority { items: Vec<T>, compare: Comparator<T> },
}

impl<T> TraversalQueue<T> {
    pub fn depth_first() -> Self {
        Self::DepthFirst(Vec::new())
    }

    pub fn breadth_first() -> Self {
        Self::BreadthFirst(VecDeque::new())
    }

    pub fn priority(compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self::Priority {
            items: Vec::new(),
            compare: Arc::new(compare),
        }
    }

    pub fn put(&mut self, item: T) {
        match self {
            Self::DepthFirst(items) => items.push(item),
            Self::BreadthFirst(items) => items.push_back(item),
            Self::Priority { items, compare } => {
                // Kept sorted ascending with newer equals in front of older
                // ones, so popping from the back yields the oldest of the
                // greatest.
                let at = items.partition_point(|e| compare(e, &item) == Ordering::Less);
                items.insert(at, item);
            }
        }
    }

    pub fn get(&mut self) -> Option<T> {
        match self {
            Self::DepthFirst(items) => items.pop(),
            Self::BreadthFirst(items) => items.pop_front(),
            Self::Priority { items, .. } => items.pop(),
        }
    }

    /// The item the next `get` would return.
    pub fn peek(&self) -> Option<&T> {
        match self {
            Self::DepthFirst(items) => items.last(),
            Self::BreadthFirst(items) => items.front(),
            Self::Priority { items, .. } => items.last(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            Self::DepthFirst(items) => items.len(),
            Self::BreadthFirst(items) => items.len(),
            Self::Priority { items, .. } => items.len(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Self::DepthFirst(items) => items.clear(),
            Self::BreadthFirst(items) => items.clear(),
            Self::Priority { items, .. } => items.clear(),
        }
    }
}

impl<T> fmt::Debug for TraversalQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::DepthFirst(_) => "DepthFirst",
            Self::BreadthFirst(_) => "BreadthFirst",
            Self::Priority { .. } => "Priority",
        };
        f.debug_struct("TraversalQueue")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// QueueDiscipline
// ---------------------------------------------------------------------------

/// Builds fresh queues of one ordering for a traversal and each of its
/// branches.
pub enum QueueDiscipline<T> {
    DepthFirst,
    BreadthFirst,
    Priority(Comparator<T>),
}

impl<T> QueueDiscipline<T> {
    pub fn priority(compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self::Priority(Arc::new(compare))
    }

    pub fn queue(&self) -> TraversalQueue<T> {
        match self {
            Self::DepthFirst => TraversalQueue::depth_first(),
            Self::BreadthFirst => TraversalQueue::breadth_first(),
            Self::Priority(compare) => TraversalQueue::Priority {
                items: Vec::new(),
                compare: Arc::clone(compare),
            },
        }
    }
}

impl<T: 'static> QueueDiscipline<T> {
    /// A queue of wrapper items ordered by the `T` each one holds.
    pub fn queue_of<U: 'static>(&self, project: fn(&U) -> &T) -> TraversalQueue<U> {
        match self {
            Self::DepthFirst => TraversalQueue::depth_first(),
            Self::BreadthFirst => TraversalQueue::breadth_first(),
            Self::Priority(compare) => {
                let compare = Arc::clone(compare);
                TraversalQueue::priority(move |a: &U, b: &U| compare(project(a), project(b)))
            }
        }
    }
}

impl<T> Clone for QueueDiscipline<T> {
    fn clone(&self) -> Self {
        match self {
            Self::DepthFirst => Self::DepthFirst,
            Self::BreadthFirst => Self::BreadthFirst,
            Self::Priority(compare) => Self::Priority(Arc::clone(compare)),
        }
    }
}

impl<T> fmt::Debug for QueueDiscipline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthFirst => f.write_str("DepthFirst"),
            Self::BreadthFirst => f.write_str("BreadthFirst"),
            Self::Priority(_) => f.write_str("Priority(..)"),
        }
    }
}
