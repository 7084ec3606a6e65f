//! Task graph composition and execution.
//!
//! [`parallel`] and [`sequence`] are pure constructors, they only describe
//! the graph. [`run`] walks a [`Node`] tree: parallel composites fan out
//! over the rayon pool and join on all children, sequential composites run
//! children strictly in order and abort on the first failure.
//!
//! Concurrently running tasks must never write to overlapping output
//! paths. That disjointness is an invariant upheld by whoever builds the
//! graph, not something checked at runtime.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use console::Style;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::RunError;
use crate::task::Task;

/// A unit of work schedulable as a graph leaf.
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self) -> anyhow::Result<()>;
}

impl Runnable for Task {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn run(&self) -> anyhow::Result<()> {
        Task::run(self)?;
        Ok(())
    }
}

/// A node in the task graph: a single step, or a composite of children
/// combined in parallel or in strict sequence.
#[derive(Clone)]
pub enum Node {
    Leaf(Arc<dyn Runnable>),
    Parallel(Vec<Node>),
    Sequence(Vec<Node>),
}

pub fn leaf(runnable: impl Runnable + 'static) -> Node {
    Node::Leaf(Arc::new(runnable))
}

/// Combine independent nodes; no ordering guarantee between their side
/// effects, done when all children finish or one fails.
pub fn parallel(nodes: impl IntoIterator<Item = Node>) -> Node {
    Node::Parallel(nodes.into_iter().collect())
}

/// Combine dependent nodes; each child fully completes before the next
/// starts, a failing child aborts the rest.
pub fn sequence(nodes: impl IntoIterator<Item = Node>) -> Node {
    Node::Sequence(nodes.into_iter().collect())
}

/// A leaf built from a closure, for steps which aren't file transform
/// tasks (clean, bundle, upload).
pub fn step(
    name: &'static str,
    func: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static,
) -> Node {
    struct Step<F> {
        name: &'static str,
        func: F,
    }

    impl<F> Runnable for Step<F>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync,
    {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self) -> anyhow::Result<()> {
            (self.func)()
        }
    }

    leaf(Step { name, func })
}

/// Execute a node tree.
///
/// A parallel composite starts all children without waiting and joins on
/// all of them; in-flight siblings of a failed child are not cancelled,
/// and the first failure in child order is the one reported.
pub fn run(node: &Node) -> Result<(), RunError> {
    match node {
        Node::Leaf(runnable) => {
            let s = Instant::now();
            tracing::debug!(step = runnable.name(), "starting");

            runnable.run().map_err(|source| RunError {
                step: runnable.name().to_string(),
                source,
            })?;

            tracing::debug!(step = runnable.name(), "done {}", as_overhead(s));
            Ok(())
        }
        Node::Sequence(children) => {
            for child in children {
                run(child)?;
            }
            Ok(())
        }
        Node::Parallel(children) => children
            .par_iter()
            .map(run)
            .collect::<Vec<_>>()
            .into_iter()
            .collect(),
    }
}

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    const ANSI_BLUE: Style = Style::new().blue();
    let f = format!("(+{}ms)", s.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}
