// Copyright 2016-2024 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::thread::scope;

/// Create and execute a worker pool. Results are handed to the postprocessor in the order
/// given by their [`Orderable::index`], no matter in which order the workers finish them.
///
/// # Arguments
/// * `preprocessor` - Closure feeding work items into the pool.
/// * `workers` - Closures that execute the work.
/// * `postprocessor` - Closure consuming the ordered results.
pub(crate) fn worker_pool<Post, Pre, Workers, W, U, T>(
    preprocessor: Pre,
    workers: Workers,
    mut postprocessor: Post,
    in_capacity: usize,
    out_capacity: usize,
) -> Result<()>
where
    Post: FnMut(T) -> Result<()>,
    Post: Send,
    Pre: FnOnce(Sender<U>) -> Result<()>,
    Pre: Send,
    Workers: Iterator<Item = W>,
    W: FnOnce(Receiver<U>, Sender<T>) -> Result<()>,
    W: Send,
    T: Send + Orderable,
    U: Send,
{
    scope(|scope| -> Result<()> {
        let (in_sender, in_receiver) = bounded(in_capacity);
        let (out_sender, out_receiver) = bounded(out_capacity);

        let preprocessor = scope.spawn(move |_| preprocessor(in_sender));

        let workers: Vec<_> = workers
            .map(|worker: W| {
                let in_receiver = in_receiver.clone();
                let out_sender = out_sender.clone();
                scope.spawn(move |_| worker(in_receiver, out_sender))
            })
            .collect();
        // workers hold the remaining handles, the channels close once all of them are done
        drop(in_receiver);
        drop(out_sender);

        let postprocessor = scope.spawn(move |_| -> Result<()> {
            let mut items = OrderedContainer::new();
            let mut last_index = None;

            for item in out_receiver {
                items.insert(item.index(), item);

                // Find continuous prefix, postprocess in order.
                for item in items.remove_continuous_prefix(&mut last_index) {
                    postprocessor(item)?;
                }
            }
            if !items.is_empty() {
                return Err(anyhow!(
                    "worker pool finished with {} results missing their predecessors",
                    items.len()
                ));
            }

            Ok(())
        });

        let mut errors = Vec::new();
        let mut join = |ret: std::thread::Result<Result<()>>| match ret {
            Ok(Ok(())) => (),
            Ok(Err(e)) => errors.push(e),
            Err(_) => errors.push(anyhow!("worker thread panicked")),
        };

        join(postprocessor.join());
        for worker in workers {
            join(worker.join());
        }
        join(preprocessor.join());

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })
    .map_err(|_| anyhow!("worker pool thread panicked"))?
}

pub(crate) trait Orderable {
    fn index(&self) -> usize;
}

struct OrderedContainer<T> {
    inner: BTreeMap<usize, T>,
}

impl<T> OrderedContainer<T>
where
    T: Orderable,
{
    fn new() -> Self {
        OrderedContainer {
            inner: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: usize, value: T) {
        self.inner.insert(key, value);
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    /// Remove the items directly following `last_idx` without gaps.
    fn remove_continuous_prefix(&mut self, last_idx: &mut Option<usize>) -> Vec<T> {
        let mut items = Vec::new();
        loop {
            let next = last_idx.map_or(0, |last| last + 1);
            match self.inner.remove(&next) {
                Some(item) => {
                    items.push(item);
                    last_idx.replace(next);
                }
                None => break,
            }
        }
        items
    }
}
