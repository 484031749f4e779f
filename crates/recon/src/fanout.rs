use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// Apply `f` to every item using up to `concurrency` scoped worker threads.
///
/// Output order equals input order regardless of completion order. After the
/// first error no new items are started; the error with the lowest input
/// index among those that ran is returned.
pub fn map_ordered<T, U, E, F>(items: &[T], concurrency: usize, f: F) -> Result<Vec<U>, E>
where
    T: Sync,
    U: Send,
    E: Send,
    F: Fn(&T) -> Result<U, E> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let workers = concurrency.clamp(1, items.len());
    if workers == 1 {
        return items.iter().map(&f).collect();
    }

    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let (next, failed, f) = (&next, &failed, &f);

    let outcomes: Vec<Result<Vec<(usize, U)>, (usize, E)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        if failed.load(Ordering::Acquire) {
                            return Ok(done);
                        }
                        let idx = next.fetch_add(1, Ordering::AcqRel);
                        if idx >= items.len() {
                            return Ok(done);
                        }
                        match f(&items[idx]) {
                            Ok(value) => done.push((idx, value)),
                            Err(e) => {
                                failed.store(true, Ordering::Release);
                                return Err((idx, e));
                            }
                        }
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut slots: Vec<Option<U>> = (0..items.len()).map(|_| None).collect();
    let mut first_err: Option<(usize, E)> = None;

    for outcome in outcomes {
        match outcome {
            Ok(done) => {
                for (idx, value) in done {
                    slots[idx] = Some(value);
                }
            }
            Err((idx, e)) => {
                if first_err.as_ref().map_or(true, |(i, _)| idx < *i) {
                    first_err = Some((idx, e));
                }
            }
        }
    }

    if let Some((_, e)) = first_err {
        return Err(e);
    }

    // Without an error every index was claimed and completed exactly once.
    Ok(slots.into_iter().flatten().collect())
}
