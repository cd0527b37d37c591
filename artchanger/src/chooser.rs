use rand::{Rng, rng};

/// Source of the random picks made during a run (which source, which file).
pub trait Chooser: Send + Sync {
    /// Return an index in `0..len`. Only called with `len > 0`.
    fn pick_index(&self, len: usize) -> usize;
}

/// Pick one element of `items`, or `None` if it is empty.
pub fn pick_one<'a, T>(chooser: &dyn Chooser, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    let idx = chooser.pick_index(items.len()).min(items.len() - 1);
    items.get(idx)
}

/// Uniform picks from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngChooser;

impl Chooser for ThreadRngChooser {
    fn pick_index(&self, len: usize) -> usize {
        rng().random_range(0..len)
    }
}

/// Deterministic picks for tests: replays `indices` in order, then repeats the last one.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedChooser {
    indices: Vec<usize>,
    cursor: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FixedChooser {
    pub fn new(indices: impl Into<Vec<usize>>) -> Self {
        Self {
            indices: indices.into(),
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl Chooser for FixedChooser {
    fn pick_index(&self, len: usize) -> usize {
        let at = self
            .cursor
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let idx = self
            .indices
            .get(at)
            .or(self.indices.last())
            .copied()
            .unwrap_or(0);
        idx % len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slice_yields_none() {
        let empty: [u8; 0] = [];
        assert!(pick_one(&ThreadRngChooser, &empty).is_none());
    }

    #[test]
    fn thread_rng_stays_in_bounds() {
        let items = ["a", "b", "c"];
        for _ in 0..100 {
            assert!(items.contains(pick_one(&ThreadRngChooser, &items).unwrap()));
        }
    }

    #[test]
    fn fixed_chooser_replays_then_sticks() {
        let chooser = FixedChooser::new([2, 0]);
        let items = ["a", "b", "c"];
        assert_eq!(pick_one(&chooser, &items), Some(&"c"));
        assert_eq!(pick_one(&chooser, &items), Some(&"a"));
        assert_eq!(pick_one(&chooser, &items), Some(&"a"));
    }
}
