use std::collections::HashMap;
use std::rc::Rc;

pub const HIGH: char = 'h';
pub const LOW: char = 'l';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Mode {
    Full,
    Opposite,
}

/// Memoized high/low permutations, keyed by mode and slot count.
#[derive(Debug, Default)]
pub struct PermutationCache {
    cache: HashMap<(Mode, usize), Rc<Vec<String>>>,
}

impl PermutationCache {
    pub fn new() -> PermutationCache {
        PermutationCache::default()
    }

    /// All `2^n` assignments, `h` before `l` at every position.
    pub fn all_combinations(&mut self, n: usize) -> Rc<Vec<String>> {
        self.cache
            .entry((Mode::Full, n))
            .or_insert_with(|| {
                let mut permutations = Vec::with_capacity(1 << n.min(20));
                build(&mut permutations, &mut String::with_capacity(n), n, false);
                Rc::new(permutations)
            })
            .clone()
    }

    /// Assignments where each pair `(2k, 2k + 1)` mixes privileges.
    ///
    /// `n` is expected to be even; an odd trailing slot is left unconstrained.
    pub fn opposite_combinations(&mut self, n: usize) -> Rc<Vec<String>> {
        self.cache
            .entry((Mode::Opposite, n))
            .or_insert_with(|| {
                let mut permutations = Vec::new();
                build(&mut permutations, &mut String::with_capacity(n), n, true);
                Rc::new(permutations)
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

fn build(permutations: &mut Vec<String>, current: &mut String, n: usize, paired: bool) {
    let level = current.len();
    if level == n {
        permutations.push(current.clone());
        return;
    }

    let previous = current.as_bytes().last().map(|b| *b as char);
    for choice in [HIGH, LOW] {
        if paired && level % 2 == 1 && previous == Some(choice) {
            continue;
        }
        current.push(choice);
        build(permutations, current, n, paired);
        current.pop();
    }
}

pub fn is_all_low(permutation: &str) -> bool {
    permutation.chars().all(|c| c == LOW)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn zero_slots_yield_one_empty_permutation() {
        let mut cache = PermutationCache::new();
        assert_eq!(*cache.all_combinations(0), vec![String::new()]);
        assert!(is_all_low(""));
    }

    #[test]
    fn full_combinations_are_ordered() {
        let mut cache = PermutationCache::new();
        assert_eq!(*cache.all_combinations(2), vec!["hh", "hl", "lh", "ll"]);
    }

    #[test]
    fn opposite_pairs_only() {
        let mut cache = PermutationCache::new();
        assert_eq!(*cache.opposite_combinations(2), vec!["hl", "lh"]);
        assert_eq!(
            *cache.opposite_combinations(4),
            vec!["hlhl", "hllh", "lhhl", "lhlh"]
        );
    }

    #[test]
    fn results_are_memoized() {
        let mut cache = PermutationCache::new();
        let first = cache.all_combinations(3);
        let second = cache.all_combinations(3);
        assert!(Rc::ptr_eq(&first, &second));

        let opposite = cache.opposite_combinations(2);
        assert!(!Rc::ptr_eq(&cache.all_combinations(2), &opposite));
        assert_eq!(cache.len(), 3);
    }

    proptest! {
        #[test]
        fn full_has_every_assignment(n in 0usize..10) {
            let mut cache = PermutationCache::new();
            let permutations = cache.all_combinations(n);
            prop_assert_eq!(permutations.len(), 1 << n);
            let distinct: HashSet<&String> = permutations.iter().collect();
            prop_assert_eq!(distinct.len(), 1 << n);
            for permutation in permutations.iter() {
                prop_assert_eq!(permutation.len(), n);
                prop_assert!(permutation.chars().all(|c| c == HIGH || c == LOW));
            }
        }

        #[test]
        fn opposite_pairs_always_differ(pairs in 1usize..6) {
            let n = pairs * 2;
            let mut cache = PermutationCache::new();
            let permutations = cache.opposite_combinations(n);
            prop_assert_eq!(permutations.len(), 1 << pairs);
            for permutation in permutations.iter() {
                let bytes = permutation.as_bytes();
                prop_assert_eq!(bytes.len(), n);
                for k in 0..pairs {
                    prop_assert_ne!(bytes[2 * k], bytes[2 * k + 1]);
                }
            }
        }
    }
}
