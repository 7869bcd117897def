#![forbid(unsafe_code)]

// Random payload supplier - integers in a range, debate titles, answer lists

use rand::distributions::Alphanumeric;
use rand::Rng;

const WORDS: &[&str] = &[
    "motion", "rebuttal", "evidence", "claim", "policy", "value", "quorum",
    "floor", "chair", "ballot", "session", "point", "order", "verdict",
];

/// Uniform integer in the inclusive range `[min, max]`.
pub fn integer_between(min: u64, max: u64) -> u64 {
    rand::thread_rng().gen_range(min..=max)
}

/// Short random sentence used for debate and question titles.
pub fn sentence(words: usize) -> String {
    let mut rng = rand::thread_rng();
    let picked: Vec<&str> = (0..words.max(1))
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect();
    picked.join(" ")
}

/// Between `min` and `max` random answer options.
pub fn answers(min: usize, max: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(min..=max.max(min));
    (0..count)
        .map(|_| {
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(12)
                .map(char::from)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_between_stays_in_range() {
        for _ in 0..200 {
            let n = integer_between(3, 7);
            assert!((3..=7).contains(&n));
        }
    }

    #[test]
    fn integer_between_handles_degenerate_range() {
        assert_eq!(integer_between(4, 4), 4);
    }

    #[test]
    fn answers_respects_bounds() {
        for _ in 0..50 {
            let options = answers(2, 5);
            assert!((2..=5).contains(&options.len()));
            assert!(options.iter().all(|a| a.len() == 12));
        }
    }

    #[test]
    fn sentence_has_requested_word_count() {
        assert_eq!(sentence(4).split(' ').count(), 4);
        // zero is rounded up so titles are never empty
        assert_eq!(sentence(0).split(' ').count(), 1);
    }
}
