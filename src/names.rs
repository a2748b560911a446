//! Human-readable instance names.
//!
//! Names look like Docker's generated container names (`brave_hopper`), so
//! they are valid container names and easy to read in logs.

use rand::seq::SliceRandom;

/// Source of fresh instance names.
pub trait NameGenerator: Send + Sync {
    /// Returns a new name. Uniqueness is not guaranteed.
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "admiring", "agitated", "amazing", "angry", "awesome", "blissful", "bold", "brave",
    "clever", "compassionate", "condescending", "cranky", "dazzling", "determined", "eager",
    "ecstatic", "elegant", "epic", "festive", "focused", "friendly", "gallant", "goofy",
    "gracious", "happy", "hopeful", "hungry", "jolly", "keen", "kind", "laughing", "loving",
    "modest", "nervous", "nostalgic", "peaceful", "pensive", "quirky", "relaxed", "serene",
    "sharp", "silly", "stoic", "tender", "trusting", "upbeat", "vibrant", "wizardly", "zealous",
];

const SURNAMES: &[&str] = &[
    "albattani", "archimedes", "babbage", "bardeen", "bell", "bohr", "brattain", "curie",
    "darwin", "davinci", "einstein", "elion", "euclid", "feynman", "franklin", "galileo",
    "goldstine", "goodall", "hawking", "heisenberg", "hodgkin", "hopper", "hypatia", "jang",
    "kepler", "knuth", "lalande", "lamport", "leakey", "lovelace", "lumiere", "mayer",
    "mccarthy", "meitner", "morse", "newton", "nobel", "pare", "pasteur", "perlman", "pike",
    "poincare", "ritchie", "shannon", "sinoussi", "thompson", "torvalds", "turing", "wright",
    "yonath",
];

/// Generator drawing `adjective_surname` pairs at random.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("eager");
        let surname = SURNAMES.choose(&mut rng).copied().unwrap_or("turing");
        format!("{adjective}_{surname}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::validate_instance_name;

    #[test]
    fn test_generated_names_are_valid() {
        let names = RandomNames;
        for _ in 0..100 {
            let name = names.generate();
            assert!(validate_instance_name(&name).is_ok(), "bad name {name}");
            assert!(name.contains('_'));
        }
    }
}
