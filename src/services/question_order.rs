use rand::rngs::StdRng;
use rand::{seq::SliceRandom, SeedableRng};

use crate::db::models::Question;

pub(crate) fn new_seed() -> i64 {
    rand::random::<i64>()
}

/// Shuffles questions with a seeded Fisher–Yates pass. Questions sharing a
/// `group_id` move as one block and keep their relative order.
pub(crate) fn shuffle_grouped(questions: Vec<Question>, seed: i64) -> Vec<Question> {
    let mut units: Vec<Vec<Question>> = Vec::new();

    for question in questions {
        let existing = question.group_id.as_deref().and_then(|group| {
            units.iter().position(|unit| unit[0].group_id.as_deref() == Some(group))
        });
        match existing {
            Some(index) => units[index].push(question),
            None => units.push(vec![question]),
        }
    }

    let mut rng = StdRng::seed_from_u64(seed as u64);
    units.shuffle(&mut rng);
    units.into_iter().flatten().collect()
}
