//! Genetic-algorithm scheduling strategy (spec §4.10): population 20, 10
//! generations, elitism over the top half with mutation filling the rest.
//! Explicitly exploration-only — never selected as the default strategy,
//! kept here to fulfill the named `GeneticAlgorithm` variant.

use rand::Rng;

use crate::score::weighted_score;
use crate::types::{NodeMetrics, ScoreWeights, TaskPayload};

const POPULATION: usize = 20;
const GENERATIONS: usize = 10;

/// An individual is simply an index into `candidates`; fitness is that
/// candidate's weighted score. Evolution searches the (tiny) space of
/// "which candidate to pick" rather than anything combinatorial — the
/// point is to exercise the named strategy, not to out-search an
/// exhaustive max over a list the orchestrator already has in memory.
pub fn genetic_select<'a>(
    task: &TaskPayload,
    candidates: &[&'a NodeMetrics],
    reputation: impl Fn(&NodeMetrics) -> f64,
    weights: ScoreWeights,
    reward_multiplier: f64,
    rng: &mut impl Rng,
) -> Option<(&'a NodeMetrics, f64)> {
    if candidates.is_empty() {
        return None;
    }

    let fitness = |idx: usize| -> f64 {
        let node = candidates[idx];
        weighted_score(task, node, reputation(node), weights, reward_multiplier)
    };

    let mut population: Vec<usize> = (0..POPULATION)
        .map(|_| rng.gen_range(0..candidates.len()))
        .collect();

    for _ in 0..GENERATIONS {
        population.sort_by(|a, b| fitness(*b).total_cmp(&fitness(*a)));
        let elite_count = POPULATION / 2;
        let elites: Vec<usize> = population[..elite_count].to_vec();
        let mut next_gen = elites.clone();
        while next_gen.len() < POPULATION {
            let parent = elites[rng.gen_range(0..elites.len())];
            let mutated = if rng.gen_bool(0.3) {
                rng.gen_range(0..candidates.len())
            } else {
                parent
            };
            next_gen.push(mutated);
        }
        population = next_gen;
    }

    let best_idx = *population
        .iter()
        .max_by(|a, b| fitness(**a).total_cmp(&fitness(**b)))?;
    let score = fitness(best_idx);
    if score.is_finite() {
        Some((candidates[best_idx], score))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_node, sample_task};
    use rand::SeedableRng;

    #[test]
    fn converges_toward_the_best_candidate() {
        let task = sample_task();
        let mut weak = sample_node("weak");
        weak.capacity_score = 0.1;
        weak.latency_ms = 500.0;
        let mut strong = sample_node("strong");
        strong.capacity_score = 0.95;
        strong.latency_ms = 5.0;
        let candidates = vec![&weak, &strong];

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let (winner, _) = genetic_select(
            &task,
            &candidates,
            |_| 1.0,
            ScoreWeights::default(),
            1.0,
            &mut rng,
        )
        .unwrap();
        assert_eq!(winner.peer_id, strong.peer_id);
    }
}
