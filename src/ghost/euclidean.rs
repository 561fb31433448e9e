// Euclidean rhythms: `pulses` onsets spread as evenly as possible over `steps` slots.
//
// Bresenham form of Bjorklund: slot i is an onset when (i * pulses) mod steps < pulses.
// Starts on an onset and never needs a buffer, so it is cheap enough to query per step.

/// Whether `step` is an onset of the (pulses, steps) euclidean rhythm.
pub fn is_pulse(step: usize, pulses: usize, steps: usize) -> bool {
    if steps == 0 || pulses == 0 {
        return false;
    }
    let pulses = pulses.min(steps);
    (step % steps) * pulses % steps < pulses
}

/// The whole rhythm, for display and tests.
pub fn rhythm(pulses: usize, steps: usize) -> Vec<bool> {
    (0..steps).map(|i| is_pulse(i, pulses, steps)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::TOTAL_STEPS;

    fn onsets(r: &[bool]) -> Vec<usize> {
        r.iter().enumerate().filter(|(_, on)| **on).map(|(i, _)| i).collect()
    }

    #[test]
    fn pulse_count_is_exact() {
        for k in 0..=16 {
            let r = rhythm(k, TOTAL_STEPS);
            assert_eq!(onsets(&r).len(), k, "k = {k}");
        }
    }

    #[test]
    fn zero_pulses_selects_nothing() {
        assert!(rhythm(0, TOTAL_STEPS).iter().all(|on| !on));
    }

    #[test]
    fn spacing_is_maximally_even() {
        for k in 1..=16 {
            let on = onsets(&rhythm(k, TOTAL_STEPS));
            // gaps between consecutive onsets, including the wrap back to the first
            let gaps: Vec<usize> = (0..on.len())
                .map(|i| (on[(i + 1) % on.len()] + TOTAL_STEPS - on[i] - 1) % TOTAL_STEPS + 1)
                .collect();
            let min = *gaps.iter().min().unwrap();
            let max = *gaps.iter().max().unwrap();
            assert!(max - min <= 1, "k = {k}, gaps = {gaps:?}");
            assert_eq!(gaps.iter().sum::<usize>(), TOTAL_STEPS);
        }
    }

    #[test]
    fn four_on_the_floor() {
        assert_eq!(onsets(&rhythm(4, TOTAL_STEPS)), vec![0, 8, 16, 24]);
    }

    #[test]
    fn tresillo() {
        // E(3, 8)
        assert_eq!(onsets(&rhythm(3, 8)), vec![0, 3, 6]);
    }

    #[test]
    fn pulses_beyond_steps_fill_every_slot() {
        assert!(rhythm(12, 8).iter().all(|&on| on));
        assert!(!is_pulse(0, 3, 0));
    }
}
