use rand::Rng;

/// Pick an index with probability proportional to its weight.
///
/// Non-positive and non-finite weights never win. Returns `None` when no
/// weight is positive.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f32], rng: &mut R) -> Option<usize> {
    let usable = |w: f32| w.is_finite() && w > 0.0;
    let total: f64 = weights.iter().filter(|w| usable(**w)).map(|w| f64::from(*w)).sum();
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }

    let mut roll = rng.random_range(0.0..total);
    let mut last = None;
    for (i, w) in weights.iter().enumerate() {
        if !usable(*w) {
            continue;
        }
        let w = f64::from(*w);
        if roll < w {
            return Some(i);
        }
        roll -= w;
        last = Some(i);
    }
    // float drift: fall back to the last eligible entry
    last
}
