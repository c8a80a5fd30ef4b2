//! Deterministic stratified split of the buffer into a learning set

use fcp_common::model::{LabelType, LearningSet, LearningSetEntry, PreparedSession};

/// Entries each class contributes to the three splits
#[derive(Debug, Clone, Copy)]
struct Quota {
    training: usize,
    validation: usize,
    test: usize,
}

/// Split labeled sessions per class, in order of first appearance
///
/// Each class contributes `round(n * validation_fraction)` entries to
/// validation and `round(n * test_fraction)` to test; training takes the
/// rest. When rounding leaves validation or test empty and at least three
/// sessions are labeled, one training entry moves over from the class with
/// the most training entries (earliest class on a tie), so the set stays
/// complete. Within a class, training entries come first, then validation,
/// then test, all in buffer order. Unlabeled sessions are skipped.
pub fn split_learning_set(
    sessions: &[PreparedSession],
    validation_fraction: f64,
    test_fraction: f64,
) -> LearningSet {
    let mut groups: Vec<(LabelType, Vec<LearningSetEntry>)> = Vec::new();
    for entry in sessions.iter().filter_map(LearningSetEntry::from_session) {
        match groups.iter_mut().find(|(label, _)| *label == entry.label) {
            Some((_, entries)) => entries.push(entry),
            None => groups.push((entry.label, vec![entry])),
        }
    }

    let mut quotas: Vec<Quota> = groups
        .iter()
        .map(|(_, entries)| {
            let n = entries.len();
            let validation = ((n as f64 * validation_fraction).round() as usize).min(n);
            let test = ((n as f64 * test_fraction).round() as usize).min(n - validation);
            Quota {
                training: n - validation - test,
                validation,
                test,
            }
        })
        .collect();

    if quotas.iter().all(|q| q.validation == 0) {
        if let Some(donor) = training_donor(&quotas) {
            quotas[donor].training -= 1;
            quotas[donor].validation += 1;
        }
    }
    if quotas.iter().all(|q| q.test == 0) {
        if let Some(donor) = training_donor(&quotas) {
            quotas[donor].training -= 1;
            quotas[donor].test += 1;
        }
    }

    let mut set = LearningSet::default();
    for ((_, entries), quota) in groups.into_iter().zip(quotas) {
        let mut iter = entries.into_iter();
        set.training.extend(iter.by_ref().take(quota.training));
        set.validation.extend(iter.by_ref().take(quota.validation));
        set.test.extend(iter);
    }
    set
}

/// Class that can give up a training entry without emptying training
fn training_donor(quotas: &[Quota]) -> Option<usize> {
    let total: usize = quotas.iter().map(|q| q.training).sum();
    if total < 2 {
        return None;
    }
    quotas
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (index, q)| match best {
            Some((_, most)) if most >= q.training => best,
            _ => Some((index, q.training)),
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcp_common::model::SessionId;

    fn sessions(per_class: usize) -> Vec<PreparedSession> {
        (0..per_class * 3)
            .map(|i| {
                let label = LabelType::ALL[i % 3];
                PreparedSession::from_features(SessionId::Number(i as i64), Some(label), [i as f64; 6])
            })
            .collect()
    }

    #[test]
    fn test_stratified_sizes() {
        let set = split_learning_set(&sessions(8), 0.15, 0.15);
        assert_eq!(set.training.len(), 18);
        assert_eq!(set.validation.len(), 3);
        assert_eq!(set.test.len(), 3);
        for label in LabelType::ALL {
            assert_eq!(set.validation.iter().filter(|e| e.label == label).count(), 1);
            assert_eq!(set.test.iter().filter(|e| e.label == label).count(), 1);
        }
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let input = sessions(10);
        let a = split_learning_set(&input, 0.2, 0.2);
        let b = split_learning_set(&input, 0.2, 0.2);
        assert_eq!(a, b);
        assert_eq!(a.len(), input.len());

        // Feature vectors are unique per session, so overlap would show up here
        let mut firsts: Vec<f64> = a
            .training
            .iter()
            .chain(&a.validation)
            .chain(&a.test)
            .map(|e| e.features[0])
            .collect();
        firsts.sort_by(|x, y| x.total_cmp(y));
        firsts.dedup();
        assert_eq!(firsts.len(), input.len());
    }

    #[test]
    fn test_class_order_follows_first_appearance() {
        let mut input = sessions(2);
        input.rotate_left(2);
        let set = split_learning_set(&input, 0.0, 0.0);
        assert_eq!(set.training[0].label, LabelType::Overheating);
    }

    #[test]
    fn test_small_buffer_still_fills_every_split() {
        // round(2 * 0.15) is zero for every class
        let set = split_learning_set(&sessions(2), 0.15, 0.15);
        assert!(set.is_complete());
        assert_eq!(set.training.len(), 4);
        assert_eq!(set.validation.len(), 1);
        assert_eq!(set.test.len(), 1);
        // Ties go to the earliest class
        assert_eq!(set.validation[0].label, LabelType::None);
        assert_eq!(set.test[0].label, LabelType::Electrical);
    }

    #[test]
    fn test_single_class_buffer_fills_every_split() {
        let input: Vec<_> = (0..3)
            .map(|i| PreparedSession::from_features(SessionId::Number(i), Some(LabelType::Electrical), [i as f64; 6]))
            .collect();
        let set = split_learning_set(&input, 0.1, 0.1);
        assert_eq!((set.training.len(), set.validation.len(), set.test.len()), (1, 1, 1));
    }

    #[test]
    fn test_two_sessions_cannot_fill_every_split() {
        let set = split_learning_set(&sessions(2)[..2], 0.15, 0.15);
        assert_eq!(set.len(), 2);
        assert!(!set.is_complete());
    }

    #[test]
    fn test_unlabeled_sessions_are_skipped() {
        let input = vec![PreparedSession::from_features(SessionId::Number(1), None, [0.0; 6])];
        assert!(split_learning_set(&input, 0.15, 0.15).is_empty());
    }
}
