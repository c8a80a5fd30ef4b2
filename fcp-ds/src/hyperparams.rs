//! Hyperparameter search space
//!
//! Neuron options are the powers of two between the configured bounds,
//! widest first. A configuration is kept only if its widths never grow
//! towards the output.

use fcp_common::classifier::HyperparameterConfiguration;
use fcp_common::{Error, Result};
use tracing::warn;

/// Descending powers of two spanning `[min, max]`, both bounds included
pub fn neuron_options(neuron_count_range: [u32; 2]) -> Result<Vec<u32>> {
    let [min, max] = neuron_count_range;
    for bound in [min, max] {
        if !bound.is_power_of_two() {
            return Err(Error::InvalidInput(format!(
                "Neuron bound {} is not a power of two",
                bound
            )));
        }
    }

    let mut options = Vec::new();
    let mut width = max;
    while width >= min && width > 0 {
        options.push(width);
        width /= 2;
    }
    Ok(options)
}

/// Every non-increasing width tuple with a length in `layer_count_range`
///
/// Tuples are produced in lexicographic order over the neuron options, so
/// shorter networks come first and wider layers precede narrower ones.
pub fn search_space(
    iteration_count: u32,
    layer_count_range: [u32; 2],
    neuron_count_range: [u32; 2],
) -> Result<Vec<HyperparameterConfiguration>> {
    let options = neuron_options(neuron_count_range)?;
    let [min_layers, max_layers] = layer_count_range;

    let mut space = Vec::new();
    for layers in min_layers..=max_layers {
        let mut tuple = Vec::with_capacity(layers as usize);
        collect_tuples(&options, layers as usize, &mut tuple, &mut space, iteration_count);
    }

    if space.is_empty() {
        warn!(
            ?layer_count_range,
            ?neuron_count_range,
            "No hyperparameter combination satisfies the configured ranges"
        );
    }
    Ok(space)
}

fn collect_tuples(
    options: &[u32],
    length: usize,
    tuple: &mut Vec<u32>,
    out: &mut Vec<HyperparameterConfiguration>,
    iteration_count: u32,
) {
    if tuple.len() == length {
        let config = HyperparameterConfiguration::new(iteration_count, tuple.clone());
        if config.is_funnel() {
            out.push(config);
        }
        return;
    }
    for &width in options {
        tuple.push(width);
        collect_tuples(options, length, tuple, out, iteration_count);
        tuple.pop();
    }
}

/// Midpoint configuration used for the first training run
///
/// Layer count is `round((min + max) / 2)`; layer `i` gets
/// `ceil(avg_neurons / 2^i)` neurons.
pub fn average_configuration(
    iteration_count: u32,
    layer_count_range: [u32; 2],
    neuron_count_range: [u32; 2],
) -> HyperparameterConfiguration {
    let layers = ((layer_count_range[0] + layer_count_range[1]) as f64 / 2.0).round() as u32;
    let avg_neurons = (neuron_count_range[0] + neuron_count_range[1]) as f64 / 2.0;
    let widths = (0..layers)
        .map(|i| ((avg_neurons / 2f64.powi(i as i32)).ceil() as u32).max(1))
        .collect();
    HyperparameterConfiguration::new(iteration_count, widths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(space: &[HyperparameterConfiguration]) -> Vec<Vec<u32>> {
        space.iter().map(|c| c.hidden_layer_widths.clone()).collect()
    }

    #[test]
    fn test_neuron_options_descending() {
        assert_eq!(neuron_options([4, 8]).unwrap(), vec![8, 4]);
        assert_eq!(neuron_options([1, 32]).unwrap(), vec![32, 16, 8, 4, 2, 1]);
        assert_eq!(neuron_options([16, 16]).unwrap(), vec![16]);
        assert!(neuron_options([16, 4]).unwrap().is_empty());
    }

    #[test]
    fn test_neuron_bounds_must_be_powers_of_two() {
        assert!(neuron_options([3, 8]).is_err());
        assert!(neuron_options([4, 12]).is_err());
        assert!(neuron_options([0, 8]).is_err());
    }

    #[test]
    fn test_one_or_two_layers_of_four_or_eight() {
        let space = search_space(50, [1, 2], [4, 8]).unwrap();
        assert_eq!(
            widths(&space),
            vec![vec![8], vec![4], vec![8, 8], vec![8, 4], vec![4, 4]]
        );
        assert!(space.iter().all(|c| c.iteration_count == 50));
    }

    #[test]
    fn test_space_is_exactly_the_non_increasing_tuples() {
        let options = [16u32, 8, 4, 2];
        let space = search_space(10, [1, 3], [2, 16]).unwrap();
        assert!(space.iter().all(HyperparameterConfiguration::is_funnel));

        // Brute force over all tuples of length 1..=3
        let mut expected = 0;
        for a in options {
            expected += 1;
            for b in options {
                if a >= b {
                    expected += 1;
                }
                for c in options {
                    if a >= b && b >= c {
                        expected += 1;
                    }
                }
            }
        }
        assert_eq!(space.len(), expected);

        let mut unique = widths(&space);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), space.len());
    }

    #[test]
    fn test_empty_layer_range_gives_empty_space() {
        assert!(search_space(10, [3, 2], [4, 8]).unwrap().is_empty());
    }

    #[test]
    fn test_average_configuration_is_a_funnel() {
        let config = average_configuration(50, [1, 2], [4, 8]);
        assert_eq!(config.hidden_layer_widths, vec![6, 3]);

        let config = average_configuration(20, [1, 5], [8, 64]);
        assert_eq!(config.hidden_layer_widths, vec![36, 18, 9]);
        assert!(config.is_funnel());
        assert_eq!(config.iteration_count, 20);
    }
}
