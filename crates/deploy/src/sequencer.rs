//! Dependency ordering of the manifest contracts.

use std::collections::{BTreeSet, HashMap};

use crate::{
    error::ConfigError,
    manifest::{ContractSpec, Manifest},
};

/// Order the manifest so that every contract comes after the contracts its
/// constructor references.
///
/// Kahn's algorithm where the ready set is keyed by manifest position, so ties
/// are always broken by declaration order and the result is reproducible.
/// Fails with [`ConfigError::CyclicDependency`] when no such order exists.
pub fn sequence(manifest: &Manifest) -> Result<Vec<&ContractSpec>, ConfigError> {
    let contracts: &[ContractSpec] = manifest;
    let index: HashMap<&str, usize> = contracts
        .iter()
        .enumerate()
        .map(|(i, spec)| (spec.name.as_str(), i))
        .collect();

    let mut pending = vec![0usize; contracts.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); contracts.len()];

    for (i, spec) in contracts.iter().enumerate() {
        for dep in spec.dependencies() {
            // Unknown references are rejected when the manifest is built.
            let Some(&d) = index.get(dep) else {
                return Err(ConfigError::UnknownReference {
                    contract: spec.name.clone(),
                    reference: dep.to_string(),
                });
            };
            pending[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..contracts.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(contracts.len());

    while let Some(i) = ready.pop_first() {
        order.push(&contracts[i]);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != contracts.len() {
        return Err(ConfigError::CyclicDependency(find_cycle(
            contracts, &index, &pending,
        )));
    }

    Ok(order)
}

/// Walk unresolved dependencies from the first blocked contract until a name
/// repeats. Every blocked contract has at least one blocked dependency.
fn find_cycle(
    contracts: &[ContractSpec],
    index: &HashMap<&str, usize>,
    pending: &[usize],
) -> Vec<String> {
    let Some(start) = (0..contracts.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut current = start;
    loop {
        let next = contracts[current]
            .dependencies()
            .into_iter()
            .filter_map(|dep| index.get(dep).copied())
            .find(|&d| pending[d] > 0);

        let Some(next) = next else {
            break;
        };

        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| contracts[i].name.clone())
                .collect();
            cycle.push(contracts[next].name.clone());
            return cycle;
        }

        path.push(next);
        current = next;
    }

    path.into_iter().map(|i| contracts[i].name.clone()).collect()
}
