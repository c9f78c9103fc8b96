use std::collections::HashSet;

use crate::error::{Mt5dError, Result};
use crate::steps::Step;
use crate::types::StepId;

/// Order `steps` so every step follows its dependencies.
///
/// Stable: among steps whose dependencies are satisfied, the one declared
/// first goes first. A dependency on a step not in `steps` and a dependency
/// cycle are both errors.
pub fn plan<'s>(steps: &'s [Box<dyn Step + 's>]) -> Result<Vec<&'s dyn Step>> {
    let known: HashSet<StepId> = steps.iter().map(|s| s.id()).collect();
    for step in steps {
        for dep in step.depends_on() {
            if !known.contains(dep) {
                return Err(Mt5dError::UnknownDependency {
                    step: step.id().to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    let mut placed: HashSet<StepId> = HashSet::new();
    let mut ordered: Vec<&'s dyn Step> = Vec::with_capacity(steps.len());
    let mut remaining: Vec<&'s dyn Step> = steps.iter().map(|s| s.as_ref()).collect();

    while !remaining.is_empty() {
        let Some(pos) = remaining
            .iter()
            .position(|s| s.depends_on().iter().all(|d| placed.contains(d)))
        else {
            let stuck = remaining
                .iter()
                .map(|s| s.id().as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Mt5dError::DependencyCycle(stuck));
        };
        let next = remaining.remove(pos);
        placed.insert(next.id());
        ordered.push(next);
    }
    Ok(ordered)
}
