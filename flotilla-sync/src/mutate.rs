//! File set differ and mutator.
//!
//! [`plan`] decides which paths change; [`apply`] produces the new
//! specification from a fresh copy of the current one and runs the hooks.

use std::collections::BTreeSet;

use flotilla_core::{FileSet, InstanceSpec};

use crate::error::HookError;
use crate::hooks::TransformHooks;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Upsert every template path even when the content already matches.
    pub force: bool,
    /// Remove instance paths that are absent from the template.
    pub delete: bool,
}

/// Per-instance change set. `upsert` and `remove` are always disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffPlan {
    pub upsert: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl DiffPlan {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

pub fn plan(template: &FileSet, current: &InstanceSpec, opts: PlanOptions) -> DiffPlan {
    let files = current.files();
    let upsert = template
        .iter()
        .filter(|(path, content)| opts.force || files.get(*path) != Some(*content))
        .map(|(path, _)| path.clone())
        .collect();
    let remove = if opts.delete {
        files
            .keys()
            .filter(|path| !template.contains_key(*path))
            .cloned()
            .collect()
    } else {
        BTreeSet::new()
    };
    DiffPlan { upsert, remove }
}

/// The specification to write plus what changed relative to the fetched one.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub spec: InstanceSpec,
    pub changed: BTreeSet<String>,
    /// A hook rewrote something other than `nodejs.files`.
    pub metadata_changed: bool,
}

impl Mutation {
    pub fn is_up_to_date(&self) -> bool {
        self.changed.is_empty() && !self.metadata_changed
    }
}

pub fn apply(
    plan: &DiffPlan,
    template: &FileSet,
    current: &InstanceSpec,
    hooks: &TransformHooks,
) -> Result<Mutation, HookError> {
    let mut spec = current.clone();
    let files = spec.files_mut();
    for path in &plan.upsert {
        if let Some(content) = template.get(path) {
            files.insert(path.clone(), content.clone());
        }
    }
    for path in &plan.remove {
        files.remove(path);
    }

    let mut changed: BTreeSet<String> = plan.upsert.union(&plan.remove).cloned().collect();
    if hooks.is_empty() {
        return Ok(Mutation {
            spec,
            changed,
            metadata_changed: false,
        });
    }

    let before = spec.files().clone();
    let spec = hooks.run(spec)?;
    changed.extend(changed_paths(&before, spec.files()));
    let metadata_changed =
        spec.metadata != current.metadata || spec.nodejs.extra != current.nodejs.extra;
    Ok(Mutation {
        spec,
        changed,
        metadata_changed,
    })
}

fn changed_paths(before: &FileSet, after: &FileSet) -> BTreeSet<String> {
    before
        .keys()
        .chain(after.keys())
        .filter(|path| before.get(*path) != after.get(*path))
        .cloned()
        .collect()
}
