//! Dependency resolution and wave scheduling
//!
//! The graph is built from each task's declared references. Construction
//! fails on duplicate names, references to unknown tasks, output reads a
//! task does not declare, and cycles. A successfully built graph is always
//! acyclic, and every output a task reads comes from one of its dependencies.

use crate::error::GraphError;
use crate::task::{SharedTask, TaskName};
use std::collections::{BTreeMap, BTreeSet, btree_set};

pub struct TaskGraph {
    tasks: BTreeMap<TaskName, SharedTask>,
    /// task -> tasks it depends on
    dependencies: BTreeMap<TaskName, BTreeSet<TaskName>>,
    /// task -> tasks depending on it
    dependents: BTreeMap<TaskName, BTreeSet<TaskName>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl TaskGraph {
    pub fn build(tasks: impl IntoIterator<Item = SharedTask>) -> Result<Self, GraphError> {
        let mut by_name = BTreeMap::new();
        for task in tasks {
            let name = task.name().clone();
            if by_name.insert(name.clone(), task).is_some() {
                return Err(GraphError::DuplicateIdentity(name));
            }
        }

        let mut dependencies: BTreeMap<TaskName, BTreeSet<TaskName>> = BTreeMap::new();
        let mut dependents: BTreeMap<TaskName, BTreeSet<TaskName>> = BTreeMap::new();
        for name in by_name.keys() {
            dependencies.entry(name.clone()).or_default();
            dependents.entry(name.clone()).or_default();
        }

        for (name, task) in &by_name {
            let declared: BTreeSet<TaskName> =
                task.references().into_iter().map(|r| r.task).collect();
            let mut values = Vec::new();
            for property in task.properties().values() {
                property.collect_refs(&mut values);
            }
            if let Some(value) = values.iter().find(|v| !declared.contains(&v.task)) {
                return Err(GraphError::UndeclaredReference {
                    task: name.clone(),
                    reference: value.task.clone(),
                });
            }

            for reference in task.references() {
                if !by_name.contains_key(&reference.task) {
                    return Err(GraphError::UnknownReference {
                        task: name.clone(),
                        reference: reference.task,
                    });
                }
                dependents
                    .entry(reference.task.clone())
                    .or_default()
                    .insert(name.clone());
                dependencies
                    .entry(name.clone())
                    .or_default()
                    .insert(reference.task);
            }
        }

        let graph = Self {
            tasks: by_name,
            dependencies,
            dependents,
        };
        graph.detect_cycle()?;
        Ok(graph)
    }

    /// Depth-first search with three colors, driven by an explicit stack
    /// so chain length is not bounded by the thread stack. A back edge to
    /// a gray node closes a cycle; the cycle is the DFS path from that node
    /// onwards.
    fn detect_cycle(&self) -> Result<(), GraphError> {
        let mut colors: BTreeMap<&TaskName, Color> =
            self.tasks.keys().map(|name| (name, Color::White)).collect();
        let mut path: Vec<(&TaskName, btree_set::Iter<'_, TaskName>)> = Vec::new();

        for root in self.tasks.keys() {
            if colors[root] != Color::White {
                continue;
            }
            colors.insert(root, Color::Gray);
            path.push((root, self.dependencies[root].iter()));

            while let Some((_, deps)) = path.last_mut() {
                let Some(dep) = deps.next() else {
                    if let Some((name, _)) = path.pop() {
                        colors.insert(name, Color::Black);
                    }
                    continue;
                };
                match colors[dep] {
                    Color::White => {
                        colors.insert(dep, Color::Gray);
                        path.push((dep, self.dependencies[dep].iter()));
                    }
                    Color::Gray => {
                        let start = path.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let tasks = path[start..].iter().map(|(n, _)| (*n).clone()).collect();
                        return Err(GraphError::Cycle { tasks });
                    }
                    Color::Black => {}
                }
            }
        }
        Ok(())
    }

    /// Partition the graph into waves. Wave 0 holds tasks without
    /// dependencies; every other task sits one wave after its deepest
    /// dependency. Tasks within a wave are sorted by name.
    pub fn waves(&self) -> Vec<Vec<TaskName>> {
        let mut indegree: BTreeMap<&TaskName, usize> = self
            .dependencies
            .iter()
            .map(|(name, deps)| (name, deps.len()))
            .collect();
        let mut ready: BTreeSet<&TaskName> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut wave_of: BTreeMap<&TaskName, usize> = BTreeMap::new();

        while let Some(name) = ready.pop_first() {
            let wave = self.dependencies[name]
                .iter()
                .filter_map(|dep| wave_of.get(dep).copied())
                .max()
                .map_or(0, |deepest| deepest + 1);
            wave_of.insert(name, wave);

            for child in &self.dependents[name] {
                if let Some(degree) = indegree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        let mut waves: Vec<Vec<TaskName>> = Vec::new();
        for (name, wave) in wave_of {
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(name.clone());
        }
        for wave in &mut waves {
            wave.sort();
        }
        waves
    }

    pub fn task(&self, name: &TaskName) -> Option<&SharedTask> {
        self.tasks.get(name)
    }

    /// Tasks sorted by name
    pub fn tasks(&self) -> impl Iterator<Item = &SharedTask> {
        self.tasks.values()
    }

    pub fn dependencies(&self, name: &TaskName) -> impl Iterator<Item = &TaskName> {
        self.dependencies.get(name).into_iter().flatten()
    }

    pub fn dependents(&self, name: &TaskName) -> impl Iterator<Item = &TaskName> {
        self.dependents.get(name).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
