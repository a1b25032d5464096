//! Dependency graph construction and topological sorting

use crate::config::{LaunchProfile, ServiceDefinition};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A selected service with the dependencies that take part in this run
#[derive(Debug, Clone)]
pub struct ResolvedService {
    pub name: String,
    pub definition: ServiceDefinition,
    /// Direct dependencies inside the selection
    pub dependencies: Vec<String>,
}

/// Dependency graph for the selected services
#[derive(Debug)]
pub struct DependencyGraph {
    /// Services in launch order
    pub services: Vec<ResolvedService>,
    /// Map from service name to index
    pub index_map: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph for `selected` services of a profile.
    ///
    /// Dependencies on services outside the selection are dropped, which is
    /// what lets a single stage run in isolation. Ties are broken by
    /// declaration order, so the same profile always launches the same way.
    pub fn build(
        profile: &LaunchProfile,
        selected: &HashSet<String>,
    ) -> Result<Self, DependencyError> {
        for name in selected {
            if !profile.services.contains_key(name) {
                return Err(DependencyError::UnknownService(name.clone()));
            }
        }

        let mut resolved: Vec<ResolvedService> = Vec::new();
        for (name, definition) in &profile.services {
            if !selected.contains(name) {
                continue;
            }

            let mut dependencies = Vec::new();
            for dep in &definition.depends_on {
                if !profile.services.contains_key(dep) {
                    return Err(DependencyError::UnknownDependency {
                        service: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if selected.contains(dep) {
                    dependencies.push(dep.clone());
                } else {
                    log::debug!("[{}] Ignoring unselected dependency '{}'", name, dep);
                }
            }

            resolved.push(ResolvedService {
                name: name.clone(),
                definition: definition.clone(),
                dependencies,
            });
        }

        let services = Self::topological_sort(resolved)?;

        let index_map: HashMap<String, usize> = services
            .iter()
            .enumerate()
            .map(|(i, service)| (service.name.clone(), i))
            .collect();

        Ok(Self {
            services,
            index_map,
        })
    }

    /// Kahn's algorithm, always taking the earliest-declared ready service
    fn topological_sort(
        services: Vec<ResolvedService>,
    ) -> Result<Vec<ResolvedService>, DependencyError> {
        let position: HashMap<&str, usize> = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut in_degree: Vec<usize> = services.iter().map(|s| s.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
        for (i, service) in services.iter().enumerate() {
            for dep in &service.dependencies {
                dependents[position[dep.as_str()]].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order: Vec<usize> = Vec::with_capacity(services.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != services.len() {
            let placed: HashSet<usize> = order.iter().copied().collect();
            let cycle: Vec<String> = services
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed.contains(i))
                .map(|(_, s)| s.name.clone())
                .collect();
            return Err(DependencyError::CyclicDependency(cycle));
        }

        let mut slots: Vec<Option<ResolvedService>> = services.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect())
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedService> {
        self.index_map.get(name).map(|&i| &self.services[i])
    }

    /// Services that depend directly on `name`
    pub fn dependents(&self, name: &str) -> Vec<&ResolvedService> {
        self.services
            .iter()
            .filter(|service| service.dependencies.iter().any(|dep| dep == name))
            .collect()
    }

    pub fn launch_order(&self) -> impl Iterator<Item = &ResolvedService> {
        self.services.iter()
    }

    /// Reverse of launch order
    pub fn shutdown_order(&self) -> impl Iterator<Item = &ResolvedService> {
        self.services.iter().rev()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Errors that can occur when building the dependency graph
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("Unknown service '{0}'")]
    UnknownService(String),

    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("Cyclic dependency detected involving services: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),
}
