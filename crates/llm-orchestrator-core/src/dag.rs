// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dependency Graph (component E): static analysis of step references into
//! a DAG, topological waves, critical path, cycle detection.

use crate::error::{OrchestratorError, Result};
use crate::workflow::WorkflowDefinition;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Scans an expression/condition string for `$stepK.*` references and
/// returns the referenced step numbers. Does not match the `$steps.*`
/// namespace used by the risk engine (no digit immediately follows `step`).
pub fn extract_step_refs(text: &str) -> Vec<u32> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 5 <= chars.len() && chars[i + 1..i + 5].iter().collect::<String>() == "step"
        {
            let mut j = i + 5;
            let mut digits = String::new();
            while j < chars.len() && chars[j].is_ascii_digit() {
                digits.push(chars[j]);
                j += 1;
            }
            if !digits.is_empty() {
                if let Ok(n) = digits.parse::<u32>() {
                    out.push(n);
                }
                i = j;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Dependency graph over a workflow's step numbers.
#[derive(Debug, Clone)]
pub struct WorkflowDAG {
    graph: DiGraph<u32, ()>,
    index_of: HashMap<u32, NodeIndex>,
    total_steps: usize,
}

impl WorkflowDAG {
    /// Builds the DAG from a workflow's step list. Edges run `K -> stepNumber`
    /// for every `$stepK.*` referenced by that step's `inputMapping`/`condition`.
    pub fn from_workflow(workflow: &WorkflowDefinition) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for step in &workflow.steps {
            let idx = graph.add_node(step.step_number);
            index_of.insert(step.step_number, idx);
        }

        for step in &workflow.steps {
            let mut refs = extract_step_refs(step.condition.as_deref().unwrap_or(""));
            for expr in step.input_mapping.values() {
                refs.extend(extract_step_refs(expr));
            }
            refs.sort_unstable();
            refs.dedup();

            for dep in refs {
                if dep >= step.step_number {
                    return Err(OrchestratorError::ForwardReference {
                        from: step.step_number,
                        to: dep,
                    });
                }
                let from = *index_of.get(&dep).ok_or_else(|| {
                    OrchestratorError::Validation(format!(
                        "step {} references nonexistent step {}",
                        step.step_number, dep
                    ))
                })?;
                let to = index_of[&step.step_number];
                graph.add_edge(from, to, ());
            }
        }

        let dag = Self {
            graph,
            index_of,
            total_steps: workflow.steps.len(),
        };
        dag.detect_cycles()?;
        Ok(dag)
    }

    fn detect_cycles(&self) -> Result<()> {
        if toposort(&self.graph, None).is_err() {
            let sccs = petgraph::algo::tarjan_scc(&self.graph);
            let cyclic: Vec<Vec<u32>> = sccs
                .into_iter()
                .filter(|scc| scc.len() > 1)
                .map(|scc| scc.iter().map(|idx| self.graph[*idx]).collect())
                .collect();
            return Err(OrchestratorError::CyclicDependency(format!("{:?}", cyclic)));
        }
        Ok(())
    }

    /// Returns topological generations ("waves"): each generation is the
    /// set of steps whose predecessors are all in earlier generations,
    /// sorted deterministically by step number within a generation.
    pub fn execution_order(&self) -> Result<Vec<Vec<u32>>> {
        let order = toposort(&self.graph, None)
            .map_err(|_| OrchestratorError::CyclicDependency("cycle detected".to_string()))?;

        let mut generation_of: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &order {
            let gen = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|pred| generation_of.get(&pred).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            generation_of.insert(idx, gen);
        }

        let max_gen = generation_of.values().copied().max().unwrap_or(0);
        let mut waves = vec![Vec::new(); max_gen + 1];
        for (&idx, &gen) in &generation_of {
            waves[gen].push(self.graph[idx]);
        }
        for wave in &mut waves {
            wave.sort_unstable();
        }
        Ok(waves)
    }

    /// Longest root-to-leaf path, as step numbers in order. Computed as a
    /// dynamic program over topological order (exact longest path in a
    /// DAG), not the original source's shortest-path-over-root/leaf-pairs
    /// approximation — this value is documented as estimation-only, so the
    /// correct DP is preferred over replicating the approximation.
    pub fn critical_path(&self) -> Vec<u32> {
        let order = match toposort(&self.graph, None) {
            Ok(o) => o,
            Err(_) => return Vec::new(),
        };

        let mut best_len: HashMap<NodeIndex, usize> = HashMap::new();
        let mut best_pred: HashMap<NodeIndex, Option<NodeIndex>> = HashMap::new();

        for &idx in &order {
            let mut longest = 0usize;
            let mut pred = None;
            for p in self.graph.neighbors_directed(idx, Direction::Incoming) {
                let plen = best_len.get(&p).copied().unwrap_or(0);
                if plen + 1 > longest {
                    longest = plen + 1;
                    pred = Some(p);
                }
            }
            best_len.insert(idx, longest);
            best_pred.insert(idx, pred);
        }

        let tail = order
            .iter()
            .max_by_key(|idx| best_len.get(idx).copied().unwrap_or(0))
            .copied();

        let mut path = Vec::new();
        let mut cur = tail;
        while let Some(idx) = cur {
            path.push(self.graph[idx]);
            cur = best_pred.get(&idx).copied().flatten();
        }
        path.reverse();
        path
    }

    pub fn critical_path_length(&self) -> usize {
        self.critical_path().len().max(1)
    }

    /// `1 - criticalPathLength / totalSteps`.
    pub fn parallelization_factor(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        1.0 - (self.critical_path_length() as f64 / self.total_steps as f64)
    }

    /// `1.0 + (totalSteps/criticalPathLength - 1.0) * efficiency`, `efficiency = 0.7`.
    ///
    /// Documented estimate, not a measurement: a naive
    /// `totalSteps / criticalPathLength * efficiency` undercounts relative
    /// to a fully sequential baseline, so the 1.0 floor is added back in.
    pub fn estimate_speedup(&self) -> f64 {
        let critical = self.critical_path_length() as f64;
        if critical == 0.0 {
            return 1.0;
        }
        let theoretical = self.total_steps as f64 / critical;
        1.0 + (theoretical - 1.0) * 0.7
    }

    /// True iff there is no directed path from `a` to `b` or `b` to `a`.
    pub fn can_execute_in_parallel(&self, a: u32, b: u32) -> bool {
        if a == b {
            return false;
        }
        !self.has_path(a, b) && !self.has_path(b, a)
    }

    fn has_path(&self, from: u32, to: u32) -> bool {
        let (Some(&start), Some(&end)) = (self.index_of.get(&from), self.index_of.get(&to)) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if node == end {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
        }
        false
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ErrorHandling, Step, WorkflowDefinition};

    fn step(n: u32, mapping: &[(&str, &str)]) -> Step {
        Step {
            step_number: n,
            step_name: format!("step{}", n),
            kind: "noop".into(),
            input_mapping: mapping.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            condition: None,
            output_variable: format!("out{}", n),
            error_handling: ErrorHandling::default(),
            output_schema: None,
        }
    }

    fn workflow(steps: Vec<Step>) -> WorkflowDefinition {
        WorkflowDefinition {
            schema_key: "k".into(),
            version: "1".into(),
            steps,
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        }
    }

    #[test]
    fn scenario_1_waves_and_speedup() {
        let wf = workflow(vec![
            step(1, &[]),
            step(2, &[]),
            step(3, &[("x", "$step1.out1")]),
            step(4, &[("x", "$step2.out2"), ("y", "$step3.out3")]),
        ]);
        let dag = WorkflowDAG::from_workflow(&wf).unwrap();
        let waves = dag.execution_order().unwrap();
        assert_eq!(waves, vec![vec![1, 2], vec![3], vec![4]]);

        let speedup = dag.estimate_speedup();
        let expected = 4.0 / 3.0 * 0.7 + 0.3;
        assert!((speedup - expected).abs() < 1e-9);
    }

    #[test]
    fn single_step_has_zero_parallelization() {
        let wf = workflow(vec![step(1, &[])]);
        let dag = WorkflowDAG::from_workflow(&wf).unwrap();
        assert_eq!(dag.execution_order().unwrap(), vec![vec![1]]);
        assert_eq!(dag.parallelization_factor(), 0.0);
    }

    #[test]
    fn rejects_forward_reference_while_building() {
        let wf = workflow(vec![step(1, &[("x", "$step2.out2")]), step(2, &[])]);
        assert!(WorkflowDAG::from_workflow(&wf).is_err());
    }

    #[test]
    fn same_wave_steps_can_run_in_parallel() {
        let wf = workflow(vec![step(1, &[]), step(2, &[])]);
        let dag = WorkflowDAG::from_workflow(&wf).unwrap();
        assert!(dag.can_execute_in_parallel(1, 2));
    }

    #[test]
    fn dependent_steps_cannot_run_in_parallel() {
        let wf = workflow(vec![step(1, &[]), step(2, &[("x", "$step1.out1")])]);
        let dag = WorkflowDAG::from_workflow(&wf).unwrap();
        assert!(!dag.can_execute_in_parallel(1, 2));
    }
}
