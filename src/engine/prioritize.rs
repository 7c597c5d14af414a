//! Budget-constrained project selection.

use crate::engine::types::{FundingDecision, Project};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What the running total used for the funding test accumulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualPolicy {
    /// Every project's cost is added in priority order, funded or not. A
    /// deferred project still counts against the projects after it.
    #[default]
    AllProjects,
    /// Only funded projects consume budget, so cheaper projects further
    /// down the list can fill what is left.
    FundedOnly,
}

/// Result of one prioritization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingPlan {
    pub budget: f64,
    pub policy: AccrualPolicy,
    /// Every input project, in priority order.
    pub decisions: Vec<FundingDecision>,
    /// Running total after the last project.
    pub cumulative_cost: f64,
}

impl FundingPlan {
    pub fn funded(&self) -> impl Iterator<Item = &FundingDecision> {
        self.decisions.iter().filter(|d| d.funded)
    }

    pub fn deferred(&self) -> impl Iterator<Item = &FundingDecision> {
        self.decisions.iter().filter(|d| !d.funded)
    }

    pub fn funded_cost(&self) -> f64 {
        self.funded().map(|d| d.project.cost).sum()
    }
}

/// Higher BCR first; an undefined BCR (zero discounted cost) is treated as
/// unbounded and goes ahead of every finite ratio. Equal ratios put the
/// cheaper project first.
fn merit_order(a: &Project, b: &Project) -> Ordering {
    let bcr = |p: &Project| p.bcr.unwrap_or(f64::INFINITY);
    bcr(b)
        .total_cmp(&bcr(a))
        .then_with(|| a.cost.total_cmp(&b.cost))
}

/// Orders projects by economic merit and marks each funded or deferred
/// against `budget`.
///
/// A project is funded when the running total including it stays within
/// the budget. The walk never stops early; every project is tested.
pub fn prioritize(projects: Vec<Project>, budget: f64, policy: AccrualPolicy) -> FundingPlan {
    let mut ordered = projects;
    ordered.sort_by(merit_order);

    let mut cumulative = 0.0;
    let mut decisions = Vec::with_capacity(ordered.len());

    for (index, project) in ordered.into_iter().enumerate() {
        let candidate = cumulative + project.cost;
        let funded = candidate <= budget;

        match policy {
            AccrualPolicy::AllProjects => cumulative = candidate,
            AccrualPolicy::FundedOnly if funded => cumulative = candidate,
            AccrualPolicy::FundedOnly => {}
        }

        decisions.push(FundingDecision {
            project,
            priority: index + 1,
            funded,
            cumulative_cost: candidate,
        });
    }

    FundingPlan {
        budget,
        policy,
        decisions,
        cumulative_cost: cumulative,
    }
}
