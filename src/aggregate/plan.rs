use serde::{Serialize, Deserialize};

/// One reducer registration of a GROUPBY step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerSpec {
    pub name: String,
    pub property: Option<String>,
    pub alias: String,
}

/// An ordered processing step. The planner lowers the list onto the
/// result-processor chain in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanStep {
    /// Load fields from document storage; empty list means every field.
    Load { fields: Vec<String> },
    /// Evaluate an expression into a new row key.
    Apply { expr: String, alias: String },
    /// Keep only rows where the expression is truthy.
    Filter { expr: String },
    Group {
        by: Vec<String>,
        reducers: Vec<ReducerSpec>,
    },
    /// Sort (name, ascending) and optionally window the sorted stream.
    Arrange {
        sort_by: Vec<(String, bool)>,
        limit: Option<(usize, usize)>,
    },
    Limit { offset: usize, num: usize },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatePlan {
    pub steps: Vec<PlanStep>,
}

impl AggregatePlan {
    pub fn new() -> Self {
        AggregatePlan::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn load(mut self, fields: &[&str]) -> Self {
        self.steps.push(PlanStep::Load {
            fields: fields.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn apply(mut self, expr: &str, alias: &str) -> Self {
        self.steps.push(PlanStep::Apply {
            expr: expr.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn filter(mut self, expr: &str) -> Self {
        self.steps.push(PlanStep::Filter {
            expr: expr.to_string(),
        });
        self
    }

    pub fn group_by(mut self, by: &[&str], reducers: Vec<ReducerSpec>) -> Self {
        self.steps.push(PlanStep::Group {
            by: by.iter().map(|s| s.to_string()).collect(),
            reducers,
        });
        self
    }

    pub fn sort_by(mut self, keys: &[(&str, bool)], limit: Option<(usize, usize)>) -> Self {
        self.steps.push(PlanStep::Arrange {
            sort_by: keys.iter().map(|(n, asc)| (n.to_string(), *asc)).collect(),
            limit,
        });
        self
    }

    pub fn limit(mut self, offset: usize, num: usize) -> Self {
        self.steps.push(PlanStep::Limit { offset, num });
        self
    }
}

impl ReducerSpec {
    pub fn new(name: &str, property: Option<&str>, alias: &str) -> Self {
        ReducerSpec {
            name: name.to_string(),
            property: property.map(|s| s.to_string()),
            alias: alias.to_string(),
        }
    }
}
