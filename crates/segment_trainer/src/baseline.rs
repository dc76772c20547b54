//! Entropy baseline tree builder
//!
//! Greedy, unpruned alternative to the statistical tree-growth procedure:
//! each node splits on the remaining feature whose value distribution has
//! the highest entropy and opens one branch per observed non-missing value.
//! Rows whose split value is missing follow no branch.

use lumen_segment_core::{
    CategoricalValue, Constraint, FlatNode, GrownTree, OracleParams, RowSet, Table, TerminalRule, TreeGrowthOracle,
};
use tracing::debug;

/// Entropy at or below this counts as a single-valued column
pub const ZERO_ENTROPY_DELTA: f64 = 0.0001;

/// Tree-growth oracle implementing the entropy baseline
#[derive(Clone, Debug, Default)]
pub struct EntropyOracle;

impl TreeGrowthOracle for EntropyOracle {
    fn grow(
        &self,
        table: &Table,
        features: &[String],
        _target: &str,
        params: &OracleParams,
    ) -> Result<GrownTree, String> {
        let columns = features
            .iter()
            .map(|f| table.column_index(f).map(|c| (f.clone(), c)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| err.to_string())?;

        let mut builder = EntropyBuilder {
            table,
            params,
            grown: GrownTree::default(),
            next_id: 0,
        };
        builder.build_node(None, None, &columns, RowSet::all(table), Vec::new(), 0);
        Ok(builder.grown)
    }
}

/// Shannon entropy (natural log) of the non-missing values in `column`
///
/// Probabilities are taken over all rows, missing ones included.
pub fn value_entropy(table: &Table, rows: &RowSet, column: usize) -> f64 {
    let total = rows.len();
    if total == 0 {
        return 0.0;
    }
    distinct_values(table, rows, column)
        .iter()
        .map(|value| {
            let p = rows.count_value(table, column, value) as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

/// Non-missing values of `column` in first-seen order
fn distinct_values(table: &Table, rows: &RowSet, column: usize) -> Vec<CategoricalValue> {
    let mut values: Vec<CategoricalValue> = Vec::new();
    for row in rows.iter() {
        let value = table.value(row, column);
        if !value.is_missing() && !values.contains(value) {
            values.push(value.clone());
        }
    }
    values
}

struct EntropyBuilder<'a> {
    table: &'a Table,
    params: &'a OracleParams,
    grown: GrownTree,
    next_id: u32,
}

impl EntropyBuilder<'_> {
    fn build_node(
        &mut self,
        parent: Option<u32>,
        choice: Option<Vec<CategoricalValue>>,
        features: &[(String, usize)],
        rows: RowSet,
        constraints: Vec<Constraint>,
        depth: usize,
    ) {
        let id = self.next_id;
        self.next_id += 1;

        if features.is_empty() || rows.len() <= self.params.min_parent_node_size || depth >= self.params.max_depth {
            self.push_leaf(id, parent, choice, constraints, false);
            return;
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, (_, column)) in features.iter().enumerate() {
            let entropy = value_entropy(self.table, &rows, *column);
            if best.map_or(true, |(_, top)| entropy > top) {
                best = Some((i, entropy));
            }
        }
        let Some((best_idx, entropy)) = best else {
            self.push_leaf(id, parent, choice, constraints, false);
            return;
        };
        if entropy <= ZERO_ENTROPY_DELTA {
            debug!(node = id, rows = rows.len(), "zero entropy, closing leaf");
            self.push_leaf(id, parent, choice, constraints, true);
            return;
        }

        let (feature, column) = &features[best_idx];
        debug!(node = id, feature = %feature, entropy, rows = rows.len(), "entropy split");
        self.grown.nodes.push(FlatNode {
            id,
            parent,
            split_feature: Some(feature.clone()),
            choice,
            zero_entropy: false,
        });

        let remaining: Vec<(String, usize)> = features
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best_idx)
            .map(|(_, f)| f.clone())
            .collect();

        for value in distinct_values(self.table, &rows, *column) {
            let branch = vec![value];
            let child_rows = rows.filter_in(self.table, *column, &branch);
            let mut child_constraints = constraints.clone();
            child_constraints.push(Constraint::new(feature.clone(), branch.clone()));
            self.build_node(Some(id), Some(branch), &remaining, child_rows, child_constraints, depth + 1);
        }
    }

    fn push_leaf(
        &mut self,
        id: u32,
        parent: Option<u32>,
        choice: Option<Vec<CategoricalValue>>,
        constraints: Vec<Constraint>,
        zero_entropy: bool,
    ) {
        self.grown.nodes.push(FlatNode {
            id,
            parent,
            split_feature: None,
            choice,
            zero_entropy,
        });
        self.grown.rules.push(TerminalRule {
            leaf_id: id,
            constraints,
        });
    }
}
