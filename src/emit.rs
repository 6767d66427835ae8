//! SQL emitter for the calculation-view model.
//!
//! Every node becomes one named block of a `WITH` clause. Blocks keep
//! declaration order so that later nodes can select from earlier ones by id.

use tracing::debug;

use crate::config::Config;
use crate::filter::{ColumnLookup, FilterRewriter};
use crate::model::{
    CalculationNode, DataSourceTable, Diagnostic, DiagnosticKind, JoinNode, Model, NodeInput,
    ProjectionNode, record,
};

const INDENT: &str = "    ";
const COLUMN_INDENT: &str = "        ";

/// Turns calculation-view nodes into SQL blocks.
#[derive(Debug, Clone, Copy)]
pub struct SqlEmitter<'a> {
    config: &'a Config,
}

impl<'a> SqlEmitter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build the complete script, or `None` when no node produced a block.
    pub fn emit(&self, model: &Model, diagnostics: &mut Vec<Diagnostic>) -> Option<String> {
        let mut blocks: Vec<String> = model
            .nodes
            .iter()
            .filter_map(|node| self.emit_node(node, &model.data_sources, diagnostics))
            .collect();

        if blocks.is_empty() {
            let already_reported = diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::NoCalculationViews);
            if !already_reported {
                record(diagnostics, Diagnostic::document(DiagnosticKind::NoViewsEmitted));
            }
            return None;
        }

        if self.config.strip_trailing_comma {
            if let Some(last) = blocks.last_mut() {
                if last.ends_with(',') {
                    last.pop();
                }
            }
        }

        Some(format!("WITH\n\n{}", blocks.join("\n\n")))
    }

    /// Emit the block for one node. Nodes without usable inputs are skipped.
    pub fn emit_node(
        &self,
        node: &CalculationNode,
        tables: &DataSourceTable,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<String> {
        let block = match node {
            CalculationNode::Join(join) => self.emit_join(join, tables, diagnostics),
            CalculationNode::Projection(projection) => {
                self.emit_projection(projection, tables, diagnostics)
            }
        };

        match &block {
            Some(_) => debug!(view = node.id(), "emitted block"),
            None => record(diagnostics, Diagnostic::view(node.id(), DiagnosticKind::NoUsableInputs)),
        }
        block
    }

    fn emit_join(
        &self,
        join: &JoinNode,
        tables: &DataSourceTable,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<String> {
        let (base, rest) = join.inputs.split_first()?;
        let join_kind = join.join_kind();

        let columns: Vec<String> = join
            .inputs
            .iter()
            .flat_map(|input| input.mappings.iter().map(|m| m.select_item(&input.alias)))
            .collect();

        if !rest.is_empty() && join.join_attributes.is_empty() {
            record(diagnostics, Diagnostic::view(&join.id, DiagnosticKind::NoJoinAttributes));
        }

        let mut clauses = vec![from_clause(base, tables)];
        for input in rest {
            // Every join attribute ties the current input back to the first one.
            let conditions: Vec<String> = join
                .join_attributes
                .iter()
                .map(|attr| format!("{}.{} = {}.{}", base.alias, attr, input.alias, attr))
                .collect();
            let on = if conditions.is_empty() {
                "1 = 1".to_string()
            } else {
                conditions.join(" AND ")
            };
            clauses.push(format!(
                "{} {} AS {} ON {}",
                join_kind,
                tables.resolve(&input.source_ref),
                input.alias,
                on
            ));
        }

        Some(render_block(&join.id, &columns, &clauses, None))
    }

    fn emit_projection(
        &self,
        projection: &ProjectionNode,
        tables: &DataSourceTable,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<String> {
        let input = projection.input.as_ref()?;

        let mut lookup = ColumnLookup::new();
        let mut columns = Vec::with_capacity(input.mappings.len());
        for mapping in &input.mappings {
            if lookup.insert(&mapping.target, &mapping.source) {
                record(
                    diagnostics,
                    Diagnostic::view(&projection.id, DiagnosticKind::DuplicateTarget(mapping.target.clone())),
                );
            }
            columns.push(mapping.select_item(&input.alias));
        }

        let where_clause = projection.filter.as_deref().and_then(|filter| {
            let rewritten =
                FilterRewriter::new(&self.config.date_function, &input.alias, &lookup).rewrite(filter);
            for reference in rewritten.unresolved {
                record(
                    diagnostics,
                    Diagnostic::view(&projection.id, DiagnosticKind::UnresolvedFilterReference(reference)),
                );
            }
            (!rewritten.sql.is_empty()).then_some(rewritten.sql)
        });

        let clauses = [from_clause(input, tables)];
        Some(render_block(&projection.id, &columns, &clauses, where_clause.as_deref()))
    }
}

fn from_clause(input: &NodeInput, tables: &DataSourceTable) -> String {
    format!("FROM {} AS {}", tables.resolve(&input.source_ref), input.alias)
}

fn render_block(id: &str, columns: &[String], clauses: &[String], where_clause: Option<&str>) -> String {
    let select_list = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(&format!(",\n{}", COLUMN_INDENT))
    };

    let mut lines = vec![
        format!("{} AS (", id),
        format!("{}SELECT", INDENT),
        format!("{}{}", COLUMN_INDENT, select_list),
    ];
    for clause in clauses {
        lines.push(format!("{}{}", INDENT, clause));
    }
    if let Some(condition) = where_clause {
        lines.push(format!("{}WHERE", INDENT));
        lines.push(format!("{}{}", COLUMN_INDENT, condition));
    }
    lines.push("),".to_string());
    lines.join("\n")
}
