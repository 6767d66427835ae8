//! Intermediate representation of a calculation view.
//!
//! The extractor fills a [`Model`] from the XML tree; the emitter reads it
//! back node by node. Nothing is mutated once emission starts.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

/// Data-source id to fully-qualified `schema.table` name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DataSourceTable {
    tables: BTreeMap<String, String>,
}

impl DataSourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source. A repeated id replaces the earlier entry.
    pub fn insert(&mut self, id: impl Into<String>, schema: &str, table: &str) {
        self.tables.insert(id.into(), format!("{}.{}", schema, table));
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.tables.get(id).map(String::as_str)
    }

    /// Table reference for an input: the qualified name of a data source, or
    /// the id itself, which then names an earlier block of the WITH clause.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A `source` column projected under a `target` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    pub source: String,
    pub target: String,
}

impl Mapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Select-list entry for this mapping under the given table alias.
    pub fn select_item(&self, alias: &str) -> String {
        if self.source == self.target {
            format!("{}.{}", alias, self.source)
        } else {
            format!("{}.{} AS {}", alias, self.source, self.target)
        }
    }
}

/// One input of a calculation-view node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInput {
    /// Referenced data source or earlier node id, without the `#` prefix.
    pub source_ref: String,
    pub alias: String,
    pub mappings: Vec<Mapping>,
}

/// Join type of a join node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// Map a raw `joinType` value. Unknown values fall back to an inner join.
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "LEFTOUTER" => JoinKind::Left,
            "RIGHTOUTER" => JoinKind::Right,
            "FULLOUTER" => JoinKind::Full,
            _ => JoinKind::Inner,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinNode {
    pub id: String,
    /// `joinType` exactly as written, `inner` when absent.
    pub join_type_raw: String,
    pub inputs: Vec<NodeInput>,
    pub join_attributes: Vec<String>,
}

impl JoinNode {
    pub fn join_kind(&self) -> JoinKind {
        JoinKind::from_raw(&self.join_type_raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionNode {
    pub id: String,
    /// First input, `None` when it carries no node reference.
    pub input: Option<NodeInput>,
    pub filter: Option<String>,
    /// Calculated attribute id and formula, in document order. Not projected.
    pub calculated_attributes: Vec<(String, String)>,
}

/// A calculation-view node the emitter knows how to translate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalculationNode {
    Join(JoinNode),
    Projection(ProjectionNode),
}

impl CalculationNode {
    pub fn id(&self) -> &str {
        match self {
            CalculationNode::Join(join) => &join.id,
            CalculationNode::Projection(projection) => &projection.id,
        }
    }
}

/// Whether a diagnostic cost the output a unit, or only flags something odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Skipped,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The document has no `calculationViews` container.
    NoCalculationViews,
    /// No block could be produced for the whole document.
    NoViewsEmitted,
    MissingViewType,
    UnsupportedViewType(String),
    NoUsableInputs,
    InputWithoutNode,
    ExtraProjectionInputs(usize),
    NoJoinAttributes,
    DuplicateTarget(String),
    UnresolvedFilterReference(String),
}

/// A structural problem found while converting a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Calculation view the diagnostic belongs to, if any.
    pub view: Option<String>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn document(kind: DiagnosticKind) -> Self {
        Self { view: None, kind }
    }

    pub fn view(view: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            view: Some(view.into()),
            kind,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::NoCalculationViews
            | DiagnosticKind::NoViewsEmitted
            | DiagnosticKind::MissingViewType
            | DiagnosticKind::UnsupportedViewType(_)
            | DiagnosticKind::NoUsableInputs => Severity::Skipped,
            _ => Severity::Warning,
        }
    }
}

/// Log a diagnostic and add it to the list.
pub(crate) fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    match &diagnostic.view {
        Some(view) => warn!(view = %view, "{}", diagnostic.kind),
        None => warn!("{}", diagnostic.kind),
    }
    diagnostics.push(diagnostic);
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::NoCalculationViews => write!(f, "no <calculationViews> element found"),
            DiagnosticKind::NoViewsEmitted => write!(f, "no convertible calculation view found"),
            DiagnosticKind::MissingViewType => write!(f, "calculation view has no xsi:type, skipped"),
            DiagnosticKind::UnsupportedViewType(t) => {
                write!(f, "unsupported calculation view type '{}', skipped", t)
            }
            DiagnosticKind::NoUsableInputs => write!(f, "no input with a node reference, skipped"),
            DiagnosticKind::InputWithoutNode => write!(f, "input without node reference ignored"),
            DiagnosticKind::ExtraProjectionInputs(n) => {
                write!(f, "projection has {} extra input(s); only the first is used", n)
            }
            DiagnosticKind::NoJoinAttributes => {
                write!(f, "join has several inputs but no join attributes")
            }
            DiagnosticKind::DuplicateTarget(t) => {
                write!(f, "target column '{}' mapped more than once; last mapping wins", t)
            }
            DiagnosticKind::UnresolvedFilterReference(r) => {
                write!(f, "filter reference \"{}\" left unchanged", r)
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.view {
            Some(view) => write!(f, "{}: {}", view, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Everything extracted from one calculation-view document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Model {
    pub data_sources: DataSourceTable,
    /// Nodes in declaration order.
    pub nodes: Vec<CalculationNode>,
}
