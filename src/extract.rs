//! Calculation-view extraction.
//!
//! Walks the XML tree of a `.calculationview` document and builds the
//! [`Model`] the emitter works from:
//!
//! ```text
//! scenario
//! ├── dataSources/DataSource[@id]/columnObject[@schemaName,@columnObjectName]
//! └── calculationViews/calculationView[@id,@xsi:type]
//!     ├── JoinView:       @joinType, joinAttribute[@name]*, input[@node]/mapping*
//!     └── ProjectionView: input[@node]/mapping*, filter?, calculatedViewAttributes?
//! ```
//!
//! Unknown shapes are skipped with a [`Diagnostic`], never an error.

use tracing::debug;

use crate::config::Config;
use crate::model::{
    CalculationNode, DataSourceTable, Diagnostic, DiagnosticKind, JoinNode, Mapping, Model,
    NodeInput, ProjectionNode, record,
};
use crate::xml::Element;

const JOIN_VIEW: &str = "JoinView";
const PROJECTION_VIEW: &str = "ProjectionView";
const UNKNOWN_VIEW: &str = "UnknownView";
const DEFAULT_JOIN_TYPE: &str = "inner";

/// Builds a [`Model`] from a parsed calculation-view document.
#[derive(Debug, Clone)]
pub struct ModelExtractor<'a> {
    projection_alias: &'a str,
}

impl<'a> ModelExtractor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            projection_alias: &config.projection_alias,
        }
    }

    /// Extract data sources and calculation-view nodes, in document order.
    pub fn extract(&self, root: &Element, diagnostics: &mut Vec<Diagnostic>) -> Model {
        let data_sources = extract_data_sources(root);

        let Some(views) = root.find_descendant("calculationViews") else {
            record(diagnostics, Diagnostic::document(DiagnosticKind::NoCalculationViews));
            return Model {
                data_sources,
                nodes: Vec::new(),
            };
        };

        let mut nodes = Vec::new();
        for view in views.children_named("calculationView") {
            let id = view.attr("id").unwrap_or(UNKNOWN_VIEW);

            let Some(view_type) = view.prefixed_attr("type").or_else(|| view.attr("type")) else {
                record(diagnostics, Diagnostic::view(id, DiagnosticKind::MissingViewType));
                continue;
            };

            let kind = view_type.rsplit_once(':').map_or(view_type, |(_, kind)| kind);
            match kind {
                JOIN_VIEW => nodes.push(CalculationNode::Join(self.extract_join(id, view, diagnostics))),
                PROJECTION_VIEW => nodes.push(CalculationNode::Projection(
                    self.extract_projection(id, view, diagnostics),
                )),
                _ => record(
                    diagnostics,
                    Diagnostic::view(id, DiagnosticKind::UnsupportedViewType(view_type.to_string())),
                ),
            }
        }

        debug!(
            data_sources = data_sources.len(),
            nodes = nodes.len(),
            "extracted calculation view model"
        );

        Model {
            data_sources,
            nodes,
        }
    }

    fn extract_join(&self, id: &str, view: &Element, diagnostics: &mut Vec<Diagnostic>) -> JoinNode {
        let join_type_raw = view.attr("joinType").unwrap_or(DEFAULT_JOIN_TYPE).to_string();

        let join_attributes = view
            .children_named("joinAttribute")
            .filter_map(|ja| ja.attr("name"))
            .map(str::to_string)
            .collect();

        let mut inputs: Vec<NodeInput> = Vec::new();
        for input in view.children_named("input") {
            let Some(source_ref) = node_reference(input) else {
                record(diagnostics, Diagnostic::view(id, DiagnosticKind::InputWithoutNode));
                continue;
            };
            inputs.push(NodeInput {
                source_ref,
                alias: format!("T{}", inputs.len() + 1),
                mappings: extract_mappings(input),
            });
        }

        JoinNode {
            id: id.to_string(),
            join_type_raw,
            inputs,
            join_attributes,
        }
    }

    fn extract_projection(
        &self,
        id: &str,
        view: &Element,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ProjectionNode {
        let mut all_inputs = view.children_named("input");
        let input = all_inputs.next().and_then(|input| {
            node_reference(input).map(|source_ref| NodeInput {
                source_ref,
                alias: self.projection_alias.to_string(),
                mappings: extract_mappings(input),
            })
        });

        let extra = all_inputs.count();
        if extra > 0 {
            record(
                diagnostics,
                Diagnostic::view(id, DiagnosticKind::ExtraProjectionInputs(extra)),
            );
        }

        let filter = view
            .child("filter")
            .map(|f| f.text().to_string())
            .filter(|f| !f.is_empty());

        let calculated_attributes = view
            .child("calculatedViewAttributes")
            .map(|attrs| {
                attrs
                    .children_named("calculatedViewAttribute")
                    .filter_map(|cva| {
                        let formula = cva.child("formula").map(Element::text).unwrap_or_default();
                        cva.attr("id").map(|id| (id.to_string(), formula.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        ProjectionNode {
            id: id.to_string(),
            input,
            filter,
            calculated_attributes,
        }
    }
}

fn extract_data_sources(root: &Element) -> DataSourceTable {
    let mut tables = DataSourceTable::new();
    let Some(sources) = root.child("dataSources") else {
        return tables;
    };

    for ds in sources.children_named("DataSource") {
        let (Some(id), Some(column_object)) = (ds.attr("id"), ds.child("columnObject")) else {
            continue;
        };
        let schema = column_object.attr("schemaName").unwrap_or_default();
        let table = column_object.attr("columnObjectName").unwrap_or_default();
        tables.insert(id, schema, table);
    }
    tables
}

/// `#Join_1` → `Join_1`. Inputs without a reference yield `None`.
fn node_reference(input: &Element) -> Option<String> {
    input
        .attr("node")
        .filter(|node| !node.is_empty())
        .map(|node| node.trim_start_matches('#').to_string())
}

fn extract_mappings(input: &Element) -> Vec<Mapping> {
    input
        .children_named("mapping")
        .filter_map(|m| match (m.attr("source"), m.attr("target")) {
            (Some(source), Some(target)) if !source.is_empty() && !target.is_empty() => {
                Some(Mapping::new(source, target))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    fn extract(doc: &str) -> (Model, Vec<Diagnostic>) {
        let config = Config::default();
        let root = xml::parse(doc).unwrap();
        let mut diagnostics = Vec::new();
        let model = ModelExtractor::new(&config).extract(&root, &mut diagnostics);
        (model, diagnostics)
    }

    const XSI: &str = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

    #[test]
    fn test_data_sources() {
        let (model, _) = extract(
            r#"<scenario>
                 <dataSources>
                   <DataSource id="CSKB"><columnObject schemaName="SAPABAP1" columnObjectName="CSKB"/></DataSource>
                   <DataSource id="CSKU"><columnObject schemaName="SAPABAP1" columnObjectName="CSKU"/></DataSource>
                   <DataSource id="Orphan"/>
                 </dataSources>
               </scenario>"#,
        );
        assert_eq!(model.data_sources.get("CSKB"), Some("SAPABAP1.CSKB"));
        assert_eq!(model.data_sources.get("CSKU"), Some("SAPABAP1.CSKU"));
        assert_eq!(model.data_sources.get("Orphan"), None);
    }

    #[test]
    fn test_missing_calculation_views() {
        let (model, diagnostics) = extract("<scenario><dataSources/></scenario>");
        assert!(model.nodes.is_empty());
        assert_eq!(diagnostics, vec![Diagnostic::document(DiagnosticKind::NoCalculationViews)]);
    }

    #[test]
    fn test_join_view() {
        let doc = format!(
            r##"<scenario {XSI}><calculationViews>
                 <calculationView xsi:type="Calculation:JoinView" id="Join_1" joinType="leftOuter">
                   <input node="#CSKB">
                     <mapping source="MANDT" target="MANDT"/>
                     <mapping source="KSTAR" target="CostElement"/>
                   </input>
                   <input><mapping source="X" target="X"/></input>
                   <input node="#CSKU"><mapping source="KTEXT" target="KTEXT"/></input>
                   <joinAttribute name="MANDT"/>
                   <joinAttribute name="KOKRS"/>
                 </calculationView>
               </calculationViews></scenario>"##
        );
        let (model, diagnostics) = extract(&doc);

        let CalculationNode::Join(join) = &model.nodes[0] else {
            panic!("expected join node");
        };
        assert_eq!(join.id, "Join_1");
        assert_eq!(join.join_type_raw, "leftOuter");
        assert_eq!(join.join_attributes, vec!["MANDT", "KOKRS"]);
        assert_eq!(join.inputs.len(), 2);
        assert_eq!(join.inputs[0].source_ref, "CSKB");
        assert_eq!(join.inputs[0].alias, "T1");
        assert_eq!(join.inputs[0].mappings[1], Mapping::new("KSTAR", "CostElement"));
        assert_eq!(join.inputs[1].source_ref, "CSKU");
        assert_eq!(join.inputs[1].alias, "T2");
        assert_eq!(
            diagnostics,
            vec![Diagnostic::view("Join_1", DiagnosticKind::InputWithoutNode)]
        );
    }

    #[test]
    fn test_join_type_defaults_to_inner() {
        let doc = format!(
            r##"<s {XSI}><calculationViews>
                 <calculationView xsi:type="Calculation:JoinView" id="J"><input node="#A"/></calculationView>
               </calculationViews></s>"##
        );
        let (model, _) = extract(&doc);
        let CalculationNode::Join(join) = &model.nodes[0] else {
            panic!("expected join node");
        };
        assert_eq!(join.join_type_raw, "inner");
    }

    #[test]
    fn test_projection_view() {
        let doc = format!(
            r##"<s {XSI}><calculationViews>
                 <calculationView xsi:type="Calculation:ProjectionView" id="Projection_1">
                   <input node="#Join_1">
                     <mapping source="KTOPL" target="ChartOfAccounts"/>
                     <mapping source="DATBI"/>
                   </input>
                   <input node="#Ignored"/>
                   <calculatedViewAttributes>
                     <calculatedViewAttribute id="today"><formula>date(now())</formula></calculatedViewAttribute>
                   </calculatedViewAttributes>
                   <filter>
                     "today" &lt;= "DATBI"
                   </filter>
                 </calculationView>
               </calculationViews></s>"##
        );
        let (model, diagnostics) = extract(&doc);
        let CalculationNode::Projection(projection) = &model.nodes[0] else {
            panic!("expected projection node");
        };
        let input = projection.input.as_ref().unwrap();
        assert_eq!(input.source_ref, "Join_1");
        assert_eq!(input.alias, "J1");
        assert_eq!(input.mappings, vec![Mapping::new("KTOPL", "ChartOfAccounts")]);
        assert_eq!(projection.filter.as_deref(), Some(r#""today" <= "DATBI""#));
        assert_eq!(
            projection.calculated_attributes,
            vec![("today".to_string(), "date(now())".to_string())]
        );
        assert_eq!(
            diagnostics,
            vec![Diagnostic::view("Projection_1", DiagnosticKind::ExtraProjectionInputs(1))]
        );
    }

    #[test]
    fn test_unsupported_and_untyped_views_skipped() {
        let doc = format!(
            r##"<s {XSI}><calculationViews>
                 <calculationView xsi:type="Calculation:AggregationView" id="Agg"/>
                 <calculationView id="NoType"/>
                 <calculationView xsi:type="Calculation:ProjectionView" id="P"><input node="#A"/></calculationView>
               </calculationViews></s>"##
        );
        let (model, diagnostics) = extract(&doc);
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.nodes[0].id(), "P");
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic::view(
                    "Agg",
                    DiagnosticKind::UnsupportedViewType("Calculation:AggregationView".into())
                ),
                Diagnostic::view("NoType", DiagnosticKind::MissingViewType),
            ]
        );
    }

    #[test]
    fn test_projection_alias_from_config() {
        let config = Config {
            projection_alias: "P1".to_string(),
            ..Config::default()
        };
        let root = xml::parse(&format!(
            r##"<s {XSI}><calculationViews>
                 <calculationView xsi:type="Calculation:ProjectionView" id="P"><input node="#A"/></calculationView>
               </calculationViews></s>"##
        ))
        .unwrap();
        let model = ModelExtractor::new(&config).extract(&root, &mut Vec::new());
        let CalculationNode::Projection(projection) = &model.nodes[0] else {
            panic!("expected projection node");
        };
        assert_eq!(projection.input.as_ref().unwrap().alias, "P1");
    }
}
