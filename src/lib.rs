//! # calcsql: SAP HANA Calculation Views to SQL
//!
//! Converts calculation-view XML documents into a SQL script made of named
//! `WITH` blocks, one per join or projection node.
//!
//! ## Quick Example
//!
//! ```
//! use calcsql::prelude::*;
//!
//! let xml = r##"<scenario xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
//!   <dataSources>
//!     <DataSource id="CSKB"><columnObject schemaName="SAPABAP1" columnObjectName="CSKB"/></DataSource>
//!   </dataSources>
//!   <calculationViews>
//!     <calculationView xsi:type="Calculation:ProjectionView" id="Projection_1">
//!       <input node="#CSKB"><mapping source="KSTAR" target="CostElement"/></input>
//!     </calculationView>
//!   </calculationViews>
//! </scenario>"##;
//!
//! let conversion = calcsql::convert(xml, &Config::default()).unwrap();
//! assert_eq!(
//!     conversion.script.unwrap(),
//!     "WITH\n\nProjection_1 AS (\n    SELECT\n        J1.KSTAR AS CostElement\n    FROM SAPABAP1.CSKB AS J1\n),"
//! );
//! ```
//!
//! ## Pipeline
//!
//! | Stage     | Module      | Output                         |
//! |-----------|-------------|--------------------------------|
//! | Read      | [`xml`]     | element tree                   |
//! | Extract   | [`extract`] | [`Model`]: data sources, nodes |
//! | Emit      | [`emit`]    | `WITH` script                  |
//! | Files     | [`batch`]   | one `.sql` per input file      |

pub mod batch;
pub mod config;
pub mod emit;
pub mod error;
pub mod extract;
pub mod filter;
pub mod model;
pub mod xml;

pub use model::Model;

pub mod prelude {
    pub use crate::batch::{FileOutcome, Job, Summary};
    pub use crate::config::Config;
    pub use crate::emit::SqlEmitter;
    pub use crate::error::*;
    pub use crate::extract::ModelExtractor;
    pub use crate::model::*;
    pub use crate::{Conversion, convert};
}

use error::ConvertResult;
use model::Diagnostic;

/// Result of converting one calculation-view document.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub model: Model,
    /// The SQL script, `None` when no block could be produced.
    pub script: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Convert calculation-view XML into a SQL script.
///
/// Structural problems (unknown view types, missing inputs) are reported in
/// [`Conversion::diagnostics`]; only malformed XML is an error.
pub fn convert(xml_text: &str, config: &config::Config) -> ConvertResult<Conversion> {
    let root = xml::parse(xml_text)?;
    let mut diagnostics = Vec::new();
    let model = extract::ModelExtractor::new(config).extract(&root, &mut diagnostics);
    let script = emit::SqlEmitter::new(config).emit(&model, &mut diagnostics);

    Ok(Conversion {
        model,
        script,
        diagnostics,
    })
}
