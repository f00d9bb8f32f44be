//! Ordered dimension and indicator column names of a fact table

use std::collections::HashMap;

use minicube_common::error::{Error, Result};
use minicube_common::types::DimValue;

/// Column layout of a fact table
///
/// Names are unique across both lists and positions never change once assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    dimensions: Vec<String>,
    indicators: Vec<String>,
    dimension_positions: HashMap<String, usize>,
    indicator_positions: HashMap<String, usize>,
}

impl Schema {
    /// Dimension value loaders use for a missing (NULL) cell
    pub const UNSET_DIMENSION: DimValue = -999_999_999;

    /// Create a schema from both column lists
    pub fn new<D, I>(dimensions: D, indicators: I) -> Result<Self>
    where
        D: IntoIterator,
        D::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut schema = Schema::default();
        for name in dimensions {
            schema.add_dimension(name.into())?;
        }
        for name in indicators {
            schema.add_indicator(name.into())?;
        }
        Ok(schema)
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dimension_positions.contains_key(name) || self.indicator_positions.contains_key(name)
    }

    /// Position of a dimension column, if the schema has one by that name
    pub fn find_dimension(&self, name: &str) -> Option<usize> {
        self.dimension_positions.get(name).copied()
    }

    /// Position of a dimension column
    pub fn dimension_index(&self, name: &str) -> Result<usize> {
        require_name(name, "dimension")?;
        self.find_dimension(name).ok_or_else(|| {
            Error::InvalidArgument(format!("Unknown dimension column: {}", name))
        })
    }

    /// Position of an indicator column
    pub fn indicator_index(&self, name: &str) -> Result<usize> {
        require_name(name, "indicator")?;
        self.indicator_positions.get(name).copied().ok_or_else(|| {
            Error::InvalidArgument(format!("Unknown indicator column: {}", name))
        })
    }

    pub(crate) fn add_dimension(&mut self, name: String) -> Result<usize> {
        self.check_new_name(&name)?;
        let position = self.dimensions.len();
        self.dimension_positions.insert(name.clone(), position);
        self.dimensions.push(name);
        Ok(position)
    }

    pub(crate) fn add_indicator(&mut self, name: String) -> Result<usize> {
        self.check_new_name(&name)?;
        let position = self.indicators.len();
        self.indicator_positions.insert(name.clone(), position);
        self.indicators.push(name);
        Ok(position)
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        require_name(name, "column")?;
        if self.contains(name) {
            return Err(Error::InvalidState(format!(
                "Column {} is already defined",
                name
            )));
        }
        Ok(())
    }
}

fn require_name(name: &str, kind: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("Blank {} name", kind)));
    }
    Ok(())
}
