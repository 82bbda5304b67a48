use crate::{Error, PotentialTable};

/// Parameters controlling the construction and update of neighbor lists
#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NeighborListParameters {
    /// Range of the neighbor lists. This must be larger than the range of all
    /// the pair potentials, the difference is the skin allowing particles to
    /// move before the lists need to be rebuilt.
    pub neighbor_range: f64,
    /// Number of cells to search in each direction. Cells have a size of at
    /// least `neighbor_range / cell_radius`, larger values give smaller cells
    /// and fewer candidate pairs, at the cost of more neighboring cells.
    #[serde(default = "serde_default_cell_radius")]
    pub cell_radius: usize,
    /// Fraction of the skin a particle can travel before the lists are
    /// rebuilt. Since two particles can move towards one another, this must
    /// be below 0.5.
    #[serde(default = "serde_default_safety_factor")]
    pub safety_factor: f64,
    /// Should we also store the down neighbors (neighbors with a smaller
    /// index) of every particle?
    #[serde(default = "serde_default_down_lists")]
    pub down_lists: bool,
    /// Initial number of neighbors that can be stored for each particle. This
    /// grows automatically when needed.
    #[serde(default = "serde_default_initial_capacity")]
    pub initial_capacity: usize,
    /// Only check if the lists need an update every `update_interval` steps
    #[serde(default = "serde_default_update_interval")]
    pub update_interval: usize,
    /// Do not warn about unsafe displacements
    #[serde(default)]
    pub quiet: bool,
}

fn serde_default_cell_radius() -> usize { 2 }
fn serde_default_safety_factor() -> f64 { 0.4 }
fn serde_default_down_lists() -> bool { true }
fn serde_default_initial_capacity() -> usize { 16 }
fn serde_default_update_interval() -> usize { 1 }

impl NeighborListParameters {
    /// Create parameters with the given neighbor range, using the default
    /// values for everything else
    pub fn new(neighbor_range: f64) -> NeighborListParameters {
        NeighborListParameters {
            neighbor_range: neighbor_range,
            cell_radius: serde_default_cell_radius(),
            safety_factor: serde_default_safety_factor(),
            down_lists: serde_default_down_lists(),
            initial_capacity: serde_default_initial_capacity(),
            update_interval: serde_default_update_interval(),
            quiet: false,
        }
    }

    /// Parse and validate parameters from a JSON string
    pub fn from_json(json: &str) -> Result<NeighborListParameters, Error> {
        let parameters: NeighborListParameters = serde_json::from_str(json)?;
        parameters.validate()?;
        return Ok(parameters);
    }

    /// Serialize these parameters to JSON
    pub fn to_json(&self) -> Result<String, Error> {
        return Ok(serde_json::to_string(self)?);
    }

    /// Check that these parameters are valid on their own
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.neighbor_range > 0.0 && self.neighbor_range.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "neighbor range must be positive and finite, got {}", self.neighbor_range
            )));
        }

        if !(self.safety_factor > 0.0 && self.safety_factor < 0.5) {
            return Err(Error::InvalidParameter(format!(
                "safety factor must be between 0 and 0.5, got {}", self.safety_factor
            )));
        }

        if self.cell_radius < 1 {
            return Err(Error::InvalidParameter("cell radius must be at least 1".into()));
        }

        if self.update_interval < 1 {
            return Err(Error::InvalidParameter("update interval must be at least 1".into()));
        }

        Ok(())
    }

    /// Check that these parameters are compatible with the given potentials
    pub fn validate_with(&self, potentials: &PotentialTable) -> Result<(), Error> {
        self.validate()?;

        let max_range = potentials.max_range();
        if self.neighbor_range <= max_range {
            return Err(Error::InvalidParameter(format!(
                "neighbor range ({}) must be larger than the largest potential range ({})",
                self.neighbor_range, max_range
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::TruncatedPotential;

    #[test]
    fn defaults() {
        let parameters = NeighborListParameters::from_json(r#"{"neighbor_range": 3.5}"#).unwrap();
        assert_eq!(parameters, NeighborListParameters::new(3.5));
        assert_eq!(parameters.cell_radius, 2);
        assert_eq!(parameters.safety_factor, 0.4);
        assert!(parameters.down_lists);
        assert_eq!(parameters.initial_capacity, 16);
        assert_eq!(parameters.update_interval, 1);
        assert!(!parameters.quiet);

        let json = parameters.to_json().unwrap();
        assert_eq!(NeighborListParameters::from_json(&json).unwrap(), parameters);
    }

    #[test]
    fn invalid_json() {
        let error = NeighborListParameters::from_json(r#"{"neighbor_range": 3.5, "cutoff": 2}"#).unwrap_err();
        assert!(matches!(error, Error::Json(_)));

        let error = NeighborListParameters::from_json(r#"{"cell_radius": 3}"#).unwrap_err();
        assert!(matches!(error, Error::Json(_)));
    }

    #[test]
    fn validation() {
        let mut parameters = NeighborListParameters::new(3.0);
        parameters.validate().unwrap();

        parameters.safety_factor = 0.5;
        assert_eq!(
            parameters.validate().unwrap_err().to_string(),
            "invalid parameter: safety factor must be between 0 and 0.5, got 0.5"
        );

        parameters.safety_factor = 0.2;
        parameters.cell_radius = 0;
        assert!(parameters.validate().is_err());

        parameters.cell_radius = 1;
        parameters.neighbor_range = -3.0;
        assert!(parameters.validate().is_err());

        let error = NeighborListParameters::from_json(r#"{"neighbor_range": 3.5, "update_interval": 0}"#).unwrap_err();
        assert!(matches!(error, Error::InvalidParameter(_)));
    }

    #[test]
    fn validation_with_potentials() {
        let mut potentials = PotentialTable::new(2);
        potentials.set(0, 1, Arc::new(TruncatedPotential { range: 3.0 })).unwrap();

        let parameters = NeighborListParameters::new(3.0);
        assert_eq!(
            parameters.validate_with(&potentials).unwrap_err().to_string(),
            "invalid parameter: neighbor range (3) must be larger than the largest potential range (3)"
        );

        let parameters = NeighborListParameters::new(3.5);
        parameters.validate_with(&potentials).unwrap();
    }

    #[test]
    fn schema() {
        let schema = schemars::schema_for!(NeighborListParameters);
        let schema = serde_json::to_value(&schema).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("neighbor_range"));
        assert!(properties.contains_key("safety_factor"));
        assert_eq!(schema["required"], serde_json::json!(["neighbor_range"]));
    }
}
