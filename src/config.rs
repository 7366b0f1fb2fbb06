use json::JsonValue;
use tracing::{info, warn};

use crate::{
    datatypes::Tolerance,
    error::{CouplerError, Result},
    quadrature::QuadratureChoice,
};

const KNOWN_KEYS: [&str; 8] = [
    "tolerance",
    "quadrature",
    "primary_part",
    "macro_part",
    "macro_instance",
    "precision",
    "anchor_mass",
    "show_progress",
];

/// Everything that steers one generation run besides the two decks.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    pub tolerance: Tolerance,
    pub quadrature: QuadratureChoice,
    /// Unit-cell part carrying coupling and periodicity. `None` picks the
    /// first part of the unit-cell deck.
    pub primary_part: Option<String>,
    /// Name of the macro part, also given to records outside any `*Part`.
    pub macro_part: String,
    pub macro_instance: String,
    /// Decimal places for coordinates and coefficients.
    pub precision: usize,
    /// Point mass hung on every macro node so it carries DOFs.
    pub anchor_mass: Option<f64>,
    pub show_progress: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        RunParameters {
            tolerance: Tolerance::default(),
            quadrature: QuadratureChoice::Auto,
            primary_part: None,
            macro_part: "MACRO".to_owned(),
            macro_instance: "MACRO-1".to_owned(),
            precision: 10,
            anchor_mass: None,
            show_progress: true,
        }
    }
}

fn number_field(input_json: &JsonValue, key: &str) -> Result<Option<f64>> {
    if !input_json.has_key(key) || input_json[key].is_null() {
        return Ok(None);
    }
    match input_json[key].as_f64() {
        Some(v) => Ok(Some(v)),
        None => Err(CouplerError::Input(format!(
            "Parameter json field {key} must be a number"
        ))),
    }
}

fn string_field(input_json: &JsonValue, key: &str) -> Result<Option<String>> {
    if !input_json.has_key(key) || input_json[key].is_null() {
        return Ok(None);
    }
    match input_json[key].as_str() {
        Some(v) if !v.trim().is_empty() => Ok(Some(v.trim().to_owned())),
        _ => Err(CouplerError::Input(format!(
            "Parameter json field {key} must be a non-empty string"
        ))),
    }
}

/// Parses run parameters from json text. Absent keys keep their defaults.
///
/// # Arguments
/// * `contents` - The parameter file contents
///
/// # Returns
/// The run parameters
pub fn parse_parameters(contents: &str) -> Result<RunParameters> {
    let input_json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(CouplerError::Input(format!(
                "Error in parameter file json: {err}"
            )))
        }
    };

    if !input_json.is_object() {
        return Err(CouplerError::Input(
            "Parameter json must be an object".to_string(),
        ));
    }

    for (key, _) in input_json.entries() {
        if !KNOWN_KEYS.contains(&key) {
            warn!("ignoring unknown parameter '{key}'");
        }
    }

    let mut params = RunParameters::default();

    if let Some(tolerance) = number_field(&input_json, "tolerance")? {
        params.tolerance = Tolerance::new(tolerance)?;
    }

    if let Some(quadrature) = string_field(&input_json, "quadrature")? {
        params.quadrature = match QuadratureChoice::parse(&quadrature) {
            Some(q) => q,
            None => {
                return Err(CouplerError::Input(format!(
                    "Unknown quadrature '{quadrature}', expected auto, reduced or full"
                )))
            }
        };
    }

    params.primary_part = string_field(&input_json, "primary_part")?;

    if let Some(name) = string_field(&input_json, "macro_part")? {
        params.macro_part = name;
    }
    if let Some(name) = string_field(&input_json, "macro_instance")? {
        params.macro_instance = name;
    }

    if input_json.has_key("precision") {
        params.precision = match input_json["precision"].as_usize() {
            Some(p) if (1..=17).contains(&p) => p,
            _ => {
                return Err(CouplerError::Input(
                    "Parameter json field precision must be an integer between 1 and 17"
                        .to_string(),
                ))
            }
        };
    }

    if let Some(mass) = number_field(&input_json, "anchor_mass")? {
        if !(mass > 0.0) || !mass.is_finite() {
            return Err(CouplerError::Input(format!(
                "Anchor mass must be positive, got {mass}"
            )));
        }
        params.anchor_mass = Some(mass);
    }

    if input_json.has_key("show_progress") {
        params.show_progress = match input_json["show_progress"].as_bool() {
            Some(b) => b,
            None => {
                return Err(CouplerError::Input(
                    "Parameter json field show_progress must be a boolean".to_string(),
                ))
            }
        };
    }

    Ok(params)
}

/// Loads run parameters from a json file
///
/// # Arguments
/// * `path` - The path to the parameter file
pub fn load_parameters(path: &str) -> Result<RunParameters> {
    let file_string = match std::fs::read_to_string(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(CouplerError::Input(format!(
                "Unable to open parameter file {}",
                path
            )))
        }
    };

    let params = parse_parameters(&file_string)?;
    info!("loaded run parameters from {path}");
    Ok(params)
}
