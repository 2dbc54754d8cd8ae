use json::JsonValue;

use crate::{
    datatypes::{Grid, LoadCase},
    error::{BaselineError, Result},
};

/// Parses the input file into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
fn load_input_file(input_file: &str) -> Result<JsonValue> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(err) => return Err(BaselineError::io(input_file, err)),
    };

    match json::parse(&file_string) {
        Ok(f) => Ok(f),
        Err(err) => Err(BaselineError::Input(format!(
            "Error in input file json: {err}"
        ))),
    }
}

/// Reads an optional number from a section of the input json
fn optional_f64(input_json: &JsonValue, section: &str, key: &str) -> Result<Option<f64>> {
    let value = &input_json[section][key];
    if value.is_null() {
        return Ok(None);
    }
    match value.as_f64() {
        Some(v) => Ok(Some(v)),
        None => Err(BaselineError::Input(format!(
            "Input json field {section}.{key} must be a number"
        ))),
    }
}

fn optional_i64(input_json: &JsonValue, section: &str, key: &str) -> Result<Option<i64>> {
    let value = &input_json[section][key];
    if value.is_null() {
        return Ok(None);
    }
    match value.as_i64() {
        Some(v) => Ok(Some(v)),
        None => Err(BaselineError::Input(format!(
            "Input json field {section}.{key} must be an integer"
        ))),
    }
}

/// Parses the grid bounds from the input json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A Grid instance, defaulting missing bounds
pub fn parse_grid(input_json: &JsonValue) -> Result<Grid> {
    let default = Grid::default();
    let start = optional_i64(input_json, "grid", "start")?.unwrap_or(default.start);
    let stop = optional_i64(input_json, "grid", "stop")?.unwrap_or(default.stop);

    Grid::new(start, stop)
}

/// Parses the material model and integration constants from the input json
///
/// `pe_term` may be given directly or derived from `force` and
/// `material_elasticity`.
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A LoadCase instance, defaulting missing values
pub fn parse_load_case(input_json: &JsonValue) -> Result<LoadCase> {
    let default = LoadCase::default();

    let poisson_ratio =
        optional_f64(input_json, "material", "poisson_ratio")?.unwrap_or(default.poisson_ratio);

    let pe_term = optional_f64(input_json, "material", "pe_term")?;
    let force = optional_f64(input_json, "material", "force")?;
    let youngs_modulus = optional_f64(input_json, "material", "material_elasticity")?;

    let pe_term = match (pe_term, force, youngs_modulus) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            return Err(BaselineError::Input(
                "Input json material section must give either pe_term or force and \
                 material_elasticity, not both"
                    .to_owned(),
            ))
        }
        (Some(pe), None, None) => pe,
        (None, Some(force), Some(youngs_modulus)) => {
            if youngs_modulus == 0.0 {
                return Err(BaselineError::Input(
                    "Input json material_elasticity must be non zero".to_owned(),
                ));
            }
            LoadCase::pe_term_from(force, youngs_modulus)
        }
        (None, None, None) => default.pe_term,
        (None, _, _) => {
            return Err(BaselineError::Input(
                "Input json material section needs both force and material_elasticity".to_owned(),
            ))
        }
    };

    let c1 = optional_f64(input_json, "integration_constants", "c1")?.unwrap_or(default.c1);
    let c2 = optional_f64(input_json, "integration_constants", "c2")?.unwrap_or(default.c2);

    Ok(LoadCase {
        poisson_ratio,
        pe_term,
        c1,
        c2,
    })
}

/// Loads the grid and load case from an input file
///
/// # Arguments
/// * `input_file` - The path to the input json
pub fn run(input_file: &str) -> Result<(Grid, LoadCase)> {
    let input_json = load_input_file(input_file)?;
    let grid = parse_grid(&input_json)?;
    let load_case = parse_load_case(&input_json)?;

    log::info!("loaded configuration from {input_file}");

    Ok((grid, load_case))
}
