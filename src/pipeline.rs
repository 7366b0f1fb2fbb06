use std::sync::Arc;

use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    classifier::{classify, BoundaryClassification},
    config::RunParameters,
    constraints::{coupling_equations, periodicity_equations},
    datatypes::{instance_name, Deck, Instance, LinearConstraint, Part},
    error::{CouplerError, Result},
    pairing::{periodic_families, PeriodicFamily},
    parser::load_deck,
    quadrature::{place_unit_cells, Placement},
    report::{FamilyCount, GenerationSummary},
    writer::write_deck,
};

/// Name given to records of a unit-cell deck written without `*Part` lines.
pub const DEFAULT_CELL_PART: &str = "UNIT_CELL";

/// The augmented model handed to the writer.
#[derive(Debug)]
pub struct CoupledModel<'a> {
    pub macro_part: &'a Part,
    pub cell_deck: &'a Deck,
    pub primary: &'a Part,
    pub classification: BoundaryClassification,
    pub macro_instance: Arc<str>,
    /// Per placement, one instance per unit-cell part in deck order.
    pub instances: Vec<Instance>,
    /// Per placement, coupling equations first, then periodicity.
    pub constraints: Vec<LinearConstraint>,
    pub summary: GenerationSummary,
}

/// Work produced for one `(element, point)` pair.
struct PlacementOutput {
    instances: Vec<Instance>,
    coupling: Vec<LinearConstraint>,
    periodicity: Vec<LinearConstraint>,
}

fn select_macro_part<'a>(deck: &'a Deck, name: &str) -> Result<&'a Part> {
    if let Some(part) = deck.part_by_name(name) {
        return Ok(part);
    }
    match deck.parts.as_slice() {
        [only] => {
            debug!("using macro part {} in place of {name}", only.name);
            Ok(only)
        }
        _ => Err(CouplerError::MissingPart {
            name: name.to_owned(),
        }),
    }
}

fn select_primary_part<'a>(deck: &'a Deck, name: Option<&str>) -> Result<&'a Part> {
    let found = match name {
        Some(name) => deck.part_by_name(name),
        None => deck.parts.first(),
    };
    found.ok_or_else(|| CouplerError::MissingPart {
        name: name.unwrap_or(DEFAULT_CELL_PART).to_owned(),
    })
}

fn generate_placement(
    placement: &Placement,
    macro_part: &Part,
    cell_deck: &Deck,
    primary: &Part,
    classification: &BoundaryClassification,
    families: &[PeriodicFamily],
    macro_instance: &Arc<str>,
) -> Result<PlacementOutput> {
    let element = match macro_part.elements.get(&placement.element) {
        Some(e) => e,
        None => {
            return Err(CouplerError::Input(format!(
                "Placement refers to unknown macro element {}",
                placement.element
            )))
        }
    };

    let mut instances = Vec::with_capacity(cell_deck.parts.len());
    let mut primary_name = None;
    for part in &cell_deck.parts {
        let name: Arc<str> = Arc::from(instance_name(
            &part.name,
            placement.element,
            placement.point_index,
        ));
        if part.id == primary.id {
            primary_name = Some(Arc::clone(&name));
        }
        instances.push(Instance {
            name,
            part: part.id,
            translation: placement.translation,
        });
    }

    let Some(primary_name) = primary_name else {
        return Err(CouplerError::MissingPart {
            name: primary.name.clone(),
        });
    };

    Ok(PlacementOutput {
        instances,
        coupling: coupling_equations(
            &primary_name,
            classification,
            macro_instance,
            element,
            &placement.weights,
        ),
        periodicity: periodicity_equations(&primary_name, classification, families),
    })
}

/// Builds the coupled model: one unit-cell copy per integration point of
/// every macro element, with coupling and periodicity constraints.
///
/// Classification and pairing run once on the primary part. Placements
/// are processed in parallel and gathered back in element/point order, so
/// the result does not depend on scheduling.
///
/// # Arguments
/// * `macro_deck` - Parsed macro mesh
/// * `cell_deck` - Parsed unit-cell mesh
/// * `params` - Run parameters
///
/// # Returns
/// The coupled model, or the first structural error encountered
pub fn generate<'a>(
    macro_deck: &'a Deck,
    cell_deck: &'a Deck,
    params: &RunParameters,
) -> Result<CoupledModel<'a>> {
    let macro_part = select_macro_part(macro_deck, &params.macro_part)?;
    if macro_part.elements.is_empty() {
        return Err(CouplerError::Input(format!(
            "Macro part {} has no elements",
            macro_part.name
        )));
    }
    let primary = select_primary_part(cell_deck, params.primary_part.as_deref())?;
    info!("unit cell primary part: {}", primary.name);

    let classification = classify(primary, params.tolerance)?;
    let families = periodic_families(primary, &classification, params.tolerance);
    debug!(
        "part {}: {} interior nodes carry no boundary constraint",
        primary.name, classification.interior
    );

    let placements = place_unit_cells(
        macro_part,
        params.quadrature,
        &classification.cell.center(),
    )?;
    info!(
        "placing {} unit cells in {} macro elements",
        placements.len(),
        macro_part.elements.len()
    );

    let macro_instance: Arc<str> = Arc::from(params.macro_instance.as_str());
    let bar = if params.show_progress {
        ProgressBar::new(placements.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    let outputs: Vec<Result<PlacementOutput>> = placements
        .par_iter()
        .map(|placement| {
            let output = generate_placement(
                placement,
                macro_part,
                cell_deck,
                primary,
                &classification,
                &families,
                &macro_instance,
            );
            bar.inc(1);
            output
        })
        .collect();
    bar.finish_and_clear();

    let mut instances = Vec::with_capacity(placements.len() * cell_deck.parts.len());
    let mut constraints = Vec::new();
    let mut coupling_count = 0;
    let mut periodicity_count = 0;
    for output in outputs {
        let output = output?;
        coupling_count += output.coupling.len();
        periodicity_count += output.periodicity.len();
        instances.extend(output.instances);
        constraints.extend(output.coupling);
        constraints.extend(output.periodicity);
    }

    let summary = GenerationSummary {
        macro_elements: macro_part.elements.len(),
        placements: placements.len(),
        cell_parts: cell_deck.parts.len(),
        instances: instances.len(),
        coupling_equations: coupling_count,
        periodicity_equations: periodicity_count,
        families: families
            .iter()
            .map(|f| FamilyCount {
                name: f.name.clone(),
                matched: f.outcome.pairs.len(),
                unmatched: f.outcome.unmatched.len(),
            })
            .collect(),
        skipped_records: 0,
    };

    Ok(CoupledModel {
        macro_part,
        cell_deck,
        primary,
        classification,
        macro_instance,
        instances,
        constraints,
        summary,
    })
}

/// Runs the whole tool: parse both decks, generate, write the output deck.
///
/// # Arguments
/// * `macro_path` - Path to the macro deck
/// * `cell_path` - Path to the unit-cell deck
/// * `output_path` - Path of the deck to write
/// * `params` - Run parameters
pub fn run(
    macro_path: &str,
    cell_path: &str,
    output_path: &str,
    params: &RunParameters,
) -> Result<GenerationSummary> {
    let (macro_deck, macro_report) = load_deck(macro_path, &params.macro_part)?;
    let (cell_deck, cell_report) = load_deck(cell_path, DEFAULT_CELL_PART)?;

    let mut model = generate(&macro_deck, &cell_deck, params)?;
    model.summary.skipped_records = macro_report.skipped.len() + cell_report.skipped.len();

    write_deck(output_path, &model, params)?;
    Ok(model.summary)
}
