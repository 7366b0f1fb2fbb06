//! Serialises a [`CoupledModel`] back into the keyword deck format.
//!
//! Layout: heading, parts (macro nodes, then every unit-cell part once),
//! assembly with all instances and the constraint equations, materials,
//! then one section assignment per unit-cell instance.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    classifier::{CornerLabel, EdgeLabel, FaceLabel},
    config::RunParameters,
    datatypes::{Deck, ElementId, Material, Part},
    error::{CouplerError, Result},
    pipeline::CoupledModel,
};

/// Abaqus accepts at most 16 entries per data line.
const IDS_PER_LINE: usize = 16;

const ALL_ELEMENTS: &str = "ALL_ELEMENTS";
const ANCHOR_SET: &str = "ANCHORS";

fn write_id_lines<W: Write, T: Display>(out: &mut W, ids: &[T]) -> Result<()> {
    for chunk in ids.chunks(IDS_PER_LINE) {
        let line: Vec<String> = chunk.iter().map(|id| id.to_string()).collect();
        writeln!(out, "{}", line.join(", "))?;
    }
    Ok(())
}

fn write_nodes<W: Write>(out: &mut W, part: &Part, precision: usize) -> Result<()> {
    writeln!(out, "*Node")?;
    for node in part.nodes.values() {
        writeln!(
            out,
            "{:>7}, {:.p$}, {:.p$}, {:.p$}",
            node.id,
            node.position.x,
            node.position.y,
            node.position.z,
            p = precision
        )?;
    }
    Ok(())
}

fn write_elements<W: Write>(out: &mut W, part: &Part) -> Result<()> {
    let mut kind = None;
    for element in part.elements.values() {
        if kind != Some(element.kind) {
            writeln!(out, "*Element, type={}", element.kind.keyword())?;
            kind = Some(element.kind);
        }
        let nodes: Vec<String> = element.nodes.iter().map(|n| n.to_string()).collect();
        writeln!(out, "{:>7}, {}", element.id, nodes.join(", "))?;
    }
    Ok(())
}

fn write_macro_part<W: Write>(
    out: &mut W,
    model: &CoupledModel,
    params: &RunParameters,
) -> Result<()> {
    let part = model.macro_part;
    writeln!(out, "*Part, name={}", part.name)?;
    write_nodes(out, part, params.precision)?;

    // the macro mesh carries no elements; point masses give its nodes DOFs
    if let Some(mass) = params.anchor_mass {
        writeln!(out, "*Element, type=MASS, elset={ANCHOR_SET}")?;
        for (i, id) in part.nodes.keys().enumerate() {
            writeln!(out, "{:>7}, {}", i + 1, id)?;
        }
        writeln!(out, "*Mass, elset={ANCHOR_SET}")?;
        writeln!(out, "{mass:e},")?;
    }

    writeln!(out, "*End Part")?;
    writeln!(out, "**")?;
    Ok(())
}

fn write_cell_part<W: Write>(
    out: &mut W,
    model: &CoupledModel,
    part: &Part,
    params: &RunParameters,
) -> Result<()> {
    writeln!(out, "*Part, name={}", part.name)?;
    write_nodes(out, part, params.precision)?;
    write_elements(out, part)?;

    if part.id == model.primary.id {
        let c = &model.classification;
        for corner in CornerLabel::ALL {
            writeln!(out, "*Nset, nset={corner}")?;
            writeln!(out, "{}", c.corner(corner))?;
        }
        for face in FaceLabel::ALL {
            if !c.face(face).is_empty() {
                writeln!(out, "*Nset, nset={face}")?;
                write_id_lines(out, c.face(face))?;
            }
        }
        for edge in EdgeLabel::all() {
            if !c.edge(edge).is_empty() {
                writeln!(out, "*Nset, nset={edge}")?;
                write_id_lines(out, c.edge(edge))?;
            }
        }
    }

    if !part.elements.is_empty() {
        writeln!(out, "*Elset, elset={ALL_ELEMENTS}")?;
        let ids: Vec<ElementId> = part.elements.keys().copied().collect();
        write_id_lines(out, &ids)?;
    }

    writeln!(out, "*End Part")?;
    writeln!(out, "**")?;
    Ok(())
}

/// Material bound to a part: its `*Solid Section` material, else a
/// material sharing the part's name.
fn section_material<'a>(part: &Part, deck: &'a Deck) -> Option<&'a Material> {
    part.section_material
        .as_deref()
        .and_then(|name| deck.material_by_name(name))
        .or_else(|| deck.material_by_name(&part.name))
}

/// Writes the complete coupled deck into `out`.
///
/// # Arguments
/// * `model` - The generated model
/// * `params` - Run parameters (precision, anchor mass)
/// * `out` - Destination
pub fn render<W: Write>(model: &CoupledModel, params: &RunParameters, out: &mut W) -> Result<()> {
    let p = params.precision;
    let summary = &model.summary;

    writeln!(out, "*Heading")?;
    writeln!(out, "** Multi-scale coupled model")?;
    writeln!(
        out,
        "** Macro part {}: {} elements, {} integration points",
        model.macro_part.name, summary.macro_elements, summary.placements
    )?;
    writeln!(
        out,
        "** Unit cell: {} part(s), primary {}, tolerance {:e}",
        summary.cell_parts,
        model.primary.name,
        params.tolerance.value()
    )?;
    writeln!(out, "*Preprint, echo=NO, model=NO, history=NO, contact=NO")?;

    writeln!(out, "**\n** PARTS\n**")?;
    write_macro_part(out, model, params)?;
    for part in &model.cell_deck.parts {
        write_cell_part(out, model, part, params)?;
    }

    writeln!(out, "**\n** ASSEMBLY\n**")?;
    writeln!(out, "*Assembly, name=Assembly")?;
    writeln!(out, "**")?;
    writeln!(
        out,
        "*Instance, name={}, part={}",
        model.macro_instance, model.macro_part.name
    )?;
    writeln!(out, "*End Instance")?;
    writeln!(out, "**")?;

    for instance in &model.instances {
        let part = match model.cell_deck.part(instance.part) {
            Some(part) => part,
            None => {
                return Err(CouplerError::Input(format!(
                    "Instance {} refers to an unknown part",
                    instance.name
                )))
            }
        };
        writeln!(out, "*Instance, name={}, part={}", instance.name, part.name)?;
        let t = instance.translation;
        writeln!(out, "{:.p$}, {:.p$}, {:.p$}", t.x, t.y, t.z)?;
        writeln!(out, "*End Instance")?;
    }

    writeln!(out, "**\n** CONSTRAINT EQUATIONS\n**")?;
    for equation in &model.constraints {
        writeln!(out, "*Equation")?;
        writeln!(out, "{}", equation.terms().len())?;
        for term in equation.terms() {
            writeln!(
                out,
                "{}.{}, {}, {:.p$}",
                term.entity.instance,
                term.entity.node,
                term.dof.number(),
                term.coefficient
            )?;
        }
    }
    writeln!(out, "*End Assembly")?;

    writeln!(out, "**\n** MATERIALS\n**")?;
    for material in &model.cell_deck.materials {
        writeln!(out, "*Material, name={}", material.name)?;
        writeln!(out, "*Elastic")?;
        let (e, nu) = (material.youngs_modulus, material.poisson_ratio);
        writeln!(out, "{e}, {nu}")?;
    }

    writeln!(out, "**\n** SECTIONS\n**")?;
    // indexed by PartId; parts without elements have no ALL_ELEMENTS set
    let materials: Vec<Option<&Material>> = model
        .cell_deck
        .parts
        .iter()
        .map(|part| {
            if part.elements.is_empty() {
                return None;
            }
            let material = section_material(part, model.cell_deck);
            if material.is_none() {
                let name = &part.name;
                warn!("part {name} has no material, its instances get no section");
            }
            material
        })
        .collect();

    for instance in &model.instances {
        if let Some(Some(material)) = materials.get(instance.part.0) {
            writeln!(
                out,
                "*Solid Section, elset={}.{ALL_ELEMENTS}, material={}",
                instance.name, material.name
            )?;
            writeln!(out, "1.,")?;
        }
    }

    Ok(())
}

fn temp_path(target: &Path) -> Result<PathBuf> {
    match target.file_name() {
        Some(name) => {
            let hidden = format!(".{}.tmp", name.to_string_lossy());
            Ok(target.with_file_name(hidden))
        }
        None => Err(CouplerError::Input(format!(
            "Output path {} does not name a file",
            target.display()
        ))),
    }
}

fn write_to(path: &Path, model: &CoupledModel, params: &RunParameters) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    render(model, params, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes the coupled deck to `path`. The deck goes to a hidden sibling
/// file first and is renamed into place once complete, so a failed run
/// never leaves a truncated deck behind.
pub fn write_deck(path: &str, model: &CoupledModel, params: &RunParameters) -> Result<()> {
    let target = Path::new(path);
    let temp = temp_path(target)?;

    if let Err(err) = write_to(&temp, model, params) {
        let _ = std::fs::remove_file(&temp);
        return Err(err);
    }
    std::fs::rename(&temp, target)?;

    info!(
        "wrote {} instances and {} equations to {path}",
        model.instances.len(),
        model.constraints.len()
    );
    Ok(())
}
