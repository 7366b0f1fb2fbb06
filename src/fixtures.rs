//! Structured hexahedral meshes for tests, as parts and as deck text.

use std::fmt::Write;

use crate::datatypes::{Element, ElementKind, Node, NodeId, Part, PartId};

/// Box of `divisions` hexahedra spanning `[0, extents]`, nodes and
/// elements numbered from 1 with x varying fastest.
pub fn grid_part(name: &str, extents: [f64; 3], divisions: [usize; 3]) -> Part {
    grid_part_at(name, [0.0; 3], extents, divisions, ElementKind::Hex8Reduced)
}

pub fn grid_part_at(
    name: &str,
    origin: [f64; 3],
    extents: [f64; 3],
    divisions: [usize; 3],
    kind: ElementKind,
) -> Part {
    let [nx, ny, nz] = divisions;
    let id = |i: usize, j: usize, k: usize| (1 + i + (nx + 1) * (j + (ny + 1) * k)) as NodeId;

    let mut part = Part::new(PartId(0), name);
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                let x = origin[0] + extents[0] * i as f64 / nx as f64;
                let y = origin[1] + extents[1] * j as f64 / ny as f64;
                let z = origin[2] + extents[2] * k as f64 / nz as f64;
                part.nodes.insert(id(i, j, k), Node::new(id(i, j, k), x, y, z));
            }
        }
    }

    let mut element_id = 1;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let nodes = [
                    id(i, j, k),
                    id(i + 1, j, k),
                    id(i + 1, j + 1, k),
                    id(i, j + 1, k),
                    id(i, j, k + 1),
                    id(i + 1, j, k + 1),
                    id(i + 1, j + 1, k + 1),
                    id(i, j + 1, k + 1),
                ];
                part.elements.insert(
                    element_id,
                    Element {
                        id: element_id,
                        nodes,
                        kind,
                    },
                );
                element_id += 1;
            }
        }
    }

    part
}

/// Node and element blocks of a part, without part delimiters.
pub fn mesh_text(part: &Part) -> String {
    let mut text = String::from("*Node\n");
    for node in part.nodes.values() {
        let _ = writeln!(
            text,
            "{:>7}, {:>14}, {:>14}, {:>14}",
            node.id, node.position.x, node.position.y, node.position.z
        );
    }

    let mut kind = None;
    for element in part.elements.values() {
        if kind != Some(element.kind) {
            let _ = writeln!(text, "*Element, type={}", element.kind.keyword());
            kind = Some(element.kind);
        }
        let nodes: Vec<String> = element.nodes.iter().map(|n| n.to_string()).collect();
        let _ = writeln!(text, "{}, {}", element.id, nodes.join(", "));
    }
    text
}

/// Unit-cell deck: a `Matrice` part, optionally a centred `Fibre` block,
/// and both materials.
pub fn cell_deck(extents: [f64; 3], divisions: [usize; 3], with_fibre: bool) -> String {
    let matrix = grid_part("Matrice", extents, divisions);

    let mut text = String::from("*Heading\n** unit cell\n*Part, name=Matrice\n");
    text.push_str(&mesh_text(&matrix));
    text.push_str("*Solid Section, elset=Set-All, material=Matrice\n1.,\n");
    text.push_str("*End Part\n");

    if with_fibre {
        let size = extents.map(|e| e / 4.0);
        let origin = [0, 1, 2].map(|a| (extents[a] - size[a]) / 2.0);
        let fibre = grid_part_at("Fibre", origin, size, [1, 1, 1], ElementKind::Hex8Full);
        text.push_str("**\n*Part, name=Fibre\n");
        text.push_str(&mesh_text(&fibre));
        text.push_str("*End Part\n");
    }

    text.push_str("*Material, name=Matrice\n*Elastic\n3500., 0.35\n");
    if with_fibre {
        text.push_str("*Material, name=Fibre\n*Elastic\n230000., 0.2\n");
    }
    text
}

/// Flat macro deck (no `*Part` delimiters).
pub fn macro_deck(extents: [f64; 3], divisions: [usize; 3], kind: ElementKind) -> String {
    let part = grid_part_at("MACRO", [0.0; 3], extents, divisions, kind);
    let mut text = String::from("*Heading\n** macro mesh\n");
    text.push_str(&mesh_text(&part));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_deck;

    #[test]
    fn test_generated_decks_parse_cleanly() {
        let text = cell_deck([5.5, 5.5, 6.69], [2, 2, 3], true);
        let (cell, report) = parse_deck(&text, "CELL").unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(cell.parts.len(), 2);
        assert_eq!(cell.parts[0].nodes.len(), 3 * 3 * 4);
        assert_eq!(cell.parts[1].elements.len(), 1);
        assert_eq!(cell.materials.len(), 2);

        let text = macro_deck([1.0, 1.0, 1.0], [3, 3, 2], ElementKind::Hex8Reduced);
        let (mesh, _) = parse_deck(&text, "MACRO").unwrap();
        assert_eq!(mesh.parts[0].name, "MACRO");
        assert_eq!(mesh.parts[0].elements.len(), 18);
    }
}
