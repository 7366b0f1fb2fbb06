//! Integration-point placement inside macro hexahedra.
//!
//! Node numbering follows the corner convention shared by macro elements
//! and unit cells:
//! ```text
//!        8-------7
//!       /|      /|
//!      / |     / |
//!     5-------6  |
//!     |  4----|--3
//!     | /     | /
//!     |/      |/
//!     1-------2
//!
//! Node 1: (-1, -1, -1)    Node 5: (-1, -1, +1)
//! Node 2: (+1, -1, -1)    Node 6: (+1, -1, +1)
//! Node 3: (+1, +1, -1)    Node 7: (+1, +1, +1)
//! Node 4: (-1, +1, -1)    Node 8: (-1, +1, +1)
//! ```

use nalgebra::{Matrix3, Point3, Vector3};
use tracing::debug;

use crate::{
    datatypes::{Element, ElementId, ElementKind, Part},
    error::{CouplerError, Result},
};

/// Natural coordinates of each node. Node i sits at (XI[i], ETA[i], ZETA[i]).
pub const XI: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
pub const ETA: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
pub const ZETA: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

/// Trilinear shape functions `N_i = (1 + ξ_i ξ)(1 + η_i η)(1 + ζ_i ζ) / 8`.
pub fn shape_functions(xi: f64, eta: f64, zeta: f64) -> [f64; 8] {
    let mut n = [0.0; 8];
    for i in 0..8 {
        n[i] = 0.125 * (1.0 + XI[i] * xi) * (1.0 + ETA[i] * eta) * (1.0 + ZETA[i] * zeta);
    }
    n
}

/// Shape function derivatives with respect to (ξ, η, ζ).
fn shape_derivatives(xi: f64, eta: f64, zeta: f64) -> ([f64; 8], [f64; 8], [f64; 8]) {
    let mut dn_dxi = [0.0; 8];
    let mut dn_deta = [0.0; 8];
    let mut dn_dzeta = [0.0; 8];

    for i in 0..8 {
        dn_dxi[i] = 0.125 * XI[i] * (1.0 + ETA[i] * eta) * (1.0 + ZETA[i] * zeta);
        dn_deta[i] = 0.125 * (1.0 + XI[i] * xi) * ETA[i] * (1.0 + ZETA[i] * zeta);
        dn_dzeta[i] = 0.125 * (1.0 + XI[i] * xi) * (1.0 + ETA[i] * eta) * ZETA[i];
    }

    (dn_dxi, dn_deta, dn_dzeta)
}

/// Jacobian `J[r][c] = ∂x_c / ∂(ξ, η, ζ)_r`.
fn jacobian(coords: &[Point3<f64>; 8], xi: f64, eta: f64, zeta: f64) -> Matrix3<f64> {
    let (dn_dxi, dn_deta, dn_dzeta) = shape_derivatives(xi, eta, zeta);
    let mut j = Matrix3::zeros();

    for i in 0..8 {
        for c in 0..3 {
            j[(0, c)] += dn_dxi[i] * coords[i][c];
            j[(1, c)] += dn_deta[i] * coords[i][c];
            j[(2, c)] += dn_dzeta[i] * coords[i][c];
        }
    }

    j
}

/// Physical position `Σ N_k x_k`.
pub fn physical_position(coords: &[Point3<f64>; 8], weights: &[f64; 8]) -> Point3<f64> {
    let mut position = Vector3::zeros();
    for (node, w) in coords.iter().zip(weights) {
        position += node.coords * *w;
    }
    Point3::from(position)
}

/// An integration point in natural coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    pub xi: f64,
    pub eta: f64,
    pub zeta: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadratureRule {
    /// Single point at the element centre.
    Reduced,
    /// 2×2×2 Gauss points, ordered like the element nodes.
    Full,
}

impl QuadratureRule {
    pub fn for_kind(kind: ElementKind) -> QuadratureRule {
        match kind {
            ElementKind::Hex8Reduced => QuadratureRule::Reduced,
            ElementKind::Hex8Full => QuadratureRule::Full,
        }
    }

    pub fn points(self) -> Vec<GaussPoint> {
        match self {
            QuadratureRule::Reduced => vec![GaussPoint {
                xi: 0.0,
                eta: 0.0,
                zeta: 0.0,
                weight: 8.0,
            }],
            QuadratureRule::Full => {
                let g = 1.0 / 3.0_f64.sqrt();
                (0..8)
                    .map(|i| GaussPoint {
                        xi: XI[i] * g,
                        eta: ETA[i] * g,
                        zeta: ZETA[i] * g,
                        weight: 1.0,
                    })
                    .collect()
            }
        }
    }

    pub fn len(self) -> usize {
        match self {
            QuadratureRule::Reduced => 1,
            QuadratureRule::Full => 8,
        }
    }
}

/// Run parameter choosing the rule; `Auto` follows each element's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadratureChoice {
    #[default]
    Auto,
    Fixed(QuadratureRule),
}

impl QuadratureChoice {
    pub fn parse(value: &str) -> Option<QuadratureChoice> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(QuadratureChoice::Auto),
            "reduced" | "1" => Some(QuadratureChoice::Fixed(QuadratureRule::Reduced)),
            "full" | "8" => Some(QuadratureChoice::Fixed(QuadratureRule::Full)),
            _ => None,
        }
    }

    pub fn rule_for(self, kind: ElementKind) -> QuadratureRule {
        match self {
            QuadratureChoice::Auto => QuadratureRule::for_kind(kind),
            QuadratureChoice::Fixed(rule) => rule,
        }
    }
}

/// Where one unit-cell copy goes.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub element: ElementId,
    pub point_index: usize,
    pub point: GaussPoint,
    /// Shape function values at the point, one per element node.
    pub weights: [f64; 8],
    pub position: Point3<f64>,
    /// Offset that centres the unit cell on `position`.
    pub translation: Vector3<f64>,
}

/// Collects the 8 nodal coordinates of an element in connectivity order.
pub fn element_coordinates(part: &Part, element: &Element) -> Result<[Point3<f64>; 8]> {
    let mut coords = [Point3::origin(); 8];
    for (i, node_id) in element.nodes.iter().enumerate() {
        match part.nodes.get(node_id) {
            Some(node) => coords[i] = node.position,
            None => {
                return Err(CouplerError::MissingNode {
                    part: part.name.clone(),
                    element: element.id,
                    node: *node_id,
                })
            }
        }
    }
    Ok(coords)
}

/// Checks that an element's node order matches the corner convention: the
/// centre Jacobian must be invertible with a positive determinant, and
/// every node must map back into the octant its index assigns it.
pub fn check_corner_convention(element: ElementId, coords: &[Point3<f64>; 8]) -> Result<()> {
    let j = jacobian(coords, 0.0, 0.0, 0.0);
    let det = j.determinant();
    if !(det > 0.0) {
        return Err(CouplerError::InvalidCornerOrdering {
            element,
            reason: format!("non-positive Jacobian determinant {det:e} at the centre"),
        });
    }

    let to_natural = match j.transpose().try_inverse() {
        Some(inv) => inv,
        None => {
            return Err(CouplerError::InvalidCornerOrdering {
                element,
                reason: "Jacobian at the element centre is singular".to_owned(),
            })
        }
    };

    let centre = physical_position(coords, &shape_functions(0.0, 0.0, 0.0));
    for k in 0..8 {
        let natural = to_natural * (coords[k] - centre);
        let expected = [XI[k], ETA[k], ZETA[k]];
        if (0..3).any(|c| natural[c] * expected[c] <= 0.0) {
            return Err(CouplerError::InvalidCornerOrdering {
                element,
                reason: format!(
                    "node {} lies at natural ({:.3}, {:.3}, {:.3}), expected octant ({}, {}, {})",
                    k + 1,
                    natural[0],
                    natural[1],
                    natural[2],
                    expected[0],
                    expected[1],
                    expected[2]
                ),
            });
        }
    }

    Ok(())
}

/// Computes every unit-cell placement for a macro part.
///
/// # Arguments
/// * `macro_part` - The macro mesh
/// * `choice` - Quadrature rule selection
/// * `cell_center` - Geometric centre of the unit cell in its own frame
///
/// # Returns
/// Placements ordered by ascending element id, then point index
pub fn place_unit_cells(
    macro_part: &Part,
    choice: QuadratureChoice,
    cell_center: &Point3<f64>,
) -> Result<Vec<Placement>> {
    let mut placements = Vec::new();

    for element in macro_part.elements.values() {
        let coords = element_coordinates(macro_part, element)?;
        check_corner_convention(element.id, &coords)?;

        let rule = choice.rule_for(element.kind);
        placements.reserve(rule.len());
        for (point_index, point) in rule.points().into_iter().enumerate() {
            let weights = shape_functions(point.xi, point.eta, point.zeta);
            let position = physical_position(&coords, &weights);

            placements.push(Placement {
                element: element.id,
                point_index,
                point,
                weights,
                position,
                translation: position - cell_center,
            });
        }
    }

    debug!(
        "placed {} unit cells in {} macro elements",
        placements.len(),
        macro_part.elements.len()
    );

    Ok(placements)
}
