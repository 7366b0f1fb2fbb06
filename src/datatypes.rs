use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use nalgebra::{Point3, Vector3};

use crate::error::{CouplerError, Result};

pub type NodeId = u32;
pub type ElementId = u32;

/// Index of a part inside its [`Deck`]. Node and element ids are only
/// unique inside a part, so every lookup goes through the owning part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The two remaining axes, in ascending order.
    pub fn others(self) -> [Axis; 2] {
        match self {
            Axis::X => [Axis::Y, Axis::Z],
            Axis::Y => [Axis::X, Axis::Z],
            Axis::Z => [Axis::X, Axis::Y],
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Coordinate matching tolerance, threaded explicitly through every
/// geometric comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance(f64);

impl Tolerance {
    pub fn new(value: f64) -> Result<Tolerance> {
        if !value.is_finite() || value <= 0.0 {
            return Err(CouplerError::Input(format!(
                "Tolerance must be a positive finite number, got {value}"
            )));
        }
        Ok(Tolerance(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn matches(self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance(0.01)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Point3<f64>,
}

impl Node {
    pub fn new(id: NodeId, x: f64, y: f64, z: f64) -> Node {
        Node {
            id,
            position: Point3::new(x, y, z),
        }
    }

    pub fn coord(&self, axis: Axis) -> f64 {
        self.position[axis.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Hex8Full,
    Hex8Reduced,
}

impl ElementKind {
    /// Resolves the `type=` parameter of an element block.
    pub fn from_keyword(value: &str) -> Option<ElementKind> {
        match value.trim().to_ascii_uppercase().as_str() {
            "C3D8" => Some(ElementKind::Hex8Full),
            "C3D8R" => Some(ElementKind::Hex8Reduced),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ElementKind::Hex8Full => "C3D8",
            ElementKind::Hex8Reduced => "C3D8R",
        }
    }
}

/// An 8-node hexahedron. Node order follows the corner convention and is
/// never rearranged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub nodes: [NodeId; 8],
    pub kind: ElementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub nodes: BTreeMap<NodeId, Node>,
    pub elements: BTreeMap<ElementId, Element>,
    /// Material named by the part's `*Solid Section`, if any.
    pub section_material: Option<String>,
}

impl Part {
    pub fn new(id: PartId, name: &str) -> Part {
        Part {
            id,
            name: name.to_owned(),
            nodes: BTreeMap::new(),
            elements: BTreeMap::new(),
            section_material: None,
        }
    }
}

/// Everything parsed out of one input file.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    /// Parts in declaration order; `PartId(i)` is `parts[i]`.
    pub parts: Vec<Part>,
    pub materials: Vec<Material>,
}

impl Deck {
    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id.0)
    }

    pub fn part_by_name(&self, name: &str) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn material_by_name(&self, name: &str) -> Option<&Material> {
        self.materials
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// A placed copy of a part. The name encodes the macro element and
/// quadrature point it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: Arc<str>,
    pub part: PartId,
    pub translation: Vector3<f64>,
}

/// Builds the collision-free instance name for one `(element, point)` pair.
/// Points are written 1-based.
pub fn instance_name(part_name: &str, element: ElementId, point_index: usize) -> String {
    format!("{part_name}-E{element}-GP{}", point_index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dof {
    Ux,
    Uy,
    Uz,
}

impl Dof {
    pub const ALL: [Dof; 3] = [Dof::Ux, Dof::Uy, Dof::Uz];

    pub fn number(self) -> u8 {
        match self {
            Dof::Ux => 1,
            Dof::Uy => 2,
            Dof::Uz => 3,
        }
    }

    #[cfg(test)]
    pub fn axis(self) -> Axis {
        match self {
            Dof::Ux => Axis::X,
            Dof::Uy => Axis::Y,
            Dof::Uz => Axis::Z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub instance: Arc<str>,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub entity: EntityRef,
    pub dof: Dof,
    pub coefficient: f64,
}

/// Homogeneous linear relation `sum(c_i * u_i) = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    terms: Vec<Term>,
}

impl LinearConstraint {
    pub fn new(terms: Vec<Term>) -> LinearConstraint {
        debug_assert!(terms.len() >= 2, "a constraint needs at least two terms");
        LinearConstraint { terms }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Left-hand side of the relation for a given displacement field.
    #[cfg(test)]
    pub fn residual<F>(&self, displacement: F) -> f64
    where
        F: Fn(&EntityRef, Dof) -> f64,
    {
        self.terms
            .iter()
            .map(|t| t.coefficient * displacement(&t.entity, t.dof))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_rejects_non_positive() {
        assert!(Tolerance::new(0.0).is_err());
        assert!(Tolerance::new(-1e-3).is_err());
        assert!(Tolerance::new(f64::NAN).is_err());
        assert!(Tolerance::new(1e-6).is_ok());
    }

    #[test]
    fn test_tolerance_is_strict() {
        let tol = Tolerance::new(0.01).unwrap();
        assert!(tol.matches(1.0, 1.009));
        assert!(!tol.matches(1.0, 1.02));
    }

    #[test]
    fn test_node_ids_are_scoped_per_part() {
        let mut deck = Deck::default();
        let mut a = Part::new(PartId(0), "Matrice");
        a.nodes.insert(1, Node::new(1, 0.0, 0.0, 0.0));
        let mut b = Part::new(PartId(1), "Fibre");
        b.nodes.insert(1, Node::new(1, 2.0, 0.0, 0.0));
        deck.parts.push(a);
        deck.parts.push(b);

        assert_eq!(deck.part(PartId(0)).unwrap().nodes[&1].position.x, 0.0);
        assert_eq!(deck.part(PartId(1)).unwrap().nodes[&1].position.x, 2.0);
        assert_eq!(deck.part_by_name("fibre").unwrap().id, PartId(1));
        assert!(deck.material_by_name("Fibre").is_none());
    }

    #[test]
    fn test_instance_names_encode_element_and_point() {
        assert_eq!(instance_name("Matrice", 12, 0), "Matrice-E12-GP1");
        // E1-GP11 and E11-GP1 must not collide
        let eleventh_point = instance_name("Matrice", 1, 10);
        let eleventh_element = instance_name("Matrice", 11, 0);
        assert_ne!(eleventh_point, eleventh_element);
    }

    #[test]
    fn test_element_kind_keywords() {
        use ElementKind::*;
        assert_eq!(ElementKind::from_keyword("c3d8r"), Some(Hex8Reduced));
        assert_eq!(ElementKind::from_keyword(" C3D8 "), Some(Hex8Full));
        assert_eq!(ElementKind::from_keyword("C3D4"), None);
    }
}
