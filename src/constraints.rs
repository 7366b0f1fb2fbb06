use std::sync::Arc;

use crate::{
    classifier::{BoundaryClassification, CornerLabel},
    datatypes::{Dof, Element, EntityRef, LinearConstraint, NodeId, Term},
    pairing::PeriodicFamily,
};

fn term(instance: &Arc<str>, node: NodeId, dof: Dof, coefficient: f64) -> Term {
    Term {
        entity: EntityRef {
            instance: Arc::clone(instance),
            node,
        },
        dof,
        coefficient,
    }
}

/// Ties each unit-cell corner to the macro displacement interpolated at the
/// quadrature point:
/// `u(corner) - sum(N_i * u(macro node i)) = 0`, one equation per corner
/// and dof, corners in V1..V8 order.
///
/// # Arguments
/// * `instance` - Name of the unit-cell instance placed at the point
/// * `classification` - Boundary sets of the instanced part
/// * `macro_instance` - Name of the macro part instance
/// * `element` - Macro element hosting the point
/// * `weights` - Shape-function values at the point
///
/// # Returns
/// 24 constraints of 9 terms each
pub fn coupling_equations(
    instance: &Arc<str>,
    classification: &BoundaryClassification,
    macro_instance: &Arc<str>,
    element: &Element,
    weights: &[f64; 8],
) -> Vec<LinearConstraint> {
    let mut equations = Vec::with_capacity(8 * Dof::ALL.len());

    for corner in CornerLabel::ALL {
        for dof in Dof::ALL {
            let mut terms = Vec::with_capacity(9);
            terms.push(term(instance, classification.corner(corner), dof, 1.0));
            for (node, weight) in element.nodes.iter().zip(weights) {
                terms.push(term(macro_instance, *node, dof, -weight));
            }
            equations.push(LinearConstraint::new(terms));
        }
    }

    equations
}

/// Periodicity of one unit-cell instance.
///
/// Every matched pair satisfies
/// `u(plus) - u(minus) - u(corner_plus) + u(corner_minus) = 0`. The four
/// corners not spanning an axis from V1 follow as affine combinations, e.g.
/// `V7 = V2 + V4 + V5 - 2 V1`.
pub fn periodicity_equations(
    instance: &Arc<str>,
    classification: &BoundaryClassification,
    families: &[PeriodicFamily],
) -> Vec<LinearConstraint> {
    let mut equations = Vec::new();

    for family in families {
        let corner_minus = classification.corner(family.corner_minus);
        let corner_plus = classification.corner(family.corner_plus);
        for pair in &family.outcome.pairs {
            for dof in Dof::ALL {
                equations.push(LinearConstraint::new(vec![
                    term(instance, pair.plus, dof, 1.0),
                    term(instance, pair.minus, dof, -1.0),
                    term(instance, corner_plus, dof, -1.0),
                    term(instance, corner_minus, dof, 1.0),
                ]));
            }
        }
    }

    let origin = classification.corner(CornerLabel::V1);
    for corner in CornerLabel::ALL {
        let axes = corner.max_axes();
        if axes.len() < 2 {
            continue;
        }
        for dof in Dof::ALL {
            let mut terms = Vec::with_capacity(axes.len() + 2);
            terms.push(term(instance, classification.corner(corner), dof, 1.0));
            for axis in &axes {
                let spanning = classification.corner(CornerLabel::offset_from_origin(&[*axis]));
                terms.push(term(instance, spanning, dof, -1.0));
            }
            terms.push(term(instance, origin, dof, axes.len() as f64 - 1.0));
            equations.push(LinearConstraint::new(terms));
        }
    }

    equations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::datatypes::{Axis, ElementKind, Part, Tolerance};
    use crate::fixtures;
    use crate::pairing::periodic_families;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    fn tol() -> Tolerance {
        Tolerance::new(1e-6).unwrap()
    }

    fn cell() -> (Part, BoundaryClassification, Vec<PeriodicFamily>) {
        let part = fixtures::grid_part("Matrice", [5.5, 5.5, 6.69], [3, 3, 4]);
        let c = classify(&part, tol()).unwrap();
        let families = periodic_families(&part, &c, tol());
        (part, c, families)
    }

    /// Homogeneous strain plus a fluctuation that is periodic over the cell.
    fn periodic_field<'a>(
        part: &'a Part,
        c: &BoundaryClassification,
    ) -> impl Fn(&EntityRef, Dof) -> f64 + 'a {
        let strain = Matrix3::new(0.01, 0.002, -0.003, 0.004, -0.02, 0.001, 0.0, 0.005, 0.03);
        let shift = Vector3::new(0.3, -0.1, 0.7);
        let origin = c.cell.min;
        let lengths = Vector3::new(
            c.cell.extent(Axis::X),
            c.cell.extent(Axis::Y),
            c.cell.extent(Axis::Z),
        );
        move |entity: &EntityRef, dof: Dof| {
            let x = part.nodes[&entity.node].position;
            let phase = |a: usize| std::f64::consts::TAU * (x[a] - origin[a]) / lengths[a];
            let fluctuation = 0.05 * phase(0).sin() * phase(1).cos() + 0.02 * phase(2).sin();
            (strain * x.coords + shift)[dof.axis().index()] + fluctuation
        }
    }

    #[test]
    fn test_coupling_counts_and_shape() {
        let (_, c, _) = cell();
        let element = crate::datatypes::Element {
            id: 4,
            nodes: [11, 12, 13, 14, 15, 16, 17, 18],
            kind: ElementKind::Hex8Reduced,
        };
        let instance: Arc<str> = Arc::from("Matrice-E4-GP1");
        let macro_instance: Arc<str> = Arc::from("MACRO-1");
        let weights = [0.125; 8];

        let equations = coupling_equations(&instance, &c, &macro_instance, &element, &weights);
        assert_eq!(equations.len(), 24);
        assert!(equations.iter().all(|e| e.terms().len() == 9));

        // V1..V8 outer, dof inner
        let first = &equations[0];
        assert_eq!(first.terms()[0].entity.node, c.corner(CornerLabel::V1));
        assert_eq!(first.terms()[0].dof, Dof::Ux);
        assert_eq!(equations[2].terms()[0].dof, Dof::Uz);
        assert_eq!(
            equations[3].terms()[0].entity.node,
            c.corner(CornerLabel::V2)
        );
        assert_eq!(&*first.terms()[1].entity.instance, "MACRO-1");
        assert_eq!(first.terms()[8].entity.node, 18);
        assert_relative_eq!(first.terms()[8].coefficient, -0.125);
    }

    #[test]
    fn test_coupling_closes_under_rigid_translation() {
        let (_, c, _) = cell();
        let element = crate::datatypes::Element {
            id: 1,
            nodes: [1, 2, 3, 4, 5, 6, 7, 8],
            kind: ElementKind::Hex8Full,
        };
        let weights = crate::quadrature::shape_functions(0.2, -0.7, 0.4);
        let equations = coupling_equations(
            &Arc::from("Matrice-E1-GP3"),
            &c,
            &Arc::from("MACRO-1"),
            &element,
            &weights,
        );

        let rigid = Vector3::new(1.5, -2.0, 0.25);
        for equation in &equations {
            let residual = equation.residual(|_, dof| rigid[dof.axis().index()]);
            assert_relative_eq!(residual, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_periodicity_closes_under_periodic_field() {
        let (part, c, families) = cell();
        let equations = periodicity_equations(&Arc::from("Matrice-E1-GP1"), &c, &families);

        let pairs: usize = families.iter().map(|f| f.outcome.pairs.len()).sum();
        assert!(pairs > 0);
        assert_eq!(equations.len(), 3 * pairs + 3 * 4);

        let field = periodic_field(&part, &c);
        for equation in &equations {
            assert_relative_eq!(equation.residual(&field), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_periodicity_rejects_non_periodic_field() {
        let (part, c, families) = cell();
        let equations = periodicity_equations(&Arc::from("Matrice-E1-GP1"), &c, &families);

        // quadratic in x breaks the face X relation
        let field = |entity: &EntityRef, dof: Dof| {
            let x = part.nodes[&entity.node].position;
            if dof == Dof::Ux {
                x.x * x.y
            } else {
                0.0
            }
        };
        assert!(equations.iter().any(|e| e.residual(field).abs() > 1e-3));
    }

    #[test]
    fn test_diagonal_corner_equations() {
        let (_, c, families) = cell();
        let equations = periodicity_equations(&Arc::from("Matrice-E1-GP1"), &c, &families);
        let tail = &equations[equations.len() - 12..];

        // V3, V6, V7, V8 in that order
        let leads: Vec<_> = tail
            .iter()
            .step_by(3)
            .map(|e| e.terms()[0].entity.node)
            .collect();
        use CornerLabel::*;
        assert_eq!(
            leads,
            vec![c.corner(V3), c.corner(V6), c.corner(V7), c.corner(V8)]
        );

        let v7 = &tail[6];
        assert_eq!(v7.terms().len(), 5);
        let origin_term = &v7.terms()[4];
        assert_eq!(origin_term.entity.node, c.corner(V1));
        assert_relative_eq!(origin_term.coefficient, 2.0);
    }

    #[test]
    fn test_coarse_cell_only_gets_corner_equations() {
        let part = fixtures::grid_part("Matrice", [1.0, 1.0, 1.0], [1, 1, 1]);
        let c = classify(&part, tol()).unwrap();
        let families = periodic_families(&part, &c, tol());
        let equations = periodicity_equations(&Arc::from("Matrice-E1-GP1"), &c, &families);
        assert_eq!(equations.len(), 12);
    }
}
