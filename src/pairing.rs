use tracing::{debug, warn};

use crate::{
    classifier::{BoundaryClassification, CornerLabel, EdgeLabel, FaceLabel, Side},
    datatypes::{Axis, NodeId, Part, Tolerance},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePair {
    pub minus: NodeId,
    pub plus: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingOutcome {
    pub pairs: Vec<NodePair>,
    /// Minus-side nodes with no counterpart on the plus side.
    pub unmatched: Vec<NodeId>,
}

/// Matches nodes of two opposite boundary sets by the coordinates listed in
/// `compared`. Both sides are scanned in ascending id order and the first
/// plus node within tolerance wins; a plus node may serve several minus
/// nodes.
///
/// # Arguments
/// * `part` - Part owning both node sets
/// * `minus` - Nodes on the reference side
/// * `plus` - Nodes on the opposite side
/// * `compared` - Axes whose coordinates must agree
/// * `tolerance` - Coordinate matching tolerance
pub fn pair_nodes(
    part: &Part,
    minus: &[NodeId],
    plus: &[NodeId],
    compared: &[Axis],
    tolerance: Tolerance,
) -> PairingOutcome {
    let mut minus = minus.to_vec();
    minus.sort_unstable();
    let mut plus: Vec<_> = plus.iter().filter_map(|id| part.nodes.get(id)).collect();
    plus.sort_unstable_by_key(|n| n.id);

    let mut outcome = PairingOutcome::default();
    for id in minus {
        let Some(node) = part.nodes.get(&id) else {
            outcome.unmatched.push(id);
            continue;
        };

        let partner = plus.iter().find(|candidate| {
            compared
                .iter()
                .all(|&axis| tolerance.matches(node.coord(axis), candidate.coord(axis)))
        });

        match partner {
            Some(p) => outcome.pairs.push(NodePair {
                minus: id,
                plus: p.id,
            }),
            None => outcome.unmatched.push(id),
        }
    }

    outcome
}

/// Pairs the two faces normal to `normal` on their in-plane coordinates.
pub fn pair_faces(
    part: &Part,
    classification: &BoundaryClassification,
    normal: Axis,
    tolerance: Tolerance,
) -> PairingOutcome {
    pair_nodes(
        part,
        classification.face(FaceLabel::new(normal, Side::Min)),
        classification.face(FaceLabel::new(normal, Side::Max)),
        &normal.others(),
        tolerance,
    )
}

/// Pairs two parallel edges on their coordinate along the edge direction.
pub fn pair_edges(
    part: &Part,
    classification: &BoundaryClassification,
    reference: EdgeLabel,
    partner: EdgeLabel,
    tolerance: Tolerance,
) -> PairingOutcome {
    debug_assert_eq!(reference.direction, partner.direction);
    pair_nodes(
        part,
        classification.edge(reference),
        classification.edge(partner),
        &[reference.direction],
        tolerance,
    )
}

/// One group of periodic pairs together with the two corners whose
/// displacement difference every pair in the group must reproduce.
#[derive(Debug, Clone)]
pub struct PeriodicFamily {
    pub name: String,
    pub corner_minus: CornerLabel,
    pub corner_plus: CornerLabel,
    pub outcome: PairingOutcome,
}

/// Builds every periodic family of a unit cell: the three face pairs, then
/// for each edge direction the reference edge against its three parallel
/// partners.
///
/// Computed once per part; every instance reuses the result.
pub fn periodic_families(
    part: &Part,
    classification: &BoundaryClassification,
    tolerance: Tolerance,
) -> Vec<PeriodicFamily> {
    let mut families = Vec::with_capacity(12);

    for normal in Axis::ALL {
        families.push(PeriodicFamily {
            name: format!(
                "{}-{}",
                FaceLabel::new(normal, Side::Min),
                FaceLabel::new(normal, Side::Max)
            ),
            corner_minus: CornerLabel::V1,
            corner_plus: CornerLabel::offset_from_origin(&[normal]),
            outcome: pair_faces(part, classification, normal, tolerance),
        });
    }

    for direction in Axis::ALL {
        let reference = EdgeLabel::new(direction, Side::Min, Side::Min);
        for (a, b) in [
            (Side::Max, Side::Min),
            (Side::Min, Side::Max),
            (Side::Max, Side::Max),
        ] {
            let partner = EdgeLabel::new(direction, a, b);
            families.push(PeriodicFamily {
                name: format!("{reference}-{partner}"),
                corner_minus: CornerLabel::V1,
                corner_plus: CornerLabel::offset_from_origin(&partner.max_axes()),
                outcome: pair_edges(part, classification, reference, partner, tolerance),
            });
        }
    }

    for family in &families {
        if !family.outcome.unmatched.is_empty() {
            warn!(
                "part {}: {} unmatched node(s) in {}: {:?}",
                part.name,
                family.outcome.unmatched.len(),
                family.name,
                family.outcome.unmatched
            );
        }
        debug!(
            "part {}: {} matched {} pair(s)",
            part.name,
            family.name,
            family.outcome.pairs.len()
        );
    }

    families
}
