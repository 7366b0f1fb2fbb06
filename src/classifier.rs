use std::collections::BTreeMap;
use std::fmt::Display;

use nalgebra::Point3;
use tracing::{debug, warn};

use crate::{
    datatypes::{Axis, NodeId, Part, Tolerance},
    error::{CouplerError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Min,
    Max,
}

/// The eight cell corners, numbered like the hexahedron nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CornerLabel {
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
}

impl CornerLabel {
    pub const ALL: [CornerLabel; 8] = [
        CornerLabel::V1,
        CornerLabel::V2,
        CornerLabel::V3,
        CornerLabel::V4,
        CornerLabel::V5,
        CornerLabel::V6,
        CornerLabel::V7,
        CornerLabel::V8,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Bounding plane touched along each axis.
    pub fn sides(self) -> [Side; 3] {
        use Side::{Max, Min};
        match self {
            CornerLabel::V1 => [Min, Min, Min],
            CornerLabel::V2 => [Max, Min, Min],
            CornerLabel::V3 => [Max, Max, Min],
            CornerLabel::V4 => [Min, Max, Min],
            CornerLabel::V5 => [Min, Min, Max],
            CornerLabel::V6 => [Max, Min, Max],
            CornerLabel::V7 => [Max, Max, Max],
            CornerLabel::V8 => [Min, Max, Max],
        }
    }

    pub fn from_sides(sides: [Side; 3]) -> CornerLabel {
        // sides() is a bijection onto all 8 combinations
        CornerLabel::ALL
            .into_iter()
            .find(|c| c.sides() == sides)
            .unwrap_or(CornerLabel::V1)
    }

    /// Corner reached from V1 by moving to the max plane on `axes`.
    pub fn offset_from_origin(axes: &[Axis]) -> CornerLabel {
        let mut sides = [Side::Min; 3];
        for axis in axes {
            sides[axis.index()] = Side::Max;
        }
        CornerLabel::from_sides(sides)
    }

    /// Axes on which this corner sits on the max plane.
    pub fn max_axes(self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|a| self.sides()[a.index()] == Side::Max)
            .collect()
    }
}

impl Display for CornerLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{}", self.index() + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FaceLabel {
    pub normal: Axis,
    pub side: Side,
}

impl FaceLabel {
    pub const ALL: [FaceLabel; 6] = [
        FaceLabel::new(Axis::X, Side::Min),
        FaceLabel::new(Axis::X, Side::Max),
        FaceLabel::new(Axis::Y, Side::Min),
        FaceLabel::new(Axis::Y, Side::Max),
        FaceLabel::new(Axis::Z, Side::Min),
        FaceLabel::new(Axis::Z, Side::Max),
    ];

    pub const fn new(normal: Axis, side: Side) -> FaceLabel {
        FaceLabel { normal, side }
    }
}

impl Display for FaceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match self.side {
            Side::Min => 'N',
            Side::Max => 'P',
        };
        write!(f, "FACE_{}{}", self.normal, suffix)
    }
}

/// An edge runs along `direction`; `sides` gives the plane touched on each
/// of `direction.others()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeLabel {
    pub direction: Axis,
    pub sides: [Side; 2],
}

impl EdgeLabel {
    pub const fn new(direction: Axis, a: Side, b: Side) -> EdgeLabel {
        EdgeLabel {
            direction,
            sides: [a, b],
        }
    }

    pub fn all() -> Vec<EdgeLabel> {
        use Side::{Max, Min};
        let mut labels = Vec::with_capacity(12);
        for direction in Axis::ALL {
            for (a, b) in [(Min, Min), (Max, Min), (Min, Max), (Max, Max)] {
                labels.push(EdgeLabel::new(direction, a, b));
            }
        }
        labels
    }

    /// Axes (besides the edge direction) on which the edge sits on the max plane.
    pub fn max_axes(self) -> Vec<Axis> {
        self.direction
            .others()
            .into_iter()
            .zip(self.sides)
            .filter(|(_, side)| *side == Side::Max)
            .map(|(axis, _)| axis)
            .collect()
    }
}

impl Display for EdgeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b] = self.direction.others();
        let level = |s: Side| if s == Side::Min { 0 } else { 1 };
        write!(
            f,
            "EDGE_{}_{}{}_{}{}",
            self.direction,
            a,
            level(self.sides[0]),
            b,
            level(self.sides[1])
        )
    }
}

/// Axis-aligned bounding box of a unit cell, measured from its nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl CellBox {
    /// Measures the node cloud of a part. Fails when the cell is flat along
    /// an axis, i.e. its two bounding planes are closer than twice the
    /// tolerance and would overlap.
    pub fn measure(part: &Part, tolerance: Tolerance) -> Result<CellBox> {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);

        for node in part.nodes.values() {
            for c in 0..3 {
                min[c] = min[c].min(node.position[c]);
                max[c] = max[c].max(node.position[c]);
            }
        }

        let cell = CellBox { min, max };
        for axis in Axis::ALL {
            let extent = cell.extent(axis);
            if !(extent > 2.0 * tolerance.value()) {
                return Err(CouplerError::DegenerateUnitCell {
                    part: part.name.clone(),
                    axis,
                    extent: if extent.is_finite() { extent } else { 0.0 },
                });
            }
        }

        Ok(cell)
    }

    pub fn extent(&self, axis: Axis) -> f64 {
        self.max[axis.index()] - self.min[axis.index()]
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn plane(&self, axis: Axis, side: Side) -> f64 {
        match side {
            Side::Min => self.min[axis.index()],
            Side::Max => self.max[axis.index()],
        }
    }

    pub fn corner_point(&self, label: CornerLabel) -> Point3<f64> {
        let [x, y, z] = Axis::ALL.map(|axis| self.plane(axis, label.sides()[axis.index()]));
        Point3::new(x, y, z)
    }
}

/// Boundary node sets of one part. Computed once per part and shared by
/// every instance of it.
#[derive(Debug, Clone)]
pub struct BoundaryClassification {
    pub cell: CellBox,
    /// Indexed by [`CornerLabel::index`].
    pub corners: [NodeId; 8],
    pub edges: BTreeMap<EdgeLabel, Vec<NodeId>>,
    pub faces: BTreeMap<FaceLabel, Vec<NodeId>>,
    pub interior: usize,
}

impl BoundaryClassification {
    pub fn corner(&self, label: CornerLabel) -> NodeId {
        self.corners[label.index()]
    }

    pub fn edge(&self, label: EdgeLabel) -> &[NodeId] {
        self.edges.get(&label).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn face(&self, label: FaceLabel) -> &[NodeId] {
        self.faces.get(&label).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Labels every node of a part as corner, edge, face or interior by
/// counting the bounding planes it lies on.
///
/// # Arguments
/// * `part` - The unit-cell part
/// * `tolerance` - Coordinate matching tolerance
///
/// # Returns
/// The classification, or an error when the cell is degenerate or any of
/// the 8 corners is missing
pub fn classify(part: &Part, tolerance: Tolerance) -> Result<BoundaryClassification> {
    let cell = CellBox::measure(part, tolerance)?;

    let mut corners: [Option<(NodeId, f64)>; 8] = [None; 8];
    let mut edges: BTreeMap<EdgeLabel, Vec<NodeId>> = EdgeLabel::all()
        .into_iter()
        .map(|l| (l, Vec::new()))
        .collect();
    let mut faces: BTreeMap<FaceLabel, Vec<NodeId>> = FaceLabel::ALL
        .into_iter()
        .map(|l| (l, Vec::new()))
        .collect();
    let mut interior = 0;

    // ascending node id, so every set comes out sorted
    for node in part.nodes.values() {
        let mut touched: [Option<Side>; 3] = [None; 3];
        for axis in Axis::ALL {
            let value = node.coord(axis);
            if tolerance.matches(value, cell.plane(axis, Side::Min)) {
                touched[axis.index()] = Some(Side::Min);
            } else if tolerance.matches(value, cell.plane(axis, Side::Max)) {
                touched[axis.index()] = Some(Side::Max);
            }
        }

        match touched.iter().filter(|t| t.is_some()).count() {
            3 => {
                let sides = [
                    touched[0].unwrap_or(Side::Min),
                    touched[1].unwrap_or(Side::Min),
                    touched[2].unwrap_or(Side::Min),
                ];
                let label = CornerLabel::from_sides(sides);
                let distance = (node.position - cell.corner_point(label)).norm();
                // nearest wins; ties keep the lower id
                match corners[label.index()] {
                    None => corners[label.index()] = Some((node.id, distance)),
                    Some((kept, kept_distance)) if kept_distance <= distance => warn!(
                        "part {}: node {} also matches corner {label}, keeping node {kept}",
                        part.name, node.id
                    ),
                    Some((dropped, _)) => {
                        warn!(
                            "part {}: node {dropped} also matches corner {label}, keeping node {}",
                            part.name, node.id
                        );
                        corners[label.index()] = Some((node.id, distance));
                    }
                }
            }
            2 => {
                let direction = Axis::ALL
                    .into_iter()
                    .find(|a| touched[a.index()].is_none())
                    .unwrap_or(Axis::X);
                let [a, b] = direction.others();
                let label = EdgeLabel::new(
                    direction,
                    touched[a.index()].unwrap_or(Side::Min),
                    touched[b.index()].unwrap_or(Side::Min),
                );
                edges.entry(label).or_default().push(node.id);
            }
            1 => {
                let (axis, side) = Axis::ALL
                    .into_iter()
                    .find_map(|a| touched[a.index()].map(|s| (a, s)))
                    .unwrap_or((Axis::X, Side::Min));
                faces
                    .entry(FaceLabel::new(axis, side))
                    .or_default()
                    .push(node.id);
            }
            _ => interior += 1,
        }
    }

    let missing: Vec<String> = CornerLabel::ALL
        .into_iter()
        .filter(|c| corners[c.index()].is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CouplerError::IncompleteGeometry {
            part: part.name.clone(),
            found: 8 - missing.len(),
            missing: missing.join(", "),
        });
    }

    let mut found = [0; 8];
    for (slot, corner) in found.iter_mut().zip(corners) {
        *slot = corner.map(|(id, _)| id).unwrap_or_default();
    }

    debug!(
        "part {}: {} edge nodes, {} face nodes, {} interior nodes",
        part.name,
        edges.values().map(|v| v.len()).sum::<usize>(),
        faces.values().map(|v| v.len()).sum::<usize>(),
        interior
    );

    Ok(BoundaryClassification {
        cell,
        corners: found,
        edges,
        faces,
        interior,
    })
}
