use tracing::{debug, info, warn};

use crate::{
    datatypes::{Deck, Element, ElementId, ElementKind, Material, Node, NodeId, Part, PartId},
    error::{CouplerError, MalformedRecord, Result},
};

/// Parser mode between keyword lines.
#[derive(Debug, Clone, PartialEq)]
pub enum DeckParseState {
    ExpectNone,
    InNodeBlock,
    InElementBlock(ElementKind),
    InMaterialBlock(String),
}

/// A recognised keyword line.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyword {
    Part(String),
    EndPart,
    Assembly,
    EndAssembly,
    Node,
    Element(ElementKind),
    Material(String),
    Elastic,
    SolidSection(Option<String>),
    Other(String),
}

impl DeckParseState {
    /// Transition table. `material` is the material opened by the last
    /// `*Material` line, if it is still in scope.
    pub fn transition(&self, keyword: &Keyword, material: Option<&str>) -> DeckParseState {
        match (keyword, material) {
            (Keyword::Node, _) => DeckParseState::InNodeBlock,
            (Keyword::Element(kind), _) => DeckParseState::InElementBlock(*kind),
            (Keyword::Elastic, Some(name)) => DeckParseState::InMaterialBlock(name.to_owned()),
            (Keyword::Elastic, None) => DeckParseState::ExpectNone,
            (Keyword::Part(_), _)
            | (Keyword::EndPart, _)
            | (Keyword::Assembly, _)
            | (Keyword::EndAssembly, _)
            | (Keyword::Material(_), _)
            | (Keyword::SolidSection(_), _)
            | (Keyword::Other(_), _) => DeckParseState::ExpectNone,
        }
    }
}

/// Records skipped while parsing one deck.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub skipped: Vec<MalformedRecord>,
}

fn is_keyword_line(line: &str) -> bool {
    line.starts_with('*') && !line.starts_with("**")
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with("**")
}

/// Looks up a `key=value` parameter on a keyword line.
fn keyword_parameter<'a>(fields: &[&'a str], key: &str) -> Option<&'a str> {
    fields.iter().skip(1).find_map(|field| {
        let (k, v) = field.split_once('=')?;
        if k.trim().eq_ignore_ascii_case(key) {
            Some(v.trim())
        } else {
            None
        }
    })
}

/// Parses a keyword line (leading `*` included).
pub fn parse_keyword(line: &str, line_no: usize) -> Result<Keyword> {
    let fields: Vec<&str> = line[1..].split(',').map(|f| f.trim()).collect();
    let name = fields[0].to_ascii_uppercase();
    let name = name.split_whitespace().collect::<Vec<&str>>().join(" ");

    let required = |key: &str| -> Result<String> {
        match keyword_parameter(&fields, key) {
            Some(v) if !v.is_empty() => Ok(v.to_owned()),
            _ => Err(CouplerError::MalformedDeck {
                line: line_no,
                reason: format!("*{} is missing its {key}= parameter", fields[0]),
            }),
        }
    };

    let keyword = match name.as_str() {
        "PART" => Keyword::Part(required("name")?),
        "END PART" => Keyword::EndPart,
        "ASSEMBLY" => Keyword::Assembly,
        "END ASSEMBLY" => Keyword::EndAssembly,
        "NODE" => Keyword::Node,
        "ELEMENT" => {
            let kind_name = required("type")?;
            match ElementKind::from_keyword(&kind_name) {
                Some(kind) => Keyword::Element(kind),
                None => {
                    return Err(CouplerError::MalformedDeck {
                        line: line_no,
                        reason: format!(
                            "unsupported element type {kind_name}; only C3D8 and C3D8R are supported"
                        ),
                    })
                }
            }
        }
        "MATERIAL" => Keyword::Material(required("name")?),
        "ELASTIC" => Keyword::Elastic,
        "SOLID SECTION" => {
            Keyword::SolidSection(keyword_parameter(&fields, "material").map(str::to_owned))
        }
        _ => Keyword::Other(name),
    };

    Ok(keyword)
}

/// Splits a data line into trimmed, non-empty fields. Trailing commas and
/// trailing whitespace are tolerated.
fn record_fields(line: &str) -> Vec<&str> {
    line.split(',')
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect()
}

fn parse_node_record(line: &str) -> std::result::Result<Node, String> {
    let fields = record_fields(line);
    if fields.len() < 3 {
        return Err(format!(
            "node record needs an id and at least 2 coordinates, found {} fields",
            fields.len()
        ));
    }

    let id: NodeId = fields[0]
        .parse()
        .map_err(|_| format!("non-integer node id '{}'", fields[0]))?;

    let mut coords = [0.0_f64; 3];
    for (i, raw) in fields[1..].iter().take(3).enumerate() {
        coords[i] = raw
            .parse()
            .map_err(|_| format!("non-float coordinate '{raw}' on node {id}"))?;
    }

    Ok(Node::new(id, coords[0], coords[1], coords[2]))
}

fn parse_element_record(line: &str, kind: ElementKind) -> std::result::Result<Element, String> {
    let fields = record_fields(line);
    if fields.len() != 9 {
        return Err(format!(
            "hexahedron record needs an id and 8 node ids, found {} fields",
            fields.len()
        ));
    }

    let id: ElementId = fields[0]
        .parse()
        .map_err(|_| format!("non-integer element id '{}'", fields[0]))?;

    let mut nodes: [NodeId; 8] = [0; 8];
    for (i, raw) in fields[1..].iter().enumerate() {
        nodes[i] = raw
            .parse()
            .map_err(|_| format!("non-integer node id '{raw}' in element {id}"))?;
    }

    Ok(Element { id, nodes, kind })
}

fn parse_elastic_record(line: &str, name: &str) -> std::result::Result<Material, String> {
    let fields = record_fields(line);
    if fields.len() < 2 {
        return Err(format!(
            "elastic record for material {name} needs E and nu, found {} fields",
            fields.len()
        ));
    }

    let (e, nu) = (fields[0], fields[1]);
    let youngs_modulus: f64 = e
        .parse()
        .map_err(|_| format!("non-float modulus '{e}' in material {name}"))?;
    let poisson_ratio: f64 = nu
        .parse()
        .map_err(|_| format!("non-float ratio '{nu}' in material {name}"))?;

    Ok(Material {
        name: name.to_owned(),
        youngs_modulus,
        poisson_ratio,
    })
}

struct DeckParser<'a> {
    deck: Deck,
    report: ParseReport,
    state: DeckParseState,
    current_part: Option<PartId>,
    implicit_part: Option<PartId>,
    open_material: Option<String>,
    in_assembly: bool,
    default_part: &'a str,
}

impl<'a> DeckParser<'a> {
    fn new(default_part: &'a str) -> DeckParser<'a> {
        DeckParser {
            deck: Deck::default(),
            report: ParseReport::default(),
            state: DeckParseState::ExpectNone,
            current_part: None,
            implicit_part: None,
            open_material: None,
            in_assembly: false,
            default_part,
        }
    }

    fn open_part(&mut self, name: &str, line_no: usize) -> Result<PartId> {
        if self.deck.part_by_name(name).is_some() {
            return Err(CouplerError::MalformedDeck {
                line: line_no,
                reason: format!("part {name} is defined more than once"),
            });
        }
        let id = PartId(self.deck.parts.len());
        self.deck.parts.push(Part::new(id, name));
        Ok(id)
    }

    /// Part receiving data records: the open `*Part`, or the implicit part
    /// for flat decks.
    fn target_part(&mut self, line_no: usize) -> Result<PartId> {
        if let Some(id) = self.current_part {
            return Ok(id);
        }
        if let Some(id) = self.implicit_part {
            return Ok(id);
        }
        let name = self.default_part.to_owned();
        let id = self.open_part(&name, line_no)?;
        self.implicit_part = Some(id);
        Ok(id)
    }

    fn skip(&mut self, line_no: usize, reason: String) {
        warn!("skipping record at line {line_no}: {reason}");
        self.report.skipped.push(MalformedRecord {
            line: line_no,
            reason,
        });
    }

    fn handle_keyword(&mut self, line: &str, line_no: usize) -> Result<()> {
        let keyword = parse_keyword(line, line_no)?;

        match &keyword {
            Keyword::Part(name) => {
                self.current_part = Some(self.open_part(name, line_no)?);
                self.open_material = None;
            }
            Keyword::EndPart => {
                self.current_part = None;
                self.open_material = None;
            }
            Keyword::Assembly => self.in_assembly = true,
            Keyword::EndAssembly => self.in_assembly = false,
            Keyword::Material(name) => self.open_material = Some(name.clone()),
            Keyword::Node | Keyword::Element(_) => self.open_material = None,
            Keyword::SolidSection(material) => match (self.current_part, material) {
                (Some(id), Some(material)) => {
                    self.deck.parts[id.0].section_material = Some(material.clone())
                }
                (Some(id), None) => warn!(
                    "solid section at line {line_no} in part {} names no material",
                    self.deck.parts[id.0].name
                ),
                (None, _) => debug!("ignoring solid section outside a part at line {line_no}"),
            },
            Keyword::Elastic | Keyword::Other(_) => {}
        }

        self.state = self.state.transition(&keyword, self.open_material.as_deref());

        // assembly-level nodes and elements do not belong to any part
        if self.in_assembly
            && matches!(
                self.state,
                DeckParseState::InNodeBlock | DeckParseState::InElementBlock(_)
            )
        {
            debug!("ignoring assembly-level block at line {line_no}");
            self.state = DeckParseState::ExpectNone;
        }

        Ok(())
    }

    fn handle_record(&mut self, line: &str, line_no: usize) -> Result<()> {
        match self.state.clone() {
            DeckParseState::ExpectNone => {}
            DeckParseState::InNodeBlock => match parse_node_record(line) {
                Ok(node) => {
                    let part_id = self.target_part(line_no)?;
                    let part = &mut self.deck.parts[part_id.0];
                    if part.nodes.contains_key(&node.id) {
                        let reason = format!("duplicate node {} in part {}", node.id, part.name);
                        self.skip(line_no, reason);
                    } else {
                        part.nodes.insert(node.id, node);
                    }
                }
                Err(reason) => self.skip(line_no, reason),
            },
            DeckParseState::InElementBlock(kind) => match parse_element_record(line, kind) {
                Ok(element) => {
                    let part_id = self.target_part(line_no)?;
                    let part = &mut self.deck.parts[part_id.0];
                    if part.elements.contains_key(&element.id) {
                        let reason =
                            format!("duplicate element {} in part {}", element.id, part.name);
                        self.skip(line_no, reason);
                    } else {
                        part.elements.insert(element.id, element);
                    }
                }
                Err(reason) => self.skip(line_no, reason),
            },
            DeckParseState::InMaterialBlock(name) => {
                match parse_elastic_record(line, &name) {
                    Ok(material) => self.deck.materials.push(material),
                    Err(reason) => self.skip(line_no, reason),
                }
                self.state = DeckParseState::ExpectNone;
            }
        }
        Ok(())
    }
}

/// Parses deck text into parts and materials.
///
/// # Arguments
/// * `contents` - The raw deck text
/// * `default_part` - Name of the part that collects records found outside
///     any `*Part` / `*End Part` pair
///
/// # Returns
/// The parsed deck and the records that were skipped on the way
pub fn parse_deck(contents: &str, default_part: &str) -> Result<(Deck, ParseReport)> {
    let mut parser = DeckParser::new(default_part);

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        if is_keyword_line(line) {
            parser.handle_keyword(line, line_no)?;
        } else {
            parser.handle_record(line, line_no)?;
        }
    }

    Ok((parser.deck, parser.report))
}

/// Reads and parses a deck file.
///
/// # Arguments
/// * `path` - The path to the deck file
/// * `default_part` - See [`parse_deck`]
pub fn load_deck(path: &str, default_part: &str) -> Result<(Deck, ParseReport)> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            return Err(CouplerError::Input(format!(
                "Unable to open deck file {path}: {err}"
            )))
        }
    };

    let (deck, report) = parse_deck(&contents, default_part)?;

    for part in &deck.parts {
        info!(
            "loaded part {} from {path}: {} nodes, {} elements",
            part.name,
            part.nodes.len(),
            part.elements.len()
        );
    }
    if !report.skipped.is_empty() {
        let skipped = report.skipped.len();
        warn!("skipped {skipped} malformed records in {path}");
    }

    Ok((deck, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_PART: &str = "\
*Heading
** generated for tests
*Part, name=Matrice
*Node
      1,   0.0,   0.0,   0.0
      2,   1.0,   0.0,   0.0   \t
      3,   1.0,   1.0,   0.0
      4,   0.0,   1.0,   0.0
** interleaved comment
      5,   0.0,   0.0,   1.0
      6,   1.0,   0.0,   1.0
      7,   1.0,   1.0,   1.0
      8,   0.0,   1.0,   1.0
*Element, type=C3D8R
1, 1, 2, 3, 4, 5, 6, 7, 8

*Solid Section, elset=ALL, material=Matrix
1.,
*End Part
*PART, NAME=Fibre
*NODE
1, 0.5, 0.5, 0.5
*element, type=c3d8
7, 1, 1, 1, 1, 1, 1, 1, 1
*End Part
*Material, name=Matrix
*Density
2.4e-9,
*Elastic
25000., 0.18
*Material, name=Fibre
*Elastic
200000., 0.2
";

    #[test]
    fn test_parses_multiple_parts_and_materials() {
        let (deck, report) = parse_deck(MULTI_PART, "MACRO").unwrap();

        assert!(report.skipped.is_empty());
        assert_eq!(deck.parts.len(), 2);

        let matrice = deck.part_by_name("Matrice").unwrap();
        assert_eq!(matrice.nodes.len(), 8);
        assert_eq!(matrice.elements.len(), 1);
        assert_eq!(matrice.elements[&1].kind, ElementKind::Hex8Reduced);
        assert_eq!(matrice.elements[&1].nodes, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(matrice.section_material.as_deref(), Some("Matrix"));

        let fibre = deck.part_by_name("Fibre").unwrap();
        assert_eq!(fibre.id, PartId(1));
        assert_eq!(fibre.elements[&7].kind, ElementKind::Hex8Full);

        assert_eq!(deck.materials.len(), 2);
        assert_eq!(deck.materials[0].name, "Matrix");
        assert_eq!(deck.materials[0].youngs_modulus, 25000.0);
        assert_eq!(deck.materials[1].poisson_ratio, 0.2);
    }

    #[test]
    fn test_flat_deck_goes_to_default_part() {
        let text = "*Node\n1, 0., 0., 0.\n2, 1., 0.\n*Element, type=C3D8R\n";
        let (deck, _) = parse_deck(text, "MACRO").unwrap();
        assert_eq!(deck.parts.len(), 1);
        assert_eq!(deck.parts[0].name, "MACRO");
        // missing z defaults to zero
        assert_eq!(deck.parts[0].nodes[&2].position.z, 0.0);
    }

    #[test]
    fn test_malformed_records_are_skipped_not_fatal() {
        let text = "\
*Node
1, 0.0, 0.0, 0.0
two, 1.0, 0.0, 0.0
3, 1.0, abc, 0.0
3, 1.0, 1.0, 0.0
3, 9.0, 9.0, 9.0
*Element, type=C3D8
1, 1, 2, 3, 4
2, 1, 2, 3, 4, 5, 6, 7, x
";
        let (deck, report) = parse_deck(text, "MACRO").unwrap();
        let part = &deck.parts[0];
        assert_eq!(part.nodes.len(), 2);
        assert_eq!(part.nodes[&3].position.x, 1.0);
        assert!(part.elements.is_empty());

        let lines: Vec<usize> = report.skipped.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 4, 6, 8, 9]);
    }

    #[test]
    fn test_unsupported_element_type_is_fatal_with_line() {
        let text = "*Part, name=A\n*Node\n1, 0, 0, 0\n*Element, type=C3D4\n1, 1, 1, 1, 1\n";
        match parse_deck(text, "MACRO") {
            Err(CouplerError::MalformedDeck { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected malformed deck, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_part_is_fatal() {
        let text = "*Part, name=A\n*End Part\n*Part, name=a\n*End Part\n";
        match parse_deck(text, "MACRO") {
            Err(CouplerError::MalformedDeck { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed deck, got {other:?}"),
        }
    }

    #[test]
    fn test_node_output_and_assembly_blocks_are_ignored() {
        let text = "\
*Part, name=A
*Node
1, 0, 0, 0
*End Part
*Assembly, name=Assembly
*Node
99, 5, 5, 5
*End Assembly
*Step
*Node Output
U, RF
";
        let (deck, report) = parse_deck(text, "MACRO").unwrap();
        assert_eq!(deck.parts.len(), 1);
        assert_eq!(deck.parts[0].nodes.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_transition_table() {
        let none = DeckParseState::ExpectNone;
        assert_eq!(
            none.transition(&Keyword::Node, None),
            DeckParseState::InNodeBlock
        );
        assert_eq!(
            DeckParseState::InNodeBlock
                .transition(&Keyword::Element(ElementKind::Hex8Full), None),
            DeckParseState::InElementBlock(ElementKind::Hex8Full)
        );
        assert_eq!(
            none.transition(&Keyword::Elastic, Some("Steel")),
            DeckParseState::InMaterialBlock("Steel".to_owned())
        );
        assert_eq!(none.transition(&Keyword::Elastic, None), none);
        assert_eq!(
            DeckParseState::InElementBlock(ElementKind::Hex8Reduced)
                .transition(&Keyword::Other("NSET".to_owned()), None),
            none
        );
        assert_eq!(
            DeckParseState::InNodeBlock.transition(&Keyword::EndPart, None),
            none
        );
    }

    #[test]
    fn test_keyword_parameters_are_case_insensitive() {
        assert_eq!(
            parse_keyword("*PART, NAME=Beam", 1).unwrap(),
            Keyword::Part("Beam".to_owned())
        );
        assert_eq!(parse_keyword("*end   part", 1).unwrap(), Keyword::EndPart);
        assert!(parse_keyword("*Part", 7).is_err());
    }
}
