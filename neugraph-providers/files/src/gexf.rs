//! Reader for GEXF documents.

use std::borrow::Cow;

use neugraph_core::Graph;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::{assembler::GraphAssembler, errors::GraphFileError};

/// Parses a GEXF document into a [`Graph`].
///
/// `<node id=… label=…>` declares nodes and `<edge source=… target=…>`
/// connects them; edge direction, weights and attribute values are ignored.
///
/// # Errors
/// Returns [`GraphFileError::Xml`] for malformed XML,
/// [`GraphFileError::MissingGraph`] without a `<graph>` element, and
/// [`GraphFileError::MissingAttribute`] or [`GraphFileError::UnknownNode`]
/// for incomplete nodes and edges.
///
/// # Examples
/// ```
/// use neugraph_providers_files::parse_gexf;
///
/// let graph = parse_gexf(
///     r#"<gexf><graph defaultedgetype="directed">
///         <nodes><node id="a"/><node id="b"/><node id="c"/></nodes>
///         <edges><edge id="0" source="a" target="b"/><edge id="1" source="c" target="b"/></edges>
///     </graph></gexf>"#,
/// )?;
/// assert_eq!(graph.node_count(), 3);
/// assert_eq!(graph.degree(1), 2);
/// # Ok::<(), neugraph_providers_files::GraphFileError>(())
/// ```
pub fn parse_gexf(text: &str) -> Result<Graph, GraphFileError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut assembler = GraphAssembler::default();
    let mut has_graph = false;
    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                match element.local_name().as_ref() {
                    b"graph" => has_graph = true,
                    b"node" => {
                        let id = required(&element, "node", "id")?;
                        let label = attribute(&element, "label")?;
                        assembler.add_node(&id, label.as_deref())?;
                    }
                    b"edge" => {
                        let source = required(&element, "edge", "source")?;
                        let target = required(&element, "edge", "target")?;
                        assembler.add_edge(&source, &target);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !has_graph {
        return Err(GraphFileError::MissingGraph);
    }
    assembler.finish()
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, GraphFileError> {
    let Some(attr) = element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };
    Ok(Some(attr.unescape_value().map(Cow::into_owned)?))
}

fn required(
    element: &BytesStart<'_>,
    name: &'static str,
    attribute_name: &'static str,
) -> Result<String, GraphFileError> {
    attribute(element, attribute_name)?.ok_or(GraphFileError::MissingAttribute {
        element: name,
        attribute: attribute_name,
    })
}
