//! Tests covering the GML, GEXF and statistics readers.
use neugraph_core::{StatsError, STATS_DIM};
use rstest::rstest;

use super::{GraphFileError, parse_gexf, parse_gml, parse_stats};

const TRIANGLE_GML: &str = r#"
# exported by a graph toolkit
Creator "generator"
graph [
  directed 1
  node [ id 0 label "hub" ]
  node [ id 1 label "left" ]
  node [ id 2 ]
  edge [ source 0 target 1 weight 2.5 ]
  edge [ source 1 target 2 ]
  edge [ source 2 target 0 ]
  edge [ source 1 target 0 ]
  edge [ source 2 target 2 ]
]
"#;

#[rstest]
fn gml_triangle_is_symmetrised_without_loops() {
    let graph = parse_gml(TRIANGLE_GML).expect("valid document");
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 3);
    assert!(graph.has_edge(0, 1) && graph.has_edge(1, 2) && graph.has_edge(0, 2));
    assert_eq!(graph.label(0), Some("hub"));
    assert_eq!(graph.label(2), Some("2"));
}

#[rstest]
fn gml_string_ids_are_resolved() {
    let graph = parse_gml(
        r#"graph [
            node [ id "a b" ]
            node [ id "c" ]
            edge [ source "c" target "a b" ]
        ]"#,
    )
    .expect("valid document");
    assert_eq!(graph.edges().collect::<Vec<_>>(), vec![(0, 1)]);
}

#[rstest]
fn gml_edges_may_precede_nodes() {
    let graph = parse_gml("graph [ edge [ source 7 target 9 ] node [ id 9 ] node [ id 7 ] ]")
        .expect("valid document");
    assert!(graph.has_edge(0, 1));
}

#[rstest]
#[case::unclosed("graph [ node [ id 0 ]", 1)]
#[case::stray_close("graph [ ] ]", 1)]
#[case::missing_value("graph [\n node [ id ] ]", 2)]
#[case::unterminated("graph [\n node [ label \"oops ] ]", 2)]
fn gml_syntax_errors_report_the_line(#[case] text: &str, #[case] expected: usize) {
    let err = parse_gml(text).expect_err("malformed document");
    assert!(
        matches!(err, GraphFileError::Syntax { line, .. } if line == expected),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[case::no_graph("Creator \"x\"", "MissingGraph")]
#[case::unknown("graph [ node [ id 0 ] edge [ source 0 target 5 ] ]", "UnknownNode")]
#[case::duplicate("graph [ node [ id 0 ] node [ id 0 ] ]", "DuplicateNode")]
#[case::no_target("graph [ node [ id 0 ] edge [ source 0 ] ]", "MissingAttribute")]
fn gml_structural_errors(#[case] text: &str, #[case] variant: &str) {
    let err = parse_gml(text).expect_err("invalid document");
    let matched = match variant {
        "MissingGraph" => matches!(err, GraphFileError::MissingGraph),
        "UnknownNode" => matches!(&err, GraphFileError::UnknownNode { id } if &**id == "5"),
        "DuplicateNode" => matches!(err, GraphFileError::DuplicateNode { .. }),
        "MissingAttribute" => matches!(
            err,
            GraphFileError::MissingAttribute {
                element: "edge",
                attribute: "target"
            }
        ),
        other => panic!("unknown variant {other}"),
    };
    assert!(matched, "unexpected error: {err:?}");
}

const PATH_GEXF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gexf xmlns="http://gexf.net/1.3" version="1.3">
  <graph mode="static" defaultedgetype="undirected">
    <nodes>
      <node id="n0" label="first"/>
      <node id="n1" label="a &amp; b">
        <attvalues><attvalue for="0" value="1"/></attvalues>
      </node>
      <node id="n2"></node>
    </nodes>
    <edges>
      <edge id="e0" source="n0" target="n1" weight="1.0"/>
      <edge id="e1" source="n1" target="n2"/>
      <edge id="e2" source="n2" target="n1"/>
    </edges>
  </graph>
</gexf>"#;

#[rstest]
fn gexf_path_is_read_with_labels() {
    let graph = parse_gexf(PATH_GEXF).expect("valid document");
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edges().collect::<Vec<_>>(), vec![(0, 1), (1, 2)]);
    assert_eq!(graph.label(1), Some("a & b"));
    assert_eq!(graph.label(2), Some("n2"));
}

#[rstest]
fn gexf_requires_a_graph_element() {
    let err = parse_gexf("<gexf><meta/></gexf>").expect_err("no graph");
    assert!(matches!(err, GraphFileError::MissingGraph));
}

#[rstest]
fn gexf_rejects_unknown_endpoints() {
    let err = parse_gexf(r#"<gexf><graph><nodes><node id="a"/></nodes><edges><edge source="a" target="z"/></edges></graph></gexf>"#)
        .expect_err("unknown endpoint");
    assert!(matches!(&err, GraphFileError::UnknownNode { id } if &**id == "z"));
}

#[rstest]
fn gexf_rejects_nodes_without_ids() {
    let err = parse_gexf(r#"<gexf><graph><nodes><node label="x"/></nodes></graph></gexf>"#)
        .expect_err("node without id");
    assert!(matches!(
        err,
        GraphFileError::MissingAttribute {
            element: "node",
            attribute: "id"
        }
    ));
}

#[rstest]
fn gexf_reports_malformed_xml() {
    let err = parse_gexf("<gexf><graph></nodes></graph></gexf>").expect_err("mismatched tags");
    assert!(matches!(err, GraphFileError::Xml(_)));
}

#[rstest]
#[case::plain("1 2 3 4 5 6 7 8 9 10 11 12 13 14")]
#[case::labelled("nodes: 1\nedges = 2; c 3, 4 5 6 7 8 9 10 11 12 13 14")]
#[case::commas("1,2,3,4,5,6,7,8,9,10,11,12,13,14\n")]
fn stats_tokens_are_read_in_order(#[case] text: &str) {
    let stats = parse_stats(text).expect("fourteen numbers");
    let expected: Vec<f32> = (1..=14u8).map(f32::from).collect();
    assert_eq!(stats.as_slice(), expected.as_slice());
}

#[rstest]
fn stats_accept_missing_values() {
    let stats = parse_stats("nan 1 2 3 4 5 6 7 8 9 10 11 12 13").expect("fourteen numbers");
    assert!(stats.as_slice()[0].is_nan());
}

#[rstest]
#[case("1 2 3", 3)]
#[case("", 0)]
#[case("0 1 2 3 4 5 6 7 8 9 10 11 12 13 14", 15)]
fn stats_with_wrong_width_are_rejected(#[case] text: &str, #[case] actual: usize) {
    let err = parse_stats(text).expect_err("wrong width");
    assert!(matches!(
        err,
        GraphFileError::Stats(StatsError::WrongWidth { expected: STATS_DIM, actual: a }) if a == actual
    ));
}
