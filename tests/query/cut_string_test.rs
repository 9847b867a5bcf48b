//! String and dictionary forms of cuts.

use starql::query::{
    cut_from_dict, cut_from_string, cuts_from_string, path, path_from_string, string_from_cuts,
    string_from_path, Cell, Cut, CutKind,
};
use starql::QueryError;

#[test]
fn test_single_set_path_serializes_as_point() {
    let cut = Cut::set("foo", vec![path(&["a-b"])]);
    assert_eq!(cut.to_string(), "foo:a\\-b");

    let parsed = cut_from_string(&cut.to_string()).unwrap();
    assert!(parsed.is_point());
    assert_eq!(parsed.point_path(), Some(&path(&["a-b"])));
}

#[test]
fn test_parse_cut_kinds() {
    let point = cut_from_string("date:2012,1").unwrap();
    assert_eq!(point, Cut::point("date", path(&["2012", "1"])));

    let set = cut_from_string("customer:ann;bob,x").unwrap();
    assert_eq!(
        set.kind,
        CutKind::Set {
            paths: vec![path(&["ann"]), path(&["bob", "x"])]
        }
    );

    let range = cut_from_string("date:2012,1-2012,3").unwrap();
    assert_eq!(
        range,
        Cut::range("date", Some(path(&["2012", "1"])), Some(path(&["2012", "3"])))
    );

    let open = cut_from_string("date:-2012").unwrap();
    assert_eq!(open, Cut::range("date", None, Some(path(&["2012"]))));
    let open = cut_from_string("date:2012-").unwrap();
    assert_eq!(open, Cut::range("date", Some(path(&["2012"])), None));
}

#[test]
fn test_empty_range_bound_reads_back_open() {
    let cut = Cut::range("date", Some(path(&[""])), Some(path(&["2012"])));
    assert_eq!(cut.to_string(), "date:-2012");

    // The string form cannot tell an empty member from a missing bound
    let parsed = cut_from_string(&cut.to_string()).unwrap();
    assert_eq!(parsed, Cut::range("date", None, Some(path(&["2012"]))));
    assert_ne!(parsed, cut);

    // The dictionary form keeps the empty member
    assert_eq!(cut_from_dict(&cut.to_dict()).unwrap(), cut);
}

#[test]
fn test_hierarchy_and_inversion() {
    let cut = cut_from_string("!date@ymd:2012").unwrap();
    assert!(cut.invert);
    assert_eq!(cut.hierarchy.as_deref(), Some("ymd"));
    assert_eq!(cut.to_string(), "!date@ymd:2012");
}

#[test]
fn test_empty_payload_is_single_empty_member() {
    let cut = cut_from_string("date:").unwrap();
    assert_eq!(cut.point_path(), Some(&vec![Some(String::new())]));
}

#[test]
fn test_null_member() {
    let cut = cut_from_string("city:__null__").unwrap();
    assert_eq!(cut.point_path(), Some(&vec![None]));
    assert_eq!(cut.to_string(), "city:__null__");
}

#[test]
fn test_escaping_round_trips() {
    let paths = vec![
        path(&["plain"]),
        path(&["a,b", "c"]),
        path(&["x|y", "p:q", "s;t"]),
        path(&["back\\slash", "!bang", "-dash-"]),
    ];
    for original in paths {
        let text = string_from_path(&original);
        assert_eq!(path_from_string(&text), original, "path text: {}", text);
        // Escaping the parsed path again yields the same text
        assert_eq!(string_from_path(&path_from_string(&text)), text);
    }
}

#[test]
fn test_cuts_string_round_trip() {
    let text = "date:2012,1|!customer:ann;bob|amount:10-20";
    let cuts = cuts_from_string(text).unwrap();
    assert_eq!(cuts.len(), 3);
    assert_eq!(string_from_cuts(&cuts), text);
    assert!(cuts_from_string("").unwrap().is_empty());
}

#[test]
fn test_malformed_cut_strings() {
    for text in ["date", "date:2012:1", "da te:2012", "date:1-2-3"] {
        assert!(
            matches!(cut_from_string(text), Err(QueryError::Argument(_))),
            "expected argument error for {}",
            text
        );
    }
}

#[test]
fn test_dict_round_trip() {
    let cut = Cut::range("date", Some(path(&["2012"])), None)
        .with_hierarchy(Some("ym"))
        .inverted();
    let dict = cut.to_dict();
    assert_eq!(dict["type"], "range");
    assert_eq!(dict["level_depth"], 1);

    let parsed = cut_from_dict(&dict).unwrap();
    assert_eq!(parsed, cut);
    assert_eq!(parsed.hierarchy.as_deref(), Some("ym"));

    let value = serde_json::to_value(&cut).unwrap();
    let deserialized: Cut = serde_json::from_value(value).unwrap();
    assert_eq!(deserialized, cut);
}

#[test]
fn test_slice_replaces_cut_of_same_dimension() {
    let cell: Cell = "date:2012|city:BA".parse().unwrap();
    let sliced = cell.slice(Cut::point("date", path(&["2013"])));
    assert_eq!(sliced.cuts.len(), 2);
    assert_eq!(sliced.to_str(), "date:2013|city:BA");

    let extended = cell.slice(Cut::point("product", path(&["tea"])));
    assert_eq!(extended.to_str(), "date:2012|city:BA|product:tea");
}
