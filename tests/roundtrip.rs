use proptest::prelude::*;
use zonejson::{json, parse, parse_file, stringify, Array, Error, List, Value, Writer, Zone};

#[derive(Debug, Clone)]
enum Tree {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Tree>),
    Obj(Vec<(String, Tree)>),
}

fn arb_tree() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        Just(Tree::Null),
        any::<bool>().prop_map(Tree::Bool),
        any::<f64>()
            .prop_filter("finite", |n| n.is_finite())
            .prop_map(Tree::Num),
        any::<String>().prop_map(Tree::Str),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Tree::List),
            prop::collection::vec(("[a-z]{0,3}", inner), 0..6).prop_map(Tree::Obj),
        ]
    })
}

fn build(z: &Zone, t: &Tree) -> Value<'static> {
    match t {
        Tree::Null => Value::Null,
        Tree::Bool(b) => Value::boolean(*b),
        Tree::Num(n) => Value::number(*n),
        Tree::Str(s) => Value::string_copy(z, s).unwrap(),
        Tree::List(items) => {
            let mut l = List::new();
            for item in items {
                l.push_move(z, build(z, item)).unwrap();
            }
            Value::List(l)
        }
        Tree::Obj(entries) => {
            let mut a = Array::new();
            for (k, v) in entries {
                a.insert_move(z, k, build(z, v)).unwrap();
            }
            Value::Array(a)
        }
    }
}

fn render(v: &Value<'_>, pretty: bool) -> Vec<u8> {
    let mut w = Writer::new(pretty);
    stringify(&mut w, v).unwrap();
    w.finish()
}

proptest! {
    #[test]
    fn prop_parse_stringify_roundtrip(t in arb_tree(), pretty in any::<bool>()) {
        let z = Zone::new("prop");
        let mut v = build(&z, &t);
        let text = render(&v, pretty);
        let mut back = parse(&z, &text[..]).unwrap();
        prop_assert_eq!(&back, &v);
        // rendering is a fixed point after one trip
        prop_assert_eq!(render(&back, pretty), text);
        back.destroy(&z);
        v.destroy(&z);
        prop_assert!(z.is_balanced());
    }

    #[test]
    fn prop_copy_is_equal_and_independent(t in arb_tree()) {
        let z = Zone::new("prop");
        let mut v = build(&z, &t);
        let mut copy = v.copy(&z).unwrap();
        prop_assert_eq!(&copy, &v);
        v.destroy(&z);
        let mut fresh = build(&z, &t);
        prop_assert_eq!(&copy, &fresh);
        fresh.destroy(&z);
        copy.destroy(&z);
        prop_assert!(z.is_balanced());
    }

    #[test]
    fn prop_failed_parse_is_balanced(t in arb_tree()) {
        let src = Zone::new("src");
        let mut v = build(&src, &t);
        let text = render(&v, false);
        v.destroy(&src);

        let counting = Zone::new("count");
        let mut whole = parse(&counting, &text[..]).unwrap();
        let needed = counting.total_allocations();
        whole.destroy(&counting);
        for n in 0..needed {
            let z = Zone::failing_after("fail", n);
            let err = parse(&z, &text[..]).unwrap_err();
            prop_assert!(err.is_allocation());
            prop_assert!(z.is_balanced(), "leak when refusing after {} grants", n);
        }
    }

    #[test]
    fn prop_truncated_input_is_rejected(t in arb_tree(), cut in any::<prop::sample::Index>()) {
        let z = Zone::new("prop");
        let mut v = build(&z, &t);
        let text = render(&v, true);
        v.destroy(&z);
        let cut = cut.index(text.len());
        // a proper prefix of a container or string never parses
        if matches!(text.first(), Some(b'[' | b'{' | b'"')) {
            prop_assert!(parse(&z, &text[..cut]).is_err());
        }
        prop_assert!(z.is_balanced());
    }
}

#[test]
fn test_examples() {
    let z = Zone::new("rt");
    let mut v = parse(&z, r#"[1, "a", null, true]"#).unwrap();
    assert_eq!(v.as_list().map(List::len), Some(4));
    assert_eq!(v[0], Value::Number(1.0));
    assert_eq!(v[1].as_str(), Some("a"));
    assert!(v[2].is_null());
    assert_eq!(v[3], Value::Boolean(true));
    let mut want = json!(&z, [1, "a", null, true]).unwrap();
    assert_eq!(v, want);
    assert_eq!(v.to_string(), r#"[1,"a",null,true]"#);
    want.destroy(&z);
    v.destroy(&z);

    match parse(&z, "{bad") {
        Err(Error::Syntax { message, line, .. }) => {
            assert!(!message.is_empty());
            assert_eq!(line, 1);
        }
        other => panic!("{:?}", other),
    }
    assert!(z.is_balanced());
}

#[test]
fn test_parse_file() {
    let z = Zone::new("rt");
    let dir = tempfile::tempdir().unwrap();

    let good = dir.path().join("good.json");
    std::fs::write(&good, br#"{"a": [1, 2.5], "b": "c"}"#).unwrap();
    let mut v = parse_file(&z, &good).unwrap();
    assert_eq!(v["a"][1].as_f64(), Some(2.5));
    assert_eq!(v["b"].as_str(), Some("c"));

    let saved = dir.path().join("saved.json");
    zonejson::save(&saved, &v, false).unwrap();
    let mut again = parse_file(&z, &saved).unwrap();
    assert_eq!(again, v);
    again.destroy(&z);
    v.destroy(&z);

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, b"[1,,]").unwrap();
    assert!(matches!(parse_file(&z, &bad), Err(Error::Syntax { .. })));

    match parse_file(&z, dir.path().join("missing.json")) {
        Err(Error::Io { path, .. }) => assert!(path.ends_with("missing.json")),
        other => panic!("{:?}", other),
    }
    assert!(z.is_balanced());
}
