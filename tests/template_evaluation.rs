use bookcase::error::CatalogError;
use bookcase::formatter::functions::FunctionError;
use bookcase::formatter::{is_valid_template, parse, unparse, Evaluator, Value};

fn shelf(name: &str, specifier: Option<&str>) -> Option<Value> {
    match (name, specifier) {
        ("title", _) => Some("Salem's Lot".into()),
        ("empty", _) => Some("".into()),
        ("series_index", _) => Some(Value::from(7i64)),
        ("tags", None) => Some(vec!["horror", "vampires"].into()),
        _ => None,
    }
}

#[test]
fn plain_text_passes_through() {
    let evaluator = Evaluator::new(shelf, true);
    for template in ["", "books/by author/", "ümlauts & spaces.epub", "no variables (here), none at all"] {
        assert_eq!(evaluator.process(template).unwrap(), template);
    }
}

#[test]
fn missing_variables_depend_on_strictness() {
    let lenient = Evaluator::new(shelf, false);
    assert_eq!(lenient.process("{missing}").unwrap(), "");
    assert_eq!(lenient.process("a{missing}b").unwrap(), "ab");

    let strict = Evaluator::new(shelf, true);
    match strict.process("{missing}") {
        Err(CatalogError::UnresolvedVariable { name }) => assert_eq!(name, "missing"),
        other => panic!("expected a resolution error, got {:?}", other),
    }
}

#[test]
fn filters_apply_left_to_right() {
    let evaluator = Evaluator::new(shelf, true);
    // g(f(x)) differs from f(g(x)) here
    assert_eq!(evaluator.process("{title|uppercase|wrap('<@>')}").unwrap(), "<SALEM'S LOT>");
    assert_eq!(evaluator.process("{title|wrap('<@>')|lowercase}").unwrap(), "<salem's lot>");
}

#[test]
fn optional_blocks_short_circuit() {
    let evaluator = Evaluator::new(shelf, true);
    assert_eq!(evaluator.process("{?empty|wrap('[@]')}").unwrap(), "");
    assert_eq!(evaluator.process("{empty|wrap('[@]')}").unwrap(), "[]");
    assert_eq!(evaluator.process("{?title|wrap('[@]')}").unwrap(), "[Salem's Lot]");
}

#[test]
fn pads_series_index() {
    let evaluator = Evaluator::new(shelf, false);
    assert_eq!(evaluator.process("{series_index|pad_left(3,'0')}").unwrap(), "007");
}

#[test]
fn nested_calls_and_lists() {
    let evaluator = Evaluator::new(shelf, true);
    assert_eq!(evaluator.process("{join(list(title, 'x'), ' / ')}").unwrap(), "Salem's Lot / x");
    assert_eq!(evaluator.process("{tags}").unwrap(), "horror, vampires");
    assert_eq!(evaluator.process("{add(series_index, 3)|format_num(1)}").unwrap(), "10.0");
}

#[test]
fn arity_errors_name_function_and_variable() {
    let evaluator = Evaluator::new(shelf, true);
    match evaluator.process("{title|wrap}") {
        Err(CatalogError::Evaluation {
            function,
            variable,
            source,
        }) => {
            assert_eq!(function, "wrap");
            assert_eq!(variable.as_deref(), Some("title"));
            assert_eq!(source, FunctionError::Arity { expected: 2, got: 1 });
        }
        other => panic!("expected an evaluation error, got {:?}", other),
    }
    // a bare call has no head to prepend
    assert!(matches!(
        evaluator.process("{pad_left(3)}"),
        Err(CatalogError::Evaluation { variable: None, .. })
    ));
}

#[test]
fn malformed_templates_produce_no_output() {
    let evaluator = Evaluator::new(shelf, false);
    for template in ["{title", "{}", "x}", "{title|}", "{'open}"] {
        let error = evaluator.process(template).unwrap_err();
        assert!(error.is_template_syntax(), "{} gave {:?}", template, error);
        assert!(!is_valid_template(template));
    }
    assert!(is_valid_template("{?authors#0|def('Unknown')}/{title}"));
}

#[test]
fn reparsing_printed_templates_is_stable() {
    let source = "{ title | wrap( \"<@>\" ) }-{?series_index|pad_left(3, '0')}";
    let parsed = parse(source).unwrap();
    let printed = unparse(&parsed);
    assert_eq!(parse(&printed).unwrap(), parsed);
    assert_eq!(unparse(&parse(&printed).unwrap()), printed);
}
