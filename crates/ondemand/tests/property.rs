use ondemand::{normalize, parse_query, to_query_string};
use proptest::prelude::*;

fn arb_atom() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("release:a".to_string()),
        Just("os.name:android".to_string()),
        Just("transaction.duration:>1s".to_string()),
        Just("custom.tag:blue".to_string()),
        Just("!environment:[dev,prod]".to_string()),
        Just(r#"transaction:"<3""#.to_string()),
        Just(r#"custom.tag:">=2""#.to_string()),
        Just("AND".to_string()),
        Just("and".to_string()),
        Just("OR".to_string()),
        Just("()".to_string()),
    ]
}

fn arb_query(depth: u32) -> BoxedStrategy<String> {
    if depth == 0 {
        return prop::collection::vec(arb_atom(), 0..6)
            .prop_map(|atoms| atoms.join(" "))
            .boxed();
    }

    let flat = arb_query(0);
    let nested = (arb_query(depth - 1), arb_query(0))
        .prop_map(|(inner, tail)| format!("({inner}) {tail}"));
    prop_oneof![flat, nested].boxed()
}

proptest! {
    #[test]
    fn normalize_is_idempotent(query in arb_query(3)) {
        let tokens = parse_query(&query).expect("generated query should tokenize");
        let once = normalize(tokens);
        let twice = normalize(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalized_render_reparses_to_itself(query in arb_query(3)) {
        let tokens = normalize(parse_query(&query).expect("generated query should tokenize"));
        let rendered = to_query_string(&tokens);
        let reparsed = parse_query(&rendered).expect("rendered query should reparse");
        prop_assert_eq!(tokens, reparsed);
    }

    #[test]
    fn normalize_never_leaves_edge_operators(query in arb_query(3)) {
        let tokens = normalize(parse_query(&query).expect("generated query should tokenize"));
        prop_assert!(!matches!(tokens.first(), Some(ondemand::QueryToken::Bool(_))));
        prop_assert!(!matches!(tokens.last(), Some(ondemand::QueryToken::Bool(_))));
    }
}
