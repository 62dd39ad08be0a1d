//! Property-based tests using proptest
//!
//! These tests check query composition, defaults and padding against
//! randomized filters.

use cf_tools::resource::query::{
    compose_query, ensure_query, pad_query, pad_query_space, validate_filters, Filter, FilterKey,
    QuerySpec, DEFAULT_PER_PAGE,
};
use cf_tools::resource::registry::ResourceKind;
use cf_tools::CfConfig;
use proptest::prelude::*;
use std::path::PathBuf;

/// Any known filter key
fn arb_key() -> impl Strategy<Value = FilterKey> {
    prop::sample::select(FilterKey::ALL.to_vec())
}

/// Filter values, including characters that need encoding
fn arb_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,&=_-]{0,20}"
}

/// Keys that stay filters; paging keys move into their own fields
fn arb_data_key() -> impl Strategy<Value = FilterKey> {
    arb_key().prop_filter("paging key", |key| {
        !matches!(key, FilterKey::Page | FilterKey::PerPage | FilterKey::OrderBy)
    })
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    (arb_data_key(), arb_value()).prop_map(|(key, value)| Filter::new(key, &value))
}

/// A paging clause written as a filter, with a valid or invalid value
fn arb_paging_filter() -> impl Strategy<Value = Filter> {
    prop_oneof![
        (1u32..5000).prop_map(|n| Filter::new(FilterKey::PerPage, &n.to_string())),
        (1u32..100).prop_map(|n| Filter::new(FilterKey::Page, &n.to_string())),
        Just(Filter::new(FilterKey::OrderBy, "-created_at")),
        arb_value().prop_map(|v| Filter::new(FilterKey::PerPage, &v)),
    ]
}

fn arb_query() -> impl Strategy<Value = QuerySpec> {
    (
        prop::collection::vec(arb_filter(), 0..8),
        prop::option::of(1u32..100),
        prop::option::of(1u32..5000),
    )
        .prop_map(|(filters, page, per_page)| QuerySpec {
            filters,
            page,
            per_page,
            order_by: None,
        })
}

proptest! {
    /// Applying the defaults twice changes nothing
    #[test]
    fn ensure_query_is_idempotent(query in prop::option::of(arb_query())) {
        let once = ensure_query(query);
        let twice = ensure_query(Some(once.clone()));
        prop_assert_eq!(once, twice);
    }

    /// A caller's per_page is never replaced by the default
    #[test]
    fn ensure_query_keeps_per_page(query in arb_query()) {
        let expected = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
        prop_assert_eq!(ensure_query(Some(query)).per_page, Some(expected));
    }

    /// Paging given as filters and as fields still yields one clause per key
    #[test]
    fn ensure_query_emits_paging_once(
        query in arb_query(),
        paging in prop::collection::vec(arb_paging_filter(), 0..4),
    ) {
        let mut query = query;
        query.filters.extend(paging);

        let ensured = ensure_query(Some(query));
        prop_assert_eq!(ensure_query(Some(ensured.clone())), ensured.clone());

        let composed = compose_query(&ensured);
        for key in ["page", "per_page", "order_by"] {
            let count = composed
                .split('&')
                .filter(|clause| clause.split('=').next() == Some(key))
                .count();
            prop_assert!(count <= 1, "{} appears {} times in {}", key, count, composed);
        }
        prop_assert!(ensured.per_page.is_some());
    }

    /// Padding never overwrites a value the caller set
    #[test]
    fn pad_query_never_overwrites(query in arb_query(), fallbacks in prop::collection::vec(arb_filter(), 0..6)) {
        let padded = pad_query(query.clone(), &fallbacks);

        prop_assert!(padded.filters.starts_with(&query.filters));
        for filter in &query.filters {
            if !filter.value.is_empty() {
                prop_assert_eq!(padded.filter_value(filter.key), query.filter_value(filter.key));
            }
        }
        for fallback in &fallbacks {
            if query.filter_value(fallback.key).is_none() && !fallback.value.is_empty() {
                prop_assert!(padded.filter_value(fallback.key).is_some());
            }
        }
    }

    /// Empty values are dropped and no clause leaks an unescaped separator
    #[test]
    fn compose_query_clauses_are_well_formed(query in arb_query()) {
        let composed = compose_query(&query);
        let non_empty = query.filters.iter().filter(|f| !f.value.is_empty()).count()
            + usize::from(query.page.is_some())
            + usize::from(query.per_page.is_some());

        if non_empty == 0 {
            prop_assert!(composed.is_empty());
        } else {
            let clauses: Vec<&str> = composed.split('&').collect();
            prop_assert_eq!(clauses.len(), non_empty);
            for clause in clauses {
                prop_assert_eq!(clause.matches('=').count(), 1);
            }
        }
    }

    /// names and per_page compose in filter-then-paging order
    #[test]
    fn compose_names_then_per_page(name in "[a-z][a-z0-9-]{0,30}", per_page in 1u32..1000) {
        let query = QuerySpec {
            filters: vec![Filter::new(FilterKey::Names, &name)],
            per_page: Some(per_page),
            ..QuerySpec::default()
        };
        prop_assert_eq!(compose_query(&query), format!("names={}&per_page={}", name, per_page));
    }

    /// Validation accepts exactly the keys a resource allows
    #[test]
    fn validate_matches_allow_list(key in arb_key(), kind in prop::sample::select(ResourceKind::ALL.to_vec())) {
        let query = QuerySpec::new(vec![Filter::new(key, "x")]);
        prop_assert_eq!(validate_filters(&query, kind).is_ok(), kind.allows(key));
    }

    /// A space the caller names is kept and the cf configuration is never consulted
    #[test]
    fn pad_query_space_keeps_caller_space(guid in "[a-z0-9-]{1,36}") {
        let config = CfConfig::new(PathBuf::from("/nonexistent/cf-home"), None);
        let query = QuerySpec::new(vec![Filter::new(FilterKey::SpaceGuids, &guid)]);

        let padded = tokio_test::block_on(pad_query_space(query, &[], &config)).unwrap();
        prop_assert_eq!(padded.filter_value(FilterKey::SpaceGuids), Some(guid.as_str()));
        prop_assert_eq!(padded.filters.len(), 1);
    }
}
