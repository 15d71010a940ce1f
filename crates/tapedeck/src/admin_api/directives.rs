//! The mock-directive header protocol.
//!
//! A `PUT /mock` request carries its instructions as headers prefixed with
//! `mock` (any case), for example:
//!
//! ```text
//! mockTape_Name: team/orders
//! mockName: get-order
//! mockMethod: GET
//! mockResponse_Code: 200
//! mockHeaderOut_Content-Type: application/json
//! mockFilter_Path: orders/\d+
//! mockFilter_Param~: verbose=true
//! mockUse: 3
//! ```
//!
//! The request body becomes the response body. `mockFilter_*` keys build the
//! attractor group: a `~` anywhere in the key makes the bit optional, a `!`
//! negates it, and `Param` values are split on `&`.

use crate::attractor::{AttractorBit, AttractorGroup};
use crate::catalog::{CatalogError, MockDirectives, MockUse};
use std::collections::HashMap;

const PREFIX: &str = "mock";
const FILTER_PREFIX: &str = "filter_";
const HEADER_OUT_PREFIX: &str = "headerout_";

/// Parse `mock*` headers into directives. Other headers are ignored.
///
/// Fails when no `mock*` header is present or a filter pattern does not
/// compile.
pub fn parse_mock_directives<'a, I>(
    headers: I,
    body: Option<String>,
) -> Result<MockDirectives, CatalogError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut params: HashMap<String, &str> = HashMap::new();
    let mut response_headers = Vec::new();
    let mut filters = Vec::new();

    for (name, value) in headers {
        let Some(key) = strip_prefix_ignore_case(name, PREFIX) else {
            continue;
        };
        let key = key.to_lowercase();

        if let Some(filter) = key.strip_prefix(FILTER_PREFIX) {
            filters.push((filter.to_string(), value));
        } else if let Some(header) = key.strip_prefix(HEADER_OUT_PREFIX) {
            response_headers.push((header.to_string(), value.to_string()));
        } else {
            params.entry(key).or_insert(value);
        }
    }

    if params.is_empty() && filters.is_empty() && response_headers.is_empty() {
        return Err(CatalogError::InvalidDirective(
            "Missing mock params. Ex: mock{variable}: {value}".to_string(),
        ));
    }

    let flag = |key: &str| params.get(key).is_some_and(|v| is_true(v));
    let text = |key: &str| {
        params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(MockDirectives {
        tape_name: text("tape_name"),
        tape_url: text("tape_url"),
        tape_allow_live_recordings: params
            .get("tape_allowliverecordings")
            .map_or(true, |v| is_true(v)),
        tape_only: params.contains_key("tape_only"),
        tape_save: flag("tape_save"),
        name: text("name"),
        method: text("method"),
        response_code: params
            .get("response_code")
            .and_then(|v| v.trim().parse().ok()),
        response_headers,
        response_body: body,
        uses: params.get("use").and_then(|v| MockUse::parse(v)),
        read_only: flag("readonly"),
        live: flag("live"),
        await_response: params.get("await").map(|v| is_true(v)),
        filters: filter_group(&filters)?,
    })
}

/// Build the attractor group from `(key, value)` filter pairs, keys already
/// stripped of `mockfilter_`.
fn filter_group(filters: &[(String, &str)]) -> Result<AttractorGroup, CatalogError> {
    let mut group = AttractorGroup::new();

    if let Some((_, path)) = filters.iter().find(|(key, _)| key == "path") {
        group.routing_path = Some(AttractorBit::new(path)?);
    }

    for (key, value) in filters.iter().filter(|(key, _)| key.contains("param")) {
        for pair in value.split('&').filter(|p| !p.is_empty()) {
            group.query_params.push(filter_bit(key, pair)?);
        }
    }

    for (key, value) in filters.iter().filter(|(key, _)| key.contains("body")) {
        if !value.is_empty() {
            group.body.push(filter_bit(key, value)?);
        }
    }

    Ok(group)
}

fn filter_bit(key: &str, pattern: &str) -> Result<AttractorBit, CatalogError> {
    Ok(AttractorBit::new(pattern)?
        .optional(key.contains('~'))
        .negated(key.contains('!')))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(headers: &[(&str, &str)]) -> MockDirectives {
        parse_mock_directives(headers.iter().copied(), None).unwrap()
    }

    #[test]
    fn test_requires_mock_headers() {
        let result = parse_mock_directives([("content-type", "text/plain")], None);
        assert!(matches!(result, Err(CatalogError::InvalidDirective(_))));
    }

    #[test]
    fn test_tape_and_chapter_keys() {
        let directives = parse(&[
            ("mockTape_Name", "team/orders"),
            ("MOCKTAPE_URL", "http://orders.local"),
            ("mocktape_allowliverecordings", "false"),
            ("mockName", "get-order"),
            ("mockMethod", "POST"),
            ("mockResponse_Code", "201"),
            ("mockUse", "3"),
            ("x-request-id", "abc"),
        ]);

        assert_eq!(directives.tape_name.as_deref(), Some("team/orders"));
        assert_eq!(directives.tape_url.as_deref(), Some("http://orders.local"));
        assert!(!directives.tape_allow_live_recordings);
        assert_eq!(directives.name.as_deref(), Some("get-order"));
        assert_eq!(directives.method.as_deref(), Some("POST"));
        assert_eq!(directives.response_code, Some(201));
        assert_eq!(directives.uses, Some(MockUse::Count(3)));
        assert!(!directives.tape_only);
        assert!(directives.await_response.is_none());
    }

    #[test]
    fn test_flags() {
        let directives = parse(&[
            ("mockTape_Only", ""),
            ("mockTape_Save", "TRUE"),
            ("mockReadOnly", "true"),
            ("mockLive", "yes"),
            ("mockAwait", "false"),
        ]);

        assert!(directives.tape_only);
        assert!(directives.tape_save);
        assert!(directives.read_only);
        assert!(!directives.live);
        assert_eq!(directives.await_response, Some(false));
        assert!(directives.tape_allow_live_recordings);
    }

    #[test]
    fn test_response_headers_and_body() {
        let directives = parse_mock_directives(
            [
                ("mockName", "n"),
                ("mockHeaderOut_Content-Type", "application/json"),
                ("mockheaderout_x-trace", "1"),
            ],
            Some(r#"{"ok":true}"#.to_string()),
        )
        .unwrap();

        assert_eq!(
            directives.response_headers,
            vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("x-trace".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(directives.response_body.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn test_filters() {
        let directives = parse(&[
            ("mockFilter_Path", "/orders/\\d+"),
            ("mockFilter_Param", "a=1&b=2"),
            ("mockFilter_Param~", "verbose=true"),
            ("mockFilter_Body!", "secret"),
        ]);
        let group = directives.filters;

        assert_eq!(group.routing_path.unwrap().pattern(), "orders/\\d+");
        assert_eq!(group.query_params.len(), 3);
        assert!(group.query_params[0].is_required());
        assert!(!group.query_params[2].is_required());
        assert_eq!(group.body.len(), 1);
        assert!(group.body[0].is_negated());
        assert!(group.body[0].is_required());
    }

    #[test]
    fn test_malformed_filter() {
        let result = parse_mock_directives([("mockFilter_Path", "orders/(")], None);
        assert!(matches!(result, Err(CatalogError::Attractor(_))));
    }

    #[test]
    fn test_unknown_use_keeps_state() {
        let directives = parse(&[("mockUse", "sometimes")]);
        assert!(directives.uses.is_none());
    }
}
