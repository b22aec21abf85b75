//! Request parameter extraction: query string, urlencoded body, and multipart form data.

use std::collections::HashMap;

use crate::multipart;
use crate::urlencode;

/// A single extracted form/query parameter. Multipart fields carry extra metadata; plain
/// query/urlencoded pairs are bare text.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Text(String),
    File {
        value: Vec<u8>,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

/// Builds the `params` dict bound into the sandbox, per the specification's extraction
/// rules: split `QUERY_STRING` (and, for urlencoded bodies, the body) on any of `& = ` ,
/// URL-decode each token, then pair consecutive tokens as name/value. A multipart body
/// replaces the form-derived portion with parsed field properties.
pub fn extract_params(headers: &HashMap<String, String>, body: &[u8]) -> Vec<(String, ParamValue)> {
    let mut params: Vec<(String, ParamValue)> = Vec::new();

    if let Some(query) = headers.get("QUERY_STRING") {
        params.extend(pair_tokens(split_on_separators(query)));
    }

    let content_type = headers.get("HTTP_CONTENT_TYPE").map(|s| s.as_str()).unwrap_or("");

    if content_type == "application/x-www-form-urlencoded" && !body.is_empty() {
        if let Ok(body_str) = std::str::from_utf8(body) {
            params.extend(pair_tokens(split_on_separators(body_str)));
        }
    } else if content_type.starts_with("multipart/form-data") {
        if let Some(boundary) = multipart::boundary_from_content_type(content_type) {
            match multipart::parse(body, &boundary) {
                Ok(fields) => {
                    for field in fields {
                        let value = if field.filename.is_some() {
                            ParamValue::File {
                                value: field.value,
                                filename: field.filename,
                                content_type: field.content_type,
                            }
                        } else {
                            ParamValue::Text(
                                String::from_utf8_lossy(&field.value).into_owned(),
                            )
                        };
                        params.push((field.name, value));
                    }
                }
                Err(e) => {
                    tracing::debug!("failed to parse multipart body: {}", e);
                }
            }
        }
    }

    params
}

/// Splits on any of `&`, `=`, or space, URL-decoding nothing yet (callers pair, then decode).
fn split_on_separators(s: &str) -> Vec<&str> {
    s.split(|c| c == '&' || c == '=' || c == ' ').collect()
}

/// URL-decodes a flat token stream and pairs consecutive tokens as name/value.
fn pair_tokens<'a>(tokens: Vec<&'a str>) -> Vec<(String, ParamValue)> {
    let decoded: Vec<String> = tokens
        .into_iter()
        .map(|t| urlencode::decode(t).unwrap_or_else(|_| t.to_string()))
        .collect();
    let mut pairs = Vec::new();
    let mut iter = decoded.into_iter();
    while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((name, ParamValue::Text(value)));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extracts_query_string_pairs() {
        let h = headers(&[("QUERY_STRING", "a=1&b=2")]);
        let params = extract_params(&h, b"");
        assert_eq!(
            params,
            vec![
                ("a".to_string(), ParamValue::Text("1".to_string())),
                ("b".to_string(), ParamValue::Text("2".to_string())),
            ]
        );
    }

    #[test]
    fn extracts_urlencoded_body() {
        let h = headers(&[(
            "HTTP_CONTENT_TYPE",
            "application/x-www-form-urlencoded",
        )]);
        let params = extract_params(&h, b"a=1&b=2");
        assert_eq!(
            params,
            vec![
                ("a".to_string(), ParamValue::Text("1".to_string())),
                ("b".to_string(), ParamValue::Text("2".to_string())),
            ]
        );
    }

    #[test]
    fn decodes_percent_escapes_in_query() {
        let h = headers(&[("QUERY_STRING", "name=John%20Doe")]);
        let params = extract_params(&h, b"");
        assert_eq!(
            params[0],
            ("name".to_string(), ParamValue::Text("John Doe".to_string()))
        );
    }

    #[test]
    fn no_body_extraction_without_matching_content_type() {
        let h = headers(&[]);
        let params = extract_params(&h, b"a=1&b=2");
        assert!(params.is_empty());
    }
}
