//! Search request and response types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::vision::RecognizedCode;

/// A catalog entry returned by the search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub product_url: String,
    #[serde(default)]
    pub sale_price: String,
    #[serde(default)]
    pub original_price: String,
}

impl Product {
    /// Whether the original price should be shown next to the sale price
    pub fn is_discounted(&self) -> bool {
        !self.original_price.is_empty() && self.original_price != self.sale_price
    }
}

/// Raw body of `GET /search?keyword=...`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<Vec<Product>>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Transport-level search failures
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search service unreachable: {0}")]
    Transport(String),
    #[error("malformed search response: {0}")]
    Malformed(String),
    /// Non-2xx answer whose body is not a search response
    #[error("search service returned HTTP {0}")]
    HttpStatus(u16),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("search query is empty")]
    Empty,
}

/// Where a search request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrigin {
    Scan,
    Manual,
}

impl fmt::Display for QueryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOrigin::Scan => f.write_str("scan"),
            QueryOrigin::Manual => f.write_str("manual"),
        }
    }
}

/// A non-empty search string plus its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    /// Detection cycle that produced a scan query
    scan_cycle: Option<u64>,
}

impl SearchQuery {
    /// Query typed by the user. Surrounding whitespace is dropped.
    pub fn manual(text: &str) -> Result<Self, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(Self {
            text: text.to_string(),
            scan_cycle: None,
        })
    }

    /// Query for a code detected during scan cycle `cycle`
    pub fn scan(code: &RecognizedCode, cycle: u64) -> Self {
        Self {
            text: code.as_str().to_string(),
            scan_cycle: Some(cycle),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> QueryOrigin {
        if self.scan_cycle.is_some() {
            QueryOrigin::Scan
        } else {
            QueryOrigin::Manual
        }
    }

    pub fn scan_cycle(&self) -> Option<u64> {
        self.scan_cycle
    }
}

/// Why a search produced no results
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The service answered but reported an error
    Service(String),
    /// The service could not be reached or answered garbage
    NetworkError(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Service(msg) => write!(f, "search failed: {}", msg),
            FailureReason::NetworkError(msg) => write!(f, "network error: {}", msg),
        }
    }
}

/// Classified result of one search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Success {
        products: Vec<Product>,
        duration_sec: f64,
    },
    Empty {
        keyword: String,
    },
    Failure {
        reason: FailureReason,
    },
}

impl SearchOutcome {
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            SearchOutcome::Failure {
                reason: FailureReason::NetworkError(_)
            }
        )
    }
}

/// Sort a raw service answer into a [`SearchOutcome`]
pub fn classify(query: &SearchQuery, result: Result<SearchResponse, SearchError>) -> SearchOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            return SearchOutcome::Failure {
                reason: FailureReason::NetworkError(err.to_string()),
            }
        }
    };

    let keyword = response
        .keyword
        .clone()
        .unwrap_or_else(|| query.text().to_string());

    match response.status.as_str() {
        "success" => match response.data {
            Some(products) if !products.is_empty() => SearchOutcome::Success {
                products,
                duration_sec: response.duration_sec.unwrap_or(0.0),
            },
            _ => SearchOutcome::Empty { keyword },
        },
        "fail" => SearchOutcome::Empty { keyword },
        other => SearchOutcome::Failure {
            reason: FailureReason::Service(
                response
                    .message
                    .unwrap_or_else(|| format!("unexpected status {:?}", other)),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(text: &str) -> SearchQuery {
        SearchQuery::manual(text).unwrap()
    }

    fn parse(json: &str) -> SearchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_manual_query_trims_and_rejects_empty() {
        assert_eq!(SearchQuery::manual("  leggings ").unwrap().text(), "leggings");
        assert_eq!(SearchQuery::manual(""), Err(QueryError::Empty));
        assert_eq!(SearchQuery::manual("   \t"), Err(QueryError::Empty));
    }

    #[test]
    fn test_query_origin() {
        let code = crate::vision::CodeMatcher::default().find("XYZAB-34").unwrap();
        let scan = SearchQuery::scan(&code, 7);
        assert_eq!(scan.origin(), QueryOrigin::Scan);
        assert_eq!(scan.scan_cycle(), Some(7));
        assert_eq!(scan.text(), "XYZAB-34");
        assert_eq!(manual("x").origin(), QueryOrigin::Manual);
    }

    #[test]
    fn test_success_with_products() {
        let response = parse(
            r#"{"status":"success","data":[{"product_name":"Air Leggings","product_url":"https://shop/p/1","sale_price":"39,000원","original_price":"49,000원"}],"duration_sec":0.4,"keyword":"XYZAB-34"}"#,
        );

        match classify(&manual("XYZAB-34"), Ok(response)) {
            SearchOutcome::Success {
                products,
                duration_sec,
            } => {
                assert_eq!(products.len(), 1);
                assert_eq!(products[0].product_name, "Air Leggings");
                assert!(products[0].is_discounted());
                assert!((duration_sec - 0.4).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_success_without_data_is_empty() {
        let outcome = classify(&manual("ABCDE-12"), Ok(parse(r#"{"status":"success","data":[]}"#)));
        assert_eq!(
            outcome,
            SearchOutcome::Empty {
                keyword: "ABCDE-12".to_string()
            }
        );

        let outcome = classify(&manual("ABCDE-12"), Ok(parse(r#"{"status":"success"}"#)));
        assert!(matches!(outcome, SearchOutcome::Empty { .. }));
    }

    #[test]
    fn test_fail_status_uses_service_keyword() {
        let outcome = classify(
            &manual("abcde-12"),
            Ok(parse(r#"{"status":"fail","message":"Not found","keyword":"ABCDE-12"}"#)),
        );
        assert_eq!(
            outcome,
            SearchOutcome::Empty {
                keyword: "ABCDE-12".to_string()
            }
        );
    }

    #[test]
    fn test_error_status_is_service_failure() {
        let outcome = classify(
            &manual("ABCDE-12"),
            Ok(parse(r#"{"status":"error","message":"browser crashed"}"#)),
        );
        assert_eq!(
            outcome,
            SearchOutcome::Failure {
                reason: FailureReason::Service("browser crashed".to_string())
            }
        );
        assert!(!outcome.is_network_error());
    }

    #[test]
    fn test_transport_faults_are_network_errors() {
        let outcome = classify(
            &manual("ABCDE-12"),
            Err(SearchError::Transport("connection refused".to_string())),
        );
        assert!(outcome.is_network_error());

        let outcome = classify(
            &manual("ABCDE-12"),
            Err(SearchError::Malformed("expected value".to_string())),
        );
        assert!(outcome.is_network_error());

        // Error page that is not a search response
        let outcome = classify(&manual("ABCDE-12"), Err(SearchError::HttpStatus(502)));
        assert!(outcome.is_network_error());
    }

    #[test]
    fn test_same_prices_not_discounted() {
        let product = Product {
            product_name: "Tee".to_string(),
            product_url: String::new(),
            sale_price: "19,000원".to_string(),
            original_price: "19,000원".to_string(),
        };
        assert!(!product.is_discounted());
    }
}
