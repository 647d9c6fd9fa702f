// src/filters.rs
// Typed parse of `filters[...]` query parameters into an AggregationRequest.

use std::collections::HashMap;

use crate::aggregate::AggregationRequest;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("filters[{field}] must be a non-negative number, got '{value}'")]
    InvalidPrice { field: &'static str, value: String },

    #[error("filters[cryptoLimit] must be a positive integer, got '{value}'")]
    InvalidLimit { value: String },

    #[error("filters[minPrice] ({min}) must not exceed filters[maxPrice] ({max})")]
    InvertedRange { min: f64, max: f64 },

    #[error("query string could not be decoded: {0}")]
    MalformedQuery(String),
}

/// Look up `filters[name]`, falling back to a bare `name`. Blank is absent.
fn lookup<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(&format!("filters[{name}]"))
        .or_else(|| params.get(name))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_price(
    params: &HashMap<String, String>,
    field: &'static str,
) -> Result<Option<f64>, ValidationError> {
    let Some(raw) = lookup(params, field) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(ValidationError::InvalidPrice {
            field,
            value: raw.to_string(),
        }),
    }
}

fn parse_limit(params: &HashMap<String, String>) -> Result<Option<u32>, ValidationError> {
    let Some(raw) = lookup(params, "cryptoLimit") else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(v) if v > 0 => Ok(Some(v)),
        _ => Err(ValidationError::InvalidLimit {
            value: raw.to_string(),
        }),
    }
}

pub fn parse_filters(params: &HashMap<String, String>) -> Result<AggregationRequest, ValidationError> {
    let defaults = AggregationRequest::default();
    let min_price = parse_price(params, "minPrice")?;
    let max_price = parse_price(params, "maxPrice")?;
    if let (Some(min), Some(max)) = (min_price, max_price) {
        if min > max {
            return Err(ValidationError::InvertedRange { min, max });
        }
    }

    Ok(AggregationRequest {
        crypto: lookup(params, "crypto")
            .map(str::to_string)
            .unwrap_or(defaults.crypto),
        city: lookup(params, "city")
            .map(str::to_string)
            .unwrap_or(defaults.city),
        news_query: lookup(params, "newsQuery")
            .map(str::to_string)
            .unwrap_or(defaults.news_query),
        min_price,
        max_price,
        crypto_limit: parse_limit(params)?,
    })
}
