use axum::extract::{Query, rejection::QueryRejection};

use crate::handlers::error::ApiError;

/// Raw query pairs in request order, repeated keys included
pub type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Value of a query parameter that must be given exactly once.
pub fn single_param(query: &QueryPairs, name: &str) -> Result<String, ApiError> {
    let Ok(Query(pairs)) = query else {
        return Err(ApiError::BadRequest("malformed query string".to_string()));
    };

    let mut values = pairs.iter().filter(|(key, _)| key == name).map(|(_, value)| value);
    match (values.next(), values.next()) {
        (Some(value), None) if !value.is_empty() => Ok(value.clone()),
        (None, _) | (Some(_), None) => Err(ApiError::BadRequest(format!("\"{}\" query parameter is required", name))),
        _ => Err(ApiError::BadRequest(format!(
            "single \"{}\" query parameter must be provided",
            name
        ))),
    }
}
