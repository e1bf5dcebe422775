//! GET serialization of resolved queries, analytics-API style.
//!
//! `dimension=dx:a;b&dimension=ou:x;y&dimension=pe:202401&skipMeta=true`
//!
//! Dimension values are fully percent-encoded (`:` and `;` included), which is
//! what most HTTP clients send and gives the longest, safest length estimate.

use super::model::{Dimension, Query};
use crate::error::{Error, Result};

/// Serialize a resolved query into its query string.
pub fn encode_query_string(query: &Query) -> Result<String> {
    let mut params = Vec::with_capacity(Dimension::ALL.len() + query.flags().len());
    for dimension in Dimension::ALL {
        params.push(format!("dimension={}", encode_dimension(query, dimension)?));
    }
    for (name, value) in query.flags() {
        params.push(format!("{}={}", urlencoding::encode(name), value));
    }
    Ok(params.join("&"))
}

/// Length of the serialized query string.
pub fn encoded_len(query: &Query) -> Result<usize> {
    encode_query_string(query).map(|s| s.len())
}

/// Encoded length contributed by one dimension's identifier list.
pub(crate) fn dimension_encoded_len(query: &Query, dimension: Dimension) -> Result<usize> {
    encode_dimension(query, dimension).map(|s| s.len())
}

fn encode_dimension(query: &Query, dimension: Dimension) -> Result<String> {
    let ids = query
        .dimension(dimension)
        .ids()
        .ok_or(Error::UnresolvedDimension(dimension))?;
    let value = format!("{}:{}", dimension.key(), ids.join(";"));
    Ok(urlencoding::encode(&value).into_owned())
}
