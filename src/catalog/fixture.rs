use std::path::Path;

use tracing::debug;

use super::model::Product;
use crate::error::Result;

const DEFAULT_CATALOG: &str = include_str!("../../fixtures/products.json");

/// The built-in ten-product catalog.
pub fn default_products() -> Result<Vec<Product>> {
    parse(DEFAULT_CATALOG)
}

/// Parse a JSON array of products.
pub fn parse(json: &str) -> Result<Vec<Product>> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_path(path: &Path) -> Result<Vec<Product>> {
    let products = parse(&std::fs::read_to_string(path)?)?;
    debug!(path = %path.display(), products = products.len(), "loaded fixture");
    Ok(products)
}
