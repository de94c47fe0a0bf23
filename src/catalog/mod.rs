//! Product catalog stored in a ShelfDB collection, and the canned queries
//! run against it.

pub mod clock;
pub mod fixture;
pub mod model;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::engine::ShelfDb;
use crate::error::{Error, Result};
use crate::projection::Projection;
use crate::query::FindOptions;

pub use clock::{Clock, FixedClock, SystemClock};
pub use model::{CategoryPriceStats, NewReview, Product, ProductSummary, RatedProduct, Review};

pub const DEFAULT_COLLECTION: &str = "products";
pub const AFFORDABLE_CATEGORY: &str = "Electronics";
pub const AFFORDABLE_MAX_PRICE: f64 = 50_000.0;
pub const HIGH_RATING_THRESHOLD: f64 = 4.0;

fn decode<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(Error::from))
        .collect()
}

/// A product collection inside a database handle.
pub struct Catalog<'db> {
    db: &'db ShelfDb,
    collection: String,
}

impl<'db> Catalog<'db> {
    pub fn new(db: &'db ShelfDb, collection: impl Into<String>) -> Self {
        Self {
            db,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Replace the collection's contents with `products`, in order.
    ///
    /// `product_id` is made unique; a duplicate aborts the insert and leaves
    /// the collection empty.
    pub fn seed(&self, products: &[Product]) -> Result<usize> {
        let docs = products
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.db.drop_collection(&self.collection)?;
        self.db.create_unique_index(&self.collection, "product_id")?;
        let ids = self.db.insert_many(&self.collection, docs)?;

        info!(collection = %self.collection, products = ids.len(), "seeded catalog");
        Ok(ids.len())
    }

    /// All products in natural order.
    pub fn products(&self) -> Result<Vec<Product>> {
        decode(self.db.find(&self.collection, &json!({}))?)
    }

    pub fn product(&self, product_id: &str) -> Result<Option<Product>> {
        self.db
            .find_one(&self.collection, &json!({"product_id": product_id}))?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::from)
    }

    /// Products in `category` priced strictly below `max_price`, projected to
    /// name, price and stock.
    pub fn products_in_category_below(
        &self,
        category: &str,
        max_price: f64,
    ) -> Result<Vec<ProductSummary>> {
        let opts = FindOptions::default().projection(
            Projection::new()
                .include("name")
                .include("price")
                .include("stock")
                .exclude("_id"),
        );
        let docs = self.db.find_with_options(
            &self.collection,
            &json!({"category": category, "price": {"$lt": max_price}}),
            &opts,
        )?;
        info!(category, max_price, matched = docs.len(), "category price query");
        decode(docs)
    }

    pub fn affordable_electronics(&self) -> Result<Vec<ProductSummary>> {
        self.products_in_category_below(AFFORDABLE_CATEGORY, AFFORDABLE_MAX_PRICE)
    }

    /// Products whose mean review rating is at least `min_avg`. Products
    /// without reviews have no average and are never returned.
    pub fn highly_rated(&self, min_avg: f64) -> Result<Vec<RatedProduct>> {
        let docs = self.db.aggregate(
            &self.collection,
            &json!([
                {"$addFields": {"avg_rating": {"$avg": "$reviews.rating"}}},
                {"$match": {"avg_rating": {"$gte": min_avg}}},
                {"$project": {"name": 1, "avg_rating": 1}}
            ]),
        )?;
        info!(min_avg, matched = docs.len(), "rating aggregation");
        decode(docs)
    }

    /// Append a review dated `clock.today()` to the product's review list.
    ///
    /// Returns [`Error::ProductNotFound`] when no product has `product_id`;
    /// nothing is written in that case.
    pub fn append_review(
        &self,
        product_id: &str,
        review: NewReview,
        clock: &dyn Clock,
    ) -> Result<Review> {
        let review = review.dated(clock.today());
        let result = self.db.update_one(
            &self.collection,
            &json!({"product_id": product_id}),
            &json!({"$push": {"reviews": serde_json::to_value(&review)?}}),
        )?;
        if result.matched_count == 0 {
            warn!(product_id, "review target not found");
            return Err(Error::ProductNotFound(product_id.to_string()));
        }
        info!(product_id, date = %review.date, "review appended");
        Ok(review)
    }

    /// Average price and product count per category, highest average first.
    pub fn category_price_summary(&self) -> Result<Vec<CategoryPriceStats>> {
        let docs = self.db.aggregate(
            &self.collection,
            &json!([
                {"$group": {
                    "_id": "$category",
                    "avg_price": {"$avg": "$price"},
                    "product_count": {"$sum": 1}
                }},
                {"$sort": {"avg_price": -1}}
            ]),
        )?;
        info!(categories = docs.len(), "category price aggregation");
        decode(docs)
    }
}
