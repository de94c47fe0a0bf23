use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A catalog entry as stored in the `products` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: u32,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl Product {
    /// Mean of the review ratings, or `None` for a product without reviews.
    pub fn average_rating(&self) -> Option<f64> {
        if self.reviews.is_empty() {
            return None;
        }
        let total: i64 = self.reviews.iter().map(|r| i64::from(r.rating)).sum();
        Some(total as f64 / self.reviews.len() as f64)
    }
}

/// A review embedded in its product. Serialized dates use `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub user_id: String,
    pub username: String,
    pub rating: i32,
    pub comment: String,
    pub date: NaiveDate,
}

/// Review content supplied by a caller; the date is stamped on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub user_id: String,
    pub username: String,
    pub rating: i32,
    pub comment: String,
}

impl NewReview {
    pub fn dated(self, date: NaiveDate) -> Review {
        Review {
            user_id: self.user_id,
            username: self.username,
            rating: self.rating,
            comment: self.comment,
            date,
        }
    }
}

/// `{name, price, stock}` projection of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedProduct {
    pub name: String,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPriceStats {
    #[serde(rename = "_id")]
    pub category: String,
    pub avg_price: f64,
    pub product_count: u64,
}
